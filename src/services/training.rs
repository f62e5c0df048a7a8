// Simulated training job with observable progress

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::core::config::TrainingConfig;
use crate::core::errors::TrainingError;
use crate::utils::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Idle,
    Running { progress: u8 },
    Completed { finished_at: DateTime<Utc> },
}

/// Status body reported to clients
#[derive(Debug, Clone, Serialize)]
pub struct TrainingStatus {
    pub state: &'static str,
    pub is_training: bool,
    pub progress: u8,
    pub last_trained: Option<DateTime<Utc>>,
}

/// Tracks one training run at a time.
///
/// The job only advances progress in equal steps; it performs no learning.
#[derive(Clone)]
pub struct TrainingTracker {
    state: Arc<RwLock<TrainingState>>,
    last_trained: Arc<RwLock<Option<DateTime<Utc>>>>,
    total_steps: u32,
    step_interval: Duration,
    metrics: Option<Metrics>,
}

impl TrainingTracker {
    pub fn new(config: &TrainingConfig, metrics: Option<Metrics>) -> Self {
        Self {
            state: Arc::new(RwLock::new(TrainingState::Idle)),
            last_trained: Arc::new(RwLock::new(None)),
            total_steps: config.total_steps.max(1),
            step_interval: config.step_interval,
            metrics,
        }
    }

    pub fn state(&self) -> TrainingState {
        *self.state.read()
    }

    pub fn status(&self) -> TrainingStatus {
        let state = self.state();
        let (name, progress) = match state {
            TrainingState::Idle => ("idle", 0),
            TrainingState::Running { progress } => ("running", progress),
            TrainingState::Completed { .. } => ("completed", 100),
        };
        TrainingStatus {
            state: name,
            is_training: matches!(state, TrainingState::Running { .. }),
            progress,
            last_trained: *self.last_trained.read(),
        }
    }

    /// Start a run in the background; fails while one is in progress
    pub fn start(&self) -> Result<(), TrainingError> {
        {
            let mut state = self.state.write();
            if let TrainingState::Running { progress } = *state {
                return Err(TrainingError::AlreadyRunning { progress });
            }
            *state = TrainingState::Running { progress: 0 };
        }

        if let Some(ref m) = self.metrics {
            m.record_training_run();
        }
        info!("Training started ({} steps)", self.total_steps);

        let tracker = self.clone();
        tokio::spawn(async move {
            tracker.run().await;
        });
        Ok(())
    }

    async fn run(&self) {
        for step in 1..=self.total_steps {
            tokio::time::sleep(self.step_interval).await;
            let progress = (step * 100 / self.total_steps) as u8;
            *self.state.write() = TrainingState::Running { progress };
        }

        let finished_at = Utc::now();
        *self.last_trained.write() = Some(finished_at);
        *self.state.write() = TrainingState::Completed { finished_at };
        info!("✓ Training completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(steps: u32, interval_ms: u64) -> TrainingTracker {
        TrainingTracker::new(
            &TrainingConfig {
                total_steps: steps,
                step_interval: Duration::from_millis(interval_ms),
            },
            None,
        )
    }

    async fn wait_for_completion(tracker: &TrainingTracker) {
        for _ in 0..200 {
            if matches!(tracker.state(), TrainingState::Completed { .. }) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("training did not complete: {:?}", tracker.state());
    }

    #[tokio::test]
    async fn test_idle_running_completed() {
        let tracker = tracker(4, 10);
        let status = tracker.status();
        assert_eq!(status.state, "idle");
        assert!(status.last_trained.is_none());

        tracker.start().unwrap();
        assert!(tracker.status().is_training);

        wait_for_completion(&tracker).await;
        let status = tracker.status();
        assert_eq!(status.state, "completed");
        assert_eq!(status.progress, 100);
        assert!(!status.is_training);
        assert!(status.last_trained.is_some());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let tracker = tracker(10, 50);
        tracker.start().unwrap();
        assert!(matches!(
            tracker.start(),
            Err(TrainingError::AlreadyRunning { .. })
        ));
    }

    #[tokio::test]
    async fn test_can_restart_after_completion() {
        let tracker = tracker(2, 5);
        tracker.start().unwrap();
        wait_for_completion(&tracker).await;

        tracker.start().unwrap();
        assert!(matches!(tracker.state(), TrainingState::Running { .. }));
    }

    #[tokio::test]
    async fn test_progress_moves_in_equal_steps() {
        let tracker = tracker(10, 30);
        tracker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        match tracker.state() {
            TrainingState::Running { progress } => {
                assert!(progress > 0 && progress < 100);
                assert_eq!(progress % 10, 0);
            }
            other => panic!("unexpected state {:?}", other),
        }
    }
}

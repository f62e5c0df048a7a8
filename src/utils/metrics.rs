use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Most recent latency samples kept per series
const MAX_SAMPLES: usize = 4096;

/// Process-wide metrics collector.
///
/// Tracks images read, cells decoded, translator outcomes, cache performance
/// and per-endpoint traffic. Cheap to clone and share.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    // Detection
    images_processed: AtomicUsize,
    images_failed: AtomicUsize,
    blank_images: AtomicUsize,
    cells_detected: AtomicUsize,
    unrecognized_cells: AtomicUsize,
    dropped_blobs: AtomicUsize,
    detection_latency_ms: RwLock<Vec<u64>>,

    // External translator
    translator_calls: AtomicUsize,
    translator_success: AtomicUsize,
    translator_failed: AtomicUsize,
    translator_fallbacks: AtomicUsize,
    translator_latency_ms: RwLock<Vec<u64>>,

    // Translation cache
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    cache_size: AtomicUsize,

    // Feedback and training
    feedback_received: AtomicUsize,
    training_runs: AtomicUsize,

    endpoint_counters: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

fn push_sample(series: &RwLock<Vec<u64>>, duration: Duration) {
    let mut samples = series.write();
    if samples.len() >= MAX_SAMPLES {
        samples.remove(0);
    }
    samples.push(duration.as_millis() as u64);
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                images_processed: AtomicUsize::new(0),
                images_failed: AtomicUsize::new(0),
                blank_images: AtomicUsize::new(0),
                cells_detected: AtomicUsize::new(0),
                unrecognized_cells: AtomicUsize::new(0),
                dropped_blobs: AtomicUsize::new(0),
                detection_latency_ms: RwLock::new(Vec::new()),
                translator_calls: AtomicUsize::new(0),
                translator_success: AtomicUsize::new(0),
                translator_failed: AtomicUsize::new(0),
                translator_fallbacks: AtomicUsize::new(0),
                translator_latency_ms: RwLock::new(Vec::new()),
                cache_hits: AtomicUsize::new(0),
                cache_misses: AtomicUsize::new(0),
                cache_size: AtomicUsize::new(0),
                feedback_received: AtomicUsize::new(0),
                training_runs: AtomicUsize::new(0),
                endpoint_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Detection
    pub fn record_image(&self, cells: usize, unrecognized: usize, dropped: usize, duration: Duration) {
        self.inner.images_processed.fetch_add(1, Ordering::Relaxed);
        if cells == 0 {
            self.inner.blank_images.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.cells_detected.fetch_add(cells, Ordering::Relaxed);
        self.inner.unrecognized_cells.fetch_add(unrecognized, Ordering::Relaxed);
        self.inner.dropped_blobs.fetch_add(dropped, Ordering::Relaxed);
        push_sample(&self.inner.detection_latency_ms, duration);
    }

    pub fn record_image_failure(&self) {
        self.inner.images_failed.fetch_add(1, Ordering::Relaxed);
    }

    // External translator
    pub fn record_translator_call(&self, success: bool, duration: Duration) {
        self.inner.translator_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.translator_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.translator_failed.fetch_add(1, Ordering::Relaxed);
        }
        push_sample(&self.inner.translator_latency_ms, duration);
    }

    pub fn record_translator_fallback(&self) {
        self.inner.translator_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    // Cache
    pub fn record_cache_hit(&self) {
        self.inner.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.inner.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_cache_size(&self, size: usize) {
        self.inner.cache_size.store(size, Ordering::Relaxed);
    }

    pub fn record_feedback(&self) {
        self.inner.feedback_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_training_run(&self) {
        self.inner.training_runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_endpoint_request(&self, endpoint: &str) {
        self.inner
            .endpoint_counters
            .entry(endpoint.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let detection = self.inner.detection_latency_ms.read();
        let detection_latency_avg_ms = avg(&detection);
        let detection_latency_p50_ms = percentile(&detection, 0.5);
        let detection_latency_p95_ms = percentile(&detection, 0.95);
        drop(detection);

        let translator_latency_avg_ms = avg(&self.inner.translator_latency_ms.read());

        let cache_hits = self.inner.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.inner.cache_misses.load(Ordering::Relaxed);
        let cache_total = cache_hits + cache_misses;
        let cache_hit_rate = if cache_total > 0 {
            cache_hits as f64 / cache_total as f64
        } else {
            0.0
        };

        let endpoint_requests = self
            .inner
            .endpoint_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            images_processed: self.inner.images_processed.load(Ordering::Relaxed),
            images_failed: self.inner.images_failed.load(Ordering::Relaxed),
            blank_images: self.inner.blank_images.load(Ordering::Relaxed),
            cells_detected: self.inner.cells_detected.load(Ordering::Relaxed),
            unrecognized_cells: self.inner.unrecognized_cells.load(Ordering::Relaxed),
            dropped_blobs: self.inner.dropped_blobs.load(Ordering::Relaxed),
            detection_latency_avg_ms,
            detection_latency_p50_ms,
            detection_latency_p95_ms,
            translator_calls: self.inner.translator_calls.load(Ordering::Relaxed),
            translator_success: self.inner.translator_success.load(Ordering::Relaxed),
            translator_failed: self.inner.translator_failed.load(Ordering::Relaxed),
            translator_fallbacks: self.inner.translator_fallbacks.load(Ordering::Relaxed),
            translator_latency_avg_ms,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            cache_size: self.inner.cache_size.load(Ordering::Relaxed),
            feedback_received: self.inner.feedback_received.load(Ordering::Relaxed),
            training_runs: self.inner.training_runs.load(Ordering::Relaxed),
            endpoint_requests,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = format!(
            r#"# HELP braille_images_processed_total Images run through the cell detector
# TYPE braille_images_processed_total counter
braille_images_processed_total {}

# HELP braille_images_failed_total Images rejected before detection
# TYPE braille_images_failed_total counter
braille_images_failed_total {}

# HELP braille_blank_images_total Images in which no cell was found
# TYPE braille_blank_images_total counter
braille_blank_images_total {}

# HELP braille_cells_detected_total Cells decoded, including inserted spaces
# TYPE braille_cells_detected_total counter
braille_cells_detected_total {}

# HELP braille_unrecognized_cells_total Cells decoded to the unrecognized marker
# TYPE braille_unrecognized_cells_total counter
braille_unrecognized_cells_total {}

# HELP braille_dropped_blobs_total Dots that could not be placed in a cell
# TYPE braille_dropped_blobs_total counter
braille_dropped_blobs_total {}

# HELP braille_detection_latency_avg_ms Average detection latency in milliseconds
# TYPE braille_detection_latency_avg_ms gauge
braille_detection_latency_avg_ms {}

# HELP braille_translator_calls_total Calls to the external translator
# TYPE braille_translator_calls_total counter
braille_translator_calls_total{{outcome="success"}} {}
braille_translator_calls_total{{outcome="failure"}} {}

# HELP braille_translator_fallbacks_total Requests answered with the basic transliteration
# TYPE braille_translator_fallbacks_total counter
braille_translator_fallbacks_total {}

# HELP braille_cache_hit_rate Translation cache hit rate (0.0 to 1.0)
# TYPE braille_cache_hit_rate gauge
braille_cache_hit_rate {}

# HELP braille_cache_size Translation cache entries
# TYPE braille_cache_size gauge
braille_cache_size {}

# HELP braille_feedback_received_total Feedback records accepted
# TYPE braille_feedback_received_total counter
braille_feedback_received_total {}

# HELP braille_uptime_seconds Process uptime in seconds
# TYPE braille_uptime_seconds counter
braille_uptime_seconds {}
"#,
            s.images_processed,
            s.images_failed,
            s.blank_images,
            s.cells_detected,
            s.unrecognized_cells,
            s.dropped_blobs,
            s.detection_latency_avg_ms,
            s.translator_success,
            s.translator_failed,
            s.translator_fallbacks,
            s.cache_hit_rate,
            s.cache_size,
            s.feedback_received,
            s.uptime_seconds,
        );

        if !s.endpoint_requests.is_empty() {
            out.push_str("\n# HELP braille_http_requests_total Requests per endpoint\n");
            out.push_str("# TYPE braille_http_requests_total counter\n");
            for (endpoint, count) in &s.endpoint_requests {
                out.push_str(&format!(
                    "braille_http_requests_total{{endpoint=\"{}\"}} {}\n",
                    endpoint, count
                ));
            }
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub images_processed: usize,
    pub images_failed: usize,
    pub blank_images: usize,
    pub cells_detected: usize,
    pub unrecognized_cells: usize,
    pub dropped_blobs: usize,
    pub detection_latency_avg_ms: u64,
    pub detection_latency_p50_ms: u64,
    pub detection_latency_p95_ms: u64,
    pub translator_calls: usize,
    pub translator_success: usize,
    pub translator_failed: usize,
    pub translator_fallbacks: usize,
    pub translator_latency_avg_ms: u64,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_hit_rate: f64,
    pub cache_size: usize,
    pub feedback_received: usize,
    pub training_runs: usize,
    pub endpoint_requests: BTreeMap<String, usize>,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_image(3, 1, 0, Duration::from_millis(20));
        metrics.record_image(0, 0, 2, Duration::from_millis(10));
        metrics.record_translator_call(true, Duration::from_millis(100));
        metrics.record_translator_call(false, Duration::from_millis(50));
        metrics.record_translator_fallback();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_endpoint_request("/health");
        metrics.record_endpoint_request("/health");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.images_processed, 2);
        assert_eq!(snapshot.blank_images, 1);
        assert_eq!(snapshot.cells_detected, 3);
        assert_eq!(snapshot.unrecognized_cells, 1);
        assert_eq!(snapshot.dropped_blobs, 2);
        assert_eq!(snapshot.detection_latency_avg_ms, 15);
        assert_eq!(snapshot.translator_calls, 2);
        assert_eq!(snapshot.translator_success, 1);
        assert_eq!(snapshot.translator_failed, 1);
        assert_eq!(snapshot.translator_fallbacks, 1);
        assert_eq!(snapshot.cache_hit_rate, 0.5);
        assert_eq!(snapshot.endpoint_requests.get("/health"), Some(&2));
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_image(4, 0, 0, Duration::from_millis(5));
        metrics.record_endpoint_request("/process-image");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("braille_images_processed_total 1"));
        assert!(prometheus.contains("braille_cells_detected_total 4"));
        assert!(prometheus.contains("braille_http_requests_total{endpoint=\"/process-image\"} 1"));
    }

    #[test]
    fn test_latency_samples_are_bounded() {
        let metrics = Metrics::new();
        for _ in 0..MAX_SAMPLES + 10 {
            metrics.record_image(1, 0, 0, Duration::from_millis(1));
        }
        assert_eq!(metrics.inner.detection_latency_ms.read().len(), MAX_SAMPLES);
    }
}

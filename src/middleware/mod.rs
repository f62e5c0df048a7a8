// Middleware for resilient calls to the external translator

pub mod circuit_breaker;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};

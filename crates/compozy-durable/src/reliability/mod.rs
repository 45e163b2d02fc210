//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff
//! - [`CircuitBreakerConfig`] - Circuit breaker configuration
//! - [`TimeoutManager`] - Start-to-close / schedule-to-start / heartbeat timeout enforcement

mod circuit_breaker;
mod retry;
mod timeout;

pub use circuit_breaker::{CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
pub use timeout::{TimeoutError, TimeoutManager};

pub mod circuit_breaker;
pub mod http_client_factory;
pub mod rate_limiter;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use http_client_factory::HttpClientFactory;
pub use rate_limiter::{RateLimiter, RateLimiterConfig};

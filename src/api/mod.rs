//! Generic Microsoft API invocation engine
//!
//! One entry point ([`ApiDispatcher`]) over two backends (Microsoft Graph,
//! Azure Resource Management), with uniform retry, pagination, token
//! caching and response shaping.

pub mod azure;
pub mod backend;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod graph;
pub mod paginate;
pub mod rate_limit;
pub mod request;
pub mod retry;

pub use dispatch::{ApiDispatcher, DispatchOutcome};
pub use error::ApiError;
pub use rate_limit::{RateLimiter, TokenBucketLimiter};
pub use request::{ApiRequest, Backend, HttpMethod, ResponseFormat};
pub use retry::RetryPolicy;

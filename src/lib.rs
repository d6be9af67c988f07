#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod classify;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod probe;
pub mod remap;
pub mod silence;
pub mod telemetry;
pub mod throttle;
pub mod types;

pub use classify::FailedRequest;
pub use interceptor::{ErrorInterceptor, HideErrorsFlag, NotificationSink, Outcome};

pub type Result<T> = std::result::Result<T, error::Error>;

pub mod retry;

pub use retry::{retry_on_transient, retry_when, IsTransient, RetryConfig};

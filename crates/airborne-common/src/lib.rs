pub mod cmd;
pub mod cost;
pub mod error;
pub mod retry;

pub use cmd::{parse_command, CommandOutcome};
pub use cost::{CostRate, CostRateTable, ZeroCostRateTable};
pub use error::AirborneError;
pub use retry::{is_retryable, retry_with_backoff, RetryConfig};

pub mod dispatcher;
pub mod request;

pub use dispatcher::Dispatcher;
pub use request::{DispatchOutcome, DispatchRequest, DispatchResult};

//! Response Handler Pipeline: turns an activity outcome plus its task
//! config into persisted `TaskState` and the next dispatch directive.

pub mod dispatch;
pub mod error;
pub mod types;

pub use dispatch::{handle_response, ResponseHandler};
pub use error::ResponseError;
pub use types::{ActivityOutcome, NextDirective, ResponseInput, ResponseOutcome, ResponseResult};

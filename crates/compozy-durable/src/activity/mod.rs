//! Activity error type.
//!
//! Activities themselves are plain `Fn(ClaimedTask) -> Future<ActivityResult>`
//! closures registered with a `WorkerPool` (see `crate::worker::pool`); this
//! module only owns the error type they report through.

mod definition;

pub use definition::ActivityError;

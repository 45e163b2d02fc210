//! Event envelope, subject grammar, and publication.

pub mod envelope;
pub mod publisher;
pub mod subject;

pub use envelope::{Event, EventId};
pub use publisher::{EventPublisher, InProcessEventPublisher, PublishError};
pub use subject::{Subject, SubjectComponent, SubjectError, SubjectKind};

pub mod error;
pub mod resource;
pub mod state;

pub use error::StoreError;
pub use resource::{InMemoryResourceStore, ResourceEvent, ResourceEventStream, ResourceStore};
pub use state::{InMemoryStateStore, StateStore, TaskRepository};

#[cfg(feature = "postgres")]
pub use resource::PostgresResourceStore;
#[cfg(feature = "postgres")]
pub use state::PostgresStateStore;

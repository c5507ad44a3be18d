pub mod memory;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryKnowledgeStore;
pub use store::{KnowledgeStore, SensorSample};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKnowledgeStore;

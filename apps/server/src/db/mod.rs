//! Storage layer: store traits plus the PostgreSQL and in-memory backends

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use traits::{QuestionnaireRows, Store, StoreTransaction};

pub mod memory;
pub mod schema;
pub mod sqlite;

pub use memory::*;
pub use sqlite::SqliteStore;

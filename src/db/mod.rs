mod backend;
mod sqlite;

pub use backend::RecordStore;
pub use sqlite::SqliteStore;

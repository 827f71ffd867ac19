pub mod blob;
pub mod job;

pub use blob::LocalBlobStore;
pub use job::{JobStorage, SqliteJobStorage};

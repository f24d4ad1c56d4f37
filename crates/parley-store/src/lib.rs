pub mod archive;
pub mod database;
pub mod error;
pub mod messages;
pub mod ratings;
pub mod schema;
pub mod sessions;

pub use archive::SqliteArchive;
pub use database::Database;
pub use error::StoreError;

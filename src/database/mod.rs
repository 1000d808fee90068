/*!
 * Database module for persistent storage of translations.
 *
 * SQLite-backed store behind the translation cache: entries written here
 * survive the process and are loaded into memory at startup.
 */

pub mod schema;
pub mod connection;
pub mod repository;
pub mod models;

// Re-export main types
pub use connection::DatabaseConnection;
pub use models::{CacheRecord, CacheStats};
pub use repository::Repository;

pub mod db;
pub mod metadata_store;
pub mod search;
pub mod types;

pub mod backend_client;
pub mod collection_cache;
pub mod config;
pub mod credential_store;
pub mod error;
pub mod notification_store;

pub mod conflict;
pub mod models;

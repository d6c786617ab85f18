pub mod api;
pub mod cache;
pub mod db;
pub mod server;
pub mod types;

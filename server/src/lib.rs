pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod http_server;
pub mod reorder;
pub mod scores;

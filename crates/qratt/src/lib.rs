pub mod attendance;
pub mod clock;
pub mod config;
pub mod db;
pub mod report;
pub mod server;
pub mod types;

pub mod config;
pub mod connection;
pub mod notification;
pub mod router;

// Library exports for Heartline
// This allows integration tests and external code to use Heartline modules

pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod matching;
pub mod moderation;
pub mod notify;
pub mod routes;
pub mod state;
pub mod store;
pub mod users;

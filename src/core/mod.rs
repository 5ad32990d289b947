pub mod adapters;
pub mod app;
pub mod builtin_providers;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod message;
pub mod persistence;
pub mod providers;
pub mod session;
pub mod transport;

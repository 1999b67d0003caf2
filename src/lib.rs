//! plainwire - HTTP/1.1 client and server on raw sockets
//!
//! Core library for the message codec, the readiness-driven server and the
//! caching client.

pub mod client;
pub mod config;
pub mod http;
pub mod server;

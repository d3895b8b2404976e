//! Stremmer - streaming proxy for stored media
//!
//! Serves browser video/audio players from object storage with byte-range
//! support, rewriting published storage URLs to the internal address.

pub mod config;
pub mod http;
pub mod proxy;
pub mod server;

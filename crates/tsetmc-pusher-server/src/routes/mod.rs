//! HTTP and websocket routes

pub mod instruments;
pub mod websocket;

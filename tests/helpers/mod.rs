#![allow(dead_code)]

pub mod connection_tracker;
pub mod mock_server;
pub mod ws_peer;

//! Relay core library: sessions, assistant runs, channel envelopes, and the gateway
//! shared by the `relay` CLI.

pub mod assistant;
pub mod channels;
pub mod config;
pub mod doctor;
pub mod gateway;
pub mod init;
pub mod relay;
pub mod session;

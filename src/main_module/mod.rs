//! Process wiring: router assembly, health probes and the HTTP listener

mod health;
mod server;

pub use health::*;
pub use server::*;

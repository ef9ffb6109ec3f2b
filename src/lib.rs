// Torii proxy session core library

pub mod buffer;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod handoff;
pub mod logging;
pub mod routing;
pub mod session;
pub mod token;
pub mod upstream;
pub mod xff;

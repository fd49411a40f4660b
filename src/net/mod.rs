//! Network-facing building blocks: TCP/HTTP probes and loopback URL
//! resolution across the Windows/WSL boundary.

pub mod probe;
pub mod resolve;

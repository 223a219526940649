//! JSON-RPC server exposing `procmem-core` over stdio.

pub mod auth;
pub mod error;
pub mod events;
pub mod jsonrpc;
pub mod protocol;
pub mod server;

pub use server::ProcMemServer;

//! MCP server exposing Apple Music tools
//!
//! Wraps [`applemusic_core::MusicService`] in a tool registry and serves it
//! over STDIO JSON-RPC 2.0.

pub mod adapter;
pub mod protocol;
pub mod server;
pub mod tools;

pub use adapter::McpToolAdapter;
pub use server::McpServer;

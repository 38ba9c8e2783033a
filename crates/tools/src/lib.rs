//! Tool endpoint plumbing for the Luna bridge.
//!
//! The bridge executes no tools itself. This crate connects to the external
//! execution endpoint, republishes its tools in the shape the model's
//! function-calling interface accepts, and forwards invocations:
//!
//! - **schema**: strips `$schema` / `additionalProperties` at every depth
//! - **registry**: discovers endpoint tools and caches their descriptors
//! - **mcp**: MCP client over streamable HTTP, built on `rmcp`
//! - **connector**: session lifecycle with refresh-and-retry on auth failure

pub mod connector;
pub mod mcp;
pub mod registry;
pub mod schema;

pub use connector::{ConnectError, ConnectionState, SessionConnector};
pub use mcp::McpHttpEndpoint;
pub use registry::ToolRegistryAdapter;
pub use schema::sanitize_schema;

//! MCP client plumbing: wire types, the streamable-HTTP transport, and the
//! tool bridge that the reasoning loop calls through.

pub mod bridge;
pub mod protocol;
pub mod transport;

pub use bridge::{Catalog, EmptyCatalogPolicy, ToolBridge};
pub use protocol::{CallToolResult, Content, Implementation, Tool, ToolAnnotations};
pub use transport::{HttpTransport, McpTransport, TransportError, DEFAULT_REQUEST_TIMEOUT};

//! Data model for MCP entities (spec.md §3).
//!
//! All wire types use `#[serde(rename_all = "camelCase")]` to match MCP's
//! JSON naming, and `#[serde(default)]` for fields servers may omit.

mod content;
mod oauth_token;
mod prompt;
mod resource;
mod root;
mod server_id;
mod server_info;
mod task;
mod tool;

pub use content::{AudioContent, ResourceContent, ResourceLink};
pub use oauth_token::OAuthToken;
pub use prompt::{Prompt, PromptArgument};
pub use resource::{Resource, ResourceAnnotations, ResourceTemplate};
pub use root::Root;
pub use server_id::ServerId;
pub use server_info::{ClientInfo, ServerMetadata};
pub use task::{Task, TaskState};
pub use tool::{Tool, ToolAnnotations};

//! buddha-agents: everything that talks to the hosted language model.
//!
//! - `llm`: OpenAI-compatible chat-completions client (tools + streaming)
//! - `rag`: answers grounded in retrieved knowledge-base passages
//! - `summary`: short conversation titles
//! - `registry`: agent configuration records in the vector store
//! - `codegen`: Python source for a stored agent
//! - `meta`: the agent that builds agents, driven by a tool loop

pub mod codegen;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod meta;
pub mod rag;
pub mod registry;
pub mod summary;

pub use conversation::{AskOptions, Context, Language, Message};
pub use error::{AgentError, LlmError};
pub use llm::{ChatMessage, ChatOptions, LlmClient, ToolCall, ToolDef};
pub use meta::{MetaAgent, MetaReply, ToolAction};
pub use registry::{AgentRecord, AgentRegistry, AgentTestResult, AgentUpdate, NewAgent};

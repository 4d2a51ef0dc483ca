//! Agent runtime for tradeflow
//!
//! This crate provides a concrete [`AgentInvoker`](tradeflow_core::AgentInvoker)
//! backed by any OpenAI-compatible chat completions endpoint (OpenAI, LM Studio,
//! vLLM, llama.cpp server, ...), together with the in-memory session store that
//! keeps each session key's conversation isolated for the lifetime of a run.

pub mod config;
pub mod error;
pub mod http;
pub mod session;

pub use config::InvokerConfig;
pub use error::{Result, RuntimeError};
pub use http::HttpInvoker;
pub use session::{ChatMessage, ChatRole, SessionLease, SessionStore};

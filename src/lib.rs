//! manifold: a local HTTP gateway that accepts one chat-completion request,
//! fans it out as N concurrent calls to an OpenAI-compatible upstream, and
//! aggregates the outcomes into a single response.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod server;
pub mod uniquify;

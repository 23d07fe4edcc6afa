//! OpenAI-compatible front end for Converse-style inference providers.
//!
//! The proxy accepts chat-completion requests on the OpenAI wire protocol,
//! translates them to the backing provider's Converse protocol, and
//! translates responses (including streams and errors) back. It keeps no
//! per-conversation state; each request carries its own history.

pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod translate;

pub use config::{default_model_aliases, ModelAlias, ProxyConfig};
pub use error::{ProxyError, Result};
pub use logging::SharedLogger;
pub use registry::ModelRegistry;
pub use server::{build_router, AppState};

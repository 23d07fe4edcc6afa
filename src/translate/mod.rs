//! Translation between the external OpenAI-compatible wire protocol and the
//! Converse-style backing inference protocol.

pub mod content;
pub mod converse_types;
pub mod error;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;

//! Inbound chat request types and provider wire types

mod chat;
mod openai;

pub use chat::*;
pub use openai::*;

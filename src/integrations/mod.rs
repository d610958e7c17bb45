//! External service integrations.

pub mod llm_client {
    pub use crate::llm_client::*;
}

pub mod prompts {
    pub use crate::prompts::*;
}

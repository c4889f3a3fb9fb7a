pub mod openai;

pub use openai::{ChatClient, ChatClientConfig, ChatCompletionRequest, ChatMessage, ChatRole, LlmClient, LlmError};

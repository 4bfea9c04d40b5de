pub mod history;
pub mod openai;

pub use history::{ChatHistoryService, HistoryError};
pub use openai::{OpenAiError, OpenAiService, StreamUpdate};

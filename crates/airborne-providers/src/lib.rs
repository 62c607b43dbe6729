pub mod anthropic;
pub mod gemini;
pub mod messages;
pub mod openai_compat;
pub mod openai_native;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::{OpenAiCompatProvider, ProviderProfile};
pub use openai_native::OpenAiResponsesProvider;

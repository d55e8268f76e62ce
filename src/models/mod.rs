mod http;

pub use http::HttpChatBackend;

/// A text-generation service answering one prompt with one reply.
pub trait ChatBackend {
    fn name(&self) -> &str;
    fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

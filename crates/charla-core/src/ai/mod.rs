pub mod gemini;

pub use gemini::GeminiClient;

use anyhow::Result;
use async_trait::async_trait;

/// The remote side of a chat turn: one prompt in, one answer out.
///
/// Every failure (transport, status, response shape) is a plain `Err`; the
/// caller does not distinguish between them.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    async fn answer(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl AnswerSource for GeminiClient {
    async fn answer(&self, prompt: &str) -> Result<String> {
        self.query(prompt).await
    }
}

use async_trait::async_trait;

use super::{ChatRequest, ChatResponse};
use crate::Result;

/// Chat completion client
///
/// The only way agents talk to a model. Implementations map the request onto
/// a provider API and report token usage alongside the reply text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier used in logs
    fn name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

use async_trait::async_trait;

use crate::errors::GenerationError;

/// Transport to a text-generation model.
///
/// One call per attempt: the prompt goes in, the raw reply comes back
/// untouched. Recovery of records from the reply happens in the engine.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Name recorded in run reports.
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

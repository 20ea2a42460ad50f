//! Optional narration boundary
//!
//! A narrator turns a cycle summary into free-text commentary stored on
//! the finding record. Commentary is strictly advisory: no number in the
//! system is ever derived from it, and the loop runs identically with the
//! narrator disabled.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarrationError {
    #[error("narration timed out")]
    Timeout,

    #[error("narration failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, summary: &str) -> Result<String, NarrationError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Echoes a canned line; lets orchestrator tests assert commentary
    /// plumbing without a reasoning service.
    pub struct CannedNarrator(pub String);

    #[async_trait]
    impl Narrator for CannedNarrator {
        async fn narrate(&self, _summary: &str) -> Result<String, NarrationError> {
            Ok(self.0.clone())
        }
    }

    /// Never answers within any sane deadline; exercises the narration
    /// timeout path.
    pub struct StalledNarrator;

    #[async_trait]
    impl Narrator for StalledNarrator {
        async fn narrate(&self, _summary: &str) -> Result<String, NarrationError> {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Err(NarrationError::Failed("unreachable".to_string()))
        }
    }
}

//! Long-term memory boundary.
//!
//! The engine treats the memory system (vector store, recall, learning from
//! feedback) as an external collaborator: it only signals the two moments
//! where memory would be updated. Hook failures are logged by callers and
//! never affect analysis state.

use async_trait::async_trait;

use crate::error::AppResult;
use crate::storage::{Decision, Feedback};

/// Extension point for a long-term memory collaborator.
#[async_trait]
pub trait MemoryHook: Send + Sync {
    /// Called once after an analysis completes with a decision.
    async fn on_decision(
        &self,
        analysis_id: &str,
        problem_statement: &str,
        decision: &Decision,
    ) -> AppResult<()>;

    /// Called once per feedback submission. Returns whether memory was
    /// actually updated, reported back to the caller as `memory_updated`.
    async fn on_feedback(&self, feedback: &Feedback) -> AppResult<bool>;
}

/// Default hook: no memory system attached.
pub struct NoopMemory;

#[async_trait]
impl MemoryHook for NoopMemory {
    async fn on_decision(
        &self,
        _analysis_id: &str,
        _problem_statement: &str,
        _decision: &Decision,
    ) -> AppResult<()> {
        Ok(())
    }

    async fn on_feedback(&self, _feedback: &Feedback) -> AppResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Verdict;

    #[tokio::test]
    async fn test_noop_memory_reports_no_update() {
        let hook = NoopMemory;
        let feedback = Feedback::new("a1", 4, 4, 5);
        assert!(!hook.on_feedback(&feedback).await.unwrap());

        let decision = Decision {
            verdict: Verdict::Go,
            summary: String::new(),
            detailed_explanation: String::new(),
            key_factors: vec![],
            risks: vec![],
            recommendations: vec![],
            next_steps: vec![],
            confidence: 0.8,
        };
        assert!(hook
            .on_decision("a1", "some problem statement", &decision)
            .await
            .is_ok());
    }
}

//! Pipeline runner for the four-agent analysis workflow.
//!
//! Flow:
//! 1. Research Agent - gather data
//! 2. Analysis Agent - analyze findings
//! 3. Risk Agent - assess risks
//! 4. Decision Agent - make the final decision
//!
//! The orchestrator drives the per-analysis state machine, appends each
//! agent's output to the reasoning log, publishes status events, and
//! finalizes the record exactly once. Agents run strictly sequentially
//! within one analysis; distinct analyses run concurrently and share
//! nothing but the store.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::agents::{
    AccumulatedContext, Agent, AgentKind, AnalystAgent, DecisionAgent, ResearchAgent, RiskAgent,
};
use crate::broadcast::{StatusBroadcaster, StatusEvent};
use crate::error::{AgentError, AppResult};
use crate::llm::LlmClient;
use crate::memory::MemoryHook;
use crate::reasoning::ReasoningLog;
use crate::storage::{
    AgentStep, AnalysisStatus, Decision, FinalizeOutcome, SqliteStorage, StageSummary, Storage,
};

/// Drives one analysis through the agent pipeline to a terminal state.
pub struct Orchestrator {
    storage: SqliteStorage,
    log: ReasoningLog,
    agents: Vec<Box<dyn Agent>>,
    broadcaster: Arc<StatusBroadcaster>,
    memory: Arc<dyn MemoryHook>,
}

impl Orchestrator {
    /// Create an orchestrator with the standard four-agent pipeline
    pub fn new(
        storage: SqliteStorage,
        llm: LlmClient,
        broadcaster: Arc<StatusBroadcaster>,
        memory: Arc<dyn MemoryHook>,
    ) -> Self {
        let agents: Vec<Box<dyn Agent>> = vec![
            Box::new(ResearchAgent::new(llm.clone())),
            Box::new(AnalystAgent::new(llm.clone())),
            Box::new(RiskAgent::new(llm.clone())),
            Box::new(DecisionAgent::new(llm)),
        ];
        Self::with_agents(storage, agents, broadcaster, memory)
    }

    /// Create an orchestrator with a custom agent set, in invocation order.
    /// Used by tests and embedders that substitute agent implementations.
    pub fn with_agents(
        storage: SqliteStorage,
        agents: Vec<Box<dyn Agent>>,
        broadcaster: Arc<StatusBroadcaster>,
        memory: Arc<dyn MemoryHook>,
    ) -> Self {
        Self {
            log: ReasoningLog::new(storage.clone()),
            storage,
            agents,
            broadcaster,
            memory,
        }
    }

    /// Run the pipeline for an analysis. Errors are recorded on the record
    /// and logged; they never propagate to the spawning task.
    pub async fn run(&self, analysis_id: &str) {
        if let Err(e) = self.execute(analysis_id).await {
            error!(analysis_id = %analysis_id, error = %e, "Orchestrator run aborted");
        }
    }

    async fn execute(&self, analysis_id: &str) -> AppResult<()> {
        let record = self.storage.get_analysis(analysis_id).await?;
        if record.status.is_terminal() {
            debug!(analysis_id = %analysis_id, "Record already terminal, nothing to run");
            return Ok(());
        }

        info!(analysis_id = %analysis_id, "Starting multi-agent analysis");

        let mut ctx = AccumulatedContext::new(&record.problem_statement, record.context.clone());
        let mut steps: Vec<AgentStep> = Vec::new();
        let mut decision: Option<Decision> = None;

        for agent in &self.agents {
            let kind = agent.kind();
            let status = kind.running_status();

            let current = self.storage.update_status(analysis_id, status).await?;
            if current.status.is_terminal() {
                // Something else finalized the record; terminal is sticky
                warn!(analysis_id = %analysis_id, status = %current.status, "Record went terminal mid-run, stopping");
                return Ok(());
            }

            self.publish_running(analysis_id, status, kind, steps.len());

            // The only suspension point: no lock is held across the call
            match agent.run(&ctx).await {
                Ok(output) => {
                    let step = self.log.append(analysis_id, kind, &output).await?;

                    if let Some(summary) = &output.stage_summary {
                        if let Some(stage) = stage_for(kind) {
                            self.storage
                                .set_stage_summary(analysis_id, stage, summary)
                                .await?;
                        }
                    }

                    ctx.push(kind, output.summary.clone(), output.payload.clone());
                    if let Some(d) = output.decision {
                        decision = Some(d);
                    }
                    steps.push(step);
                }
                Err(e) => {
                    self.fail(analysis_id, status, &steps, &e).await?;
                    return Ok(());
                }
            }
        }

        match decision {
            Some(decision) => self.complete(analysis_id, decision, &steps).await,
            None => {
                // Defensive: the Decision agent always yields a decision
                let err = AgentError::Execution {
                    agent: AgentKind::Decision.name().to_string(),
                    message: "pipeline finished without a decision".to_string(),
                };
                self.fail(analysis_id, AnalysisStatus::Deciding, &steps, &err)
                    .await
            }
        }
    }

    async fn complete(
        &self,
        analysis_id: &str,
        decision: Decision,
        steps: &[AgentStep],
    ) -> AppResult<()> {
        let outcome = FinalizeOutcome {
            status: AnalysisStatus::Completed,
            decision: Some(decision.clone()),
            error: None,
            total_duration_ms: total_duration(steps),
            tokens_used: total_tokens(steps),
        };

        let won = self.storage.finalize(analysis_id, &outcome).await?;
        if won {
            info!(
                analysis_id = %analysis_id,
                verdict = %decision.verdict,
                steps = steps.len(),
                duration_ms = outcome.total_duration_ms,
                "Analysis completed"
            );

            // Best-effort: memory is an external collaborator and must
            // never affect the terminal record
            if let Ok(record) = self.storage.get_analysis(analysis_id).await {
                if let Err(e) = self
                    .memory
                    .on_decision(analysis_id, &record.problem_statement, &decision)
                    .await
                {
                    warn!(analysis_id = %analysis_id, error = %e, "Memory hook failed");
                }
            }
        } else {
            debug!(analysis_id = %analysis_id, "Completion lost the terminal race");
        }

        self.broadcaster.publish(StatusEvent {
            id: analysis_id.to_string(),
            status: AnalysisStatus::Completed,
            current_agent: None,
            progress_percentage: 100,
            completed_steps: steps.len(),
            latest_update: "Analysis completed".to_string(),
            is_final: true,
        });

        Ok(())
    }

    async fn fail(
        &self,
        analysis_id: &str,
        failed_during: AnalysisStatus,
        steps: &[AgentStep],
        err: &AgentError,
    ) -> AppResult<()> {
        warn!(
            analysis_id = %analysis_id,
            stage = %failed_during,
            error = %err,
            completed_steps = steps.len(),
            "Agent failure, finalizing as failed"
        );

        let outcome = FinalizeOutcome {
            status: AnalysisStatus::Failed,
            decision: None,
            error: Some(err.to_string()),
            total_duration_ms: total_duration(steps),
            tokens_used: total_tokens(steps),
        };

        if !self.storage.finalize(analysis_id, &outcome).await? {
            debug!(analysis_id = %analysis_id, "Failure path lost the terminal race");
        }

        self.broadcaster.publish(StatusEvent {
            id: analysis_id.to_string(),
            status: AnalysisStatus::Failed,
            current_agent: None,
            progress_percentage: failed_during.progress_percentage().unwrap_or(0),
            completed_steps: steps.len(),
            latest_update: format!("Analysis failed: {}", err),
            is_final: true,
        });

        Ok(())
    }

    fn publish_running(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        kind: AgentKind,
        completed_steps: usize,
    ) {
        self.broadcaster.publish(StatusEvent {
            id: analysis_id.to_string(),
            status,
            current_agent: Some(kind.name().to_string()),
            progress_percentage: status.progress_percentage().unwrap_or(0),
            completed_steps,
            latest_update: format!("Step {}: {}", completed_steps, kind.name()),
            is_final: false,
        });
    }
}

fn stage_for(kind: AgentKind) -> Option<StageSummary> {
    match kind {
        AgentKind::Research => Some(StageSummary::Research),
        AgentKind::Analysis => Some(StageSummary::Analysis),
        AgentKind::Risk => Some(StageSummary::Risk),
        AgentKind::Decision => None,
    }
}

fn total_duration(steps: &[AgentStep]) -> i64 {
    steps.iter().map(|s| s.duration_ms).sum()
}

fn total_tokens(steps: &[AgentStep]) -> i64 {
    steps.iter().map(|s| s.tokens_used).sum()
}

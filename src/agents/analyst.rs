use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::warn;

use super::{
    build_reasoning, extract_json, payload_confidence, summarize_payload, AccumulatedContext,
    Agent, AgentCore, AgentKind, AgentOutput,
};
use crate::error::AgentResult;
use crate::llm::LlmClient;
use crate::prompts::ANALYST_SYSTEM_PROMPT;

const TEMPERATURE: f64 = 0.4;
const MAX_TOKENS: u32 = 3500;

/// Agent responsible for logical and technical analysis.
pub struct AnalystAgent {
    core: AgentCore,
}

impl AnalystAgent {
    /// Create a new analyst agent
    pub fn new(llm: LlmClient) -> Self {
        Self {
            core: AgentCore::new(llm),
        }
    }

    fn build_task(&self, ctx: &AccumulatedContext) -> String {
        let research = ctx
            .payload_for(AgentKind::Research)
            .cloned()
            .unwrap_or_else(|| json!({}));

        format!(
            r#"## ANALYSIS TASK

**Original Problem/Idea:**
{}

**Research Data to Analyze:**
```json
{}
```

**Analysis Focus:**
1. Evaluate market viability based on research findings
2. Assess technical feasibility
3. Analyze business model potential
4. Determine competitive positioning

Please analyze the data thoroughly and return your analysis in the specified JSON format.
"#,
            ctx.problem_statement,
            serde_json::to_string_pretty(&research).unwrap_or_else(|_| "{}".to_string())
        )
    }

    fn fallback_payload(raw: &str) -> Value {
        json!({
            "error": "Failed to parse response",
            "raw_response": super::truncate(raw, 500),
            "market_viability": {"score": 0.5, "assessment": "Unable to parse"},
            "technical_feasibility": {"score": 0.5},
            "business_model_analysis": {"score": 0.5},
            "competitive_position": {"score": 0.5},
            "overall_analysis_score": 0.5,
            "confidence": 0.3
        })
    }

    fn stage_summary(payload: &Value) -> String {
        let mut scores: Vec<String> = Vec::new();

        if let Some(score) = payload
            .pointer("/market_viability/score")
            .and_then(Value::as_f64)
        {
            scores.push(format!("Market: {:.0}%", score * 100.0));
        }
        if let Some(score) = payload
            .pointer("/technical_feasibility/score")
            .and_then(Value::as_f64)
        {
            scores.push(format!("Tech: {:.0}%", score * 100.0));
        }
        if let Some(score) = payload
            .pointer("/business_model_analysis/score")
            .and_then(Value::as_f64)
        {
            scores.push(format!("Business: {:.0}%", score * 100.0));
        }

        if scores.is_empty() {
            "Analysis completed".to_string()
        } else {
            scores.join(" | ")
        }
    }
}

#[async_trait]
impl Agent for AnalystAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Analysis
    }

    async fn run(&self, ctx: &AccumulatedContext) -> AgentResult<AgentOutput> {
        let start = Instant::now();
        let task = self.build_task(ctx);

        let completion = self
            .core
            .complete(self.kind(), ANALYST_SYSTEM_PROMPT, task, TEMPERATURE, MAX_TOKENS)
            .await?;

        let payload = extract_json(&completion.content).unwrap_or_else(|| {
            warn!(agent = %self.kind(), "Completion was not valid JSON, degrading");
            Self::fallback_payload(&completion.content)
        });

        Ok(AgentOutput {
            action: format!("Executing {}", self.kind().role()),
            summary: summarize_payload(&payload),
            reasoning: build_reasoning(self.kind(), &payload),
            tools_used: Vec::new(),
            confidence: payload_confidence(&payload, 0.7),
            duration_ms: start.elapsed().as_millis() as i64,
            tokens_used: completion.tokens_used,
            stage_summary: Some(Self::stage_summary(&payload)),
            decision: None,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_summary_with_scores() {
        let payload = json!({
            "market_viability": {"score": 0.75},
            "technical_feasibility": {"score": 0.8},
            "business_model_analysis": {"score": 0.7}
        });
        assert_eq!(
            AnalystAgent::stage_summary(&payload),
            "Market: 75% | Tech: 80% | Business: 70%"
        );
    }

    #[test]
    fn test_stage_summary_empty() {
        assert_eq!(AnalystAgent::stage_summary(&json!({})), "Analysis completed");
    }
}

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
use crate::prompts::RISK_SYSTEM_PROMPT;

// Lower temperature for consistent risk assessment
const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 4000;

/// Agent responsible for identifying and assessing risks.
pub struct RiskAgent {
    core: AgentCore,
}

impl RiskAgent {
    /// Create a new risk agent
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
        let analysis = ctx
            .payload_for(AgentKind::Analysis)
            .cloned()
            .unwrap_or_else(|| json!({}));

        format!(
            r#"## RISK ASSESSMENT TASK

**Original Problem/Idea:**
{}

**Research Findings:**
```json
{}
```

**Analysis Results:**
```json
{}
```

**Risk Assessment Focus:**
1. Identify all significant risks across categories
2. Assess severity and probability
3. Propose mitigation strategies
4. Provide overall risk score

Please conduct a thorough risk assessment and return your findings in the specified JSON format.
"#,
            ctx.problem_statement,
            serde_json::to_string_pretty(&research).unwrap_or_else(|_| "{}".to_string()),
            serde_json::to_string_pretty(&analysis).unwrap_or_else(|_| "{}".to_string())
        )
    }

    fn fallback_payload(raw: &str) -> Value {
        json!({
            "error": "Failed to parse response",
            "raw_response": super::truncate(raw, 500),
            "risks": [],
            "risk_matrix_summary": {},
            "overall_risk_score": 0.5,
            "top_3_concerns": ["Unable to parse risk assessment"],
            "confidence": 0.3
        })
    }

    fn stage_summary(payload: &Value) -> String {
        let overall = payload
            .get("overall_risk_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let critical = payload
            .pointer("/risk_matrix_summary/critical_risks")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let high = payload
            .pointer("/risk_matrix_summary/high_risks")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        format!(
            "Overall Risk: {:.0}% | Critical: {} | High: {}",
            overall * 100.0,
            critical,
            high
        )
    }
}

#[async_trait]
impl Agent for RiskAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Risk
    }

    async fn run(&self, ctx: &AccumulatedContext) -> AgentResult<AgentOutput> {
        let start = Instant::now();
        let task = self.build_task(ctx);

        let completion = self
            .core
            .complete(self.kind(), RISK_SYSTEM_PROMPT, task, TEMPERATURE, MAX_TOKENS)
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

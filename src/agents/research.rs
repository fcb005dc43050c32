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
use crate::prompts::RESEARCH_SYSTEM_PROMPT;

// Lower temperature for factual responses
const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 3000;

/// Agent responsible for gathering factual data about the problem.
pub struct ResearchAgent {
    core: AgentCore,
}

impl ResearchAgent {
    /// Create a new research agent
    pub fn new(llm: LlmClient) -> Self {
        Self {
            core: AgentCore::new(llm),
        }
    }

    fn build_task(&self, ctx: &AccumulatedContext) -> String {
        format!(
            r#"## RESEARCH TASK

**Problem/Idea to Research:**
{}

**Additional Context:**
{}

**Focus Areas:**
1. Market size and potential
2. Existing competitors
3. Target audience characteristics
4. Industry trends and dynamics

Please gather comprehensive data on the above and return your findings in the specified JSON format.
"#,
            ctx.problem_statement,
            ctx.context.as_deref().unwrap_or("None provided")
        )
    }

    fn fallback_payload(raw: &str) -> Value {
        json!({
            "error": "Failed to parse response",
            "raw_response": super::truncate(raw, 500),
            "market_overview": {"market_size": "Unable to parse", "key_trends": []},
            "competitors": [],
            "target_market": {},
            "industry_insights": [],
            "confidence": 0.3
        })
    }

    fn stage_summary(payload: &Value) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(size) = payload
            .pointer("/market_overview/market_size")
            .and_then(Value::as_str)
        {
            parts.push(format!("Market: {}", size));
        }
        if let Some(competitors) = payload.get("competitors").and_then(Value::as_array) {
            if !competitors.is_empty() {
                parts.push(format!("Competitors identified: {}", competitors.len()));
            }
        }
        if let Some(trends) = payload
            .pointer("/market_overview/key_trends")
            .and_then(Value::as_array)
        {
            if !trends.is_empty() {
                parts.push(format!("Key trends: {}", trends.len()));
            }
        }

        if parts.is_empty() {
            "Research completed".to_string()
        } else {
            parts.join(" | ")
        }
    }
}

#[async_trait]
impl Agent for ResearchAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Research
    }

    async fn run(&self, ctx: &AccumulatedContext) -> AgentResult<AgentOutput> {
        let start = Instant::now();
        let task = self.build_task(ctx);

        let completion = self
            .core
            .complete(self.kind(), RESEARCH_SYSTEM_PROMPT, task, TEMPERATURE, MAX_TOKENS)
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
    fn test_stage_summary_with_data() {
        let payload = json!({
            "market_overview": {"market_size": "$2B", "key_trends": ["a", "b"]},
            "competitors": [{"name": "X"}]
        });
        assert_eq!(
            ResearchAgent::stage_summary(&payload),
            "Market: $2B | Competitors identified: 1 | Key trends: 2"
        );
    }

    #[test]
    fn test_stage_summary_empty_payload() {
        assert_eq!(ResearchAgent::stage_summary(&json!({})), "Research completed");
    }

    #[test]
    fn test_fallback_payload_confidence() {
        let payload = ResearchAgent::fallback_payload("garbage output");
        assert_eq!(payload_confidence(&payload, 0.7), 0.3);
        assert_eq!(payload["raw_response"], "garbage output");
    }
}

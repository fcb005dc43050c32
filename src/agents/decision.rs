use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::warn;

use super::{
    build_reasoning, extract_json, extract_strings, payload_confidence, summarize_payload,
    AccumulatedContext, Agent, AgentCore, AgentKind, AgentOutput,
};
use crate::error::AgentResult;
use crate::llm::LlmClient;
use crate::prompts::DECISION_SYSTEM_PROMPT;
use crate::storage::{
    Decision, FactorDetail, KeyFactor, RiskDetail, RiskEntry, RiskProbability, RiskSeverity,
    Verdict,
};

const TEMPERATURE: f64 = 0.5;
const MAX_TOKENS: u32 = 4000;

/// How many risks from the Risk agent are carried into the final decision
const MAX_DECISION_RISKS: usize = 5;

/// Agent responsible for making the final decision.
pub struct DecisionAgent {
    core: AgentCore,
}

impl DecisionAgent {
    /// Create a new decision agent
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
        let risk = ctx
            .payload_for(AgentKind::Risk)
            .cloned()
            .unwrap_or_else(|| json!({}));

        format!(
            r#"## DECISION TASK

**Original Problem/Idea:**
{}

---

### RESEARCH FINDINGS (from Research Agent):
```json
{}
```

---

### ANALYSIS RESULTS (from Analysis Agent):
```json
{}
```

---

### RISK ASSESSMENT (from Risk Agent):
```json
{}
```

---

## YOUR TASK:
1. Synthesize all the above information
2. Weigh the pros and cons carefully
3. Make a clear GO, NO-GO, or CONDITIONAL decision
4. Explain your reasoning thoroughly
5. Provide actionable next steps

Make your decision and return it in the specified JSON format.
"#,
            ctx.problem_statement,
            serde_json::to_string_pretty(&research).unwrap_or_else(|_| "{}".to_string()),
            serde_json::to_string_pretty(&analysis).unwrap_or_else(|_| "{}".to_string()),
            serde_json::to_string_pretty(&risk).unwrap_or_else(|_| "{}".to_string())
        )
    }

    fn fallback_payload(raw: &str) -> Value {
        json!({
            "error": "Failed to parse response",
            "raw_response": super::truncate(raw, 500),
            "verdict": "CONDITIONAL",
            "summary": "Unable to parse decision - manual review required",
            "key_factors": [],
            "recommendations": [],
            "next_steps": ["Review raw output manually"],
            "confidence": 0.3
        })
    }

    /// Assemble the final [`Decision`] from the decision payload and the
    /// Risk agent's upstream findings.
    fn compile_decision(payload: &Value, ctx: &AccumulatedContext) -> Decision {
        let verdict: Verdict = payload
            .get("verdict")
            .and_then(Value::as_str)
            .and_then(|v| v.parse().ok())
            .unwrap_or(Verdict::Conditional);

        let summary = payload
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let detailed_explanation = payload
            .pointer("/detailed_reasoning/why_this_decision")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let key_factors = payload
            .get("key_factors")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(key_factor_from_value).collect())
            .unwrap_or_default();

        let risks = ctx
            .payload_for(AgentKind::Risk)
            .and_then(|p| p.get("risks"))
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(MAX_DECISION_RISKS)
                    .map(risk_from_value)
                    .collect()
            })
            .unwrap_or_default();

        Decision {
            verdict,
            summary,
            detailed_explanation,
            key_factors,
            risks,
            recommendations: extract_strings(payload.get("recommendations")),
            next_steps: extract_strings(payload.get("next_steps")),
            confidence: payload_confidence(payload, 0.5),
        }
    }
}

fn key_factor_from_value(value: &Value) -> KeyFactor {
    if let Ok(detail) = serde_json::from_value::<FactorDetail>(value.clone()) {
        return KeyFactor::Detailed(detail);
    }
    match value {
        Value::String(s) => KeyFactor::Simple(s.clone()),
        Value::Object(map) => KeyFactor::Simple(
            map.get("factor")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        ),
        other => KeyFactor::Simple(other.to_string()),
    }
}

fn risk_from_value(value: &Value) -> RiskEntry {
    let Value::Object(map) = value else {
        return RiskEntry::Simple(value.as_str().unwrap_or_default().to_string());
    };

    let severity: RiskSeverity = map
        .get("severity")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(RiskSeverity::Medium);
    let probability: RiskProbability = map
        .get("probability")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(RiskProbability::Possible);

    // Mitigation arrives as either a bare string or {strategy, effort, ...}
    let mitigation = match map.get("mitigation") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(m)) => m
            .get("strategy")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };

    RiskEntry::Detailed(RiskDetail {
        category: map
            .get("category")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        description: map
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        severity,
        probability,
        mitigation,
        impact_score: map
            .get("impact_score")
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
    })
}

#[async_trait]
impl Agent for DecisionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Decision
    }

    async fn run(&self, ctx: &AccumulatedContext) -> AgentResult<AgentOutput> {
        let start = Instant::now();
        let task = self.build_task(ctx);

        let completion = self
            .core
            .complete(self.kind(), DECISION_SYSTEM_PROMPT, task, TEMPERATURE, MAX_TOKENS)
            .await?;

        let payload = extract_json(&completion.content).unwrap_or_else(|| {
            warn!(agent = %self.kind(), "Completion was not valid JSON, degrading");
            Self::fallback_payload(&completion.content)
        });

        let decision = Self::compile_decision(&payload, ctx);

        Ok(AgentOutput {
            action: format!("Executing {}", self.kind().role()),
            summary: summarize_payload(&payload),
            reasoning: build_reasoning(self.kind(), &payload),
            tools_used: Vec::new(),
            confidence: payload_confidence(&payload, 0.7),
            duration_ms: start.elapsed().as_millis() as i64,
            tokens_used: completion.tokens_used,
            stage_summary: None,
            decision: Some(decision),
            payload,
        })
    }
}

//! Anthropic Messages API implementation of the model invocation boundary.
//!
//! Three call shapes, selected per agent role by the engine:
//! - direct: single request/response
//! - tool-augmented: bounded multi-turn loop with a calculator tool and a
//!   document-focus cue tool
//! - extended reasoning: thinking enabled with a configurable budget
//!
//! The calculator evaluates arithmetic locally (a small recursive-descent
//! parser) instead of handing expressions to any interpreter.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::model::{InvocationMode, ModelCallResult, ModelInvoker};
use crate::config::ModelConfig;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicInvoker {
    client: reqwest::Client,
    api_key: String,
    config: ModelConfig,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        #[allow(dead_code)]
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicInvoker {
    pub fn new(api_key: String, config: ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            config,
        }
    }

    async fn post(&self, body: Value) -> Result<ApiResponse> {
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Model request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("Model backend returned {}: {}", status, detail);
        }

        response
            .json::<ApiResponse>()
            .await
            .context("Failed to decode model response")
    }

    async fn call_direct(&self, system: &str, message: &str) -> Result<ModelCallResult> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": system,
            "messages": [{"role": "user", "content": message}],
        });

        let response = self.post(body).await?;
        Ok(self.result_from(&response, collect_text(&response.content)))
    }

    async fn call_with_reasoning(&self, system: &str, message: &str) -> Result<ModelCallResult> {
        // Temperature must not be set when thinking is enabled.
        let body = json!({
            "model": self.config.model,
            "max_tokens": self.config.reasoning_max_tokens,
            "thinking": {"type": "enabled", "budget_tokens": self.config.thinking_budget},
            "system": system,
            "messages": [{"role": "user", "content": message}],
        });

        let response = self.post(body).await?;
        Ok(self.result_from(&response, collect_text(&response.content)))
    }

    async fn call_with_tools(&self, system: &str, message: &str) -> Result<ModelCallResult> {
        let tools = tool_definitions();
        let mut messages = vec![json!({"role": "user", "content": message})];
        let mut input_tokens = 0;
        let mut output_tokens = 0;
        let mut final_content = String::new();

        for turn in 1..=self.config.max_tool_turns {
            let body = json!({
                "model": self.config.model,
                "max_tokens": self.config.max_tokens,
                "temperature": 0.3,
                "system": system,
                "messages": messages,
                "tools": tools,
            });

            let response = self.post(body).await?;
            input_tokens += response.usage.input_tokens;
            output_tokens += response.usage.output_tokens;

            let text = collect_text(&response.content);
            if !text.is_empty() {
                final_content = text;
            }

            let tool_uses: Vec<(&String, &String, &Value)> = response
                .content
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, name, input } => Some((id, name, input)),
                    _ => None,
                })
                .collect();

            if response.stop_reason.as_deref() == Some("end_turn") || tool_uses.is_empty() {
                break;
            }

            debug!(turn, tools = tool_uses.len(), "processing tool calls");

            let results: Vec<Value> = tool_uses
                .iter()
                .map(|(id, name, input)| {
                    json!({
                        "type": "tool_result",
                        "tool_use_id": id,
                        "content": run_tool(name, input),
                    })
                })
                .collect();

            messages.push(json!({
                "role": "assistant",
                "content": assistant_blocks(&response.content),
            }));
            messages.push(json!({"role": "user", "content": results}));
        }

        Ok(ModelCallResult {
            content: final_content,
            input_tokens,
            output_tokens,
            model: self.config.model.clone(),
        })
    }

    fn result_from(&self, response: &ApiResponse, content: String) -> ModelCallResult {
        ModelCallResult {
            content,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
            model: self.config.model.clone(),
        }
    }
}

#[async_trait]
impl ModelInvoker for AnthropicInvoker {
    async fn invoke(
        &self,
        mode: InvocationMode,
        system: &str,
        message: &str,
    ) -> Result<ModelCallResult> {
        match mode {
            InvocationMode::Direct => self.call_direct(system, message).await,
            InvocationMode::ToolAugmented => self.call_with_tools(system, message).await,
            InvocationMode::ExtendedReasoning => self.call_with_reasoning(system, message).await,
        }
    }
}

fn collect_text(blocks: &[ContentBlock]) -> String {
    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    texts.join("\n")
}

/// Re-serialize response blocks for the follow-up assistant message,
/// keeping only the block kinds the API accepts back.
fn assistant_blocks(blocks: &[ContentBlock]) -> Vec<Value> {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(json!({"type": "text", "text": text})),
            ContentBlock::ToolUse { id, name, input } => Some(json!({
                "type": "tool_use", "id": id, "name": name, "input": input,
            })),
            _ => None,
        })
        .collect()
}

fn tool_definitions() -> Value {
    json!([
        {
            "name": "calculator",
            "description": "Perform arithmetic calculations. Use this for computing margins, growth rates, ratios, percentages, and projections. Always show your work.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "A mathematical expression to evaluate, e.g. \"(150000 - 120000) / 150000 * 100\""
                    },
                    "label": {
                        "type": "string",
                        "description": "Human-readable label for what this calculation represents"
                    }
                },
                "required": ["expression", "label"]
            }
        },
        {
            "name": "analyze_document_section",
            "description": "Request a focused re-read of a specific section of the business documents. Use when you need to drill deeper into a topic or cross-reference information across documents.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What specific information are you looking for?"
                    },
                    "document_name": {
                        "type": "string",
                        "description": "Optional: specific document to focus on"
                    }
                },
                "required": ["query"]
            }
        }
    ])
}

fn run_tool(name: &str, input: &Value) -> String {
    match name {
        "calculator" => {
            let expression = input["expression"].as_str().unwrap_or_default();
            let label = input["label"].as_str().unwrap_or("result");
            match eval_expression(expression) {
                Ok(value) => format!("{}: {} = {}", label, expression, value),
                Err(_) => format!("Error: could not evaluate \"{}\"", expression),
            }
        }
        "analyze_document_section" => {
            let query = input["query"].as_str().unwrap_or_default();
            let scope = input["document_name"]
                .as_str()
                .map(|d| format!(" in {}", d))
                .unwrap_or_default();
            // Virtual tool: the cue redirects the model's attention to the
            // documents already in its context.
            format!(
                "Focused analysis requested: \"{}\"{}. Analyze the relevant sections from the documents provided above and continue your research.",
                query, scope
            )
        }
        other => format!("Unknown tool: {}", other),
    }
}

// ── Arithmetic evaluator ──────────────────────────────────────────────

/// Evaluate `+ - * / %` with parentheses and unary minus over f64.
pub fn eval_expression(input: &str) -> Result<f64> {
    let mut parser = ExprParser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        bail!("Trailing input at position {}", parser.pos);
    }
    if !value.is_finite() {
        bail!("Expression did not evaluate to a finite number");
    }
    Ok(value)
}

struct ExprParser {
    chars: Vec<char>,
    pos: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('+') => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some('-') => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    value *= self.factor()?;
                }
                Some('/') => {
                    self.pos += 1;
                    value /= self.factor()?;
                }
                Some('%') => {
                    self.pos += 1;
                    value %= self.factor()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64> {
        self.skip_ws();
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.pos += 1;
                let value = self.expr()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    bail!("Expected closing parenthesis at position {}", self.pos);
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) => bail!("Unexpected character '{}' at position {}", c, self.pos),
            None => bail!("Unexpected end of expression"),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.' || c == '_' || c == ',')
        {
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_' && **c != ',')
            .collect();
        raw.parse::<f64>()
            .with_context(|| format!("Invalid number \"{}\"", raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_margin_style_expressions() {
        let value = eval_expression("(150000 - 120000) / 150000 * 100").unwrap();
        assert!((value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn evaluates_precedence_and_unary_minus() {
        assert_eq!(eval_expression("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval_expression("-(2 + 3)").unwrap(), -5.0);
        assert_eq!(eval_expression("10 % 4").unwrap(), 2.0);
    }

    #[test]
    fn accepts_separator_characters_in_numbers() {
        assert_eq!(eval_expression("1,500 + 500").unwrap(), 2000.0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(eval_expression("2 +").is_err());
        assert!(eval_expression("rm -rf /").is_err());
        assert!(eval_expression("(1 + 2").is_err());
        assert!(eval_expression("1 / 0").is_err());
    }

    #[test]
    fn calculator_tool_formats_result_with_label() {
        let out = run_tool(
            "calculator",
            &json!({"expression": "2 * 21", "label": "answer"}),
        );
        assert_eq!(out, "answer: 2 * 21 = 42");
    }

    #[test]
    fn focus_tool_echoes_query_and_document() {
        let out = run_tool(
            "analyze_document_section",
            &json!({"query": "Q3 churn", "document_name": "metrics.pdf"}),
        );
        assert!(out.contains("Q3 churn"));
        assert!(out.contains("metrics.pdf"));
    }

    #[test]
    fn collect_text_joins_blocks() {
        let blocks = vec![
            ContentBlock::Thinking {
                thinking: "hmm".into(),
            },
            ContentBlock::Text { text: "a".into() },
            ContentBlock::Text { text: "b".into() },
        ];
        assert_eq!(collect_text(&blocks), "a\nb");
    }
}

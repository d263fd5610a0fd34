//! Typed JSON answers from free-text model output.
//!
//! Models wrap JSON in prose or Markdown fences. The helpers here cut the
//! outermost JSON block out of the reply and deserialize it, retrying the call
//! once with a stricter instruction when the first reply does not parse.

use super::{ChatModel, LlmError, LlmMessage};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub const JSON_ONLY_INSTRUCTION: &str = "반드시 유효한 JSON 형식으로만 답변하세요.";

#[derive(Debug, Error)]
pub enum StructuredOutputError {
    #[error("no json block in model output")]
    NoJson,
    #[error("json parse error: {0}")]
    Parse(String),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    Object,
    Array,
}

impl Shape {
    fn delimiters(self) -> (char, char) {
        match self {
            Shape::Object => ('{', '}'),
            Shape::Array => ('[', ']'),
        }
    }
}

pub fn extract_json_object(text: &str) -> Result<Value, StructuredOutputError> {
    extract(text, Shape::Object)
}

pub fn extract_json_array(text: &str) -> Result<Value, StructuredOutputError> {
    extract(text, Shape::Array)
}

fn extract(text: &str, shape: Shape) -> Result<Value, StructuredOutputError> {
    let body = strip_markdown_fence(text);
    let (open, close) = shape.delimiters();
    let start = body.find(open).ok_or(StructuredOutputError::NoJson)?;
    let end = body.rfind(close).ok_or(StructuredOutputError::NoJson)?;
    if end < start {
        return Err(StructuredOutputError::NoJson);
    }
    serde_json::from_str(&body[start..=end])
        .map_err(|err| StructuredOutputError::Parse(err.to_string()))
}

/// Returns the body of the first fenced block, or the trimmed input when
/// there is none.
fn strip_markdown_fence(input: &str) -> &str {
    let trimmed = input.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[open + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
    let body = &after[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

pub async fn request_object<T: DeserializeOwned>(
    llm: &dyn ChatModel,
    messages: &[LlmMessage],
) -> Result<T, StructuredOutputError> {
    request(llm, messages, Shape::Object).await
}

pub async fn request_array<T: DeserializeOwned>(
    llm: &dyn ChatModel,
    messages: &[LlmMessage],
) -> Result<T, StructuredOutputError> {
    request(llm, messages, Shape::Array).await
}

async fn request<T: DeserializeOwned>(
    llm: &dyn ChatModel,
    messages: &[LlmMessage],
    shape: Shape,
) -> Result<T, StructuredOutputError> {
    let first = llm.chat(messages).await?;
    match parse_as::<T>(&first.text, shape) {
        Ok(value) => return Ok(value),
        Err(err) => {
            warn!(target = "studio.llm", error = %err, "structured_output_retry");
        }
    }

    let retry = with_json_instruction(messages);
    let second = llm.chat(&retry).await?;
    parse_as::<T>(&second.text, shape)
}

fn parse_as<T: DeserializeOwned>(text: &str, shape: Shape) -> Result<T, StructuredOutputError> {
    let value = extract(text, shape)?;
    serde_json::from_value(value).map_err(|err| StructuredOutputError::Parse(err.to_string()))
}

fn with_json_instruction(messages: &[LlmMessage]) -> Vec<LlmMessage> {
    let mut out = messages.to_vec();
    match out.iter_mut().find(|m| m.role == "system") {
        Some(system) => {
            system.content = format!("{}\n{}", system.content, JSON_ONLY_INSTRUCTION);
        }
        None => out.insert(0, LlmMessage::system(JSON_ONLY_INSTRUCTION)),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Pair {
        a: u32,
        b: Vec<String>,
    }

    #[test]
    fn extracts_object_from_fenced_reply() {
        let text = "분석 결과입니다.\n```json\n{\"a\": 1, \"b\": [\"x\"]}\n```\n감사합니다.";
        let value = extract_json_object(text).expect("object");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn greedy_block_keeps_nested_objects() {
        let text = "result: {\"outer\": {\"inner\": 2}} done";
        let value = extract_json_object(text).expect("object");
        assert_eq!(value["outer"]["inner"], 2);
    }

    #[test]
    fn extracts_array_from_prose() {
        let value = extract_json_array("목록: [{\"title\": \"t\"}]").expect("array");
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn prose_only_reply_has_no_json() {
        assert!(matches!(
            extract_json_object("죄송합니다, 분석할 수 없습니다."),
            Err(StructuredOutputError::NoJson)
        ));
    }

    #[tokio::test]
    async fn retries_once_with_json_instruction() {
        let llm = ScriptedModel::replying(&["not json", r#"{"a": 2, "b": []}"#]);
        let messages = [LlmMessage::system("분석가"), LlmMessage::user("분석해줘")];
        let pair: Pair = request_object(&llm, &messages).await.expect("retry parses");
        assert_eq!(pair.a, 2);
        assert!(pair.b.is_empty());
        assert_eq!(llm.calls(), 2);
        let retried = &llm.requests()[1];
        assert!(retried[0].content.ends_with(JSON_ONLY_INSTRUCTION));
    }

    #[tokio::test]
    async fn second_parse_failure_is_typed() {
        let llm = ScriptedModel::replying(&["nope", "still nope", "unused"]);
        let err = request_object::<Pair>(&llm, &[LlmMessage::user("x")])
            .await
            .expect_err("both fail");
        assert!(matches!(err, StructuredOutputError::NoJson));
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn provider_error_is_not_retried() {
        let llm = ScriptedModel::failing();
        let err = request_object::<Pair>(&llm, &[LlmMessage::user("x")])
            .await
            .expect_err("outage");
        assert!(matches!(err, StructuredOutputError::Llm(_)));
        assert_eq!(llm.calls(), 1);
    }
}

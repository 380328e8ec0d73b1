//! Wire shapes for the supported chat endpoints and answer unwrapping.

use serde::Serialize;
use serde_json::Value;

use super::LlmRequest;
use crate::error::RemoteExtractionError;
use crate::models::config::LlmProtocol;

#[derive(Debug, Serialize)]
struct DashScopeRequest<'a> {
    model: &'a str,
    input: DashScopeInput<'a>,
}

#[derive(Debug, Serialize)]
struct DashScopeInput<'a> {
    messages: Vec<DashScopeMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct DashScopeMessage<'a> {
    role: &'a str,
    content: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Request body for `protocol`.
pub fn build_payload(protocol: LlmProtocol, model: &str, request: &LlmRequest) -> Value {
    let payload = match protocol {
        LlmProtocol::DashScope => serde_json::to_value(DashScopeRequest {
            model,
            input: DashScopeInput {
                messages: vec![
                    DashScopeMessage {
                        role: "system",
                        content: vec![TextPart { text: &request.system }],
                    },
                    DashScopeMessage {
                        role: "user",
                        content: vec![TextPart { text: &request.user }],
                    },
                ],
            },
        }),
        LlmProtocol::OpenAi => serde_json::to_value(ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: 0.0,
        }),
    };
    // Plain structs of strings always serialize.
    payload.unwrap_or(Value::Null)
}

/// Pull the assistant text out of a response body.
///
/// Accepts `output.choices[0].message.content`, `choices[0].message.content`
/// and `output.text`; content may be a string or a list of `{text}` parts.
pub fn extract_content(body: &Value) -> Result<String, RemoteExtractionError> {
    let content = body
        .pointer("/output/choices/0/message/content")
        .or_else(|| body.pointer("/choices/0/message/content"))
        .or_else(|| body.pointer("/output/text"))
        .ok_or_else(|| RemoteExtractionError::Parse("no message content in response".to_string()))?;

    match content {
        Value::String(text) => Ok(text.clone()),
        Value::Array(parts) => {
            let text = parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect::<Vec<_>>()
                .join("");
            if text.is_empty() {
                Err(RemoteExtractionError::Parse("content has no text parts".to_string()))
            } else {
                Ok(text)
            }
        }
        other => Err(RemoteExtractionError::Parse(format!(
            "unexpected content type: {}",
            other
        ))),
    }
}

/// Locate the JSON object in free-form model text: a fenced code block
/// first, then the first balanced top-level `{...}` span.
///
/// A fenced block that does not hold an object falls through to the span.
pub fn extract_json(text: &str) -> Result<Value, RemoteExtractionError> {
    let fenced = match fenced_block(text).map(parse_object) {
        Some(Ok(value)) => return Ok(value),
        other => other,
    };

    match (first_object_span(text), fenced) {
        (Some(span), Some(Err(fenced_err))) => parse_object(span).map_err(|_| fenced_err),
        (Some(span), _) => parse_object(span),
        (None, Some(Err(fenced_err))) => Err(fenced_err),
        _ => Err(RemoteExtractionError::Parse("no JSON object in model output".to_string())),
    }
}

fn parse_object(candidate: &str) -> Result<Value, RemoteExtractionError> {
    let value: Value = serde_json::from_str(candidate.trim())
        .map_err(|e| RemoteExtractionError::Parse(format!("invalid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(RemoteExtractionError::Parse("top-level JSON is not an object".to_string()));
    }
    Ok(value)
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the info string ("json") up to the end of the line.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request() -> LlmRequest {
        LlmRequest {
            system: "sys".to_string(),
            user: "hello".to_string(),
        }
    }

    #[test]
    fn test_dashscope_payload_shape() {
        let payload = build_payload(LlmProtocol::DashScope, "qwen-vl-max", &request());
        assert_eq!(payload["model"], "qwen-vl-max");
        assert_eq!(payload["input"]["messages"][1]["role"], "user");
        assert_eq!(payload["input"]["messages"][1]["content"][0]["text"], "hello");
    }

    #[test]
    fn test_openai_payload_shape() {
        let payload = build_payload(LlmProtocol::OpenAi, "gpt-4o", &request());
        assert_eq!(payload["messages"][0]["content"], "sys");
        assert_eq!(payload["temperature"], 0.0);
        assert!(payload.get("input").is_none());
    }

    #[test]
    fn test_extract_content_envelopes() {
        let dashscope = json!({"output": {"choices": [{"message": {"content": [{"text": "{\"a\""}, {"text": ":1}"}]}}]}});
        assert_eq!(extract_content(&dashscope).unwrap(), "{\"a\":1}");

        let openai = json!({"choices": [{"message": {"content": "plain"}}]});
        assert_eq!(extract_content(&openai).unwrap(), "plain");

        let text = json!({"output": {"text": "legacy"}});
        assert_eq!(extract_content(&text).unwrap(), "legacy");

        assert!(matches!(
            extract_content(&json!({"error": "quota"})),
            Err(RemoteExtractionError::Parse(_))
        ));
    }

    #[test]
    fn test_extract_json_prefers_fenced_block() {
        let text = "Here you go {not this}\n```json\n{\"fields\": []}\n```\n";
        assert_eq!(extract_json(text).unwrap(), json!({"fields": []}));
    }

    #[test]
    fn test_extract_json_prose_fence_falls_back_to_object() {
        let text = "```\nI found these fields:\n```\n{\"fields\": [{\"field_name\": \"party_a\"}]}";
        assert_eq!(
            extract_json(text).unwrap(),
            json!({"fields": [{"field_name": "party_a"}]})
        );
    }

    #[test]
    fn test_extract_json_first_balanced_object() {
        let text = "Result: {\"fields\": [{\"value\": \"a}b\"}]} trailing {\"x\": 1}";
        assert_eq!(
            extract_json(text).unwrap(),
            json!({"fields": [{"value": "a}b"}]})
        );
    }

    #[test]
    fn test_extract_json_rejects_garbage() {
        assert!(extract_json("no json here").is_err());
        assert!(extract_json("```\n[1, 2]\n```").is_err());
        assert!(extract_json("{\"unterminated\": ").is_err());
    }
}

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Message kind from the `type` field. Unrecognized kinds are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    System,
    Assistant,
    User,
    Result,
    Other(String),
}

impl MessageKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
            Self::Result => "result",
            Self::Other(kind) => kind,
        }
    }
}

impl From<String> for MessageKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            "user" => Self::User,
            "result" => Self::Result,
            _ => Self::Other(kind),
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_tokens: u64,
}

impl Usage {
    #[must_use]
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    /// Reads a usage object, treating missing or non-numeric counts as 0.
    fn from_value(value: Value) -> Result<Self, Value> {
        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(other),
        };
        let count = |key: &str| fields.get(key).and_then(Value::as_u64).unwrap_or(0);
        Ok(Self::new(count("input_tokens"), count("output_tokens")))
    }
}

/// One block of a message's content array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
    },
    ToolUse {
        #[serde(default, deserialize_with = "null_as_default")]
        id: String,
        #[serde(default, deserialize_with = "null_as_default")]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default, deserialize_with = "null_as_default")]
        tool_use_id: String,
        #[serde(default)]
        content: Value,
        #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "is_false")]
        is_error: bool,
    },
    // Thinking blocks, images, anything newer, and known blocks of the wrong shape.
    #[serde(other)]
    Unknown,
}

impl ContentBlock {
    fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or(Self::Unknown)
    }
}

/// Message content is either a plain string or an array of blocks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }

    /// Returns the block array, or an empty slice for plain-string content.
    #[must_use]
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            Self::Text(_) => &[],
            Self::Blocks(blocks) => blocks,
        }
    }

    fn from_value(value: Value) -> Result<Self, Value> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Array(items) => Ok(Self::Blocks(
                items.into_iter().map(ContentBlock::from_value).collect(),
            )),
            other => Err(other),
        }
    }
}

/// The nested `message` container of assistant and user events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageBody {
    fn from_value(value: Value) -> Result<Self, Value> {
        let mut fields = match value {
            Value::Object(fields) => fields,
            other => return Err(other),
        };
        Ok(Self {
            content: take_field(&mut fields, "content", MessageContent::from_value),
            usage: take_field(&mut fields, "usage", Usage::from_value),
            extra: fields,
        })
    }
}

/// One parsed line of an execution's output stream.
///
/// Fields the engine does not interpret (`session_id`, `model`, `cwd`, `tools`,
/// `cost_usd`, `duration_ms`, `num_turns`, `error`, `result`, ...) are kept in
/// `extra` and surfaced verbatim through the accessors below.
///
/// Only a non-object line or a missing or non-string `type` is rejected. A
/// known field of an unexpected shape is left in `extra` (or, inside a content
/// array, decoded as [`ContentBlock::Unknown`]) instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(rename = "isMeta", skip_serializing_if = "is_false")]
    pub is_meta: bool,
    #[serde(rename = "leafUuid", skip_serializing_if = "Option::is_none")]
    pub leaf_uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Set on messages the engine produced itself rather than received.
    #[serde(skip_serializing_if = "is_false")]
    pub synthetic: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for StreamMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => MessageKind::from(kind),
            Some(_) => return Err(D::Error::custom("message `type` must be a string")),
            None => return Err(D::Error::missing_field("type")),
        };

        Ok(Self {
            kind,
            subtype: take_field(&mut fields, "subtype", string_value),
            message: take_field(&mut fields, "message", MessageBody::from_value),
            usage: take_field(&mut fields, "usage", Usage::from_value),
            is_meta: take_field(&mut fields, "isMeta", bool_value).unwrap_or(false),
            leaf_uuid: take_field(&mut fields, "leafUuid", string_value),
            summary: take_field(&mut fields, "summary", string_value),
            synthetic: take_field(&mut fields, "synthetic", bool_value).unwrap_or(false),
            extra: fields,
        })
    }
}

impl StreamMessage {
    /// Creates an empty message of the given kind.
    #[must_use]
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            subtype: None,
            message: None,
            usage: None,
            is_meta: false,
            leaf_uuid: None,
            summary: None,
            synthetic: false,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Usage for accounting: top-level `usage` first, then `message.usage`.
    #[must_use]
    pub fn effective_usage(&self) -> Option<Usage> {
        self.usage
            .or_else(|| self.message.as_ref().and_then(|body| body.usage))
    }

    #[must_use]
    pub fn content(&self) -> Option<&MessageContent> {
        self.message.as_ref().and_then(|body| body.content.as_ref())
    }

    #[must_use]
    pub fn is_init(&self) -> bool {
        self.kind == MessageKind::System && self.subtype.as_deref() == Some("init")
    }

    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.extra_str("session_id")
    }

    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.extra_str("model")
    }

    #[must_use]
    pub fn cwd(&self) -> Option<&str> {
        self.extra_str("cwd")
    }

    #[must_use]
    pub fn tools(&self) -> Vec<&str> {
        self.extra
            .get("tools")
            .and_then(Value::as_array)
            .map(|tools| tools.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn cost_usd(&self) -> Option<f64> {
        self.extra.get("cost_usd").and_then(Value::as_f64)
    }

    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        self.extra.get("duration_ms").and_then(Value::as_f64)
    }

    #[must_use]
    pub fn num_turns(&self) -> Option<u64> {
        self.extra.get("num_turns").and_then(Value::as_u64)
    }

    #[must_use]
    pub fn result_text(&self) -> Option<&str> {
        self.extra_str("result")
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.extra
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The `error` field rendered as text; non-string errors render as JSON.
    #[must_use]
    pub fn error_text(&self) -> Option<String> {
        match self.extra.get("error")? {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Renders a tool-result body as text.
///
/// Strings pass through, arrays of `{"type":"text"}` blocks are joined with
/// newlines, and anything else renders as compact JSON.
#[must_use]
pub fn tool_result_text(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            if texts.len() == items.len() {
                texts.join("\n")
            } else {
                content.to_string()
            }
        }
        other => other.to_string(),
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Removes `key` and converts it. `null` is dropped; a value `convert`
/// rejects goes back into `fields` untouched.
fn take_field<T>(
    fields: &mut Map<String, Value>,
    key: &str,
    convert: impl FnOnce(Value) -> Result<T, Value>,
) -> Option<T> {
    match fields.remove(key)? {
        Value::Null => None,
        value => match convert(value) {
            Ok(converted) => Some(converted),
            Err(value) => {
                fields.insert(key.to_string(), value);
                None
            }
        },
    }
}

fn string_value(value: Value) -> Result<String, Value> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(other),
    }
}

fn bool_value(value: Value) -> Result<bool, Value> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(other),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

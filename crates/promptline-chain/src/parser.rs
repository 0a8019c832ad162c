//! Output parsers: plain text and schema-checked structured extraction.

use crate::runnable::{RunStream, Runnable};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use promptline_llm::Message;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Extracts the text content of an assistant message
///
/// Streaming passes every fragment through as soon as it arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrOutputParser;

impl StrOutputParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runnable for StrOutputParser {
    type Input = Message;
    type Output = String;

    async fn invoke(&self, input: Message) -> Result<String> {
        Ok(input.into_content())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        })
    }
}

/// One required field of a structured result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    pub name: String,
    pub description: String,
    pub kind: FieldKind,
}

impl ResponseSchema {
    /// String field
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: FieldKind::String,
        }
    }

    pub fn integer(mut self) -> Self {
        self.kind = FieldKind::Integer;
        self
    }

    pub fn number(mut self) -> Self {
        self.kind = FieldKind::Number;
        self
    }

    pub fn boolean(mut self) -> Self {
        self.kind = FieldKind::Boolean;
        self
    }
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in model output: {output:?}")]
    NoJson { output: String },

    #[error("model output is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(Value),

    #[error("required field `{0}` is missing")]
    MissingField(String),

    #[error("field `{field}` should be {expected}, got {found}")]
    InvalidField {
        field: String,
        expected: FieldKind,
        found: Value,
    },

    #[error("structured output does not match the target type: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Parses model text into a JSON object holding every declared field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredOutputParser {
    schemas: Vec<ResponseSchema>,
}

impl StructuredOutputParser {
    pub fn from_response_schemas<I>(schemas: I) -> Self
    where
        I: IntoIterator<Item = ResponseSchema>,
    {
        Self {
            schemas: schemas.into_iter().collect(),
        }
    }

    pub fn schemas(&self) -> &[ResponseSchema] {
        &self.schemas
    }

    /// Instructions telling the model how to shape its answer
    pub fn format_instructions(&self) -> String {
        let fields: Vec<String> = self
            .schemas
            .iter()
            .map(|schema| format!("\t\"{}\": {}  // {}", schema.name, schema.kind, schema.description))
            .collect();

        format!(
            "The output should be a markdown code snippet formatted in the following schema, \
             including the leading and trailing \"```json\" and \"```\":\n\n```json\n{{\n{}\n}}\n```",
            fields.join("\n")
        )
    }

    pub fn parse(&self, text: &str) -> Result<Map<String, Value>, ParseError> {
        let value = extract_json(text)?;
        let mut object = match value {
            Value::Object(object) => object,
            other => return Err(ParseError::NotAnObject(other)),
        };

        for schema in &self.schemas {
            let value = match object.remove(&schema.name) {
                None | Some(Value::Null) => return Err(ParseError::MissingField(schema.name.clone())),
                Some(value) => value,
            };
            let coerced = coerce(schema.kind, value).map_err(|found| ParseError::InvalidField {
                field: schema.name.clone(),
                expected: schema.kind,
                found,
            })?;
            object.insert(schema.name.clone(), coerced);
        }

        Ok(object)
    }
}

/// Pull the JSON payload out of model text: a fenced block if it parses,
/// otherwise the first object starting at a `{`
fn extract_json(text: &str) -> Result<Value, ParseError> {
    let mut first_error = None;

    if let Some(body) = fenced_block(text) {
        match serde_json::from_str(body) {
            Ok(value) => return Ok(value),
            Err(e) => first_error = Some(e),
        }
    }

    for (start, _) in text.match_indices('{') {
        match serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()
        {
            Some(Ok(value)) => return Ok(value),
            Some(Err(e)) => {
                first_error.get_or_insert(e);
            }
            None => {}
        }
    }

    Err(match first_error {
        Some(e) => ParseError::InvalidJson(e),
        None => ParseError::NoJson {
            output: text.to_string(),
        },
    })
}

/// Body of the first ``` fence, without its info string; `None` when empty
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the line
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    let body = body.find("```").map(|end| &body[..end]).unwrap_or(body).trim();
    (!body.is_empty()).then_some(body)
}

/// Check a value against its declared kind, converting the lenient forms models
/// tend to produce (`"25"` for 25, `25.0` for an integer). Returns the original
/// value on mismatch.
fn coerce(kind: FieldKind, value: Value) -> Result<Value, Value> {
    match (kind, value) {
        (FieldKind::String, Value::String(s)) => Ok(Value::String(s)),
        (FieldKind::String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (FieldKind::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),

        (FieldKind::Integer, Value::Number(n)) => {
            if n.is_i64() || n.is_u64() {
                Ok(Value::Number(n))
            } else {
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::from(f as i64)),
                    _ => Err(Value::Number(n)),
                }
            }
        }
        (FieldKind::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(Value::from(i)),
            Err(_) => Err(Value::String(s)),
        },

        (FieldKind::Number, Value::Number(n)) => Ok(Value::Number(n)),
        (FieldKind::Number, Value::String(s)) => {
            match s.trim().parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(Value::String(s)),
            }
        }

        (FieldKind::Boolean, Value::Bool(b)) => Ok(Value::Bool(b)),
        (FieldKind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(Value::String(s)),
        },

        (_, other) => Err(other),
    }
}

async fn concat_chunks(mut chunks: RunStream<'_, Message>) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        text.push_str(chunk?.content());
    }
    Ok(text)
}

#[async_trait]
impl Runnable for StructuredOutputParser {
    type Input = Message;
    type Output = Map<String, Value>;

    async fn invoke(&self, input: Message) -> Result<Map<String, Value>> {
        Ok(self.parse(input.content())?)
    }

    /// A partial object is not useful, so the whole reply is gathered first
    fn transform<'a>(&'a self, inputs: RunStream<'a, Message>) -> RunStream<'a, Map<String, Value>> {
        let parsed = async move {
            concat_chunks(inputs)
                .await
                .and_then(|text| self.parse(&text).map_err(anyhow::Error::from))
        };
        Box::pin(futures::stream::once(parsed))
    }
}

/// A record type that can be extracted from model output
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct UserInfo { name: String, age: u32 }
///
/// impl Schema for UserInfo {
///     fn fields() -> Vec<ResponseSchema> {
///         vec![
///             ResponseSchema::new("name", "用户的姓名"),
///             ResponseSchema::new("age", "用户的年龄").integer(),
///         ]
///     }
/// }
/// ```
pub trait Schema: DeserializeOwned + Send + 'static {
    fn fields() -> Vec<ResponseSchema>;
}

/// Typed counterpart of [`StructuredOutputParser`]
pub struct SchemaParser<T> {
    inner: StructuredOutputParser,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Schema> SchemaParser<T> {
    pub fn new() -> Self {
        Self {
            inner: StructuredOutputParser::from_response_schemas(T::fields()),
            _marker: PhantomData,
        }
    }

    pub fn format_instructions(&self) -> String {
        self.inner.format_instructions()
    }

    pub fn parse(&self, text: &str) -> Result<T, ParseError> {
        let object = self.inner.parse(text)?;
        serde_json::from_value(Value::Object(object)).map_err(ParseError::Deserialize)
    }
}

impl<T: Schema> Default for SchemaParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SchemaParser<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SchemaParser<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaParser")
            .field("target", &std::any::type_name::<T>())
            .field("schemas", &self.inner.schemas)
            .finish()
    }
}

#[async_trait]
impl<T: Schema> Runnable for SchemaParser<T> {
    type Input = Message;
    type Output = T;

    async fn invoke(&self, input: Message) -> Result<T> {
        Ok(self.parse(input.content())?)
    }

    fn transform<'a>(&'a self, inputs: RunStream<'a, Message>) -> RunStream<'a, T> {
        let parsed = async move {
            concat_chunks(inputs)
                .await
                .and_then(|text| self.parse(&text).map_err(anyhow::Error::from))
        };
        Box::pin(futures::stream::once(parsed))
    }
}

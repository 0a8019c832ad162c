//! Prompt templates with `{name}` placeholders.
//!
//! `{{` and `}}` render literal braces. Values are substituted verbatim, so a
//! value may itself contain braces (JSON format instructions, code, ...).

use crate::runnable::Runnable;
use anyhow::Result;
use async_trait::async_trait;
use promptline_llm::{Message, Role};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("malformed template at byte {position}: {reason}")]
    Malformed {
        position: usize,
        reason: &'static str,
    },

    #[error("missing value for template variable `{0}`")]
    MissingVariable(String),

    #[error("missing message list for placeholder `{0}`")]
    MissingMessages(String),
}

/// Values supplied to a template: plain variables and named message lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptInput {
    values: HashMap<String, String>,
    histories: HashMap<String, Vec<Message>>,
}

impl PromptInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn messages(mut self, name: impl Into<String>, messages: Vec<Message>) -> Self {
        self.histories.insert(name.into(), messages);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn get_messages(&self, name: &str) -> Option<&[Message]> {
        self.histories.get(name).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Variable(String),
}

fn parse_template(template: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    text.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if !closed {
                    return Err(TemplateError::Malformed {
                        position,
                        reason: "unclosed `{`",
                    });
                }
                let name = name.trim();
                if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(TemplateError::Malformed {
                        position,
                        reason: "placeholder names may only contain letters, digits and `_`",
                    });
                }

                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Variable(name.to_string()));
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    text.push('}');
                    continue;
                }
                return Err(TemplateError::Malformed {
                    position,
                    reason: "unmatched `}`",
                });
            }
            _ => text.push(c),
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

/// Single-string template, e.g. `"请根据以下内容提取用户信息：\n{input}"`
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
    segments: Vec<Segment>,
    partials: HashMap<String, String>,
}

impl PromptTemplate {
    pub fn from_template(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        let segments = parse_template(&template)?;
        Ok(Self {
            template,
            segments,
            partials: HashMap::new(),
        })
    }

    /// Pre-fill a variable; values passed at format time still take precedence
    pub fn partial(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.partials.insert(name.into(), value.into());
        self
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Variables still expected from the caller, in order of first appearance
    pub fn input_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable(name) = segment {
                if !self.partials.contains_key(name) && !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    pub fn format(&self, input: &PromptInput) -> Result<String, TemplateError> {
        let mut rendered = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.push_str(text),
                Segment::Variable(name) => {
                    let value = input
                        .get(name)
                        .or_else(|| self.partials.get(name).map(String::as_str))
                        .ok_or_else(|| TemplateError::MissingVariable(name.clone()))?;
                    rendered.push_str(value);
                }
            }
        }
        Ok(rendered)
    }
}

#[async_trait]
impl Runnable for PromptTemplate {
    type Input = PromptInput;
    type Output = Vec<Message>;

    /// Renders to a single user message
    async fn invoke(&self, input: PromptInput) -> Result<Vec<Message>> {
        Ok(vec![Message::human(self.format(&input)?)])
    }
}

/// One entry of a chat prompt
#[derive(Debug, Clone, PartialEq)]
pub enum MessageTemplate {
    /// Templated text rendered into a message with the given role
    Templated(Role, String),
    /// Literal message, inserted as-is (braces are not interpreted)
    Fixed(Message),
    /// Expands to the message list supplied under this name
    Placeholder(String),
}

impl MessageTemplate {
    pub fn system(template: impl Into<String>) -> Self {
        Self::Templated(Role::System, template.into())
    }

    pub fn user(template: impl Into<String>) -> Self {
        Self::Templated(Role::User, template.into())
    }

    pub fn assistant(template: impl Into<String>) -> Self {
        Self::Templated(Role::Assistant, template.into())
    }

    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::Placeholder(name.into())
    }
}

impl From<Message> for MessageTemplate {
    fn from(message: Message) -> Self {
        Self::Fixed(message)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ChatPart {
    Templated(Role, PromptTemplate),
    Fixed(Message),
    Placeholder(String),
}

/// Message-list template: system/user/assistant lines plus history placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPromptTemplate {
    parts: Vec<ChatPart>,
}

impl ChatPromptTemplate {
    pub fn from_messages<I>(messages: I) -> Result<Self, TemplateError>
    where
        I: IntoIterator<Item = MessageTemplate>,
    {
        let parts = messages
            .into_iter()
            .map(|message| {
                Ok(match message {
                    MessageTemplate::Templated(role, text) => {
                        ChatPart::Templated(role, PromptTemplate::from_template(text)?)
                    }
                    MessageTemplate::Fixed(message) => ChatPart::Fixed(message),
                    MessageTemplate::Placeholder(name) => ChatPart::Placeholder(name),
                })
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        Ok(Self { parts })
    }

    /// Pre-fill a variable in every templated line
    pub fn partial(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        self.parts = self
            .parts
            .into_iter()
            .map(|part| match part {
                ChatPart::Templated(role, template) => {
                    ChatPart::Templated(role, template.partial(name.clone(), value.clone()))
                }
                other => other,
            })
            .collect();
        self
    }

    pub fn input_variables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for part in &self.parts {
            if let ChatPart::Templated(_, template) = part {
                for name in template.input_variables() {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
        }
        names
    }

    pub fn format_messages(&self, input: &PromptInput) -> Result<Vec<Message>, TemplateError> {
        let mut messages = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            match part {
                ChatPart::Templated(role, template) => {
                    messages.push(Message::with_role(*role, template.format(input)?));
                }
                ChatPart::Fixed(message) => messages.push(message.clone()),
                ChatPart::Placeholder(name) => {
                    let history = input
                        .get_messages(name)
                        .ok_or_else(|| TemplateError::MissingMessages(name.clone()))?;
                    messages.extend_from_slice(history);
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl Runnable for ChatPromptTemplate {
    type Input = PromptInput;
    type Output = Vec<Message>;

    async fn invoke(&self, input: PromptInput) -> Result<Vec<Message>> {
        Ok(self.format_messages(&input)?)
    }
}

//! Content returned from tool calls.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTextContent {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Content {
    Text(RawTextContent),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(RawTextContent { text: text.into() })
    }

    /// Get the text content if this is a text content
    pub fn as_text(&self) -> Option<&RawTextContent> {
        match self {
            Content::Text(text) => Some(text),
        }
    }
}

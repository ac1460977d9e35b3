//! Webhook message wire format

use crate::render::RenderedEmbed;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// One embed of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    /// ISO 8601
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl From<&RenderedEmbed> for Embed {
    fn from(rendered: &RenderedEmbed) -> Self {
        Self {
            title: rendered.title.clone(),
            description: rendered.description.clone(),
            color: rendered.color.value(),
            thumbnail: rendered
                .thumbnail_url
                .clone()
                .map(|url| EmbedThumbnail { url }),
            footer: Some(EmbedFooter {
                text: rendered.footer.text.clone(),
                icon_url: rendered.footer.icon_url.clone(),
            }),
            author: Some(EmbedAuthor {
                name: rendered.author.name.clone(),
                icon_url: rendered.author.icon_url.clone(),
            }),
            timestamp: Some(rendered.timestamp.to_rfc3339()),
        }
    }
}

/// A queued message for a webhook
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl WebhookMessage {
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A message needs content or at least one embed
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty) && self.embeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_is_empty() {
        assert!(WebhookMessage::default().is_empty());
        assert!(WebhookMessage::with_content("").is_empty());
        assert!(!WebhookMessage::with_content("hello").is_empty());
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let message = WebhookMessage::with_content("@here");
        assert_eq!(serde_json::to_value(&message).unwrap(), json!({"content": "@here"}));
    }
}

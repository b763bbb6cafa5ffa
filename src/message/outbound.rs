//! Messages pushed through `/cgi-bin/message/send`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One article of a news message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    #[serde(default, alias = "picUrl", skip_serializing_if = "Option::is_none")]
    pub picurl: Option<String>,
}

/// Message body, one variant per platform message type.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    Text {
        content: String,
    },
    Image {
        media_id: String,
    },
    Voice {
        media_id: String,
    },
    Video {
        media_id: String,
        title: Option<String>,
        description: Option<String>,
    },
    File {
        media_id: String,
    },
    Markdown {
        content: String,
    },
    TextCard {
        title: String,
        description: String,
        url: String,
        btn_txt: Option<String>,
    },
    News {
        articles: Vec<Article>,
    },
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn markdown(content: impl Into<String>) -> Self {
        Self::Markdown {
            content: content.into(),
        }
    }

    pub fn image(media_id: impl Into<String>) -> Self {
        Self::Image {
            media_id: media_id.into(),
        }
    }

    pub fn text_card(
        title: impl Into<String>,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::TextCard {
            title: title.into(),
            description: description.into(),
            url: url.into(),
            btn_txt: None,
        }
    }

    /// Wire value of `msgtype`
    pub fn msg_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Voice { .. } => "voice",
            Self::Video { .. } => "video",
            Self::File { .. } => "file",
            Self::Markdown { .. } => "markdown",
            Self::TextCard { .. } => "textcard",
            Self::News { .. } => "news",
        }
    }

    /// Per-type body, placed under the `msgtype` key.
    fn body(&self) -> Value {
        match self {
            Self::Text { content } | Self::Markdown { content } => json!({ "content": content }),
            Self::Image { media_id } | Self::Voice { media_id } | Self::File { media_id } => {
                json!({ "media_id": media_id })
            }
            Self::Video {
                media_id,
                title,
                description,
            } => {
                let mut body = Map::new();
                body.insert("media_id".to_string(), json!(media_id));
                if let Some(title) = title {
                    body.insert("title".to_string(), json!(title));
                }
                if let Some(description) = description {
                    body.insert("description".to_string(), json!(description));
                }
                Value::Object(body)
            }
            Self::TextCard {
                title,
                description,
                url,
                btn_txt,
            } => {
                let mut body = json!({
                    "title": title,
                    "description": description,
                    "url": url,
                });
                if let Some(btn_txt) = btn_txt {
                    body["btntxt"] = json!(btn_txt);
                }
                body
            }
            Self::News { articles } => json!({ "articles": articles }),
        }
    }
}

/// Who receives a message. Multiple ids are joined with `|`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recipients {
    pub to_user: Option<String>,
    pub to_party: Option<String>,
    pub to_tag: Option<String>,
}

impl Recipients {
    pub fn users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            to_user: Some(join(ids)),
            ..Default::default()
        }
    }

    /// Every member of the application; party and tag are then ignored by the platform.
    pub fn all() -> Self {
        Self {
            to_user: Some("@all".to_string()),
            ..Default::default()
        }
    }

    pub fn with_parties<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.to_party = Some(join(ids));
        self
    }

    pub fn with_tags<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.to_tag = Some(join(ids));
        self
    }

    pub fn is_empty(&self) -> bool {
        [&self.to_user, &self.to_party, &self.to_tag]
            .iter()
            .all(|v| v.as_deref().map_or(true, |s| s.trim().is_empty()))
    }
}

fn join<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ids.into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// A message addressed to recipients; the agent id is filled in at send time.
#[derive(Clone, Debug, PartialEq)]
pub struct SendRequest {
    pub recipients: Recipients,
    pub message: OutboundMessage,
}

impl SendRequest {
    pub fn new(recipients: Recipients, message: OutboundMessage) -> Self {
        Self {
            recipients,
            message,
        }
    }

    /// JSON body for `/cgi-bin/message/send`.
    pub fn to_payload(&self, agent_id: i64) -> Value {
        let mut payload = Map::new();
        if let Some(v) = &self.recipients.to_user {
            payload.insert("touser".to_string(), json!(v));
        }
        if let Some(v) = &self.recipients.to_party {
            payload.insert("toparty".to_string(), json!(v));
        }
        if let Some(v) = &self.recipients.to_tag {
            payload.insert("totag".to_string(), json!(v));
        }

        let msg_type = self.message.msg_type();
        payload.insert("msgtype".to_string(), json!(msg_type));
        payload.insert("agentid".to_string(), json!(agent_id));
        payload.insert(msg_type.to_string(), self.message.body());

        Value::Object(payload)
    }
}

/// Outcome of one send. Failures are values, not errors.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    /// Unix millis when the result was produced
    pub timestamp: i64,
}

impl MessageResult {
    pub fn success(msg_id: Option<String>) -> Self {
        Self {
            success: true,
            msg_id,
            err_code: None,
            err_msg: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn failure(err_code: i64, err_msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg_id: None,
            err_code: Some(err_code),
            err_msg: Some(err_msg.into()),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

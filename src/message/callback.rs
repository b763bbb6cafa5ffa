//! Decrypted callback messages pushed by the platform.

use crate::error::{NoticeError, NoticeResult};
use std::collections::HashMap;

/// What a callback carries, derived from `MsgType` and `Event`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackKind {
    Text,
    Image,
    Voice,
    Video,
    Location,
    Link,
    Event(EventKind),
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Subscribe,
    Unsubscribe,
    EnterAgent,
    Click,
    View,
    Other(String),
}

impl EventKind {
    fn parse(event: &str) -> Self {
        match event.to_ascii_lowercase().as_str() {
            "subscribe" => Self::Subscribe,
            "unsubscribe" => Self::Unsubscribe,
            "enter_agent" => Self::EnterAgent,
            "click" => Self::Click,
            "view" => Self::View,
            _ => Self::Other(event.to_string()),
        }
    }
}

/// Flat view over the fields of a decrypted callback body.
///
/// Fields the platform did not send are `None`; unknown fields are ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallbackMessage {
    pub to_user_name: Option<String>,
    pub from_user_name: Option<String>,
    pub create_time: Option<i64>,
    pub msg_type: Option<String>,
    pub content: Option<String>,
    pub msg_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub pic_url: Option<String>,
    pub media_id: Option<String>,
    pub format: Option<String>,
    /// Speech recognition result of a voice message
    pub recognition: Option<String>,
    pub thumb_media_id: Option<String>,
    pub location_x: Option<f64>,
    pub location_y: Option<f64>,
    pub scale: Option<i64>,
    pub label: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub event: Option<String>,
    pub event_key: Option<String>,
}

impl CallbackMessage {
    /// Build from the output of [`crate::xml::parse_fields`].
    ///
    /// # Errors
    /// * `Decrypt` - a numeric field is present but not a number
    pub fn from_fields(fields: &HashMap<String, String>) -> NoticeResult<Self> {
        let text = |name: &str| {
            fields
                .get(name)
                .filter(|v| !v.is_empty())
                .cloned()
        };

        Ok(Self {
            to_user_name: text("ToUserName"),
            from_user_name: text("FromUserName"),
            create_time: number(fields, "CreateTime")?,
            msg_type: text("MsgType"),
            content: text("Content"),
            msg_id: number(fields, "MsgId")?,
            agent_id: number(fields, "AgentID")?,
            pic_url: text("PicUrl"),
            media_id: text("MediaId"),
            format: text("Format"),
            recognition: text("Recognition"),
            thumb_media_id: text("ThumbMediaId"),
            location_x: number(fields, "Location_X")?,
            location_y: number(fields, "Location_Y")?,
            scale: number(fields, "Scale")?,
            label: text("Label"),
            title: text("Title"),
            description: text("Description"),
            url: text("Url"),
            event: text("Event"),
            event_key: text("EventKey"),
        })
    }

    pub fn kind(&self) -> CallbackKind {
        match self.msg_type.as_deref() {
            Some("text") => CallbackKind::Text,
            Some("image") => CallbackKind::Image,
            Some("voice") => CallbackKind::Voice,
            Some("video") => CallbackKind::Video,
            Some("location") => CallbackKind::Location,
            Some("link") => CallbackKind::Link,
            Some("event") => {
                CallbackKind::Event(EventKind::parse(self.event.as_deref().unwrap_or_default()))
            }
            Some(other) => CallbackKind::Other(other.to_string()),
            None => CallbackKind::Other(String::new()),
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind() == CallbackKind::Text
    }

    pub fn is_event(&self) -> bool {
        matches!(self.kind(), CallbackKind::Event(_))
    }
}

fn number<T: std::str::FromStr>(fields: &HashMap<String, String>, name: &str) -> NoticeResult<Option<T>> {
    match fields.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| NoticeError::Decrypt(format!("callback field {} is not a number", name))),
    }
}

//! Flat field extraction from callback XML.
//!
//! Callback bodies are a single `<xml>` element with flat children, each either
//! plain text or CDATA. No nesting, attributes or entities are interpreted.

use crate::error::{NoticeError, NoticeResult};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn cdata_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)<([A-Za-z_][\w.:-]*)><!\[CDATA\[(.*?)\]\]></[^>]*>").expect("valid CDATA pattern")
    })
}

fn element_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<([A-Za-z_][\w.:-]*)>([^<]*)</[^>]*>").expect("valid element pattern"))
}

/// Parse callback XML into field name → value.
///
/// CDATA values take precedence over plain-text values of the same name.
pub fn parse_fields(xml: &str) -> NoticeResult<HashMap<String, String>> {
    if xml.trim().is_empty() {
        return Err(NoticeError::Decrypt("XML content is empty".to_string()));
    }

    let mut fields = HashMap::new();

    for caps in cdata_pattern().captures_iter(xml) {
        fields.insert(caps[1].to_string(), caps[2].to_string());
    }

    for caps in element_pattern().captures_iter(xml) {
        fields
            .entry(caps[1].to_string())
            .or_insert_with(|| caps[2].to_string());
    }

    Ok(fields)
}

/// Value of a single field, if present.
pub fn extract_field(xml: &str, field: &str) -> NoticeResult<Option<String>> {
    Ok(parse_fields(xml)?.remove(field))
}

/// Passive text reply. Blank content yields an empty body.
pub fn build_text_reply(content: &str) -> String {
    if content.trim().is_empty() {
        return String::new();
    }
    format!(
        "<xml><MsgType><![CDATA[text]]></MsgType><Content><![CDATA[{}]]></Content></xml>",
        content
    )
}

/// Envelope for an encrypted passive reply.
pub fn build_encrypted_reply(encrypt: &str, signature: &str, timestamp: &str, nonce: &str) -> String {
    format!(
        "<xml><Encrypt><![CDATA[{}]]></Encrypt><MsgSignature><![CDATA[{}]]></MsgSignature><TimeStamp>{}</TimeStamp><Nonce><![CDATA[{}]]></Nonce></xml>",
        encrypt, signature, timestamp, nonce
    )
}

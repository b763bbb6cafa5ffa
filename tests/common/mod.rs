// Shared fixtures for integration tests

#![allow(dead_code)]

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use cbc::cipher::{block_padding::NoPadding, BlockEncryptMut, KeyIvInit};
use std::sync::Arc;
use wecom_notice::config::{AppConfig, AppRegistry, NoticeConfig};
use wecom_notice::crypto::decode_key;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;

pub const APP: &str = "alerts";
pub const CORP_ID: &str = "wx5823bf96d3bd56c7";
pub const TOKEN: &str = "QDG6eK";
pub const AES_KEY: &str = "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C";

pub fn app_config(corp_id: &str) -> AppConfig {
    AppConfig {
        corp_id: corp_id.to_string(),
        secret: "corp-secret".to_string(),
        agent_id: Some(1000002),
        token: TOKEN.to_string(),
        aes_key: AES_KEY.to_string(),
    }
}

pub fn registry() -> Arc<AppRegistry> {
    let mut config = NoticeConfig::default();
    config.default_app = APP.to_string();
    config.apps.insert(APP.to_string(), app_config(CORP_ID));
    config.apps.insert(
        "half-configured".to_string(),
        AppConfig {
            aes_key: String::new(),
            ..app_config(CORP_ID)
        },
    );
    Arc::new(AppRegistry::new(&config))
}

/// Builds a platform envelope: random prefix, length, payload, tenant, padded to 32.
pub fn encrypt(payload: &str, tenant: &str, key_base64: &str) -> String {
    let mut plain = rand::random::<[u8; 16]>().to_vec();
    plain.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    plain.extend_from_slice(payload.as_bytes());
    plain.extend_from_slice(tenant.as_bytes());

    let pad = 32 - (plain.len() % 32);
    plain.extend(std::iter::repeat(pad as u8).take(pad));

    let key = decode_key(key_base64).unwrap();
    let len = plain.len();
    Aes256CbcEnc::new_from_slices(&key, &key[..16])
        .unwrap()
        .encrypt_padded_mut::<NoPadding>(&mut plain, len)
        .unwrap();
    BASE64.encode(plain)
}

/// URI with a form-encoded query string.
pub fn uri(path: &str, params: &[(&str, &str)]) -> String {
    format!("{}?{}", path, serde_urlencoded::to_string(params).unwrap())
}

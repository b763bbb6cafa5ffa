//! AES-256-CBC decryption of the platform's callback envelope.
//!
//! Decrypted layout:
//!
//! ```text
//! [16 bytes random][4 bytes length L, big-endian][L bytes payload][tenant id]
//! ```
//!
//! The key is the base64-decoded EncodingAESKey (32 bytes). Its first 16 bytes
//! are the IV. Padding is removed by hand rather than by the cipher.

use crate::error::{NoticeError, NoticeResult};
use aes::Aes256;
use base64::{
    alphabet,
    engine::{general_purpose::GeneralPurpose, DecodePaddingMode, GeneralPurposeConfig},
    Engine,
};
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};


type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Size of the AES key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the IV in bytes, taken from the head of the key
const IV_SIZE: usize = 16;

/// Random prefix length in the decrypted envelope
const RANDOM_PREFIX: usize = 16;

/// Random prefix plus the 4-byte length field
const HEADER_SIZE: usize = RANDOM_PREFIX + 4;

/// Largest pad length accepted by [`strip_padding`]
const MAX_PAD: u8 = 32;

/// Platform keys are 43 characters with no `=` and leftover bits.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decodes the base64 AES key and checks it is 32 bytes.
///
/// Whitespace anywhere in the key is ignored.
pub fn decode_key(key_base64: &str) -> NoticeResult<[u8; KEY_SIZE]> {
    let cleaned: String = key_base64.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = LENIENT_BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| NoticeError::Decrypt(format!("invalid key encoding: {}", e)))?;

    bytes.as_slice().try_into().map_err(|_| {
        NoticeError::Decrypt(format!(
            "key must be {} bytes, got {} bytes",
            KEY_SIZE,
            bytes.len()
        ))
    })
}

/// Decrypts an envelope and returns its payload.
///
/// The tenant suffix is ignored. Use [`decrypt_for_tenant`] when the
/// envelope must be bound to a known corp id.
pub fn decrypt(ciphertext_base64: &str, key_base64: &str) -> NoticeResult<String> {
    let plain = decrypt_raw(ciphertext_base64, key_base64)?;
    let envelope = Envelope::parse(&plain)?;
    utf8(envelope.payload, "payload")
}

/// Decrypts an envelope and requires its trailing tenant id to equal `expected_tenant`.
///
/// # Errors
/// * `Decrypt` for any structural violation
/// * `TenantMismatch` if the envelope was issued for another tenant
pub fn decrypt_for_tenant(
    ciphertext_base64: &str,
    key_base64: &str,
    expected_tenant: &str,
) -> NoticeResult<String> {
    let plain = decrypt_raw(ciphertext_base64, key_base64)?;
    let envelope = Envelope::parse(&plain)?;

    let tenant = utf8(envelope.tenant, "tenant id")?;
    if tenant != expected_tenant {
        return Err(NoticeError::TenantMismatch {
            expected: expected_tenant.to_string(),
            actual: tenant,
        });
    }

    utf8(envelope.payload, "payload")
}

/// Borrowed view of a decrypted, unpadded envelope.
#[derive(Debug, PartialEq)]
struct Envelope<'a> {
    payload: &'a [u8],
    tenant: &'a [u8],
}

impl<'a> Envelope<'a> {
    fn parse(decrypted: &'a [u8]) -> NoticeResult<Self> {
        let content = strip_padding(decrypted);
        if content.len() < HEADER_SIZE {
            return Err(NoticeError::Decrypt("envelope too short".to_string()));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&content[RANDOM_PREFIX..HEADER_SIZE]);
        let length = u32::from_be_bytes(len_bytes) as usize;

        let end = HEADER_SIZE
            .checked_add(length)
            .filter(|end| *end <= content.len())
            .ok_or_else(|| NoticeError::Decrypt("length out of range".to_string()))?;

        Ok(Self {
            payload: &content[HEADER_SIZE..end],
            tenant: &content[end..],
        })
    }
}

/// Removes PKCS#7-style padding.
///
/// A last byte outside `1..=32` means "no padding" rather than an error;
/// some envelopes arrive unpadded and must still be accepted.
fn strip_padding(decrypted: &[u8]) -> &[u8] {
    let pad = match decrypted.last() {
        Some(&p) if (1..=MAX_PAD).contains(&p) => p as usize,
        _ => 0,
    };
    &decrypted[..decrypted.len().saturating_sub(pad)]
}

fn decrypt_raw(ciphertext_base64: &str, key_base64: &str) -> NoticeResult<Vec<u8>> {
    let key = decode_key(key_base64)?;
    let mut buf = LENIENT_BASE64
        .decode(ciphertext_base64.trim().as_bytes())
        .map_err(|e| NoticeError::Decrypt(format!("invalid ciphertext encoding: {}", e)))?;

    if buf.is_empty() {
        return Err(NoticeError::Decrypt("empty ciphertext".to_string()));
    }

    let cipher = Aes256CbcDec::new_from_slices(&key, &key[..IV_SIZE])
        .map_err(|e| NoticeError::Decrypt(format!("failed to create cipher: {}", e)))?;

    let len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| NoticeError::Decrypt("ciphertext is not a whole number of blocks".to_string()))?
        .len();
    buf.truncate(len);

    Ok(buf)
}

fn utf8(bytes: &[u8], what: &str) -> NoticeResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| NoticeError::Decrypt(format!("{} is not valid UTF-8", what)))
}

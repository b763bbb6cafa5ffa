// Error taxonomy
pub mod error;

// Callback signature (SHA-1 over sorted parts)
pub mod signature;

// Callback envelope decryption (AES-256-CBC)
pub mod crypto;

// Tenant credentials and access-token cache
pub mod credentials;

// Configuration and app registry
pub mod config;

// Plaintext callback field extraction
pub mod xml;

// Outbound messages and callback messages
pub mod message;

// Platform API client
pub mod client;

// Notification send path
pub mod service;

// HTTP callback portal
pub mod api;

pub use error::{NoticeError, NoticeResult};

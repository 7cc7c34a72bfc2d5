//! Ed25519 request signature check
//!
//! Discord signs `timestamp || body` with the application key and sends the
//! hex signature in `X-Signature-Ed25519` and the timestamp in
//! `X-Signature-Timestamp`.

use super::DiscordError;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

#[derive(Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Parse the hex public key from the developer portal
    pub fn from_hex(public_key: &str) -> Result<Self, DiscordError> {
        let bytes = hex::decode(public_key.trim()).map_err(|e| DiscordError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| DiscordError::InvalidKey("expected 32 bytes".to_string()))?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|e| DiscordError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }

    pub fn from_key(key: VerifyingKey) -> Self {
        Self { key }
    }

    pub fn verify(&self, signature_hex: &str, timestamp: &str, body: &[u8]) -> Result<(), DiscordError> {
        let sig_bytes = hex::decode(signature_hex.trim()).map_err(|_| DiscordError::InvalidSignature)?;
        let signature = Signature::from_slice(&sig_bytes).map_err(|_| DiscordError::InvalidSignature)?;

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key
            .verify(&message, &signature)
            .map_err(|_| DiscordError::InvalidSignature)
    }
}

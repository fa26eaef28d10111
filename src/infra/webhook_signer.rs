//! Produces `stripe-signature` headers the way the provider does.
//!
//! Used to replay captured payloads against a local instance and in tests.

use hmac::{Hmac, Mac, digest::InvalidLength};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub fn sign_webhook_payload(
    secret: &str,
    timestamp: i64,
    body: &str,
) -> Result<String, InvalidLength> {
    let signed_content = format!("{}.{}", timestamp, body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(signed_content.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("t={},v1={}", timestamp, signature))
}

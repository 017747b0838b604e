//! Webhook signature verification.
//!
//! GitHub signs deliveries with an HMAC over the raw body and sends it as
//! `X-Hub-Signature-256: sha256=<hex>` (and the legacy
//! `X-Hub-Signature: sha1=<hex>`). Gitea sends a bare hex HMAC-SHA256 in
//! `X-Gitea-Signature`. Both are checked against the exact bytes received.

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

pub const GITHUB_SIGNATURE_256_HEADER: &str = "x-hub-signature-256";
pub const GITHUB_SIGNATURE_HEADER: &str = "x-hub-signature";
pub const GITEA_SIGNATURE_HEADER: &str = "x-gitea-signature";

/// Computes the MAC and compares it with `expected` in constant time.
fn verify_mac<M: Mac + KeyInit>(secret: &[u8], payload: &[u8], expected: &[u8]) -> bool {
    let mut mac = match <M as Mac>::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    Mac::update(&mut mac, payload);
    mac.verify_slice(expected).is_ok()
}

/// Verifies a GitHub-style header value (`sha256=...` or `sha1=...`).
pub fn verify_hub_signature(secret: &[u8], payload: &[u8], signature_header: &str) -> bool {
    if let Some(hex_sig) = signature_header.strip_prefix("sha256=") {
        match hex::decode(hex_sig) {
            Ok(sig) => verify_mac::<HmacSha256>(secret, payload, &sig),
            Err(_) => false,
        }
    } else if let Some(hex_sig) = signature_header.strip_prefix("sha1=") {
        match hex::decode(hex_sig) {
            Ok(sig) => verify_mac::<HmacSha1>(secret, payload, &sig),
            Err(_) => false,
        }
    } else {
        false
    }
}

/// Verifies a Gitea header value: hex HMAC-SHA256 with no prefix.
pub fn verify_gitea_signature(secret: &[u8], payload: &[u8], signature_header: &str) -> bool {
    match hex::decode(signature_header.trim()) {
        Ok(sig) => verify_mac::<HmacSha256>(secret, payload, &sig),
        Err(_) => false,
    }
}

/// Hex HMAC-SHA256 of `payload`, as Gitea would send it.
pub fn sign_sha256(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC can take key of any size");
    Mac::update(&mut mac, payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Hex HMAC-SHA1 of `payload`.
pub fn sign_sha1(secret: &[u8], payload: &[u8]) -> String {
    let mut mac = <HmacSha1 as Mac>::new_from_slice(secret).expect("HMAC can take key of any size");
    Mac::update(&mut mac, payload);
    hex::encode(mac.finalize().into_bytes())
}

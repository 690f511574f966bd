use sha2::{Digest, Sha256};

/// Header carrying the payment watcher's signature over the canonical request body.
pub const SIGNATURE_HEADER: &str = "x-internal-signature";

fn hook_digest(payload: &str, secret: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(b":");
    hasher.update(payload.as_bytes());
    hasher.finalize().into()
}

pub fn sign_internal_payload(payload: &str, secret: &str) -> String {
    hex::encode(hook_digest(payload, secret))
}

pub fn verify_internal_signature(
    payload: &str,
    signature_hex: &str,
    secret: &str,
) -> Result<(), String> {
    let provided = hex::decode(signature_hex.trim())
        .map_err(|e| format!("signature is not valid hex: {e}"))?;
    if provided.as_slice() == hook_digest(payload, secret).as_slice() {
        Ok(())
    } else {
        Err("signature verification failed".to_string())
    }
}

use base64::Engine;
use rand::RngCore;
use sha2::Sha256;

use crate::constants::PASSWORD_HASH_ITERATIONS;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD_NO_PAD;
const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// Hashes a password with PBKDF2-HMAC-SHA256 as
/// `v1$<iterations>$<salt>$<digest>`.
pub(crate) fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    encode(password, &salt, PASSWORD_HASH_ITERATIONS)
}

pub(crate) fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some("v1"), Some(iters), Some(salt_b64), Some(digest_b64), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Ok(iterations) = iters.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (B64.decode(salt_b64), B64.decode(digest_b64)) else {
        return false;
    };
    if iterations == 0 || expected.len() != DIGEST_LEN {
        return false;
    }

    let actual = derive(password, &salt, iterations);
    // Constant time over the whole digest.
    actual
        .iter()
        .zip(&expected)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

fn encode(password: &str, salt: &[u8], iterations: u32) -> String {
    let digest = derive(password, salt, iterations);
    format!(
        "v1${iterations}${}${}",
        B64.encode(salt),
        B64.encode(digest)
    )
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

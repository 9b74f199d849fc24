// Cursor manager. Opaque pagination tokens: a JSON payload encrypted
// with AES-256-CBC under a scrypt-derived key, then hex- and base64-encoded.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// One-hour token lifetime.
const CURSOR_TTL_MILLIS: i64 = 60 * 60 * 1000;

/// scrypt cost parameters: N=16384 (log2=14), r=8, p=1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// Fixed salt: cursor tokens are never meant to resist offline key recovery,
/// only to be opaque and tamper-evident to a caller without the gateway's key.
const SCRYPT_SALT: &[u8] = b"kip-gateway-cursor-salt-v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPayload {
    #[serde(rename = "lastId")]
    pub last_id: i64,
    pub offset: i64,
    #[serde(rename = "queryHash")]
    pub query_hash: String,
    #[serde(rename = "issuedAt")]
    pub issued_at: i64,
}

fn derive_key(cursor_key: &[u8; 32]) -> [u8; 32] {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, 32)
        .expect("fixed scrypt parameters are always valid");
    let mut key = [0u8; 32];
    scrypt::scrypt(cursor_key, SCRYPT_SALT, &params, &mut key)
        .expect("scrypt with a 32-byte output buffer never fails");
    key
}

/// Derive the deterministic hash binding a cursor to the query that minted
/// it: the first 16 hex characters of
/// `SHA-256(normalize(find || where || filter))`.
pub fn query_hash(find_text: &str, where_text: &str, filter_text: &str) -> String {
    let normalized = format!(
        "{}|{}|{}",
        normalize(find_text),
        normalize(where_text),
        normalize(filter_text)
    );
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_ascii_lowercase()
}

/// Encode a cursor payload into the opaque wire token:
/// `base64(hex(iv) ++ ":" ++ hex(ciphertext))`.
pub fn encode(payload: &CursorPayload, cursor_key: &[u8; 32]) -> String {
    let key = derive_key(cursor_key);
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);

    let plaintext = serde_json::to_vec(payload).expect("CursorPayload always serializes");
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(&plaintext);

    let wire = format!("{}:{}", hex::encode(iv), hex::encode(ciphertext));
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, wire)
}

/// Decode a cursor token back into its payload. Any malformed, tampered,
/// or expired token is treated as "no cursor" — this function never
/// surfaces a hard error to the caller.
pub fn decode(token: &str, cursor_key: &[u8; 32]) -> Option<CursorPayload> {
    let wire_bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, token).ok()?;
    let wire = String::from_utf8(wire_bytes).ok()?;
    let (iv_hex, ciphertext_hex) = wire.split_once(':')?;

    let iv = hex::decode(iv_hex).ok()?;
    let ciphertext = hex::decode(ciphertext_hex).ok()?;
    if iv.len() != 16 {
        return None;
    }

    let key = derive_key(cursor_key);
    let iv_array: [u8; 16] = iv.try_into().ok()?;
    let plaintext = Aes256CbcDec::new(&key.into(), &iv_array.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .ok()?;

    let payload: CursorPayload = serde_json::from_slice(&plaintext).ok()?;

    let now = Utc::now().timestamp_millis();
    if now - payload.issued_at > CURSOR_TTL_MILLIS {
        return None;
    }

    Some(payload)
}

/// Decode a cursor and confirm it was minted for the same query. A hash
/// mismatch is treated identically to "no cursor": the caller falls back
/// to a fresh first page rather than erroring.
pub fn decode_for_query(token: &str, cursor_key: &[u8; 32], expected_query_hash: &str) -> Option<CursorPayload> {
    let payload = decode(token, cursor_key)?;
    if payload.query_hash != expected_query_hash {
        return None;
    }
    Some(payload)
}

//! Web Push protocol client: VAPID (RFC 8292) authorization and aes128gcm
//! (RFC 8291) payload encryption over plain HTTPS POSTs.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes128Gcm, KeyInit};
use base64::Engine as _;
use dashmap::DashMap;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::ecdsa::SigningKey;
use p256::ecdsa::signature::Signer;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use crate::config::PushConfig;
use crate::push::{DeliveryOutcome, PushClient, PushTarget};

const SALT_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const AUTH_SECRET_LEN: usize = 16;
const DEFAULT_RS: u32 = 4096;
const PUSH_TTL_SECS: &str = "3600";
const VAPID_JWT_EXP_SECS: i64 = 12 * 60 * 60;
const VAPID_JWT_SKEW_SECS: i64 = 60;

const IKM_INFO_PREFIX: &str = "WebPush: info\0";
const KEY_INFO: &str = "Content-Encoding: aes128gcm\0";
const NONCE_INFO: &str = "Content-Encoding: nonce\0";

#[derive(Debug, Error)]
pub enum WebPushError {
    #[error("Invalid VAPID key material: {0}")]
    InvalidKey(String),
    #[error("Invalid subscription key material: {0}")]
    InvalidSubscription(String),
    #[error("Payload encryption failed: {0}")]
    Encryption(String),
    #[error("Push request failed: {0}")]
    Transport(String),
}

#[derive(Clone)]
struct CachedVapidJwt {
    jwt: String,
    exp_unix: i64,
}

/// Production Web Push delivery client.
pub struct WebPushClient {
    client: reqwest::Client,
    vapid_public_key_b64: String,
    vapid_private_key_raw: [u8; 32],
    vapid_subject: String,
    // One signed JWT per push-service origin, reused until close to expiry.
    vapid_jwt_cache: DashMap<String, CachedVapidJwt>,
}

impl WebPushClient {
    pub fn new(config: &PushConfig) -> Result<Self, WebPushError> {
        let public_raw = decode_b64url(&config.vapid_public_key)
            .map_err(|e| WebPushError::InvalidKey(format!("vapid_public_key: {e}")))?;
        let _public_raw: [u8; PUBLIC_KEY_LEN] = public_raw.try_into().map_err(|_| {
            WebPushError::InvalidKey(format!(
                "vapid_public_key must decode to {PUBLIC_KEY_LEN} bytes"
            ))
        })?;
        let private_raw = decode_b64url(&config.vapid_private_key)
            .map_err(|e| WebPushError::InvalidKey(format!("vapid_private_key: {e}")))?;
        let private_raw: [u8; 32] = private_raw.try_into().map_err(|_| {
            WebPushError::InvalidKey("vapid_private_key must decode to 32 bytes".into())
        })?;
        // Fail at startup rather than on first delivery.
        SigningKey::from_bytes((&private_raw).into())
            .map_err(|_| WebPushError::InvalidKey("vapid_private_key is not a P-256 scalar".into()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| WebPushError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            vapid_public_key_b64: config.vapid_public_key.clone(),
            vapid_private_key_raw: private_raw,
            vapid_subject: config.vapid_subject.clone(),
            vapid_jwt_cache: DashMap::new(),
        })
    }

    pub fn vapid_public_key(&self) -> &str {
        &self.vapid_public_key_b64
    }

    async fn try_deliver(&self, target: &PushTarget, payload: &str) -> Result<u16, WebPushError> {
        let aud = push_service_audience(&target.endpoint)?;
        let jwt = self.get_or_build_vapid_jwt(&aud)?;

        let client_pub_raw = decode_b64url(&target.p256dh)
            .map_err(|e| WebPushError::InvalidSubscription(format!("p256dh: {e}")))?;
        let client_pub_raw: [u8; PUBLIC_KEY_LEN] = client_pub_raw
            .try_into()
            .map_err(|_| WebPushError::InvalidSubscription("p256dh key length".into()))?;
        let client_auth = decode_b64url(&target.auth)
            .map_err(|e| WebPushError::InvalidSubscription(format!("auth: {e}")))?;
        let client_auth: [u8; AUTH_SECRET_LEN] = client_auth
            .try_into()
            .map_err(|_| WebPushError::InvalidSubscription("auth secret length".into()))?;

        let (body, salt_b64, dh_b64) =
            encrypt_aes128gcm(payload.as_bytes(), &client_pub_raw, &client_auth)?;

        let crypto_key = format!("dh={dh_b64}; p256ecdsa={}", self.vapid_public_key_b64);
        let authorization = format!("vapid t={jwt}, k={}", self.vapid_public_key_b64);

        let response = self
            .client
            .post(&target.endpoint)
            .header("TTL", PUSH_TTL_SECS)
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Encryption", format!("salt={salt_b64}"))
            .header("Crypto-Key", crypto_key)
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await
            .map_err(|e| WebPushError::Transport(e.to_string()))?;

        Ok(response.status().as_u16())
    }

    fn get_or_build_vapid_jwt(&self, aud: &str) -> Result<String, WebPushError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if let Some(entry) = self.vapid_jwt_cache.get(aud)
            && entry.exp_unix - VAPID_JWT_SKEW_SECS > now
        {
            return Ok(entry.jwt.clone());
        }

        let exp_unix = now + VAPID_JWT_EXP_SECS;
        let jwt = build_vapid_jwt(
            aud,
            &self.vapid_subject,
            &self.vapid_private_key_raw,
            exp_unix,
        )?;
        self.vapid_jwt_cache.insert(
            aud.to_string(),
            CachedVapidJwt {
                jwt: jwt.clone(),
                exp_unix,
            },
        );
        Ok(jwt)
    }
}

#[async_trait::async_trait]
impl PushClient for WebPushClient {
    async fn deliver(&self, target: &PushTarget, payload: &str) -> DeliveryOutcome {
        match self.try_deliver(target, payload).await {
            Ok(status) if (200..300).contains(&status) => DeliveryOutcome::Delivered,
            Ok(404 | 410) => DeliveryOutcome::Gone,
            Ok(status) => DeliveryOutcome::Failed(format!("push service returned HTTP {status}")),
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        }
    }
}

fn push_service_audience(endpoint: &str) -> Result<String, WebPushError> {
    let url = Url::parse(endpoint)
        .map_err(|e| WebPushError::InvalidSubscription(format!("endpoint URL: {e}")))?;
    let host = url
        .host()
        .ok_or_else(|| WebPushError::InvalidSubscription("endpoint missing host".into()))?;

    let host = match host {
        url::Host::Domain(d) => d.to_string(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => format!("[{ip}]"),
    };

    let aud = match (url.scheme(), url.port()) {
        (scheme, Some(port)) => format!("{scheme}://{host}:{port}"),
        (scheme, None) => format!("{scheme}://{host}"),
    };
    Ok(aud)
}

fn decode_b64url(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(input.as_bytes())
}

fn encode_b64url(input: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(input)
}

fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, WebPushError> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| WebPushError::Encryption("HKDF expand failed".into()))?;
    Ok(okm)
}

fn encrypt_aes128gcm(
    plaintext: &[u8],
    remote_public_key_raw: &[u8; PUBLIC_KEY_LEN],
    auth_secret: &[u8; AUTH_SECRET_LEN],
) -> Result<(Vec<u8>, String, String), WebPushError> {
    if plaintext.is_empty() {
        return Err(WebPushError::Encryption("payload cannot be empty".into()));
    }

    let mut salt = [0u8; SALT_LEN];
    let mut rng = OsRng;
    rng.fill_bytes(&mut salt);

    let remote_pub = p256::PublicKey::from_sec1_bytes(remote_public_key_raw)
        .map_err(|_| WebPushError::InvalidSubscription("p256dh is not a P-256 point".into()))?;

    let local_secret = EphemeralSecret::random(&mut rng);
    let local_pub = p256::PublicKey::from(&local_secret);
    let local_pub_raw = local_pub.to_encoded_point(false);
    let local_pub_raw: [u8; PUBLIC_KEY_LEN] = local_pub_raw
        .as_bytes()
        .try_into()
        .map_err(|_| WebPushError::Encryption("local public key length".into()))?;

    let shared_secret = local_secret.diffie_hellman(&remote_pub);
    let shared_secret = shared_secret.raw_secret_bytes();

    let mut ikm_info = Vec::with_capacity(IKM_INFO_PREFIX.len() + PUBLIC_KEY_LEN * 2);
    ikm_info.extend_from_slice(IKM_INFO_PREFIX.as_bytes());
    ikm_info.extend_from_slice(remote_public_key_raw);
    ikm_info.extend_from_slice(&local_pub_raw);

    let ikm = hkdf_sha256(auth_secret, shared_secret.as_slice(), &ikm_info, 32)?;
    let cek = hkdf_sha256(&salt, &ikm, KEY_INFO.as_bytes(), 16)?;
    let nonce = hkdf_sha256(&salt, &ikm, NONCE_INFO.as_bytes(), 12)?;

    let cipher = Aes128Gcm::new_from_slice(&cek)
        .map_err(|_| WebPushError::Encryption("invalid CEK length".into()))?;
    let iv: [u8; 12] = nonce
        .as_slice()
        .try_into()
        .map_err(|_| WebPushError::Encryption("invalid nonce length".into()))?;

    // Single record: plaintext + final-record delimiter byte.
    let mut padded = Vec::with_capacity(plaintext.len() + 1);
    padded.extend_from_slice(plaintext);
    padded.push(2);

    let ciphertext = cipher
        .encrypt((&iv).into(), padded.as_slice())
        .map_err(|_| WebPushError::Encryption("AES-GCM encryption failed".into()))?;

    // aes128gcm header (RFC 8188): salt | rs | idlen | keyid, then ciphertext.
    let mut body = Vec::with_capacity(SALT_LEN + 4 + 1 + PUBLIC_KEY_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&DEFAULT_RS.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(&local_pub_raw);
    body.extend_from_slice(&ciphertext);

    Ok((body, encode_b64url(&salt), encode_b64url(&local_pub_raw)))
}

fn build_vapid_jwt(
    aud: &str,
    subject: &str,
    private_key_raw: &[u8; 32],
    exp_unix: i64,
) -> Result<String, WebPushError> {
    #[derive(Serialize)]
    struct Claims<'a> {
        aud: &'a str,
        exp: u64,
        sub: &'a str,
    }

    let header = serde_json::json!({ "typ": "JWT", "alg": "ES256" });
    let claims = Claims {
        aud,
        exp: exp_unix as u64,
        sub: subject,
    };

    let header_b64 = encode_b64url(
        serde_json::to_string(&header)
            .map_err(|e| WebPushError::Encryption(format!("JWT header: {e}")))?
            .as_bytes(),
    );
    let claims_b64 = encode_b64url(
        serde_json::to_string(&claims)
            .map_err(|e| WebPushError::Encryption(format!("JWT claims: {e}")))?
            .as_bytes(),
    );

    let signing_input = format!("{header_b64}.{claims_b64}");

    let signing_key = SigningKey::from_bytes(private_key_raw.into())
        .map_err(|_| WebPushError::InvalidKey("VAPID private key".into()))?;
    let sig: p256::ecdsa::Signature = signing_key.sign(signing_input.as_bytes());
    let sig_b64 = encode_b64url(sig.to_bytes().as_slice());

    Ok(format!("{signing_input}.{sig_b64}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_strips_path_and_keeps_origin() {
        assert_eq!(
            push_service_audience("https://fcm.googleapis.com/fcm/send/abc123").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            push_service_audience("https://push.example.org:8443/ep/1").unwrap(),
            "https://push.example.org:8443"
        );
    }

    #[test]
    fn audience_rejects_bad_urls() {
        assert!(push_service_audience("not a url").is_err());
    }

    #[test]
    fn encrypt_produces_rfc8188_header() {
        // Any valid P-256 point works as the remote key for framing checks.
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = p256::PublicKey::from(&secret);
        let point = public.to_encoded_point(false);
        let remote: [u8; PUBLIC_KEY_LEN] = point.as_bytes().try_into().unwrap();
        let auth = [7u8; AUTH_SECRET_LEN];

        let (body, salt_b64, dh_b64) = encrypt_aes128gcm(b"{\"title\":\"x\"}", &remote, &auth).unwrap();

        assert_eq!(&body[SALT_LEN..SALT_LEN + 4], &DEFAULT_RS.to_be_bytes());
        assert_eq!(body[SALT_LEN + 4], PUBLIC_KEY_LEN as u8);
        assert_eq!(decode_b64url(&salt_b64).unwrap().len(), SALT_LEN);
        assert_eq!(decode_b64url(&dh_b64).unwrap().len(), PUBLIC_KEY_LEN);
    }

    #[test]
    fn vapid_jwt_has_three_segments() {
        let secret = p256::SecretKey::random(&mut OsRng);
        let raw: [u8; 32] = secret.to_bytes().into();
        let jwt = build_vapid_jwt(
            "https://push.example.org",
            "mailto:ops@example.org",
            &raw,
            4_102_444_800,
        )
        .unwrap();
        assert_eq!(jwt.split('.').count(), 3);
    }
}

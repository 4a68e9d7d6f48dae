//! Webhook authentication.
//!
//! Each provider proves knowledge of the shared secret differently: GitHub
//! signs the raw body (`X-Hub-Signature`, HMAC-SHA1, or `X-Hub-Signature-256`),
//! GitLab echoes it in `X-Gitlab-Token` and Travis CI passes it as the
//! `secret` query parameter.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;
use std::collections::HashMap;
use tracing::warn;

use super::{ProjectPath, Provider};
use crate::error::{EventcError, Result};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "X-Hub-Signature";
const SIGNATURE_256_HEADER: &str = "X-Hub-Signature-256";
const GITLAB_TOKEN_HEADER: &str = "X-Gitlab-Token";
const SECRET_QUERY_PARAMETER: &str = "secret";

/// Compares two byte strings in time independent of where they differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `sha1=<hex>` signature of `body`, as GitHub sends it.
pub fn sign_sha1(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha1={}", hex::encode(mac.finalize().into_bytes())))
}

/// `sha256=<hex>` signature of `body`.
pub fn sign_sha256(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks a `sha1=<hex>` or `sha256=<hex>` header. Hex case does not matter.
pub fn verify_hub_signature(secret: &str, body: &[u8], header: &str) -> bool {
    let (algorithm, hex_signature) = match header.split_once('=') {
        Some(parts) => parts,
        None => return false,
    };
    let Ok(signature) = hex::decode(hex_signature.trim()) else {
        return false;
    };

    match algorithm {
        "sha1" => HmacSha1::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(body);
                mac.verify_slice(&signature).is_ok()
            })
            .unwrap_or(false),
        "sha256" => HmacSha256::new_from_slice(secret.as_bytes())
            .map(|mut mac| {
                mac.update(body);
                mac.verify_slice(&signature).is_ok()
            })
            .unwrap_or(false),
        _ => false,
    }
}

/// Secret for a request path. The project entry wins over the group entry.
pub fn lookup_secret<'a>(
    secrets: &'a HashMap<String, String>,
    project: &ProjectPath,
) -> Option<&'a str> {
    project
        .project
        .as_deref()
        .and_then(|name| secrets.get(name))
        .or_else(|| secrets.get(&project.group))
        .map(String::as_str)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Verifies a request against the configured secrets.
///
/// Without a secret store every request is accepted. With one, a request for
/// a project that has no entry is rejected and an empty secret disables the
/// check for that project. The error never says which check failed.
pub fn authenticate(
    secrets: Option<&HashMap<String, String>>,
    provider: Provider,
    project: &ProjectPath,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    body: &[u8],
) -> Result<()> {
    let Some(secrets) = secrets else {
        return Ok(());
    };
    let rejected = || EventcError::WebhookValidationFailed(format!("request for {}", project));

    let Some(secret) = lookup_secret(secrets, project) else {
        warn!("No secret configured for {}", project);
        return Err(rejected());
    };
    if secret.is_empty() {
        return Ok(());
    }

    let valid = match provider {
        Provider::GitHub => {
            match (
                header(headers, SIGNATURE_256_HEADER),
                header(headers, SIGNATURE_HEADER),
            ) {
                (Some(signature), _) if signature.starts_with("sha256=") => {
                    verify_hub_signature(secret, body, signature)
                }
                (_, Some(signature)) if signature.starts_with("sha1=") => {
                    verify_hub_signature(secret, body, signature)
                }
                _ => false,
            }
        }
        Provider::GitLab => header(headers, GITLAB_TOKEN_HEADER)
            .is_some_and(|token| constant_time_eq(token.as_bytes(), secret.as_bytes())),
        Provider::Travis => query
            .get(SECRET_QUERY_PARAMETER)
            .is_some_and(|token| constant_time_eq(token.as_bytes(), secret.as_bytes())),
    };

    if valid {
        Ok(())
    } else {
        warn!("{} request for {} failed authentication", provider, project);
        Err(rejected())
    }
}

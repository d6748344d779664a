use anyhow::{Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Method;
use sha1::Sha1;

use crate::types::AccessKeys;

type HmacSha1 = Hmac<Sha1>;

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Headers for an AWS signature version 2 request against `path`.
///
/// The gateway's admin resources carry no signed sub-resources, so only the path is canonicalized.
pub fn sign_v2(
    keys: &AccessKeys,
    method: &Method,
    path: &str,
    now: DateTime<Utc>,
) -> Result<(String, String)> {
    let date = now.format(HTTP_DATE_FORMAT).to_string();
    let string_to_sign = format!("{}\n\n\n{}\n{}", method.as_str(), date, path);
    let signature = signature(&keys.secret_key, &string_to_sign)?;

    Ok((date, format!("AWS {}:{}", keys.access_key, signature)))
}

fn signature(secret_key: &str, string_to_sign: &str) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret_key.as_bytes())
        .map_err(|e| anyhow!("invalid signing key: {e}"))?;
    mac.update(string_to_sign.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

//! Relying-party identity and ceremony settings, loaded from the environment.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use std::{env, sync::LazyLock};
use thiserror::Error;
use url::Url;

use crate::utils::base64url_encode;

const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CLIENT_TIMEOUT_SECS: u32 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

const APK_KEY_HASH_PREFIX: &str = "android:apk-key-hash:";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Json conversion(Serde) error: {0}")]
    Serde(String),
}

/// Read a numeric setting, falling back to `default` when unset or unparsable.
fn env_number<T: FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Err(_) => default,
        Ok(v) => v.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}: {}. Using default '{}'", key, v, default);
            default
        }),
    }
}

/// Read an enumerated setting, falling back to `default` when unset or unknown.
fn env_choice<T: FromStr + std::fmt::Debug + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Err(_) => default,
        Ok(v) => v.parse::<T>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}: {}. Using default '{:?}'", key, v, default);
            default
        }),
    }
}

/// Seconds a pending ceremony stays valid in the ledger.
pub(crate) static PASSKEY_CHALLENGE_TIMEOUT: LazyLock<u64> = LazyLock::new(|| {
    env_number("PASSKEY_CHALLENGE_TIMEOUT", DEFAULT_CHALLENGE_TIMEOUT_SECS)
});

/// Seconds the client is told it may take to answer a challenge.
pub(crate) static PASSKEY_TIMEOUT: LazyLock<u32> =
    LazyLock::new(|| env_number("PASSKEY_TIMEOUT", DEFAULT_CLIENT_TIMEOUT_SECS));

/// Minimum seconds between opportunistic sweeps of the in-memory ledger.
pub(crate) static PASSKEY_LEDGER_SWEEP_INTERVAL: LazyLock<u64> = LazyLock::new(|| {
    env_number(
        "PASSKEY_LEDGER_SWEEP_INTERVAL",
        DEFAULT_SWEEP_INTERVAL_SECS,
    )
});

pub(crate) static PASSKEY_USER_VERIFICATION: LazyLock<UserVerification> = LazyLock::new(|| {
    env_choice("PASSKEY_USER_VERIFICATION", UserVerification::Required)
});

pub(crate) static PASSKEY_RESIDENT_KEY: LazyLock<ResidentKey> =
    LazyLock::new(|| env_choice("PASSKEY_RESIDENT_KEY", ResidentKey::Required));

pub(crate) static PASSKEY_AUTHENTICATOR_ATTACHMENT: LazyLock<AttachmentPreference> =
    LazyLock::new(|| {
        env_choice(
            "PASSKEY_AUTHENTICATOR_ATTACHMENT",
            AttachmentPreference::Platform,
        )
    });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

impl FromStr for UserVerification {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(ConfigError::Invalid(format!("user verification: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKey {
    Required,
    Preferred,
    Discouraged,
}

impl FromStr for ResidentKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "preferred" => Ok(Self::Preferred),
            "discouraged" => Ok(Self::Discouraged),
            other => Err(ConfigError::Invalid(format!("resident key: {other}"))),
        }
    }
}

/// Which kind of authenticator the client should offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentPreference {
    Platform,
    CrossPlatform,
    /// No preference is sent to the client
    Any,
}

impl FromStr for AttachmentPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "platform" => Ok(Self::Platform),
            "cross-platform" => Ok(Self::CrossPlatform),
            "none" | "any" => Ok(Self::Any),
            other => Err(ConfigError::Invalid(format!(
                "authenticator attachment: {other}"
            ))),
        }
    }
}

/// Client-facing parameters handed to the verification engine with every
/// challenge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CeremonyOptions {
    pub timeout_ms: u32,
    pub user_verification: UserVerification,
    pub resident_key: ResidentKey,
    pub authenticator_attachment: AttachmentPreference,
}

impl Default for CeremonyOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CLIENT_TIMEOUT_SECS * 1000,
            user_verification: UserVerification::Required,
            resident_key: ResidentKey::Required,
            authenticator_attachment: AttachmentPreference::Platform,
        }
    }
}

impl CeremonyOptions {
    pub fn from_env() -> Self {
        Self {
            timeout_ms: PASSKEY_TIMEOUT.saturating_mul(1000),
            user_verification: *PASSKEY_USER_VERIFICATION,
            resident_key: *PASSKEY_RESIDENT_KEY,
            authenticator_attachment: *PASSKEY_AUTHENTICATOR_ATTACHMENT,
        }
    }
}

/// Settings the orchestrator applies to every ceremony it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct CeremonyConfig {
    /// Lifetime of a pending ceremony in the ledger
    pub challenge_ttl: Duration,
    pub options: CeremonyOptions,
}

impl Default for CeremonyConfig {
    fn default() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(DEFAULT_CHALLENGE_TIMEOUT_SECS),
            options: CeremonyOptions::default(),
        }
    }
}

impl CeremonyConfig {
    pub fn from_env() -> Self {
        Self {
            challenge_ttl: Duration::from_secs(*PASSKEY_CHALLENGE_TIMEOUT),
            options: CeremonyOptions::from_env(),
        }
    }
}

/// Relying-party identity and the origins it accepts responses from.
///
/// The core never interprets origin strings; they are passed through to the
/// verification engine and published for related-origin discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelyingPartyConfig {
    pub id: String,
    pub name: String,
    pub origins: Vec<String>,
}

#[derive(Serialize)]
struct RelatedOrigins<'a> {
    rp_id: &'a str,
    origins: &'a [String],
}

impl RelyingPartyConfig {
    /// Load from `ORIGIN`, `PASSKEY_RP_ID`, `PASSKEY_RP_NAME`,
    /// `WEBAUTHN_ADDITIONAL_ORIGINS` and `PASSKEY_ANDROID_APK_KEY_HASHES`,
    /// reading a `.env` file first when one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let origin = env::var("ORIGIN").map_err(|_| ConfigError::Missing("ORIGIN".to_string()))?;
        let origin_url = parse_web_origin(&origin)?;

        let id = match env::var("PASSKEY_RP_ID") {
            Ok(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => origin_url
                .host_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigError::Invalid(format!("ORIGIN has no host: {origin}")))?,
        };
        let name = env::var("PASSKEY_RP_NAME").unwrap_or_else(|_| id.clone());

        let mut origins = vec![origin.trim_end_matches('/').to_string()];
        for additional in split_list(&env::var("WEBAUTHN_ADDITIONAL_ORIGINS").unwrap_or_default()) {
            parse_web_origin(additional)?;
            push_unique(&mut origins, additional.trim_end_matches('/').to_string());
        }
        for fingerprint in
            split_list(&env::var("PASSKEY_ANDROID_APK_KEY_HASHES").unwrap_or_default())
        {
            push_unique(&mut origins, apk_key_hash_origin(fingerprint)?);
        }

        tracing::info!(rp_id = %id, origins = origins.len(), "Loaded relying party configuration");
        Ok(Self { id, name, origins })
    }

    /// JSON document advertising `{rp_id, origins}` for related-origin discovery.
    pub fn related_origins_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(&RelatedOrigins {
            rp_id: &self.id,
            origins: &self.origins,
        })
        .map_err(|e| ConfigError::Serde(e.to_string()))
    }
}

fn push_unique(origins: &mut Vec<String>, origin: String) {
    if !origins.contains(&origin) {
        origins.push(origin);
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_web_origin(origin: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(origin.trim())
        .map_err(|e| ConfigError::Invalid(format!("origin {origin}: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ConfigError::Invalid(format!(
            "origin {origin}: expected an http(s) URL with a host"
        ))),
    }
}

/// Convert a colon-separated hex SHA-256 signing-certificate fingerprint into
/// the `android:apk-key-hash:` origin an Android client reports.
pub fn apk_key_hash_origin(fingerprint: &str) -> Result<String, ConfigError> {
    let hex_digits: String = fingerprint.chars().filter(|c| *c != ':').collect();
    let digest = hex::decode(&hex_digits)
        .map_err(|e| ConfigError::Invalid(format!("apk key hash {fingerprint}: {e}")))?;

    if digest.len() != 32 {
        return Err(ConfigError::Invalid(format!(
            "apk key hash {fingerprint}: expected 32 bytes, got {}",
            digest.len()
        )));
    }

    Ok(format!("{APK_KEY_HASH_PREFIX}{}", base64url_encode(&digest)))
}

//! Crypto key type and key families.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{StorageError, StorageResult};

/// The intended use of a key family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPurpose {
    /// Keys sign and verify tokens.
    Signing,
    /// Keys encrypt and decrypt payloads.
    Encryption,
}

impl fmt::Display for KeyPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signing => f.write_str("signing"),
            Self::Encryption => f.write_str("encryption"),
        }
    }
}

/// A logical key family. Each family has its own rotation lineage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptoKeyFeature {
    /// Signs workspace application tokens.
    WorkspaceAppsToken,
    /// Encrypts workspace application API keys.
    WorkspaceAppsApiKey,
    /// Signs OIDC account conversion state.
    OidcConvert,
    /// Signs tailnet resume tokens.
    TailnetResume,
}

impl CryptoKeyFeature {
    /// Every known feature.
    pub const ALL: [Self; 4] =
        [Self::WorkspaceAppsToken, Self::WorkspaceAppsApiKey, Self::OidcConvert, Self::TailnetResume];

    /// Returns the wire name of the feature.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WorkspaceAppsToken => "workspace_apps_token",
            Self::WorkspaceAppsApiKey => "workspace_apps_api_key",
            Self::OidcConvert => "oidc_convert",
            Self::TailnetResume => "tailnet_resume",
        }
    }

    /// Returns what keys of this family are used for.
    #[must_use]
    pub fn purpose(self) -> KeyPurpose {
        match self {
            Self::WorkspaceAppsApiKey => KeyPurpose::Encryption,
            Self::WorkspaceAppsToken | Self::OidcConvert | Self::TailnetResume => {
                KeyPurpose::Signing
            },
        }
    }
}

impl fmt::Display for CryptoKeyFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CryptoKeyFeature {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| StorageError::serialization(format!("unknown crypto key feature: {s}")))
    }
}

/// One rotation generation of a key, as published by the key authority.
///
/// # Validity Window
///
/// - A key may sign once `now >= starts_at`.
/// - A key is retired once `deletes_at` is set and `now >= deletes_at`. Retired keys must not be
///   used for signing or verification.
/// - `deletes_at == None` means the key is never retired.
///
/// # Wire Form
///
/// The secret travels hex-encoded. Use [`decode_secret`](Self::decode_secret)
/// to obtain the raw bytes.
///
/// # Example
///
/// ```
/// use chrono::{Duration, Utc};
/// use rotakey_storage::{CryptoKey, CryptoKeyFeature};
///
/// let now = Utc::now();
/// let key = CryptoKey::builder()
///     .feature(CryptoKeyFeature::TailnetResume)
///     .secret("00ff".to_owned())
///     .sequence(7)
///     .starts_at(now)
///     .deletes_at(now + Duration::minutes(10))
///     .build();
///
/// assert!(key.can_sign(now));
/// assert!(key.is_retired(now + Duration::minutes(10)));
/// assert_eq!(*key.decode_secret()?, vec![0x00, 0xff]);
/// # Ok::<(), rotakey_storage::StorageError>(())
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct CryptoKey {
    /// Key family this generation belongs to.
    pub feature: CryptoKeyFeature,

    /// Hex-encoded secret material.
    #[builder(into)]
    pub secret: Zeroizing<String>,

    /// Monotonic generation counter, unique within a feature.
    pub sequence: i32,

    /// When the key becomes eligible for signing.
    #[builder(default = Utc::now())]
    pub starts_at: DateTime<Utc>,

    /// When the key is retired, if ever.
    #[serde(default)]
    pub deletes_at: Option<DateTime<Utc>>,
}

impl CryptoKey {
    /// Returns `true` if the key may sign at `now`.
    #[must_use]
    pub fn can_sign(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now && !self.is_retired(now)
    }

    /// Returns `true` if the key is past its `deletes_at`.
    #[must_use]
    pub fn is_retired(&self, now: DateTime<Utc>) -> bool {
        self.deletes_at.is_some_and(|deletes_at| deletes_at <= now)
    }

    /// Decodes the hex secret.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the secret is not valid hex.
    pub fn decode_secret(&self) -> StorageResult<Zeroizing<Vec<u8>>> {
        hex::decode(self.secret.as_bytes()).map(Zeroizing::new).map_err(|e| {
            StorageError::serialization_with_source(
                format!("secret of {}/{} is not valid hex", self.feature, self.sequence),
                e,
            )
        })
    }

    /// Checks the key's own invariants.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if `deletes_at` is set and not
    /// strictly after `starts_at`.
    pub fn validate(&self) -> StorageResult<()> {
        if let Some(deletes_at) = self.deletes_at
            && deletes_at <= self.starts_at
        {
            return Err(StorageError::serialization(format!(
                "key {}/{} deletes_at ({deletes_at}) must be after starts_at ({})",
                self.feature, self.sequence, self.starts_at
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for CryptoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoKey")
            .field("feature", &self.feature)
            .field("secret", &"[REDACTED]")
            .field("sequence", &self.sequence)
            .field("starts_at", &self.starts_at)
            .field("deletes_at", &self.deletes_at)
            .finish()
    }
}

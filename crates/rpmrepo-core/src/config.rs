//! Signing configuration shared by the command-line front end and the library.

use thiserror::Error;

/// Secret id of the armored private key.
pub const ENV_SIGNING_KEY_SECRET: &str = "RPMREPO_SECRET_SIGNING_KEY";
/// Secret id of the key passphrase.
pub const ENV_SIGNING_PASSPHRASE_SECRET: &str = "RPMREPO_SECRET_SIGNING_PASSPHRASE";
/// Destination bucket for signed packages.
pub const ENV_TARGET_BUCKET: &str = "RPMREPO_S3_TARGET";
/// Destination key prefix for signed packages.
pub const ENV_TARGET_PATH: &str = "RPMREPO_S3_TARGET_PATH";
/// Source prefix removed before applying the destination prefix.
pub const ENV_BASE_PATH: &str = "RPMREPO_S3_BASE_PATH";

/// Invalid or incomplete configuration. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// The first setting needs the second.
    #[error("{0} is only valid together with {1}")]
    Requires(&'static str, &'static str),

    /// A setting has an unusable value.
    #[error("invalid {name}: {message}")]
    Invalid {
        /// The setting.
        name: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Where the signing key and its passphrase live in the secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningConfig {
    /// Secret id of the armored private key.
    pub key_secret: String,
    /// Secret id of the passphrase, for encrypted keys.
    pub passphrase_secret: Option<String>,
}

impl SigningConfig {
    /// Validate raw settings. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] without a key secret id.
    pub fn new(
        key_secret: Option<String>,
        passphrase_secret: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            key_secret: non_empty(key_secret).ok_or(ConfigError::Missing(ENV_SIGNING_KEY_SECRET))?,
            passphrase_secret: non_empty(passphrase_secret),
        })
    }
}

/// Where signed packages are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetConfig {
    /// Destination bucket. `None` keeps the source bucket.
    pub bucket: Option<String>,
    /// Destination key prefix. `None` keeps the source key.
    pub path: Option<String>,
    /// Prefix stripped from source keys before `path` is applied.
    pub base_path: Option<String>,
}

impl TargetConfig {
    /// Validate raw settings. Blank values count as unset.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Requires`] when a base path is given without a target
    /// path, since it would have no effect.
    pub fn new(
        bucket: Option<String>,
        path: Option<String>,
        base_path: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            bucket: non_empty(bucket),
            path: non_empty(path),
            base_path: non_empty(base_path),
        };
        if config.base_path.is_some() && config.path.is_none() {
            return Err(ConfigError::Requires(ENV_BASE_PATH, ENV_TARGET_PATH));
        }
        Ok(config)
    }

    /// Packages are re-signed where they are.
    pub fn is_in_place(&self) -> bool {
        self.bucket.is_none() && self.path.is_none()
    }
}

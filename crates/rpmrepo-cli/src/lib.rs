//! rpmrepo - yum repositories on object storage
//!
//! Batch handlers for package indexing and signing, plus signature checks.
//!
//! Every batch command reads one notification batch (a file or stdin),
//! processes it to completion and exits non-zero on any failure so the batch
//! is retried whole. Signing keys are armored OpenPGP keys, e.g. from
//! `gpg --armor --export-secret-keys`.

pub mod cmd;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rpmrepo_core::config::{
    ENV_BASE_PATH, ENV_SIGNING_KEY_SECRET, ENV_SIGNING_PASSPHRASE_SECRET, ENV_TARGET_BUCKET,
    ENV_TARGET_PATH,
};
use std::path::PathBuf;

/// Command-line entry point.
#[derive(Debug, Parser)]
#[command(name = "rpmrepo")]
#[command(author, version, about = "rpmrepo - yum repositories on object storage")]
pub struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index new packages and publish repository metadata
    Index {
        /// Store, secrets and batch settings.
        #[command(flatten)]
        runtime: RuntimeArgs,
    },
    /// Sign packages, optionally moving them to a release location
    #[command(name = "sign-package")]
    SignPackage {
        /// Store, secrets and batch settings.
        #[command(flatten)]
        runtime: RuntimeArgs,
        /// Signing key location.
        #[command(flatten)]
        signing: SigningArgs,
        /// Destination of signed packages.
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Write detached signatures next to metadata objects
    #[command(name = "sign-metadata")]
    SignMetadata {
        /// Store, secrets and batch settings.
        #[command(flatten)]
        runtime: RuntimeArgs,
        /// Signing key location.
        #[command(flatten)]
        signing: SigningArgs,
    },
    /// Verify a signed package or a detached signature
    Verify {
        /// Package or metadata file
        file: PathBuf,
        /// Armored OpenPGP public key
        #[arg(long)]
        key: PathBuf,
        /// Detached signature; without it the embedded package signature is checked
        #[arg(long)]
        signature: Option<PathBuf>,
    },
}

/// Object store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// S3 or an S3-compatible service
    S3,
    /// A local directory, one subdirectory per bucket
    Fs,
}

/// Secret store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SecretsKind {
    /// AWS Secrets Manager
    Aws,
    /// One file per secret in a directory
    File,
}

/// Settings shared by every batch command.
#[derive(Debug, Clone, Args)]
pub struct RuntimeArgs {
    /// Notification batch to process ("-" reads stdin)
    #[arg(long, default_value = "-")]
    pub event: String,
    /// Object store backend
    #[arg(long, value_enum, env = "RPMREPO_STORE", default_value_t = StoreKind::S3)]
    pub store: StoreKind,
    /// Root directory for the filesystem store
    #[arg(long, env = "RPMREPO_STORE_ROOT")]
    pub store_root: Option<PathBuf>,
    /// Custom S3 endpoint
    #[arg(long, env = "RPMREPO_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,
    /// AWS region override
    #[arg(long, env = "RPMREPO_S3_REGION")]
    pub s3_region: Option<String>,
    /// Use path-style S3 addressing
    #[arg(long, env = "RPMREPO_S3_PATH_STYLE")]
    pub s3_path_style: bool,
    /// Make uploaded objects publicly readable
    #[arg(long, env = "RPMREPO_PUBLIC_READ")]
    pub public_read: bool,
    /// Secret store backend
    #[arg(long, value_enum, env = "RPMREPO_SECRETS", default_value_t = SecretsKind::Aws)]
    pub secrets: SecretsKind,
    /// Directory for the file secret store
    #[arg(long, env = "RPMREPO_SECRETS_DIR")]
    pub secrets_dir: Option<PathBuf>,
    /// Batch deadline in seconds
    #[arg(long, env = "RPMREPO_TIMEOUT", default_value_t = 900)]
    pub timeout: u64,
}

/// Where the signing key lives.
#[derive(Debug, Clone, Args)]
pub struct SigningArgs {
    /// Secret id of the private key
    #[arg(long, env = ENV_SIGNING_KEY_SECRET)]
    pub signing_key_secret: Option<String>,
    /// Secret id of the private key passphrase
    #[arg(long, env = ENV_SIGNING_PASSPHRASE_SECRET)]
    pub signing_passphrase_secret: Option<String>,
}

/// Where signed packages go.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Destination bucket (default: the source bucket)
    #[arg(long, env = ENV_TARGET_BUCKET)]
    pub target_bucket: Option<String>,
    /// Destination key prefix (default: the source key)
    #[arg(long, env = ENV_TARGET_PATH)]
    pub target_path: Option<String>,
    /// Source prefix replaced by the target path
    #[arg(long, env = ENV_BASE_PATH)]
    pub base_path: Option<String>,
}

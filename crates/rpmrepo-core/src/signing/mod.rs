//! Package and metadata signing.
//!
//! Signatures are OpenPGP. Packages carry them in the RPM signature header
//! (the same slot `rpmsign` writes), metadata gets an armored detached
//! signature beside the signed object.

pub mod detached;
pub mod key;
pub mod package;
pub mod target;

pub use detached::{
    SIGNATURE_SUFFIX, armor, dearmor, sign_detached, sign_reader, signature_key, verify_detached,
};
pub use key::{Keyring, PublicKeys, load_keyring};
pub use package::{embed_signature, sign_package, verify_package};
pub use target::destination;

use crate::package::ParseError;
use std::io;
use thiserror::Error;

/// Unusable key material. Always fatal.
#[derive(Debug, Error)]
pub enum KeyError {
    /// The keyring held zero or several private keys.
    #[error("keyring must contain exactly one private key, found {0}")]
    InvalidKeyring(usize),

    /// The private key is protected and no passphrase secret is configured.
    #[error("private key is encrypted but no passphrase was configured")]
    MissingPassphrase,

    /// The key secret is binary rather than armored text.
    #[error("keyring is not valid UTF-8")]
    NotText,

    /// The key could not be parsed or unlocked.
    #[error("failed to decode key: {0}")]
    Decode(String),
}

/// Failure while producing, embedding or checking a signature.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The input is not a package.
    #[error("not a signable package: {0}")]
    Parse(#[from] ParseError),

    /// Reading the input or writing the output failed.
    #[error("I/O error while signing: {0}")]
    Io(#[from] io::Error),

    /// Creating or checking the OpenPGP signature failed.
    #[error("signature operation failed: {0}")]
    Crypto(#[source] rpm::Error),

    /// The input carries no signature.
    #[error("no signature present")]
    Unsigned,

    /// The signature text is not a valid armored OpenPGP signature.
    #[error("malformed signature: {0}")]
    Malformed(String),
}

impl From<rpm::Error> for SigningError {
    fn from(err: rpm::Error) -> Self {
        match err {
            rpm::Error::NoSignatureFound => Self::Unsigned,
            rpm::Error::Io(io) => Self::Io(io),
            other => Self::Crypto(other),
        }
    }
}

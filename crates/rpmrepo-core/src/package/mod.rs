//! Package inspection.
//!
//! Only the headers are decoded; the payload is hashed but never unpacked.
//! Decoding is done by the `rpm` crate once the header sizes have been
//! checked against [`MAX_HEADER_ENTRIES`] and [`MAX_HEADER_DATA`].

pub mod builder;
pub mod parser;

pub use builder::PackageBuilder;
pub use parser::{
    HashingReader, MAX_HEADER_DATA, MAX_HEADER_ENTRIES, PackageHeader, PackageParser,
    RpmHeaderParser, read_metadata, scan_package,
};

use std::io;
use thiserror::Error;

/// Failure to decode a package.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Reading failed or the input ended inside the headers.
    #[error("I/O error while reading package: {0}")]
    Io(#[from] io::Error),

    /// The first bytes are not an RPM lead.
    #[error("not an RPM package (bad lead magic)")]
    BadLeadMagic,

    /// A header section does not start with the header magic.
    #[error("bad magic in {0} header")]
    BadHeaderMagic(&'static str),

    /// A header declares more entries or data than any real package has.
    #[error("{section} header {what} of {value} exceeds the limit")]
    TooLarge {
        /// `signature` or `main`.
        section: &'static str,
        /// Which size field was out of range.
        what: &'static str,
        /// The declared value.
        value: u32,
    },

    /// The header index or data store is inconsistent.
    #[error("malformed header: {0}")]
    Malformed(#[source] rpm::Error),

    /// A tag every binary package carries is absent.
    #[error("required tag {0} is missing")]
    MissingTag(u32),
}

impl From<rpm::Error> for ParseError {
    fn from(err: rpm::Error) -> Self {
        match err {
            rpm::Error::Io(io) => Self::Io(io),
            rpm::Error::TagNotFound(tag) => Self::MissingTag(tag),
            other => Self::Malformed(other),
        }
    }
}

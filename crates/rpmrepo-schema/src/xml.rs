//! XML encoding shared by the three repository documents.
//!
//! Documents are written straight into an [`io::Write`] sink so callers can
//! stream them through compressors and hashers without building the full
//! serialized text in memory.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::{self, Write as _};
use thiserror::Error;

const DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Errors raised while reading or writing repository documents.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document text is not valid for the expected schema.
    #[error("failed to decode <{root}> document: {message}")]
    Decode {
        /// Root element of the document being decoded.
        root: &'static str,
        /// Underlying parser message.
        message: String,
    },

    /// The serializer rejected the in-memory document.
    #[error("failed to encode <{root}> document: {message}")]
    Encode {
        /// Root element of the document being encoded.
        root: &'static str,
        /// Underlying serializer message.
        message: String,
    },

    /// The sink returned an I/O error mid-document.
    #[error("I/O error while writing document: {0}")]
    Io(#[from] io::Error),
}

/// A repository document with a fixed root element.
pub trait XmlDocument: Serialize + DeserializeOwned + Send + Sync {
    /// Name of the root element (`repomd`, `metadata`, `filelists`).
    const ROOT: &'static str;

    /// Restore derived fields (such as counts) after decoding.
    fn normalize(&mut self) {}

    /// Serialize the document, declaration included, into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the sink fails and
    /// [`SchemaError::Encode`] if the serializer rejects the document.
    fn encode<W: io::Write>(&self, sink: W) -> Result<(), SchemaError> {
        let mut adapter = IoAdapter::new(sink);
        fmt::Write::write_str(&mut adapter, DECLARATION).map_err(|_| adapter.take_error())?;

        let mut serializer = quick_xml::se::Serializer::with_root(&mut adapter, Some(Self::ROOT))
            .map_err(|e| SchemaError::Encode {
                root: Self::ROOT,
                message: e.to_string(),
            })?;
        serializer.indent(' ', 2);

        if let Err(e) = self.serialize(serializer) {
            // A sink failure surfaces as a generic fmt error inside the serializer.
            if let Some(io_err) = adapter.error.take() {
                return Err(SchemaError::Io(io_err));
            }
            return Err(SchemaError::Encode {
                root: Self::ROOT,
                message: e.to_string(),
            });
        }

        fmt::Write::write_str(&mut adapter, "\n").map_err(|_| adapter.take_error())?;
        adapter.inner.flush()?;
        Ok(())
    }

    /// Parse a document from its XML text.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Decode`] if the text is malformed.
    fn decode(xml: &str) -> Result<Self, SchemaError> {
        let mut doc: Self = quick_xml::de::from_str(xml).map_err(|e| SchemaError::Decode {
            root: Self::ROOT,
            message: e.to_string(),
        })?;
        doc.normalize();
        Ok(doc)
    }

    /// Encode into an owned buffer. Intended for tests and small documents.
    ///
    /// # Errors
    ///
    /// See [`XmlDocument::encode`].
    fn to_xml_string(&self) -> Result<String, SchemaError> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        String::from_utf8(buf).map_err(|e| SchemaError::Encode {
            root: Self::ROOT,
            message: e.to_string(),
        })
    }
}

/// Bridges the `fmt::Write` serializer onto an `io::Write` sink, keeping the
/// first I/O error so it is not flattened into `fmt::Error`.
struct IoAdapter<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: io::Write> IoAdapter<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    fn take_error(&mut self) -> SchemaError {
        SchemaError::Io(
            self.error
                .take()
                .unwrap_or_else(|| io::Error::other("formatter error")),
        )
    }
}

impl<W: io::Write> fmt::Write for IoAdapter<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.error.is_some() {
            return Err(fmt::Error);
        }
        self.inner.write_all(s.as_bytes()).map_err(|e| {
            self.error = Some(e);
            fmt::Error
        })
    }
}

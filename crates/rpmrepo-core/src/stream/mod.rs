//! Streaming primitives: the bounded pipe and the document codec built on it.

pub mod codec;
pub mod pipe;

pub use codec::{Encoding, LoadedDocument, StoredDocument, load_document, read_document, upload_document};
pub use pipe::{PIPE_BUFFER_SIZE, PipeReader, PipeWriter, pipe, run_piped};

//! Bounded producer/consumer handoff.
//!
//! A blocking producer writes into a [`PipeWriter`] while an async consumer
//! reads the other end as an [`AsyncRead`]. The channel holds a single
//! buffered chunk, so the producer is never more than one buffer ahead of the
//! consumer. [`run_piped`] joins the two sides and cancels the survivor when
//! either one fails.

use crate::error::PipelineError;
use bytes::{Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Bytes the writer accumulates before handing a chunk to the reader.
pub const PIPE_BUFFER_SIZE: usize = 64 * 1024;

enum Frame {
    Data(Bytes),
    End,
    Error(io::Error),
}

/// Create a connected writer/reader pair.
pub fn pipe(cancel: CancellationToken) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(1);
    (
        PipeWriter {
            tx,
            buf: BytesMut::with_capacity(PIPE_BUFFER_SIZE),
            cancel,
        },
        PipeReader {
            rx,
            chunk: Bytes::new(),
            done: false,
        },
    )
}

/// Blocking write half. Must only be used off the async runtime threads.
///
/// Dropping the writer without calling [`PipeWriter::finish`] makes the
/// reader fail instead of seeing a clean end of stream, so a producer error
/// can never turn into a truncated but successful upload.
pub struct PipeWriter {
    tx: mpsc::Sender<Frame>,
    buf: BytesMut,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeWriter")
            .field("buffered", &self.buf.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

// Not `Interrupted`: `write_all` retries those forever.
fn cancelled() -> io::Error {
    io::Error::other("pipe cancelled")
}

fn reader_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed")
}

impl PipeWriter {
    fn send(&self, frame: Frame) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        self.tx.blocking_send(frame).map_err(|_| reader_gone())
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.send(Frame::Data(chunk))
    }

    /// Flush buffered bytes and signal a clean end of stream.
    ///
    /// # Errors
    ///
    /// The reading side has gone away.
    pub fn finish(mut self) -> io::Result<()> {
        self.send_buffered()?;
        self.send(Frame::End)
    }

    /// Fail the reader with `err`.
    ///
    /// Never blocks: if the channel is full the reader still fails, because
    /// the writer drops without sending an end marker.
    pub fn close_with_error(self, err: io::Error) {
        let _ = self.tx.try_send(Frame::Error(err));
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.cancel.is_cancelled() {
            return Err(cancelled());
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() >= PIPE_BUFFER_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Async read half.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Frame>,
    chunk: Bytes,
    done: bool,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Frame::Data(b) => write!(f, "Data({} bytes)", b.len()),
            Frame::End => f.write_str("End"),
            Frame::Error(e) => write!(f, "Error({e})"),
        }
    }
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.chunk.is_empty() {
                let n = this.chunk.len().min(out.remaining());
                out.put_slice(&this.chunk.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }
            match ready!(this.rx.poll_recv(cx)) {
                Some(Frame::Data(chunk)) => this.chunk = chunk,
                Some(Frame::End) => this.done = true,
                Some(Frame::Error(err)) => return Poll::Ready(Err(err)),
                None => {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "pipe writer dropped before finishing",
                    )));
                }
            }
        }
    }
}

const NONE_FAILED: u8 = 0;
const PRODUCER_FAILED: u8 = 1;
const CONSUMER_FAILED: u8 = 2;

fn record_failure(first: &AtomicU8, side: u8) {
    let _ = first.compare_exchange(NONE_FAILED, side, Ordering::SeqCst, Ordering::SeqCst);
}

/// Run a blocking `producer` and an async `consumer` joined by a [`pipe`].
///
/// The producer runs on the blocking pool and writes into the pipe; the pipe
/// is finished once it returns `Ok`. The consumer receives the read half.
/// The first side to fail cancels the other, both sides are allowed to wind
/// down, and the first error is returned. Cancelling `cancel` (or dropping
/// the returned future) stops both sides.
///
/// # Errors
///
/// Returns the first error raised by either side.
pub async fn run_piped<T, U, P, C, F>(
    cancel: &CancellationToken,
    producer: P,
    consumer: C,
) -> Result<(T, U), PipelineError>
where
    T: Send + 'static,
    P: FnOnce(&mut PipeWriter) -> Result<T, PipelineError> + Send + 'static,
    C: FnOnce(PipeReader) -> F,
    F: Future<Output = Result<U, PipelineError>>,
{
    let token = cancel.child_token();
    let _guard = token.clone().drop_guard();
    let first = Arc::new(AtomicU8::new(NONE_FAILED));
    let (mut writer, reader) = pipe(token.clone());

    let produce = {
        let first = Arc::clone(&first);
        let token = token.clone();
        let thread_first = Arc::clone(&first);
        async move {
            let handle = tokio::task::spawn_blocking(move || match producer(&mut writer) {
                Ok(value) => {
                    writer.finish()?;
                    Ok(value)
                }
                Err(err) => {
                    // Mark before the writer drops so the reader's follow-on
                    // error is not mistaken for the root cause. A closed pipe
                    // means the consumer failed first.
                    if !writer.is_closed() {
                        record_failure(&thread_first, PRODUCER_FAILED);
                    }
                    writer.close_with_error(io::Error::other("producer failed"));
                    Err(err)
                }
            });
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(PipelineError::Cancelled(format!(
                    "producer task failed: {join_err}"
                ))),
            };
            if result.is_err() {
                record_failure(&first, PRODUCER_FAILED);
                token.cancel();
            }
            result
        }
    };

    let consume = {
        let first = Arc::clone(&first);
        let token = token.clone();
        async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(PipelineError::Cancelled("stream consumer cancelled".to_string())),
                result = consumer(reader) => result,
            };
            if result.is_err() {
                record_failure(&first, CONSUMER_FAILED);
                token.cancel();
            }
            result
        }
    };

    match tokio::join!(produce, consume) {
        (Ok(produced), Ok(consumed)) => Ok((produced, consumed)),
        (Err(p), Err(c)) => {
            if first.load(Ordering::SeqCst) == CONSUMER_FAILED {
                Err(c)
            } else {
                Err(p)
            }
        }
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
    }
}

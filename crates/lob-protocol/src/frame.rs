//! Byte-level framing for the smart LOB transfer protocol (§4.A).
//!
//! Three frame kinds share one duplex stream: NUL-terminated JSON records,
//! and raw byte runs whose length was declared by a prior JSON record. This
//! module reads and writes exactly those two primitives; it has no notion of
//! "request" or "method" — see [`crate::envelope`] for that layer.

use std::io::{self, BufRead, BufReader, Read, Write};

use lob_core::error::ProtocolError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Default buffer size for copying raw byte runs (§5 resource budget).
pub const COPY_BUFFER_SIZE: usize = 128 * 1024;

/// Reads NUL-terminated JSON records and raw byte runs from a duplex stream.
///
/// Holds the single buffered reader the protocol specification requires:
/// bytes pulled past a JSON record's terminating `NUL` while looking for the
/// next one are never discarded, so a subsequent raw byte run starts from
/// exactly where the JSON record left off.
pub struct FrameReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wraps `inner` in a default-sized buffered reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Reads bytes up to and including the next `0x00`, strips the
    /// terminator, and JSON-decodes the remainder.
    ///
    /// Returns `Ok(None)` on a clean EOF with zero bytes read (the loop
    /// termination case in §4.B); any other short read is
    /// [`ProtocolError::Transport`].
    pub fn read_json<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ProtocolError> {
        let mut buf = Vec::new();
        let read = self
            .inner
            .read_until(0u8, &mut buf)
            .map_err(ProtocolError::Transport)?;

        if read == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&0u8) {
            return Err(ProtocolError::Transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended mid JSON record",
            )));
        }
        buf.pop();

        let text = std::str::from_utf8(&buf)
            .map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        serde_json::from_str(text)
            .map(Some)
            .map_err(|e| ProtocolError::MalformedJson(e.to_string()))
    }

    /// Reads exactly `n` bytes and copies them into `sink`, in
    /// [`COPY_BUFFER_SIZE`] increments.
    ///
    /// Fails with [`ProtocolError::StreamTruncated`] if EOF arrives before
    /// `n` bytes have been copied.
    pub fn read_exact_raw(
        &mut self,
        n: u64,
        sink: &mut impl Write,
    ) -> Result<(), ProtocolError> {
        copy_exact(&mut self.inner, sink, n)
    }

    /// Returns a bounded [`Read`] view over the next `n` bytes of the
    /// underlying stream, without copying them anywhere.
    ///
    /// Used by handlers that hand the raw run directly to a destination
    /// that wants its own `Read` source (e.g. [`lob-store`]'s
    /// `write_atomically`), rather than a pre-filled buffer. The returned
    /// adapter reads from the same buffered reader [`FrameReader::read_json`]
    /// uses, so bytes already pulled past a prior record's terminator are
    /// consumed first, exactly as the protocol requires.
    pub fn raw_reader(&mut self, n: u64) -> io::Take<&mut BufReader<R>> {
        Read::take(&mut self.inner, n)
    }
}

/// Writes NUL-terminated JSON records and raw byte runs to a duplex stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: Write> FrameWriter<W> {
    /// Wraps `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Serializes `value` and writes it followed by a single `0x00` in one
    /// `write_all` call, so no other writer can interleave bytes mid-record.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<(), ProtocolError> {
        let mut buf = serde_json::to_vec(value)
            .map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
        buf.push(0u8);
        self.inner.write_all(&buf).map_err(ProtocolError::Transport)
    }

    /// Writes `data` as-is — used for a raw byte run's payload.
    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.inner.write_all(data).map_err(ProtocolError::Transport)
    }

    /// Copies exactly `n` bytes from `source` into the stream, in
    /// [`COPY_BUFFER_SIZE`] increments.
    pub fn write_exact_raw(
        &mut self,
        source: &mut impl Read,
        n: u64,
    ) -> Result<(), ProtocolError> {
        copy_exact(source, &mut self.inner, n)
    }

    /// Flushes the underlying stream.
    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.inner.flush().map_err(ProtocolError::Transport)
    }
}

/// Copies exactly `n` bytes from `source` to `sink` in bounded increments,
/// failing with [`ProtocolError::StreamTruncated`] on a short read.
pub fn copy_exact(
    source: &mut impl Read,
    sink: &mut impl Write,
    n: u64,
) -> Result<(), ProtocolError> {
    let mut remaining = n;
    let mut buf = [0u8; COPY_BUFFER_SIZE];

    while remaining > 0 {
        let want = remaining.min(COPY_BUFFER_SIZE as u64) as usize;
        let got = source
            .read(&mut buf[..want])
            .map_err(ProtocolError::Transport)?;
        if got == 0 {
            return Err(ProtocolError::StreamTruncated {
                expected: n,
                actual: n - remaining,
            });
        }
        sink.write_all(&buf[..got]).map_err(ProtocolError::Transport)?;
        remaining -= got as u64;
    }

    Ok(())
}

//! Pull loop moving a stored file to the network in fixed-size chunks.

use std::fmt;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// How a transfer ended.
#[derive(Debug)]
pub enum Outcome {
    /// Every byte was delivered.
    Success,
    /// A read or write failed and the transfer was aborted; the peer sees a
    /// truncated body.
    IoError(io::Error),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::IoError(err) => write!(f, "i/o error: {}", err),
        }
    }
}

/// The result of one [`stream_file`] run.
#[derive(Debug)]
pub struct Transfer {
    bytes: u64,
    reads: usize,
    elapsed: Duration,
    outcome: Outcome,
}

impl Transfer {
    /// Bytes written to the sink.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Number of chunk reads issued against the file.
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_millis(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
}

fn read_chunk<R: Read + ?Sized>(file: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match file.read(buf) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

/// Streams `file` into `sink`, `chunk_size` bytes at a time.
///
/// A read that returns fewer than `chunk_size` bytes marks the end of the
/// file; there is no separate end-of-file check. When `known_size` is given
/// and the first read already returns that many bytes, the loop stops after
/// a single write. One buffer of `chunk_size` bytes is reused for all chunks.
///
/// Any failure aborts immediately and is reported in the returned
/// [`Transfer`]; nothing is flushed after a failure.
pub fn stream_file<R, W>(file: &mut R, sink: &mut W, chunk_size: usize, known_size: Option<u64>) -> Transfer
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut bytes = 0u64;
    let mut reads = 0usize;

    let started = Instant::now();
    let result = (|| -> io::Result<()> {
        loop {
            let n = read_chunk(file, &mut buf)?;
            reads += 1;

            if n > 0 {
                sink.write_all(&buf[..n])?;
                bytes += n as u64;
            }

            let whole_file_at_once = reads == 1 && known_size == Some(n as u64);
            if n < buf.len() || whole_file_at_once {
                break;
            }
        }

        sink.flush()
    })();
    let elapsed = started.elapsed();

    let outcome = match result {
        Ok(()) => {
            debug!("streamed {} bytes in {} reads, {:?}", bytes, reads, elapsed);
            Outcome::Success
        }
        Err(err) => {
            warn!("stream aborted after {} bytes: {}", bytes, err);
            Outcome::IoError(err)
        }
    };

    Transfer {
        bytes,
        reads,
        elapsed,
        outcome,
    }
}

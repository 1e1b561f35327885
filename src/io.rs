// File-level I/O helpers for marker decompression.
//
// `decompress_file()` wraps the streaming decompressor with buffered file
// I/O. Optionally computes a streaming SHA-256 of the output (feature-gated
// behind `file-io`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;
use thiserror::Error;

use crate::decoder::{self, DecompressError, DecompressOptions, Termination};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `decompress_file()`.
#[derive(Debug, Clone)]
pub struct FileStats {
    /// Input file size in bytes.
    pub input_size: u64,
    /// Decompressed output size in bytes.
    pub output_size: u64,
    /// Number of markers expanded.
    pub markers: u64,
    /// Whether the input ended cleanly or mid-marker.
    pub termination: Termination,
    /// SHA-256 of the output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file I/O operations.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("decompress error: {0}")]
    Decompress(#[from] DecompressError),
}

// ---------------------------------------------------------------------------
// decompress_file
// ---------------------------------------------------------------------------

/// Decompress `input_path` into `output_path`.
///
/// The input is streamed through a `BufReader` sized by
/// `opts.buffer_size`; the output uses a `BufWriter` of the same size.
/// On a marker error the output file holds whatever was written before it.
pub fn decompress_file(
    input_path: &Path,
    output_path: &Path,
    opts: &DecompressOptions,
) -> Result<FileStats, IoError> {
    let input_file = File::open(input_path)?;
    let input_size = input_file.metadata()?.len();

    let output_file = File::create(output_path)?;
    let mut output_writer = BufWriter::with_capacity(opts.buffer_size.max(1), output_file);

    #[cfg(feature = "file-io")]
    let mut output_hasher = sha2::Sha256::new();

    #[cfg(feature = "file-io")]
    let result = {
        let mut hashing_writer = HashingWriter {
            inner: &mut output_writer,
            hasher: &mut output_hasher,
        };
        decoder::decompress(input_file, &mut hashing_writer, opts)
    };

    #[cfg(not(feature = "file-io"))]
    let result = decoder::decompress(input_file, &mut output_writer, opts);

    // Flush partial output before surfacing a decompress error.
    output_writer.flush()?;
    let stats = result?;

    #[cfg(feature = "file-io")]
    let output_sha256 = Some(output_hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    Ok(FileStats {
        input_size,
        output_size: stats.bytes_written,
        markers: stats.markers,
        termination: stats.termination,
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// Hashing writer (used with file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingWriter<'a, W: Write> {
    inner: &'a mut W,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Lowercase hex rendering of a digest.
pub fn hex_digest(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

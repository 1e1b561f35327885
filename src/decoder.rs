// Streaming marker decompressor.
//
// Decompressor drives an explicit state machine over a BufRead source:
//   - ReadingLiteral        copy bytes up to the next `(`, trimming the span
//   - ReadingMarkerBody     collect the body up to `)` and parse it
//   - ReadingRepeatedBlock  read exactly `len` bytes and write them `count` times
//   - Done                  end of input (clean or truncated)
//
// Output goes straight to the writer as each span resolves. The only bytes
// held in memory are one marker body, one repeated block, and any run of
// whitespace inside a literal that may still turn out to be trailing.
//
// End of input in the middle of a marker or block is not an error: the
// partial tail is written (trimmed) and the outcome is reported through
// `Termination`.

use std::io::{self, BufRead, BufReader, Read, Write};

use log::{debug, trace};
use thiserror::Error;

use crate::marker::{Marker, MarkerError};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Default read buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024; // 64 KiB

/// Default upper bound on a single repeated block.
pub const DEFAULT_MAX_BLOCK_LEN: usize = 64 * 1024 * 1024; // 64 MiB

/// Configuration for the decompressor.
#[derive(Debug, Clone)]
pub struct DecompressOptions {
    /// Capacity of the `BufReader` wrapped around the source.
    pub buffer_size: usize,
    /// Largest `len` a marker may request. The block is buffered in full so
    /// it can be replayed, which makes this the peak memory per marker.
    pub max_block_len: usize,
}

impl Default for DecompressOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_block_len: DEFAULT_MAX_BLOCK_LEN,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecompressError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid marker at input offset {offset}: {source}")]
    Marker {
        offset: u64,
        #[source]
        source: MarkerError,
    },

    #[error("marker at input offset {offset} repeats {len} bytes, limit is {max}")]
    BlockTooLarge { offset: u64, len: usize, max: usize },
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// How the input ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Input ended inside a literal span or right after a repeated block.
    Complete,
    /// Input ended after a `(` with no closing `)`.
    UnterminatedMarker,
    /// Input ended before a marker's block was fully read.
    TruncatedBlock,
}

impl Termination {
    /// True when the input stopped inside a marker or its block.
    pub fn is_truncated(self) -> bool {
        self != Self::Complete
    }

    /// Stable name used in logs and JSON stats.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::UnterminatedMarker => "unterminated-marker",
            Self::TruncatedBlock => "truncated-block",
        }
    }
}

/// Result of a finished decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompressStats {
    /// Bytes consumed from the source.
    pub bytes_in: u64,
    /// Bytes written to the sink.
    pub bytes_written: u64,
    /// Markers fully expanded.
    pub markers: u64,
    /// How the input ended.
    pub termination: Termination,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadingLiteral,
    /// `offset` is the input position of the opening `(`.
    ReadingMarkerBody { offset: u64 },
    ReadingRepeatedBlock { offset: u64, marker: Marker },
    Done(Termination),
}

/// Streaming decompressor over a buffered source.
///
/// Each instance handles one stream. After an error the instance should be
/// dropped; stepping it further resumes from wherever the source was left.
pub struct Decompressor<R: BufRead> {
    reader: R,
    state: State,
    max_block_len: usize,
    /// Reused for marker bodies and repeated blocks.
    scratch: Vec<u8>,
    bytes_in: u64,
    bytes_written: u64,
    markers: u64,
}

impl<R: BufRead> Decompressor<R> {
    /// Create a decompressor with the default block limit.
    pub fn new(reader: R) -> Self {
        Self::with_max_block_len(reader, DEFAULT_MAX_BLOCK_LEN)
    }

    pub fn with_max_block_len(reader: R, max_block_len: usize) -> Self {
        Self {
            reader,
            state: State::ReadingLiteral,
            max_block_len,
            scratch: Vec::new(),
            bytes_in: 0,
            bytes_written: 0,
            markers: 0,
        }
    }

    /// Run to the end of the input, writing everything to `writer`.
    pub fn decompress_to<W: Write>(
        &mut self,
        writer: &mut W,
    ) -> Result<DecompressStats, DecompressError> {
        loop {
            if let Some(termination) = self.step(writer)? {
                return Ok(self.stats(termination));
            }
        }
    }

    /// Perform one state transition.
    ///
    /// Returns `Some(termination)` once the input is exhausted; further
    /// calls keep returning the same value without touching the source.
    pub fn step<W: Write>(
        &mut self,
        writer: &mut W,
    ) -> Result<Option<Termination>, DecompressError> {
        let state = self.state;
        self.state = match state {
            State::ReadingLiteral => self.read_literal(writer)?,
            State::ReadingMarkerBody { offset } => self.read_marker_body(offset, writer)?,
            State::ReadingRepeatedBlock { offset, marker } => {
                self.read_repeated_block(offset, marker, writer)?
            }
            State::Done(termination) => return Ok(Some(termination)),
        };
        match self.state {
            State::Done(termination) => Ok(Some(termination)),
            _ => Ok(None),
        }
    }

    fn read_literal<W: Write>(&mut self, writer: &mut W) -> Result<State, DecompressError> {
        let mut span = TrimmedSpan::default();
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                trace!("literal span: {} bytes, end of input", span.written);
                return Ok(State::Done(Termination::Complete));
            }

            let open = buf.iter().position(|&b| b == b'(');
            let chunk = &buf[..open.unwrap_or(buf.len())];
            let consumed = chunk.len() + usize::from(open.is_some());
            self.bytes_written += span.push(writer, chunk)?;
            self.reader.consume(consumed);
            self.bytes_in += consumed as u64;

            if open.is_some() {
                trace!("literal span: {} bytes", span.written);
                return Ok(State::ReadingMarkerBody {
                    offset: self.bytes_in - 1,
                });
            }
        }
    }

    fn read_marker_body<W: Write>(
        &mut self,
        offset: u64,
        writer: &mut W,
    ) -> Result<State, DecompressError> {
        self.scratch.clear();
        let n = self.reader.read_until(b')', &mut self.scratch)?;
        self.bytes_in += n as u64;

        if self.scratch.last() != Some(&b')') {
            // No closing delimiter: flush the body read so far. The `(` was
            // consumed as the delimiter and is not written.
            let written = TrimmedSpan::default().push(writer, &self.scratch)?;
            self.bytes_written += written;
            debug!("unterminated marker at offset {offset}, flushed {written} bytes");
            return Ok(State::Done(Termination::UnterminatedMarker));
        }

        let body = &self.scratch[..self.scratch.len() - 1];
        let marker =
            Marker::parse_bytes(body).map_err(|source| DecompressError::Marker { offset, source })?;
        if marker.len > self.max_block_len {
            return Err(DecompressError::BlockTooLarge {
                offset,
                len: marker.len,
                max: self.max_block_len,
            });
        }
        Ok(State::ReadingRepeatedBlock { offset, marker })
    }

    fn read_repeated_block<W: Write>(
        &mut self,
        offset: u64,
        marker: Marker,
        writer: &mut W,
    ) -> Result<State, DecompressError> {
        self.scratch.clear();
        let n = self
            .reader
            .by_ref()
            .take(marker.len as u64)
            .read_to_end(&mut self.scratch)?;
        self.bytes_in += n as u64;

        if n < marker.len {
            let written = TrimmedSpan::default().push(writer, &self.scratch)?;
            self.bytes_written += written;
            debug!(
                "marker {marker} at offset {offset}: block truncated to {n} bytes, flushed {written}"
            );
            return Ok(State::Done(Termination::TruncatedBlock));
        }

        debug!("marker {marker} at offset {offset}");
        if !self.scratch.is_empty() {
            for _ in 0..marker.count {
                writer.write_all(&self.scratch)?;
            }
        }
        self.bytes_written = self
            .bytes_written
            .saturating_add(marker.expanded_len().unwrap_or(u64::MAX));
        self.markers += 1;
        Ok(State::ReadingLiteral)
    }

    fn stats(&self, termination: Termination) -> DecompressStats {
        DecompressStats {
            bytes_in: self.bytes_in,
            bytes_written: self.bytes_written,
            markers: self.markers,
            termination,
        }
    }

    /// Bytes consumed from the source so far.
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Bytes written to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Markers fully expanded so far.
    pub fn markers(&self) -> u64 {
        self.markers
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

// ---------------------------------------------------------------------------
// Literal trimming
// ---------------------------------------------------------------------------

fn is_trim_byte(b: &u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n')
}

/// Writes a span fed in pieces with leading and trailing space, tab and
/// newline removed. Interior whitespace runs are held back until a
/// non-whitespace byte follows them, so a run at the very end is never
/// written.
#[derive(Default)]
struct TrimmedSpan {
    started: bool,
    pending: Vec<u8>,
    written: u64,
}

impl TrimmedSpan {
    /// Returns the number of bytes written by this call.
    fn push<W: Write>(&mut self, writer: &mut W, mut chunk: &[u8]) -> io::Result<u64> {
        if !self.started {
            let lead = chunk.iter().take_while(|b| is_trim_byte(b)).count();
            chunk = &chunk[lead..];
            if chunk.is_empty() {
                return Ok(0);
            }
            self.started = true;
        }

        let tail = chunk.iter().rev().take_while(|b| is_trim_byte(b)).count();
        let body = &chunk[..chunk.len() - tail];
        let mut written = 0u64;
        if !body.is_empty() {
            writer.write_all(&self.pending)?;
            writer.write_all(body)?;
            written = (self.pending.len() + body.len()) as u64;
            self.pending.clear();
        }
        self.pending.extend_from_slice(&chunk[chunk.len() - tail..]);
        self.written += written;
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Decompress `source` into `sink`, buffering the source per `opts`.
pub fn decompress<R: Read, W: Write>(
    source: R,
    sink: &mut W,
    opts: &DecompressOptions,
) -> Result<DecompressStats, DecompressError> {
    let reader = BufReader::with_capacity(opts.buffer_size.max(1), source);
    Decompressor::with_max_block_len(reader, opts.max_block_len).decompress_to(sink)
}

/// Decompress an in-memory input.
pub fn decompress_all(input: &[u8]) -> Result<Vec<u8>, DecompressError> {
    let mut output = Vec::new();
    Decompressor::new(input).decompress_to(&mut output)?;
    Ok(output)
}

/// Length of the decompressed output, computed without keeping it.
pub fn decompressed_len<R: Read>(
    source: R,
    opts: &DecompressOptions,
) -> Result<DecompressStats, DecompressError> {
    decompress(source, &mut io::sink(), opts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> (String, DecompressStats) {
        let mut output = Vec::new();
        let stats = Decompressor::new(input.as_bytes())
            .decompress_to(&mut output)
            .unwrap();
        (String::from_utf8(output).unwrap(), stats)
    }

    #[test]
    fn known_scenarios() {
        let cases = [
            ("ADVENT", "ADVENT"),
            ("A(1x5)BC", "ABBBBBC"),
            ("(3x3)XYZ", "XYZXYZXYZ"),
            ("A(2x2)BCD(2x2)EFG", "ABCBCDEFEFG"),
            ("(6x1)(1x3)A", "(1x3)A"),
            ("X(8x2)(3x3)ABCY", "X(3x3)ABC(3x3)ABCY"),
        ];
        for (input, want) in cases {
            let (got, stats) = run(input);
            assert_eq!(got, want, "input {input:?}");
            assert_eq!(stats.bytes_written, got.len() as u64, "input {input:?}");
            assert_eq!(stats.bytes_in, input.len() as u64, "input {input:?}");
            assert_eq!(stats.termination, Termination::Complete);
        }
    }

    #[test]
    fn counts_markers() {
        let (_, stats) = run("A(2x2)BCD(2x2)EFG");
        assert_eq!(stats.markers, 2);
        let (_, stats) = run("(6x1)(1x3)A");
        assert_eq!(stats.markers, 1);
    }

    #[test]
    fn literal_spans_are_trimmed() {
        let (got, _) = run("  AB \n(1x2)C\t D \n");
        assert_eq!(got, "ABCCD");
        let (got, _) = run("(1x2)C x  y \n");
        assert_eq!(got, "CCx  y");
    }

    #[test]
    fn repeated_blocks_keep_whitespace() {
        let (got, stats) = run("(3x2) a ");
        assert_eq!(got, " a  a ");
        assert_eq!(stats.bytes_written, 6);
    }

    #[test]
    fn interior_whitespace_survives_small_buffers() {
        let input = "A   B      C(1x1)x";
        let reader = BufReader::with_capacity(2, input.as_bytes());
        let mut output = Vec::new();
        let stats = Decompressor::new(reader)
            .decompress_to(&mut output)
            .unwrap();
        assert_eq!(output, b"A   B      Cx");
        assert_eq!(stats.bytes_written, output.len() as u64);
    }

    #[test]
    fn zero_length_and_zero_count() {
        assert_eq!(run("A(0x5)B").0, "AB");
        assert_eq!(run("A(3x0)XYZB").0, "AB");
    }

    #[test]
    fn unterminated_marker_passes_through() {
        let (got, stats) = run("AB(6x1");
        assert_eq!(got, "AB6x1");
        assert_eq!(stats.termination, Termination::UnterminatedMarker);
        assert_eq!(stats.bytes_written, 5);

        let (got, stats) = run("AB( 6x1 ");
        assert_eq!(got, "AB6x1");
        assert_eq!(stats.bytes_written, 5);

        let (got, stats) = run("AB(");
        assert_eq!(got, "AB");
        assert_eq!(stats.termination, Termination::UnterminatedMarker);
    }

    #[test]
    fn truncated_block_flushes_partial_data() {
        let (got, stats) = run("A(5x3)XY\n");
        assert_eq!(got, "AXY");
        assert_eq!(stats.termination, Termination::TruncatedBlock);
        assert!(stats.termination.is_truncated());
        assert_eq!(stats.markers, 0);
    }

    #[test]
    fn malformed_marker_stops_after_prior_output() {
        let mut output = Vec::new();
        let err = Decompressor::new(&b"AB(1y2)CD"[..])
            .decompress_to(&mut output)
            .unwrap_err();
        match err {
            DecompressError::Marker { offset, source } => {
                assert_eq!(offset, 2);
                assert!(matches!(source, MarkerError::MissingSeparator { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(output, b"AB");
    }

    #[test]
    fn block_limit_is_enforced() {
        let mut output = Vec::new();
        let err = Decompressor::with_max_block_len(&b"(10x2)0123456789"[..], 4)
            .decompress_to(&mut output)
            .unwrap_err();
        assert!(matches!(
            err,
            DecompressError::BlockTooLarge {
                offset: 0,
                len: 10,
                max: 4
            }
        ));
    }

    #[test]
    fn step_reports_done_repeatedly() {
        let mut decoder = Decompressor::new(&b"(1x2)A"[..]);
        let mut output = Vec::new();
        let mut steps = 0;
        while decoder.step(&mut output).unwrap().is_none() {
            steps += 1;
        }
        // marker body, block, trailing literal
        assert_eq!(steps, 3);
        assert_eq!(
            decoder.step(&mut output).unwrap(),
            Some(Termination::Complete)
        );
        assert_eq!(output, b"AA");
        assert_eq!(decoder.bytes_written(), 2);
        assert_eq!(decoder.markers(), 1);
    }

    #[test]
    fn decompress_all_and_len_agree() {
        let input = b"X(8x2)(3x3)ABCY";
        let all = decompress_all(input).unwrap();
        let stats = decompressed_len(&input[..], &DecompressOptions::default()).unwrap();
        assert_eq!(stats.bytes_written, all.len() as u64);
    }

    #[test]
    fn empty_input() {
        let (got, stats) = run("");
        assert!(got.is_empty());
        assert_eq!(stats.bytes_written, 0);
        assert_eq!(stats.termination, Termination::Complete);
    }
}

//! Unrepeat: streaming decompression of `(LxN)` repetition-marker text.
//!
//! Input is literal text interleaved with markers such as `(3x2)`, meaning
//! "write the next 3 bytes twice". Repeated blocks are copied verbatim and
//! never re-scanned for markers.
//!
//! The crate provides:
//! - Marker body parsing (`marker`)
//! - The streaming decompressor (`decoder`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use unrepeat::decoder;
//!
//! let output = decoder::decompress_all(b"X(8x2)(3x3)ABCY").unwrap();
//! assert_eq!(output, b"X(3x3)ABC(3x3)ABCY");
//! ```

pub mod decoder;
pub mod io;
pub mod marker;

#[cfg(feature = "cli")]
pub mod cli;

pub use decoder::{
    DecompressError, DecompressOptions, DecompressStats, Decompressor, Termination, decompress,
};
pub use marker::{Marker, MarkerError};

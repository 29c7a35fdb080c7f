//! Self-describing, length-prefixed streaming envelope.
//!
//! Sessions stream structured records (nested maps, arrays and scalars,
//! possibly carrying large binary fields) as a sequence of raw chunks.
//! The encoder never needs the total size up front: every field carries
//! its own type tag and length.
//!
//! # Wire format
//!
//! ```text
//! value  := tag:u8 body
//!
//!   0x00  null
//!   0x01  false
//!   0x02  true
//!   0x03  int     [8 bytes BE: i64]
//!   0x04  float   [8 bytes BE: f64 bits]
//!   0x05  string  [4 bytes BE: len] [len bytes: UTF-8]
//!   0x06  bytes   [4 bytes BE: len] [len bytes: raw]
//!   0x07  array   [4 bytes BE: count] value*
//!   0x08  map     [4 bytes BE: count] ([4 bytes BE: key len] [key UTF-8] value)*
//! ```

mod decode;
mod encode;
mod value;

pub use decode::decode;
pub use encode::{StreamEncoder, encode_to_vec};
pub use value::Value;

/// Maximum nesting of arrays and maps accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

/// Default size of the chunks produced by [`StreamEncoder`] (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

pub(crate) mod tag {
    pub const NULL: u8 = 0x00;
    pub const FALSE: u8 = 0x01;
    pub const TRUE: u8 = 0x02;
    pub const INT: u8 = 0x03;
    pub const FLOAT: u8 = 0x04;
    pub const STRING: u8 = 0x05;
    pub const BYTES: u8 = 0x06;
    pub const ARRAY: u8 = 0x07;
    pub const MAP: u8 = 0x08;
}

/// Errors produced while decoding an envelope.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of stream at offset {offset} ({needed} more bytes needed)")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("unknown type tag 0x{tag:02x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),

    #[error("nesting deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("field of {0} bytes exceeds the 4 GiB length prefix")]
    FieldTooLarge(usize),

    #[error("empty stream")]
    Empty,
}

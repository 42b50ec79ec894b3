/// Errors produced while decoding a bencoded buffer.
///
/// All variants are non-fatal to the calling process: a malformed packet or
/// a malformed metadata piece is always just dropped and counted, never
/// allowed to take down a worker.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before a value finished decoding.
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    /// A type tag byte did not match `i`, `l`, `d`, or an ASCII digit.
    #[error("unknown type tag {tag:#04x} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    /// An integer or string-length used a leading zero, e.g. `i03e` or `03:abc`.
    #[error("illegal leading zero at offset {offset}")]
    LeadingZero { offset: usize },

    /// An integer used the illegal form `i-0e`.
    #[error("illegal negative zero at offset {offset}")]
    NegativeZero { offset: usize },

    /// A digit run did not parse as a valid base-10 integer.
    #[error("invalid integer literal at offset {offset}")]
    InvalidInteger { offset: usize },

    /// A byte-string length claimed more bytes than remain in the buffer.
    #[error("string of length {length} at offset {offset} overruns the buffer")]
    LengthOverrun { offset: usize, length: usize },

    /// A dictionary key was not terminated properly (this is a byte string,
    /// so `LengthOverrun` and `UnexpectedEof` cover most cases, but a
    /// non-string key tag is rejected separately).
    #[error("dictionary key at offset {offset} is not a byte string")]
    NonStringKey { offset: usize },

    /// A top-level decode left unconsumed bytes after the value.
    #[error("{trailing} byte(s) of trailing data after a valid top-level value")]
    TrailingData { trailing: usize },
}

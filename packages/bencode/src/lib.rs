//! Bencode encoding and decoding.
//!
//! Bencode is the binary dictionary format used throughout the `BitTorrent`
//! wire protocols: the Mainline DHT (BEP-5), the peer handshake extensions
//! (BEP-10) and the metadata exchange (BEP-9) all exchange bencoded
//! dictionaries.
//!
//! Four value shapes exist:
//!
//! - integers: `i<digits>e`
//! - byte strings: `<len>:<bytes>`
//! - lists: `l<value>*e`
//! - dictionaries: `d(<key><value>)*e`, keys are byte strings
//!
//! This crate models a decoded value as [`Value`], decodes with [`decode`]
//! (or [`decode_prefix`] when the caller only owns a prefix of a larger
//! buffer), and re-encodes deterministically with [`encode`]: dictionary
//! keys are always emitted in raw byte order, which is what makes two
//! independently-produced encodings of the same dictionary compare equal
//! and hash identically.
//!
//! Text pulled out of a decoded dictionary (a torrent's `name`, a file path
//! component) is never assumed to be UTF-8 by this crate: see
//! [`Value::decode_text`].

mod decode;
mod encode;
mod error;
mod value;

pub use decode::{decode, decode_prefix};
pub use encode::encode;
pub use error::DecodeError;
pub use value::Value;

//! BitTorrent peer wire handshake (BEP-3) and the BEP-10/BEP-9 extension
//! framing used to pull the `info` dictionary out of a single peer.
//!
//! The handshake and extended-handshake exchange use standard
//! length-prefixed BT message framing, decoded properly. Metadata piece
//! responses are read differently: see [`extract_piece_payload`].

use std::collections::BTreeMap;

use dht_crawler_bencode::{decode, decode_prefix, encode, DecodeError, Value};
use dht_crawler_primitives::InfoHash;

/// The fixed protocol name string every BT handshake starts with.
pub const PSTR: &[u8] = b"BitTorrent protocol";
/// Total handshake length: `1 + 19 + 8 + 20 + 20`.
pub const HANDSHAKE_LEN: usize = 68;
/// The reserved-bytes bit announcing BEP-10 extension protocol support.
const RESERVED: [u8; 8] = [0, 0, 0, 0, 0, 0x10, 0, 0];

/// The standard BT message id every extension message uses.
pub const EXTENDED_MESSAGE_ID: u8 = 20;
/// The extended-message id reserved for the extension handshake itself.
pub const EXTENDED_HANDSHAKE_ID: u8 = 0;
/// The id this crawler advertises for `ut_metadata` in its own handshake.
const OUR_UT_METADATA_ID: i64 = 1;
/// Metadata piece size, fixed by BEP-9.
pub const PIECE_LEN: usize = 16 * 1024;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("handshake too short: got {0} bytes, need {HANDSHAKE_LEN}")]
    ShortHandshake(usize),
    #[error("unexpected protocol name in handshake")]
    WrongProtocol,
    #[error("extended message shorter than its 2-byte header")]
    ShortExtendedMessage,
    #[error("peer sent an unexpected extended message id {0}, expected the handshake (0)")]
    UnexpectedExtendedMessage(u8),
    #[error("malformed bencode: {0}")]
    Decode(#[from] DecodeError),
    #[error("extended handshake is missing `m.ut_metadata`")]
    MissingUtMetadata,
    #[error("extended handshake is missing `metadata_size`")]
    MissingMetadataSize,
    #[error("metadata piece response shorter than the declared remaining size")]
    TruncatedPiece,
}

/// What a peer's extension handshake told us: the id *it* assigned to
/// `ut_metadata` (which we must use in every subsequent request) and the
/// declared total size of the `info` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedHandshake {
    pub ut_metadata_id: u8,
    pub metadata_size: usize,
}

/// Builds the 68-byte BT handshake, advertising BEP-10 support.
#[must_use]
pub fn build_handshake(info_hash: &InfoHash, peer_id: &[u8; 20]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HANDSHAKE_LEN);
    out.push(u8::try_from(PSTR.len()).expect("protocol name fits in a byte"));
    out.extend_from_slice(PSTR);
    out.extend_from_slice(&RESERVED);
    out.extend_from_slice(info_hash.as_bytes());
    out.extend_from_slice(peer_id);
    out
}

/// Validates a received 68-byte handshake's protocol name prefix.
pub fn parse_handshake(data: &[u8]) -> Result<(), Error> {
    if data.len() < HANDSHAKE_LEN {
        return Err(Error::ShortHandshake(data.len()));
    }
    let pstrlen = data[0] as usize;
    if pstrlen != PSTR.len() || &data[1..1 + PSTR.len()] != PSTR {
        return Err(Error::WrongProtocol);
    }
    Ok(())
}

fn dict_from(entries: Vec<(&str, Value)>) -> Value {
    let mut map = BTreeMap::new();
    for (key, value) in entries {
        map.insert(key.as_bytes().to_vec(), value);
    }
    Value::Dict(map)
}

/// Frames a BT message: 4-byte big-endian length, message id, extended id,
/// payload.
fn frame_extended_message(extended_id: u8, payload: &[u8]) -> Vec<u8> {
    let body_len = 2 + payload.len();
    let mut out = Vec::with_capacity(4 + body_len);
    out.extend_from_slice(&u32::try_from(body_len).unwrap_or(u32::MAX).to_be_bytes());
    out.push(EXTENDED_MESSAGE_ID);
    out.push(extended_id);
    out.extend_from_slice(payload);
    out
}

/// Builds our extension handshake: `d1:md11:ut_metadatai1eee`.
#[must_use]
pub fn build_extended_handshake() -> Vec<u8> {
    let m = dict_from(vec![("ut_metadata", Value::Int(OUR_UT_METADATA_ID))]);
    let payload = encode(&dict_from(vec![("m", m)]));
    frame_extended_message(EXTENDED_HANDSHAKE_ID, &payload)
}

/// Parses a peer's extension handshake from the framed message body
/// (message id and extended id already stripped off by the caller).
pub fn parse_extended_handshake(payload: &[u8]) -> Result<ExtendedHandshake, Error> {
    let value = decode(payload)?;

    let ut_metadata_id = value
        .get(b"m")
        .and_then(|m| m.get(b"ut_metadata"))
        .and_then(Value::as_int)
        .and_then(|id| u8::try_from(id).ok())
        .ok_or(Error::MissingUtMetadata)?;

    let metadata_size = value
        .get(b"metadata_size")
        .and_then(Value::as_int)
        .and_then(|size| usize::try_from(size).ok())
        .ok_or(Error::MissingMetadataSize)?;

    Ok(ExtendedHandshake { ut_metadata_id, metadata_size })
}

/// Strips the 2-byte extended-message header off a framed message, and
/// checks that it is the extension handshake (id 0).
pub fn split_extended_handshake_message(message: &[u8]) -> Result<&[u8], Error> {
    let (&_msg_id, rest) = message.split_first().ok_or(Error::ShortExtendedMessage)?;
    let (&extended_id, payload) = rest.split_first().ok_or(Error::ShortExtendedMessage)?;
    if extended_id != EXTENDED_HANDSHAKE_ID {
        return Err(Error::UnexpectedExtendedMessage(extended_id));
    }
    Ok(payload)
}

/// Builds a `ut_metadata` piece request, addressed to the peer's own
/// extension id for it.
#[must_use]
pub fn build_metadata_request(peer_ut_metadata_id: u8, piece: u32) -> Vec<u8> {
    let payload = encode(&dict_from(vec![
        ("msg_type", Value::Int(0)),
        ("piece", Value::Int(i64::from(piece))),
    ]));
    frame_extended_message(peer_ut_metadata_id, &payload)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Extracts the raw piece bytes from a metadata piece response.
///
/// Primary path: scan for the first `ee` byte pair (the nested closes of
/// the response dict's trailing integer field and the dict itself) and
/// take everything after it. This can misfire if the header dict ever
/// contains a nested structure ending in `ee` before its real close, but
/// it is kept as the documented primary behavior. When no `ee` is found
/// at all, fall back to properly bdecoding the leading dict and taking
/// the tail that follows it.
pub fn extract_piece_payload(data: &[u8], expected_len: usize) -> Result<Vec<u8>, Error> {
    if let Some(position) = find_subsequence(data, b"ee") {
        let tail = &data[position + 2..];
        if tail.len() >= expected_len {
            return Ok(tail[..expected_len].to_vec());
        }
    }

    let (_, consumed) = decode_prefix(data)?;
    let tail = &data[consumed..];
    if tail.len() < expected_len {
        return Err(Error::TruncatedPiece);
    }
    Ok(tail[..expected_len].to_vec())
}

use std::collections::BTreeMap;

use crate::error::DecodeError;
use crate::value::Value;

/// Decodes a single top-level bencode value from `input`.
///
/// Fails with [`DecodeError::TrailingData`] if any bytes remain after the
/// value, which is what distinguishes this from [`decode_prefix`].
pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
    let (value, consumed) = decode_prefix(input)?;
    if consumed != input.len() {
        return Err(DecodeError::TrailingData {
            trailing: input.len() - consumed,
        });
    }
    Ok(value)
}

/// Decodes a single bencode value starting at the beginning of `input`,
/// returning the value and the number of bytes it consumed. Unlike
/// [`decode`], trailing bytes after the value are not an error: this is
/// what lets a caller decode a dict embedded at the front of a larger
/// frame (for example a BEP-9 extension message that appends raw piece
/// bytes after the bencoded header).
pub fn decode_prefix(input: &[u8]) -> Result<(Value, usize), DecodeError> {
    decode_at(input, 0)
}

fn decode_at(x: &[u8], f: usize) -> Result<(Value, usize), DecodeError> {
    let tag = *x.get(f).ok_or(DecodeError::UnexpectedEof { offset: f })?;
    match tag {
        b'i' => decode_int(x, f),
        b'l' => decode_list(x, f),
        b'd' => decode_dict(x, f),
        b'0'..=b'9' => decode_bytes(x, f).map(|(b, next)| (Value::Bytes(b), next)),
        other => Err(DecodeError::UnknownTag { tag: other, offset: f }),
    }
}

fn decode_int(x: &[u8], f: usize) -> Result<(Value, usize), DecodeError> {
    let start = f + 1;
    let end = find(x, b'e', start).ok_or(DecodeError::UnexpectedEof { offset: start })?;

    let digits = &x[start..end];
    if digits.is_empty() {
        return Err(DecodeError::InvalidInteger { offset: start });
    }

    if digits[0] == b'-' {
        if digits.get(1) == Some(&b'0') {
            return Err(DecodeError::NegativeZero { offset: start });
        }
    } else if digits[0] == b'0' && digits.len() != 1 {
        return Err(DecodeError::LeadingZero { offset: start });
    }

    let text = std::str::from_utf8(digits).map_err(|_| DecodeError::InvalidInteger { offset: start })?;
    let n: i64 = text.parse().map_err(|_| DecodeError::InvalidInteger { offset: start })?;

    Ok((Value::Int(n), end + 1))
}

fn decode_bytes(x: &[u8], f: usize) -> Result<(Vec<u8>, usize), DecodeError> {
    let colon = find(x, b':', f).ok_or(DecodeError::UnexpectedEof { offset: f })?;

    let digits = &x[f..colon];
    if digits.is_empty() {
        return Err(DecodeError::InvalidInteger { offset: f });
    }
    if digits[0] == b'0' && digits.len() != 1 {
        return Err(DecodeError::LeadingZero { offset: f });
    }

    let text = std::str::from_utf8(digits).map_err(|_| DecodeError::InvalidInteger { offset: f })?;
    let len: usize = text.parse().map_err(|_| DecodeError::InvalidInteger { offset: f })?;

    let start = colon + 1;
    let end = start
        .checked_add(len)
        .ok_or(DecodeError::LengthOverrun { offset: f, length: len })?;
    if end > x.len() {
        return Err(DecodeError::LengthOverrun { offset: f, length: len });
    }

    Ok((x[start..end].to_vec(), end))
}

fn decode_list(x: &[u8], f: usize) -> Result<(Value, usize), DecodeError> {
    let mut items = Vec::new();
    let mut pos = f + 1;
    loop {
        match x.get(pos) {
            None => return Err(DecodeError::UnexpectedEof { offset: pos }),
            Some(b'e') => return Ok((Value::List(items), pos + 1)),
            Some(_) => {
                let (value, next) = decode_at(x, pos)?;
                items.push(value);
                pos = next;
            }
        }
    }
}

fn decode_dict(x: &[u8], f: usize) -> Result<(Value, usize), DecodeError> {
    let mut map = BTreeMap::new();
    let mut pos = f + 1;
    loop {
        match x.get(pos) {
            None => return Err(DecodeError::UnexpectedEof { offset: pos }),
            Some(b'e') => return Ok((Value::Dict(map), pos + 1)),
            Some(b'0'..=b'9') => {
                let (key, next) = decode_bytes(x, pos)?;
                let (value, next) = decode_at(x, next)?;
                map.insert(key, value);
                pos = next;
            }
            Some(_) => return Err(DecodeError::NonStringKey { offset: pos }),
        }
    }
}

fn find(x: &[u8], needle: u8, from: usize) -> Option<usize> {
    x[from..].iter().position(|&b| b == needle).map(|i| i + from)
}

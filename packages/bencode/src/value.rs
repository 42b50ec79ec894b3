use std::borrow::Cow;
use std::collections::BTreeMap;

/// A decoded bencode value.
///
/// Dictionary storage is a `BTreeMap<Vec<u8>, Value>`. `Vec<u8>`'s `Ord`
/// implementation is lexicographic over raw bytes, which is exactly the
/// ordering bencode's canonical form requires, so iterating a `Dict` for
/// re-encoding never needs a separate sort step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up `key` in a `Dict` value. Returns `None` for any other shape.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    /// Decodes a byte string for display, trying UTF-8, then the two
    /// East-Asian legacy encodings most commonly seen in torrent names in
    /// the wild (GBK, Big5), and finally falling back to lossy UTF-8.
    ///
    /// Bencode byte strings carry no declared encoding; the codec layer
    /// must never assume UTF-8 when turning them into display text.
    #[must_use]
    pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return Cow::Borrowed(s);
        }

        let (gbk, _, had_errors) = encoding_rs::GBK.decode(bytes);
        if !had_errors {
            return Cow::Owned(gbk.into_owned());
        }

        let (big5, _, had_errors) = encoding_rs::BIG5.decode(bytes);
        if !had_errors {
            return Cow::Owned(big5.into_owned());
        }

        Cow::Owned(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Bytes(s.as_bytes().to_vec())
    }
}

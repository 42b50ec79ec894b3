//! The 20-byte `SHA-1` info-hash that identifies a torrent's content.

use std::panic::Location;

/// Number of bytes in a `BitTorrent` v1 info-hash.
pub const INFO_HASH_BYTES_LEN: usize = 20;

/// `BitTorrent` info-hash: the `SHA-1` digest of the bencoded `info` dictionary.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug, Default, PartialOrd, Ord)]
pub struct InfoHash(pub [u8; INFO_HASH_BYTES_LEN]);

impl InfoHash {
    #[must_use]
    pub fn bytes(&self) -> [u8; INFO_HASH_BYTES_LEN] {
        self.0
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; INFO_HASH_BYTES_LEN] {
        &self.0
    }

    #[must_use]
    pub fn to_hex_string(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; INFO_HASH_BYTES_LEN]> for InfoHash {
    fn from(bytes: [u8; INFO_HASH_BYTES_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

/// Errors converting a byte slice into an [`InfoHash`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum ConversionError {
    #[error("not enough bytes for an info-hash: got {len}, expected {INFO_HASH_BYTES_LEN}, {location}")]
    NotEnoughBytes { len: usize, location: &'static Location<'static> },

    #[error("too many bytes for an info-hash: got {len}, expected {INFO_HASH_BYTES_LEN}, {location}")]
    TooManyBytes { len: usize, location: &'static Location<'static> },

    #[error("invalid hex info-hash string: {message}, {location}")]
    InvalidHex { message: String, location: &'static Location<'static> },
}

impl TryFrom<&[u8]> for InfoHash {
    type Error = ConversionError;

    #[track_caller]
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() < INFO_HASH_BYTES_LEN {
            return Err(ConversionError::NotEnoughBytes {
                len: bytes.len(),
                location: Location::caller(),
            });
        }
        if bytes.len() > INFO_HASH_BYTES_LEN {
            return Err(ConversionError::TooManyBytes {
                len: bytes.len(),
                location: Location::caller(),
            });
        }
        let mut data = [0u8; INFO_HASH_BYTES_LEN];
        data.copy_from_slice(bytes);
        Ok(Self(data))
    }
}

impl std::str::FromStr for InfoHash {
    type Err = ConversionError;

    #[track_caller]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut data = [0u8; INFO_HASH_BYTES_LEN];
        hex::decode_to_slice(s, &mut data).map_err(|err| ConversionError::InvalidHex {
            message: err.to_string(),
            location: Location::caller(),
        })?;
        Ok(Self(data))
    }
}

impl serde::ser::Serialize for InfoHash {
    fn serialize<S: serde::ser::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex_string())
    }
}

impl<'de> serde::de::Deserialize<'de> for InfoHash {
    fn deserialize<D: serde::de::Deserializer<'de>>(des: D) -> Result<Self, D::Error> {
        let s = String::deserialize(des)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn displays_as_lowercase_hex() {
        let hash = InfoHash([0xabu8; 20]);
        assert_eq!(hash.to_string(), "ab".repeat(20));
    }

    #[test]
    fn round_trips_through_hex_string() {
        let hash = InfoHash([0x42u8; 20]);
        let parsed = InfoHash::from_str(&hash.to_hex_string()).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn rejects_short_byte_slices() {
        let bytes = [0u8; 10];
        assert!(InfoHash::try_from(bytes.as_slice()).is_err());
    }
}

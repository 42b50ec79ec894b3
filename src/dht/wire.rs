//! KRPC message framing for the Mainline DHT wire protocol (BEP-5).
//!
//! Every message is a bencoded dict with `t` (transaction id), `y` (message
//! class: `q` query, `r` response, `e` error), and the class-specific
//! payload. This module only understands the four queries the crawler
//! issues and answers: `ping`, `find_node`, `get_peers`, `announce_peer`.
//!
//! A response's payload is interpreted field-by-field rather than by the
//! query it supposedly answers: a `nodes` list and a `values` list are
//! handled independently wherever they appear, mirroring the reference
//! crawler this was ported from, which never correlates a response back
//! to the query that produced it except to recover a `get_peers` info-hash
//! through the transaction table.

use std::collections::BTreeMap;

use dht_crawler_bencode::{decode, encode, Value};
use dht_crawler_primitives::info_hash::InfoHash;
use dht_crawler_primitives::node_id::NodeId;

/// A decoded incoming KRPC query, with its sender's claimed node ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Ping,
    FindNode { target: [u8; 20] },
    GetPeers { info_hash: InfoHash },
    AnnouncePeer {
        info_hash: InfoHash,
        port: u16,
        token: Vec<u8>,
        implied_port: bool,
    },
}

/// A decoded incoming KRPC response. Any subset of `token`/`nodes`/`values`
/// may be populated; all three are read independently.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reply {
    pub id: Option<NodeId>,
    pub token: Option<Vec<u8>>,
    pub nodes: Vec<u8>,
    pub values: Vec<Vec<u8>>,
}

/// A fully decoded incoming KRPC packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Query {
        transaction_id: Vec<u8>,
        sender_id: NodeId,
        query: Query,
    },
    Reply {
        transaction_id: Vec<u8>,
        reply: Reply,
    },
    Error {
        transaction_id: Vec<u8>,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed bencode: {0}")]
    Decode(#[from] dht_crawler_bencode::DecodeError),
    #[error("top-level value is not a dict")]
    NotADict,
    #[error("missing or malformed field `{0}`")]
    MissingField(&'static str),
    #[error("unknown message class `y`")]
    UnknownClass,
    #[error("unsupported query `{0}`")]
    UnsupportedQuery(String),
}

fn bytes<'a>(dict: &'a BTreeMap<Vec<u8>, Value>, key: &str) -> Option<&'a [u8]> {
    dict.get(key.as_bytes())?.as_bytes()
}

fn int(dict: &BTreeMap<Vec<u8>, Value>, key: &str) -> Option<i64> {
    dict.get(key.as_bytes())?.as_int()
}

fn node_id(dict: &BTreeMap<Vec<u8>, Value>) -> Result<NodeId, Error> {
    let id = bytes(dict, "id").ok_or(Error::MissingField("id"))?;
    let id: [u8; 20] = id.try_into().map_err(|_| Error::MissingField("id"))?;
    Ok(NodeId(id))
}

/// Decodes a raw UDP datagram into a [`Message`].
pub fn decode_message(datagram: &[u8]) -> Result<Message, Error> {
    let value = decode(datagram)?;
    let dict = value.as_dict().ok_or(Error::NotADict)?;

    let transaction_id = bytes(dict, "t").ok_or(Error::MissingField("t"))?.to_vec();
    let class = bytes(dict, "y").ok_or(Error::MissingField("y"))?;

    match class {
        b"q" => decode_query(dict, transaction_id),
        b"r" => decode_reply(dict, transaction_id),
        b"e" => Ok(Message::Error { transaction_id }),
        _ => Err(Error::UnknownClass),
    }
}

fn decode_query(dict: &BTreeMap<Vec<u8>, Value>, transaction_id: Vec<u8>) -> Result<Message, Error> {
    let name = bytes(dict, "q").ok_or(Error::MissingField("q"))?;
    let args = dict.get(b"a".as_slice()).and_then(Value::as_dict).ok_or(Error::MissingField("a"))?;
    let sender_id = node_id(args)?;

    let query = match name {
        b"ping" => Query::Ping,
        b"find_node" => {
            let target = bytes(args, "target").ok_or(Error::MissingField("target"))?;
            let target: [u8; 20] = target.try_into().map_err(|_| Error::MissingField("target"))?;
            Query::FindNode { target }
        }
        b"get_peers" => {
            let info_hash = bytes(args, "info_hash").ok_or(Error::MissingField("info_hash"))?;
            let info_hash = InfoHash::try_from(info_hash).map_err(|_| Error::MissingField("info_hash"))?;
            Query::GetPeers { info_hash }
        }
        b"announce_peer" => {
            let info_hash = bytes(args, "info_hash").ok_or(Error::MissingField("info_hash"))?;
            let info_hash = InfoHash::try_from(info_hash).map_err(|_| Error::MissingField("info_hash"))?;
            let port = int(args, "port").ok_or(Error::MissingField("port"))?;
            let token = bytes(args, "token").ok_or(Error::MissingField("token"))?.to_vec();
            let implied_port = int(args, "implied_port").unwrap_or(0) != 0;
            Query::AnnouncePeer {
                info_hash,
                port: u16::try_from(port).unwrap_or(0),
                token,
                implied_port,
            }
        }
        other => return Err(Error::UnsupportedQuery(String::from_utf8_lossy(other).into_owned())),
    };

    Ok(Message::Query {
        transaction_id,
        sender_id,
        query,
    })
}

fn decode_reply(dict: &BTreeMap<Vec<u8>, Value>, transaction_id: Vec<u8>) -> Result<Message, Error> {
    let r = dict.get(b"r".as_slice()).and_then(Value::as_dict).ok_or(Error::MissingField("r"))?;

    let id = bytes(r, "id")
        .and_then(|bytes| <[u8; 20]>::try_from(bytes).ok())
        .map(NodeId);

    let values = r
        .get(b"values".as_slice())
        .and_then(Value::as_list)
        .map(|list| list.iter().filter_map(Value::as_bytes).map(<[u8]>::to_vec).collect())
        .unwrap_or_default();

    let nodes = bytes(r, "nodes").unwrap_or_default().to_vec();
    let token = bytes(r, "token").map(<[u8]>::to_vec);

    Ok(Message::Reply {
        transaction_id,
        reply: Reply { id, token, nodes, values },
    })
}

fn dict_from(entries: Vec<(&str, Value)>) -> Value {
    let mut map = BTreeMap::new();
    for (key, value) in entries {
        map.insert(key.as_bytes().to_vec(), value);
    }
    Value::Dict(map)
}

/// Encodes an outgoing query.
#[must_use]
pub fn encode_query(transaction_id: &[u8], sender_id: &NodeId, query: &Query) -> Vec<u8> {
    let (name, mut args) = match query {
        Query::Ping => ("ping", vec![]),
        Query::FindNode { target } => ("find_node", vec![("target", Value::Bytes(target.to_vec()))]),
        Query::GetPeers { info_hash } => (
            "get_peers",
            vec![("info_hash", Value::Bytes(info_hash.bytes().to_vec()))],
        ),
        Query::AnnouncePeer {
            info_hash,
            port,
            token,
            implied_port,
        } => (
            "announce_peer",
            vec![
                ("info_hash", Value::Bytes(info_hash.bytes().to_vec())),
                ("port", Value::Int(i64::from(*port))),
                ("token", Value::Bytes(token.clone())),
                ("implied_port", Value::Int(i64::from(*implied_port))),
            ],
        ),
    };
    args.push(("id", Value::Bytes(sender_id.bytes().to_vec())));

    let message = dict_from(vec![
        ("t", Value::Bytes(transaction_id.to_vec())),
        ("y", Value::Bytes(b"q".to_vec())),
        ("q", Value::Bytes(name.as_bytes().to_vec())),
        ("a", dict_from(args)),
    ]);

    encode(&message)
}

/// Encodes an outgoing reply. `nodes` is sent empty (as an explicit choice,
/// see module docs on the DHT server) unless the caller supplies one.
#[must_use]
pub fn encode_reply(transaction_id: &[u8], sender_id: &NodeId, token: Option<&[u8]>, nodes: &[u8]) -> Vec<u8> {
    let mut fields = vec![("id", Value::Bytes(sender_id.bytes().to_vec()))];

    if let Some(token) = token {
        fields.push(("token", Value::Bytes(token.to_vec())));
    }
    fields.push(("nodes", Value::Bytes(nodes.to_vec())));

    let message = dict_from(vec![
        ("t", Value::Bytes(transaction_id.to_vec())),
        ("y", Value::Bytes(b"r".to_vec())),
        ("r", dict_from(fields)),
    ]);

    encode(&message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_ping_query() {
        let sender = NodeId([7u8; 20]);
        let encoded = encode_query(b"aa", &sender, &Query::Ping);
        let decoded = decode_message(&encoded).unwrap();
        assert_eq!(
            decoded,
            Message::Query {
                transaction_id: b"aa".to_vec(),
                sender_id: sender,
                query: Query::Ping,
            }
        );
    }

    #[test]
    fn round_trips_a_find_node_query() {
        let sender = NodeId([1u8; 20]);
        let target = [9u8; 20];
        let encoded = encode_query(b"bb", &sender, &Query::FindNode { target });
        let decoded = decode_message(&encoded).unwrap();
        assert_eq!(
            decoded,
            Message::Query {
                transaction_id: b"bb".to_vec(),
                sender_id: sender,
                query: Query::FindNode { target },
            }
        );
    }

    #[test]
    fn round_trips_an_announce_peer_query_with_implied_port() {
        let sender = NodeId([2u8; 20]);
        let info_hash = InfoHash::from([3u8; 20]);
        let query = Query::AnnouncePeer {
            info_hash,
            port: 6881,
            token: vec![0xab, 0xcd],
            implied_port: true,
        };
        let encoded = encode_query(b"cc", &sender, &query);
        let decoded = decode_message(&encoded).unwrap();
        assert_eq!(
            decoded,
            Message::Query {
                transaction_id: b"cc".to_vec(),
                sender_id: sender,
                query,
            }
        );
    }

    #[test]
    fn round_trips_a_get_peers_reply_carrying_values() {
        let id = NodeId([4u8; 20]);
        let encoded = encode_reply(b"dd", &id, Some(&[1, 2]), b"");
        let Message::Reply { reply, .. } = decode_message(&encoded).unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.id, Some(id));
        assert_eq!(reply.token, Some(vec![1, 2]));
        assert!(reply.values.is_empty());
    }

    #[test]
    fn decodes_a_values_list_from_a_raw_response() {
        let mut r = BTreeMap::new();
        r.insert(b"id".to_vec(), Value::Bytes(vec![9u8; 20]));
        r.insert(
            b"values".to_vec(),
            Value::List(vec![Value::Bytes(vec![203, 0, 113, 7, 0x1a, 0xe1])]),
        );
        let message = dict_from(vec![
            ("t", Value::Bytes(b"zz".to_vec())),
            ("y", Value::Bytes(b"r".to_vec())),
            ("r", Value::Dict(r)),
        ]);
        let Message::Reply { reply, .. } = decode_message(&encode(&message)).unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.values, vec![vec![203, 0, 113, 7, 0x1a, 0xe1]]);
    }

    #[test]
    fn decodes_an_error_message() {
        let encoded = encode(&dict_from(vec![
            ("t", Value::Bytes(b"ee".to_vec())),
            ("y", Value::Bytes(b"e".to_vec())),
            ("e", Value::List(vec![Value::Int(201), Value::from("generic error")])),
        ]));
        let decoded = decode_message(&encoded).unwrap();
        assert_eq!(
            decoded,
            Message::Error {
                transaction_id: b"ee".to_vec()
            }
        );
    }

    #[test]
    fn rejects_truncated_packets() {
        assert!(decode_message(b"d1:t").is_err());
    }
}

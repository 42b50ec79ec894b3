//! The metadata fetcher pool: the only TCP client in the crawler.
//!
//! Each worker pulls the highest-priority [`FetchTask`] off the router's
//! queue and runs the bounded seven-step exchange described in the purpose
//! specification §4.4 against a single peer, bounded end-to-end by a single
//! [`tokio::time::timeout`].

pub mod wire;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use dht_crawler_primitives::InfoHash;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{info, trace};

use crate::blacklist::Blacklist;
use crate::router::{FetchTask, MetadataQueue};
use crate::sink::Sink;
use crate::stats::{Event, StatsSender};

/// How long to wait for more bytes on a piece response before deciding the
/// peer has gone quiet and the response is complete.
const PIECE_QUIET_WINDOW: Duration = Duration::from_millis(500);

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("exceeded the overall fetch timeout")]
    TimedOut,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire protocol error: {0}")]
    Wire(#[from] wire::Error),
    #[error("metadata hash does not match the announced info-hash")]
    HashMismatch,
    #[error("the assembled metadata is not a valid bencoded dictionary: {0}")]
    Decode(#[from] dht_crawler_bencode::DecodeError),
}

/// Runs the full protocol exchange against `task.ip:task.target_port`,
/// bounded end-to-end by `timeout_duration`. Returns the raw bencoded
/// `info` dictionary bytes on success.
pub async fn fetch(task: FetchTask, timeout_duration: Duration, stats: &StatsSender) -> Result<Vec<u8>, Error> {
    match timeout(timeout_duration, fetch_inner(task, stats)).await {
        Ok(result) => result,
        Err(_) => Err(Error::TimedOut),
    }
}

async fn fetch_inner(task: FetchTask, stats: &StatsSender) -> Result<Vec<u8>, Error> {
    let address = SocketAddr::new(IpAddr::V4(task.ip), task.target_port);
    let mut stream = TcpStream::connect(address).await.map_err(Error::Connect)?;
    stats.send(Event::FetchConnected);

    let peer_id = random_peer_id();
    stream.write_all(&wire::build_handshake(&task.info_hash, &peer_id)).await?;

    let mut handshake_reply = [0u8; wire::HANDSHAKE_LEN];
    stream.read_exact(&mut handshake_reply).await?;
    wire::parse_handshake(&handshake_reply)?;
    stats.send(Event::FetchHandshaken);

    stream.write_all(&wire::build_extended_handshake()).await?;
    let message = read_bt_message(&mut stream).await?;
    let payload = wire::split_extended_handshake_message(&message)?;
    let handshake = wire::parse_extended_handshake(payload)?;

    let metadata = download_metadata(&mut stream, &handshake).await?;
    verify(&task.info_hash, &metadata)?;
    Ok(metadata)
}

async fn read_bt_message(stream: &mut TcpStream) -> Result<Vec<u8>, Error> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

async fn download_metadata(stream: &mut TcpStream, handshake: &wire::ExtendedHandshake) -> Result<Vec<u8>, Error> {
    let piece_count = (handshake.metadata_size + wire::PIECE_LEN - 1) / wire::PIECE_LEN;
    let mut collected = Vec::with_capacity(handshake.metadata_size);

    for piece in 0..piece_count {
        let piece_index = u32::try_from(piece).unwrap_or(u32::MAX);
        let request = wire::build_metadata_request(handshake.ut_metadata_id, piece_index);
        stream.write_all(&request).await?;

        let raw = read_until_quiet(stream).await?;
        let remaining = handshake.metadata_size - collected.len();
        let expected_len = remaining.min(wire::PIECE_LEN);
        collected.extend_from_slice(&wire::extract_piece_payload(&raw, expected_len)?);
    }

    Ok(collected)
}

/// Reads raw bytes until the peer stops sending for [`PIECE_QUIET_WINDOW`].
/// Matches the reference crawler, which never parses a piece response's own
/// BT framing and instead treats a lull in the stream as "response done".
async fn read_until_quiet(stream: &mut TcpStream) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match timeout(PIECE_QUIET_WINDOW, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => return Ok(buf),
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(err)) => return Err(Error::Io(err)),
            Err(_) if buf.is_empty() => continue,
            Err(_) => return Ok(buf),
        }
    }
}

fn verify(info_hash: &InfoHash, metadata: &[u8]) -> Result<(), Error> {
    let mut hasher = Sha1::new();
    hasher.update(metadata);
    let digest: [u8; 20] = hasher.finalize().into();
    if digest != info_hash.bytes() {
        return Err(Error::HashMismatch);
    }
    dht_crawler_bencode::decode(metadata)?;
    Ok(())
}

fn random_peer_id() -> [u8; 20] {
    let mut id = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut id);
    id
}

/// Renders a verified `info` dict as `"<name> (<size> bytes)"` for the
/// per-fetch log line. Falls back to a generic description if the metadata
/// somehow fails to bdecode a second time (it was already verified to
/// decode in [`verify`], so this is defensive only).
fn describe(metadata: &[u8]) -> String {
    use dht_crawler_bencode::Value;

    let Ok(info) = dht_crawler_bencode::decode(metadata) else {
        return format!("<undecodable> ({} bytes)", metadata.len());
    };

    let name = info
        .get(b"name")
        .and_then(Value::as_bytes)
        .map(|bytes| Value::decode_text(bytes).into_owned())
        .unwrap_or_else(|| "<unnamed>".to_string());

    let size = info
        .get(b"length")
        .and_then(Value::as_int)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or_else(|| sum_file_lengths(info.get(b"files")));

    format!("{name} ({size} bytes)")
}

fn sum_file_lengths(files: Option<&dht_crawler_bencode::Value>) -> u64 {
    use dht_crawler_bencode::Value;

    let Some(files) = files.and_then(Value::as_list) else {
        return 0;
    };
    files
        .iter()
        .filter_map(Value::as_dict)
        .filter_map(|file| file.get(b"length".as_slice()))
        .filter_map(Value::as_int)
        .filter_map(|n| u64::try_from(n).ok())
        .sum()
}

/// One worker's main loop: pulls tasks off the shared queue until every
/// producer has dropped, then returns.
pub async fn run_worker(
    queue: Arc<Mutex<MetadataQueue>>,
    blacklist: Arc<Blacklist>,
    stats: StatsSender,
    timeout_duration: Duration,
    sink: Arc<dyn Sink>,
) {
    loop {
        let task = { queue.lock().await.recv().await };
        let Some(task) = task else {
            return;
        };
        process_task(task, &blacklist, &stats, timeout_duration, sink.as_ref()).await;
    }
}

async fn process_task(task: FetchTask, blacklist: &Blacklist, stats: &StatsSender, timeout_duration: Duration, sink: &dyn Sink) {
    if !blacklist.admit(task.ip).await {
        return;
    }
    stats.send(Event::FetchAttempted);

    match fetch(task, timeout_duration, stats).await {
        Ok(metadata) => {
            blacklist.clear(task.ip).await;
            stats.send(Event::FetchVerified);
            info!(target: "metadata_fetcher", "[+] Found: {} | Hash: {}", describe(&metadata), task.info_hash);
            sink.accept(task.info_hash, metadata, task.ip).await;
        }
        Err(err) => {
            trace!(target: "metadata_fetcher", %err, ip = %task.ip, "metadata fetch failed");
            blacklist.record_failure(task.ip).await;
            stats.send(Event::FetchFailed);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use dht_crawler_bencode::{encode, Value};
    use tokio::net::TcpListener;

    use super::*;
    use crate::stats::Keeper;

    fn info_dict_bytes(name: &str, length: i64) -> Vec<u8> {
        let mut map = std::collections::BTreeMap::new();
        map.insert(b"name".to_vec(), Value::from(name));
        map.insert(b"length".to_vec(), Value::Int(length));
        encode(&Value::Dict(map))
    }

    #[tokio::test]
    async fn fetches_and_verifies_a_single_piece_torrent() {
        let metadata = info_dict_bytes("example.iso", 12345);
        let info_hash = {
            let mut hasher = Sha1::new();
            hasher.update(&metadata);
            InfoHash(hasher.finalize().into())
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_metadata = metadata.clone();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut handshake = [0u8; wire::HANDSHAKE_LEN];
            socket.read_exact(&mut handshake).await.unwrap();
            socket
                .write_all(&wire::build_handshake(&InfoHash([0u8; 20]), &[1u8; 20]))
                .await
                .unwrap();

            let ext_handshake = read_bt_message(&mut socket).await.unwrap();
            wire::split_extended_handshake_message(&ext_handshake).unwrap();

            let response_payload = encode(&Value::Dict({
                let mut d = std::collections::BTreeMap::new();
                d.insert(b"metadata_size".to_vec(), Value::Int(server_metadata.len() as i64));
                let m = Value::Dict({
                    let mut m = std::collections::BTreeMap::new();
                    m.insert(b"ut_metadata".to_vec(), Value::Int(1));
                    m
                });
                d.insert(b"m".to_vec(), m);
                d
            }));
            let mut message = vec![wire::EXTENDED_MESSAGE_ID, wire::EXTENDED_HANDSHAKE_ID];
            message.extend_from_slice(&response_payload);
            socket.write_all(&(message.len() as u32).to_be_bytes()).await.unwrap();
            socket.write_all(&message).await.unwrap();

            // a single piece request is expected; reply with the header
            // dict followed immediately by the raw metadata bytes
            let mut request_len_buf = [0u8; 4];
            socket.read_exact(&mut request_len_buf).await.unwrap();
            let request_len = u32::from_be_bytes(request_len_buf) as usize;
            let mut request = vec![0u8; request_len];
            socket.read_exact(&mut request).await.unwrap();

            let mut reply = format!("d8:msg_typei1e5:piecei0e10:total_sizei{}ee", server_metadata.len()).into_bytes();
            reply.extend_from_slice(&server_metadata);
            socket.write_all(&reply).await.unwrap();

            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let task = FetchTask {
            info_hash,
            ip: Ipv4Addr::new(127, 0, 0, 1),
            target_port: addr.port(),
        };
        let stats = Keeper::new_noop_sender();
        let result = fetch(task, Duration::from_secs(5), &stats).await.unwrap();
        assert_eq!(result, metadata);
    }

    #[tokio::test]
    async fn aborts_on_a_mismatched_protocol_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut handshake = [0u8; wire::HANDSHAKE_LEN];
            socket.read_exact(&mut handshake).await.unwrap();
            socket.write_all(&[0u8; wire::HANDSHAKE_LEN]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let task = FetchTask {
            info_hash: InfoHash([1u8; 20]),
            ip: Ipv4Addr::new(127, 0, 0, 1),
            target_port: addr.port(),
        };
        let stats = Keeper::new_noop_sender();
        let result = fetch(task, Duration::from_secs(5), &stats).await;
        assert!(matches!(result, Err(Error::Wire(wire::Error::WrongProtocol))));
    }

    #[test]
    fn describes_a_verified_torrent_by_name_and_size() {
        let metadata = info_dict_bytes("example.iso", 12345);
        assert_eq!(describe(&metadata), "example.iso (12345 bytes)");
    }

    #[tokio::test]
    async fn times_out_against_an_unresponsive_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let task = FetchTask {
            info_hash: InfoHash([2u8; 20]),
            ip: Ipv4Addr::new(127, 0, 0, 1),
            target_port: addr.port(),
        };
        let stats = Keeper::new_noop_sender();
        let result = fetch(task, Duration::from_millis(200), &stats).await;
        assert!(matches!(result, Err(Error::TimedOut)));
    }
}

//! Unix Socket Server
//!
//! Line-delimited JSON request/response surface for status reads and the
//! manual fan preference. The (separate, unprivileged) web frontend is a
//! client of this socket; the daemon never initiates traffic.
//!
//! Hardening carried at a scale proportionate to the surface:
//! - Symlink refusal on socket creation
//! - Concurrent connection cap
//! - Bounded line reads with a maximum message size
//! - Read/write timeouts per message
//! - Peer credential (SO_PEERCRED) audit logging

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use pifan_core::StateStore;
use pifan_protocol::{Request, RequestEnvelope, Response, ResponseEnvelope, MAX_MESSAGE_SIZE};

/// Maximum concurrent client connections
const MAX_CONNECTIONS: usize = 16;

/// Read timeout per message
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per message
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket permissions (0666 = world read/write). Clients are
/// unprivileged local processes; the socket carries no secrets.
const SOCKET_MODE: u32 = 0o666;

/// Global connection counter
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Run the Unix socket server until a shutdown signal arrives.
pub async fn run_server(socket_path: &str, store: Arc<StateStore>) -> anyhow::Result<()> {
    let path = Path::new(socket_path);

    if path.exists() {
        let metadata = path.symlink_metadata()?;
        if metadata.file_type().is_symlink() {
            anyhow::bail!("socket path is a symlink - refusing for security");
        }
        std::fs::remove_file(path)?;
        debug!("removed existing socket file");
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    info!("listening on {} (mode {:o})", socket_path, SOCKET_MODE);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
                        if current >= MAX_CONNECTIONS {
                            warn!("connection limit reached ({current}), rejecting new connection");
                            drop(stream);
                            continue;
                        }

                        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                        let store = store.clone();
                        tokio::spawn(async move {
                            handle_client(stream, store).await;
                            ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!("accept error: {e}");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    info!("server stopped");
    Ok(())
}

/// Client credentials from the Unix socket peer, for audit logging
#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    pid: i32,
}

async fn handle_client(stream: UnixStream, store: Arc<StateStore>) {
    match peer_credentials(&stream) {
        Some(cred) => debug!("client connected: uid={}, pid={}", cred.uid, cred.pid),
        None => debug!("client connected (peer credentials unavailable)"),
    }

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::with_capacity(256);

    loop {
        let read_result = timeout(READ_TIMEOUT, read_request_line(&mut reader, &mut line)).await;

        match read_result {
            Ok(Ok(0)) => {
                // EOF - client disconnected gracefully
                break;
            }
            Ok(Ok(_)) => {
                let envelope = process_request(&line, &store);
                if send_response(&mut writer, &envelope).await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
                // Oversized line or non-UTF8 bytes; either way the client
                // is not speaking the protocol.
                warn!("rejecting client: {e}");
                let envelope = ResponseEnvelope::new(0, Response::error(e.to_string()));
                let _ = send_response(&mut writer, &envelope).await;
                break;
            }
            Ok(Err(e)) => {
                debug!("read error: {e}");
                break;
            }
            Err(_) => {
                debug!("read timeout, dropping client");
                break;
            }
        }
    }
}

/// Read one newline-terminated request without buffering past the
/// message size limit.
async fn read_request_line(
    reader: &mut BufReader<tokio::net::unix::OwnedReadHalf>,
    line: &mut String,
) -> std::io::Result<usize> {
    line.clear();
    let mut limited = reader.take((MAX_MESSAGE_SIZE + 1) as u64);
    let n = limited.read_line(line).await?;

    // Hitting the cap means the message ran past the limit.
    if n > MAX_MESSAGE_SIZE {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "message too large",
        ));
    }

    Ok(n)
}

/// Parse and dispatch a single request.
///
/// Malformed input (bad JSON, missing or non-boolean `manual_state`)
/// yields an error response and touches no state.
fn process_request(line: &str, store: &StateStore) -> ResponseEnvelope {
    let envelope: RequestEnvelope = match serde_json::from_str(line.trim()) {
        Ok(e) => e,
        Err(e) => {
            debug!("invalid request: {e}");
            return ResponseEnvelope::new(0, Response::error("invalid request format"));
        }
    };

    let request_id = envelope.id;
    debug!("processing {} (id={request_id})", envelope.request.type_name());

    let response = match envelope.request {
        Request::Ping => Response::ok_string("pong"),

        Request::Version => Response::ok_string(env!("CARGO_PKG_VERSION")),

        Request::Status => Response::ok_status(store.status().to_status_payload()),

        Request::SetFan { manual_state } => {
            info!("AUDIT: SetFan manual_state={manual_state}");
            store.set_manual(manual_state);
            Response::ok_fan_ack(true)
        }
    };

    ResponseEnvelope::new(request_id, response)
}

/// Send a response with a write timeout.
async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    envelope: &ResponseEnvelope,
) -> Result<(), ()> {
    let response_json = serde_json::to_string(envelope).unwrap_or_else(|_| {
        r#"{"id":0,"status":"error","message":"serialization error"}"#.to_string()
    });

    let write_result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    match write_result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!("write error: {e}");
            Err(())
        }
        Err(_) => {
            debug!("write timeout");
            Err(())
        }
    }
}

/// Get peer credentials (uid, pid) from the Unix socket via SO_PEERCRED.
fn peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();

    // SAFETY: ucred is a plain C struct; zeroing it is a valid initial
    // state, and getsockopt writes at most `len` bytes into it.
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: fd is a live socket descriptor and cred/len are sized above.
    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            &mut cred as *mut _ as *mut libc::c_void,
            &mut len,
        )
    };

    if result == 0 {
        Some(PeerCredentials {
            uid: cred.uid,
            pid: cred.pid,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pifan_core::{FanPolicy, SystemSnapshot};

    fn seeded_store() -> StateStore {
        let store = StateStore::new();
        let metrics = SystemSnapshot {
            cpu_percent: 20.0,
            cpu_temp_c: Some(60.0),
            ram_used_mb: 800,
            ram_total_mb: 3792,
            ram_percent: 21.1,
            disk_used_gb: 12,
            disk_total_gb: 29,
            disk_percent: 41.4,
        };
        store.commit(metrics, &FanPolicy::new());
        store
    }

    #[test]
    fn test_status_request_returns_consistent_snapshot() {
        let store = seeded_store();
        let envelope = process_request(r#"{"id":5,"cmd":"Status"}"#, &store);
        assert_eq!(envelope.id, 5);
        match envelope.response {
            Response::Ok(data) => {
                let status = data.system.expect("status payload");
                assert_eq!(status.cpu_temp, Some(60.0));
                assert!(status.fan_forced_auto);
                assert!(status.fan_actual_on);
                assert!(!status.fan_manual_state);
            }
            Response::Error { message } => panic!("unexpected error: {message}"),
        }
    }

    #[test]
    fn test_set_fan_updates_preference_only() {
        let store = seeded_store();
        let envelope = process_request(
            r#"{"id":6,"cmd":"SetFan","data":{"manual_state":true}}"#,
            &store,
        );
        assert_eq!(envelope.id, 6);
        assert!(matches!(envelope.response, Response::Ok(_)));

        let state = store.status();
        assert!(state.fan.manual_on);
        // Actuation stays with the monitor loop; the committed decision
        // is untouched until its next tick.
        assert!(state.fan.forced_auto);
    }

    #[test]
    fn test_malformed_json_is_client_error() {
        let store = seeded_store();
        let before = store.status();

        let envelope = process_request("{not json", &store);
        assert_eq!(envelope.id, 0);
        assert!(matches!(envelope.response, Response::Error { .. }));
        assert_eq!(store.status(), before);
    }

    #[test]
    fn test_non_boolean_manual_state_is_rejected_without_mutation() {
        let store = seeded_store();
        let before = store.status();

        for body in [
            r#"{"id":7,"cmd":"SetFan","data":{"manual_state":"on"}}"#,
            r#"{"id":8,"cmd":"SetFan","data":{"manual_state":1}}"#,
            r#"{"id":9,"cmd":"SetFan","data":{}}"#,
            r#"{"id":10,"cmd":"SetFan"}"#,
        ] {
            let envelope = process_request(body, &store);
            assert!(
                matches!(envelope.response, Response::Error { .. }),
                "accepted malformed body: {body}"
            );
        }
        assert_eq!(store.status(), before);
    }

    #[test]
    fn test_ping_and_version() {
        let store = StateStore::new();

        let envelope = process_request(r#"{"id":1,"cmd":"Ping"}"#, &store);
        match envelope.response {
            Response::Ok(data) => assert_eq!(data.value.as_deref(), Some("pong")),
            Response::Error { message } => panic!("unexpected error: {message}"),
        }

        let envelope = process_request(r#"{"id":2,"cmd":"Version"}"#, &store);
        match envelope.response {
            Response::Ok(data) => assert_eq!(data.value.as_deref(), Some(env!("CARGO_PKG_VERSION"))),
            Response::Error { message } => panic!("unexpected error: {message}"),
        }
    }
}

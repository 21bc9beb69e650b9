//! Unix Socket Server
//!
//! Newline-delimited JSON over a Unix domain socket. Every request is parsed, validated
//! a second time server-side, then dispatched to the engine on the blocking pool since
//! engine calls perform synchronous sysfs writes under the arbitration lock.
//!
//! # Limits
//! - Maximum concurrent connections
//! - Read/write timeouts
//! - Bounded line reader enforcing the protocol message size

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use pb_core::{Engine, HintTranslator, PowerHint, PowerMode};
use pb_protocol::{
    EngineStatus, HintRequest, Request, RequestEnvelope, RequestStatus, ResourceStatus, Response,
    ResponseData, ResponseEnvelope,
};

/// Maximum concurrent connections
const MAX_CONNECTIONS: usize = 32;

/// Maximum message size
const MAX_MESSAGE_SIZE: usize = pb_protocol::MAX_MESSAGE_SIZE;

/// Read timeout per request
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout per response
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket permissions: owner and group may submit requests
const SOCKET_MODE: u32 = 0o660;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

/// Shared handles every connection dispatches to
pub struct DaemonContext {
    pub engine: Arc<Engine>,
    pub hints: Arc<HintTranslator>,
}

async fn read_line_bounded<R: tokio::io::AsyncBufRead + Unpin>(
    reader: &mut R,
    out: &mut Vec<u8>,
    max_len: usize,
) -> std::io::Result<usize> {
    out.clear();

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(0);
        }

        let mut take_len = available.len();
        let mut found_newline = false;
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            take_len = pos + 1;
            found_newline = true;
        }

        let remaining = max_len.saturating_sub(out.len());
        if take_len > remaining {
            let consume_len = remaining.min(available.len());
            reader.consume(consume_len);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "Message too large",
            ));
        }

        out.extend_from_slice(&available[..take_len]);
        reader.consume(take_len);

        if found_newline {
            return Ok(out.len());
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// Bind the socket and serve until SIGINT/SIGTERM
pub async fn run_server(socket_path: &str, ctx: Arc<DaemonContext>) -> anyhow::Result<()> {
    let path = Path::new(socket_path);

    if path.exists() {
        let metadata = path.symlink_metadata()?;
        if metadata.file_type().is_symlink() {
            anyhow::bail!("Socket path is a symlink - refusing to replace it");
        }
        std::fs::remove_file(path)?;
        debug!("Removed existing socket file");
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))?;

    info!("Listening on {} (mode {:o})", socket_path, SOCKET_MODE);
    info!("Limits: max_conn={}, max_msg={}", MAX_CONNECTIONS, MAX_MESSAGE_SIZE);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let current = ACTIVE_CONNECTIONS.load(Ordering::SeqCst);
                        if current >= MAX_CONNECTIONS {
                            warn!("Connection limit reached ({}), rejecting new connection", current);
                            drop(stream);
                            continue;
                        }

                        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            handle_client(stream, ctx).await;
                            ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    info!("Server stopped");
    Ok(())
}

/// Client credentials from Unix socket peer
#[derive(Debug, Clone, Copy)]
struct PeerCredentials {
    uid: u32,
    pid: i32,
}

async fn handle_client(stream: UnixStream, ctx: Arc<DaemonContext>) {
    let cred = get_peer_credentials(&stream).unwrap_or(PeerCredentials { uid: u32::MAX, pid: 0 });
    debug!("Connection from uid={}, pid={}", cred.uid, cred.pid);

    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line: Vec<u8> = Vec::with_capacity(MAX_MESSAGE_SIZE);
    let mut request_count: u64 = 0;
    let connection_start = Instant::now();

    loop {
        let read_result = timeout(READ_TIMEOUT, read_line_bounded(&mut reader, &mut line, MAX_MESSAGE_SIZE)).await;

        match read_result {
            Ok(Ok(0)) => {
                debug!(
                    "Client disconnected: uid={}, pid={}, requests={}, duration={:?}",
                    cred.uid,
                    cred.pid,
                    request_count,
                    connection_start.elapsed()
                );
                break;
            }
            Ok(Ok(n)) => {
                request_count += 1;
                trace!("Request #{} from uid={}: {} bytes", request_count, cred.uid, n);

                let response_envelope = match std::str::from_utf8(&line) {
                    Ok(s) => process_request(s, &ctx).await,
                    Err(e) => {
                        debug!("Non-UTF8 request from uid={}: {}", cred.uid, e);
                        let envelope = ResponseEnvelope::new(0, Response::error("Invalid request encoding"));
                        let _ = send_response(&mut writer, &envelope).await;
                        break;
                    }
                };

                if send_response(&mut writer, &response_envelope).await.is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::InvalidData {
                    warn!("Message too large (>{} bytes) from uid={}, pid={}", MAX_MESSAGE_SIZE, cred.uid, cred.pid);
                    let envelope = ResponseEnvelope::new(0, Response::error("Message too large"));
                    let _ = send_response(&mut writer, &envelope).await;
                } else {
                    error!("Read error from uid={}, pid={}: {}", cred.uid, cred.pid, e);
                }
                break;
            }
            Err(_) => {
                debug!("Read timeout for uid={}, pid={}", cred.uid, cred.pid);
                break;
            }
        }
    }
}

async fn send_response(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    response_envelope: &ResponseEnvelope,
) -> Result<(), ()> {
    let response_json = serde_json::to_string(response_envelope).unwrap_or_else(|_| {
        r#"{"id":0,"status":"error","message":"Serialization error"}"#.to_string()
    });

    let write_result = timeout(WRITE_TIMEOUT, async {
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        Ok::<_, std::io::Error>(())
    })
    .await;

    match write_result {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => {
            error!("Write error: {}", e);
            Err(())
        }
        Err(_) => {
            error!("Write timeout");
            Err(())
        }
    }
}

fn get_peer_credentials(stream: &UnixStream) -> Option<PeerCredentials> {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();

    #[cfg(target_os = "linux")]
    {
        // SAFETY: ucred is a plain C struct; an all-zero value is valid.
        let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: fd is a live socket owned by `stream`, and cred/len describe a buffer of
        // the size SO_PEERCRED writes.
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
            return Some(PeerCredentials {
                uid: cred.uid,
                pid: cred.pid,
            });
        }
    }

    #[cfg(not(target_os = "linux"))]
    let _ = fd;

    None
}

// ============================================================================
// Request Processing
// ============================================================================

/// Parse, validate and dispatch one request line
async fn process_request(line: &str, ctx: &Arc<DaemonContext>) -> ResponseEnvelope {
    let envelope: RequestEnvelope = match serde_json::from_str(line.trim()) {
        Ok(e) => e,
        Err(e) => {
            debug!("Invalid JSON: {}", e);
            return ResponseEnvelope::new(0, Response::error("Invalid request format"));
        }
    };

    let request_id = envelope.id;
    let request = envelope.request;

    if let Err(e) = request.validate() {
        warn!("Request validation failed: {}", e);
        return ResponseEnvelope::new(request_id, Response::error(e));
    }

    debug!("Processing {} (id={})", request.type_name(), request_id);

    let ctx = ctx.clone();
    let response = match tokio::task::spawn_blocking(move || dispatch(&ctx, request)).await {
        Ok(response) => response,
        Err(e) => {
            error!("Request handler failed: {}", e);
            Response::error("Internal error")
        }
    };

    ResponseEnvelope::new(request_id, response)
}

/// Run a validated request against the engine
fn dispatch(ctx: &DaemonContext, request: Request) -> Response {
    match request {
        Request::Ping => Response::ok_string("pong"),

        Request::Version => Response::ok_string(env!("CARGO_PKG_VERSION")),

        Request::Boost {
            resource,
            requester,
            enable,
            duration_ms,
            value,
        } => {
            if ctx.engine.registry().get(&resource).is_none() {
                return Response::error(format!("Unknown resource: {}", resource));
            }
            let applied = ctx
                .engine
                .submit_request(&resource, &requester, enable, duration_ms, &value);
            Response::ok_applied(applied)
        }

        Request::Hint { hint } => match to_power_hint(hint) {
            Some(hint) => Response::ok_applied(ctx.hints.power_hint(hint)),
            None => Response::error("Unknown power mode"),
        },

        Request::SetInteractive { on } => Response::ok_applied(ctx.hints.set_interactive(on)),

        Request::SetCharging { charging } => {
            ctx.hints.set_charging(charging);
            Response::ok()
        }

        Request::SetEnabled { enabled } => {
            info!("Boosting {}", if enabled { "enabled" } else { "disabled" });
            ctx.engine.set_engine_enabled(enabled);
            Response::ok()
        }

        Request::GetSceneId { name } => Response::Ok(ResponseData::scene(ctx.hints.get_scene_id(&name))),

        Request::Status => Response::Ok(ResponseData::engine(status(ctx))),
    }
}

fn to_power_hint(hint: HintRequest) -> Option<PowerHint> {
    Some(match hint {
        HintRequest::Interaction { data } => PowerHint::Interaction { data },
        HintRequest::Launch { active } => PowerHint::Launch { active },
        HintRequest::VideoEncode { state } => PowerHint::VideoEncode { state },
        HintRequest::Mode { mode, enable } => PowerHint::Mode {
            mode: PowerMode::parse(&mode)?,
            enable,
        },
        HintRequest::Custom { scene, data } => PowerHint::Custom { scene, data },
    })
}

fn status(ctx: &DaemonContext) -> EngineStatus {
    EngineStatus {
        enabled: ctx.engine.is_enabled(),
        interactive: ctx.hints.is_interactive(),
        mode: ctx.hints.mode().to_string(),
        resources: ctx
            .engine
            .snapshot()
            .into_iter()
            .map(|r| ResourceStatus {
                name: r.name,
                current: r.current,
                deadline_ms: r.deadline_ms,
                requests: r
                    .requests
                    .into_iter()
                    .map(|q| RequestStatus {
                        requester: q.requester,
                        value: q.value,
                        priority: q.priority,
                        remaining_ms: q.remaining_ms,
                    })
                    .collect(),
            })
            .collect(),
    }
}

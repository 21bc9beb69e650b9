//! Daemon Client
//!
//! Blocking client for the perfboostd Unix socket. One connection per client; each
//! request is validated locally, tagged with a fresh id and matched against the
//! response id.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pb_error::{BoostError, Result};
use pb_protocol::{
    EngineStatus, HintRequest, Request, RequestEnvelope, Response, ResponseData, ResponseEnvelope,
    MAX_MESSAGE_SIZE,
};

const TIMEOUT: Duration = Duration::from_secs(5);

pub struct DaemonClient {
    socket_path: PathBuf,
    writer: UnixStream,
    reader: BufReader<UnixStream>,
}

impl DaemonClient {
    pub fn connect(socket_path: impl AsRef<Path>) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let stream = UnixStream::connect(&socket_path).map_err(|e| {
            BoostError::DaemonConnection(format!("{}: {}", socket_path.display(), e))
        })?;
        stream.set_read_timeout(Some(TIMEOUT))?;
        stream.set_write_timeout(Some(TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);

        Ok(Self {
            socket_path,
            writer: stream,
            reader,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and wait for its response
    ///
    /// Daemon-side errors come back as `DaemonRequest`.
    pub fn request(&mut self, request: Request) -> Result<ResponseData> {
        request
            .validate()
            .map_err(|e| BoostError::DaemonRequest(format!("invalid request: {}", e)))?;

        let envelope = RequestEnvelope::new(request);
        let mut json = serde_json::to_vec(&envelope)?;
        json.push(b'\n');
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(BoostError::MessageTooLarge {
                size: json.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }
        self.writer.write_all(&json)?;

        let mut buf = Vec::with_capacity(1024);
        self.reader.read_until(b'\n', &mut buf)?;
        if buf.is_empty() {
            return Err(BoostError::DaemonConnection("daemon closed connection".to_string()));
        }
        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(BoostError::MessageTooLarge {
                size: buf.len(),
                max_size: MAX_MESSAGE_SIZE,
            });
        }

        let response: ResponseEnvelope = serde_json::from_slice(&buf)?;
        if response.id != envelope.id && response.id != 0 {
            return Err(BoostError::IpcProtocol(format!(
                "response id mismatch: expected {}, got {}",
                envelope.id, response.id
            )));
        }

        match response.response {
            Response::Ok(data) => Ok(data),
            Response::Error { message } => Err(BoostError::DaemonRequest(message)),
        }
    }

    pub fn ping(&mut self) -> Result<String> {
        Ok(self.request(Request::Ping)?.value.unwrap_or_default())
    }

    pub fn version(&mut self) -> Result<String> {
        Ok(self.request(Request::Version)?.value.unwrap_or_default())
    }

    /// Assert a boost; `duration_ms == 0` holds it until released
    pub fn boost(&mut self, resource: &str, requester: &str, value: &str, duration_ms: u32) -> Result<bool> {
        let data = self.request(Request::Boost {
            resource: resource.to_string(),
            requester: requester.to_string(),
            enable: true,
            duration_ms,
            value: value.to_string(),
        })?;
        Ok(data.applied.unwrap_or(false))
    }

    pub fn release(&mut self, resource: &str, requester: &str) -> Result<bool> {
        let data = self.request(Request::Boost {
            resource: resource.to_string(),
            requester: requester.to_string(),
            enable: false,
            duration_ms: 0,
            value: String::new(),
        })?;
        Ok(data.applied.unwrap_or(false))
    }

    pub fn hint(&mut self, hint: HintRequest) -> Result<bool> {
        Ok(self.request(Request::Hint { hint })?.applied.unwrap_or(false))
    }

    pub fn set_interactive(&mut self, on: bool) -> Result<bool> {
        Ok(self.request(Request::SetInteractive { on })?.applied.unwrap_or(false))
    }

    pub fn set_charging(&mut self, charging: bool) -> Result<()> {
        self.request(Request::SetCharging { charging }).map(|_| ())
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.request(Request::SetEnabled { enabled }).map(|_| ())
    }

    pub fn scene_id(&mut self, name: &str) -> Result<u32> {
        let data = self.request(Request::GetSceneId {
            name: name.to_string(),
        })?;
        Ok(data.scene_id.unwrap_or(0))
    }

    pub fn status(&mut self) -> Result<EngineStatus> {
        self.request(Request::Status)?
            .engine
            .ok_or_else(|| BoostError::IpcProtocol("status response without engine state".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;
    use std::thread;

    /// Answer one request line with `reply(id)`
    fn fake_daemon(path: &Path, reply: fn(u64) -> String) -> thread::JoinHandle<String> {
        let listener = UnixListener::bind(path).unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            let envelope: RequestEnvelope = serde_json::from_str(&line).unwrap();
            let mut writer = stream;
            writer.write_all(reply(envelope.id).as_bytes()).unwrap();
            writer.write_all(b"\n").unwrap();
            line
        })
    }

    #[test]
    fn test_boost_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pb.sock");
        let server = fake_daemon(&path, |id| format!(r#"{{"id":{},"status":"ok","applied":true}}"#, id));

        let mut client = DaemonClient::connect(&path).unwrap();
        assert!(client.boost("ddr", "cli", "max", 200).unwrap());

        let sent = server.join().unwrap();
        let sent: serde_json::Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(sent["cmd"], "Boost");
        assert_eq!(sent["data"]["value"], "max");
        assert_eq!(sent["data"]["duration_ms"], 200);
    }

    #[test]
    fn test_daemon_error_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pb.sock");
        let server = fake_daemon(&path, |id| {
            format!(r#"{{"id":{},"status":"error","message":"Unknown resource: npu"}}"#, id)
        });

        let mut client = DaemonClient::connect(&path).unwrap();
        let err = client.release("npu", "cli").unwrap_err();
        assert!(matches!(err, BoostError::DaemonRequest(ref m) if m.contains("npu")));
        server.join().unwrap();
    }

    #[test]
    fn test_invalid_request_never_sent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pb.sock");
        let _listener = UnixListener::bind(&path).unwrap();

        let mut client = DaemonClient::connect(&path).unwrap();
        assert!(client.boost("", "cli", "max", 0).is_err());
    }

    #[test]
    fn test_connect_missing_socket() {
        let dir = tempfile::tempdir().unwrap();
        let err = DaemonClient::connect(dir.path().join("absent.sock")).err().unwrap();
        assert!(matches!(err, BoostError::DaemonConnection(_)));
    }
}

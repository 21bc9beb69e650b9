use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global request ID counter for correlation
static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Maximum message size for IPC (8KB)
pub const MAX_MESSAGE_SIZE: usize = 8 * 1024;

/// Maximum length of resource, requester and scene names
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum length of a request value
const MAX_VALUE_LENGTH: usize = 128;

/// Longest boost a client may request (one day)
pub const MAX_DURATION_MS: u32 = 24 * 60 * 60 * 1000;

/// Power modes accepted by `HintRequest::Mode`
pub const POWER_MODES: &[&str] = &[
    "normal",
    "low_power",
    "power_save",
    "ultra_power_save",
    "performance",
];

/// Generate a unique request ID for correlation
pub fn generate_request_id() -> u64 {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation and debugging
    pub id: u64,
    /// The actual request
    #[serde(flatten)]
    pub request: Request,
}

impl RequestEnvelope {
    pub fn new(request: Request) -> Self {
        Self {
            id: generate_request_id(),
            request,
        }
    }

    pub fn with_id(request: Request, id: u64) -> Self {
        Self { id, request }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "data")]
pub enum Request {
    Ping,
    Version,
    /// Assert or release one requester's ask on a resource
    Boost {
        resource: String,
        requester: String,
        enable: bool,
        /// 0 = indefinite
        duration_ms: u32,
        #[serde(default)]
        value: String,
    },
    Hint { hint: HintRequest },
    SetInteractive { on: bool },
    SetCharging { charging: bool },
    /// Globally enable or disable boosting
    SetEnabled { enabled: bool },
    GetSceneId { name: String },
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HintRequest {
    Interaction { data: Option<i32> },
    Launch { active: bool },
    VideoEncode { state: i32 },
    Mode { mode: String, enable: bool },
    Custom { scene: String, data: Option<i32> },
}

impl Request {
    /// Validate request parameters before sending to daemon
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Request::Ping
            | Request::Version
            | Request::Status
            | Request::SetInteractive { .. }
            | Request::SetCharging { .. }
            | Request::SetEnabled { .. } => Ok(()),

            Request::Boost {
                resource,
                requester,
                enable,
                duration_ms,
                value,
            } => {
                validate_name(resource)?;
                validate_name(requester)?;
                if *enable {
                    validate_value(value)?;
                }
                validate_duration_ms(*duration_ms)?;
                Ok(())
            }

            Request::Hint { hint } => hint.validate(),

            Request::GetSceneId { name } => validate_name(name),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Ping => "Ping",
            Request::Version => "Version",
            Request::Boost { .. } => "Boost",
            Request::Hint { .. } => "Hint",
            Request::SetInteractive { .. } => "SetInteractive",
            Request::SetCharging { .. } => "SetCharging",
            Request::SetEnabled { .. } => "SetEnabled",
            Request::GetSceneId { .. } => "GetSceneId",
            Request::Status => "Status",
        }
    }
}

impl HintRequest {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            HintRequest::Interaction { .. }
            | HintRequest::Launch { .. }
            | HintRequest::VideoEncode { .. } => Ok(()),
            HintRequest::Mode { mode, .. } => {
                if POWER_MODES.contains(&mode.as_str()) {
                    Ok(())
                } else {
                    Err(format!("Unknown power mode {:?}", mode))
                }
            }
            HintRequest::Custom { scene, .. } => validate_name(scene),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to
    pub id: u64,
    /// The actual response
    #[serde(flatten)]
    pub response: Response,
}

impl ResponseEnvelope {
    pub fn new(id: u64, response: Response) -> Self {
        Self { id, response }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok(ResponseData),
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Whether the request caused a hardware write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineStatus>,
}

impl ResponseData {
    pub fn none() -> Self { Self::default() }
    pub fn string(v: String) -> Self { Self { value: Some(v), ..Self::default() } }
    pub fn applied(a: bool) -> Self { Self { applied: Some(a), ..Self::default() } }
    pub fn scene(id: u32) -> Self { Self { scene_id: Some(id), ..Self::default() } }
    pub fn engine(s: EngineStatus) -> Self { Self { engine: Some(s), ..Self::default() } }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub enabled: bool,
    pub interactive: bool,
    pub mode: String,
    pub resources: Vec<ResourceStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub name: String,
    pub current: Option<String>,
    pub deadline_ms: Option<u64>,
    /// Lowest priority first; the last entry is the winner
    pub requests: Vec<RequestStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub requester: String,
    pub value: String,
    pub priority: u32,
    pub remaining_ms: Option<u64>,
}

impl Response {
    pub fn ok() -> Self {
        Response::Ok(ResponseData::none())
    }

    pub fn ok_string(s: impl Into<String>) -> Self {
        Response::Ok(ResponseData::string(s.into()))
    }

    pub fn ok_applied(applied: bool) -> Self {
        Response::Ok(ResponseData::applied(applied))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error { message: msg.into() }
    }
}

pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Name cannot be empty".into());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!("Name too long: {} > {} chars", name.len(), MAX_NAME_LENGTH));
    }
    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Err(format!("Name contains invalid character: {:?}", c));
    }
    Ok(())
}

pub fn validate_value(value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err("Value cannot be empty".into());
    }
    if value.len() > MAX_VALUE_LENGTH {
        return Err(format!("Value too long: {} > {} chars", value.len(), MAX_VALUE_LENGTH));
    }
    if let Some(c) = value.chars().find(|c| c.is_control()) {
        return Err(format!("Value contains invalid character: {:?}", c));
    }
    Ok(())
}

pub fn validate_duration_ms(duration_ms: u32) -> Result<(), String> {
    if duration_ms > MAX_DURATION_MS {
        return Err(format!("Duration too long (maximum {}ms)", MAX_DURATION_MS));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let envelope = RequestEnvelope::with_id(
            Request::Boost {
                resource: "ddr".into(),
                requester: "launch".into(),
                enable: true,
                duration_ms: 0,
                value: "max".into(),
            },
            7,
        );
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["cmd"], "Boost");
        assert_eq!(json["data"]["value"], "max");

        let unit: RequestEnvelope = serde_json::from_str(r#"{"id":1,"cmd":"Status"}"#).unwrap();
        assert_eq!(unit.request, Request::Status);
    }

    #[test]
    fn test_hint_tagging() {
        let parsed: Request = serde_json::from_str(
            r#"{"cmd":"Hint","data":{"hint":{"kind":"video_encode","state":1}}}"#,
        )
        .unwrap();
        assert_eq!(parsed, Request::Hint { hint: HintRequest::VideoEncode { state: 1 } });
    }

    #[test]
    fn test_validate_boost() {
        let boost = |resource: &str, value: &str, enable: bool, duration_ms: u32| Request::Boost {
            resource: resource.into(),
            requester: "r".into(),
            enable,
            duration_ms,
            value: value.into(),
        };
        assert!(boost("ddr", "max", true, 500).validate().is_ok());
        assert!(boost("ddr", "", false, 0).validate().is_ok());
        assert!(boost("", "max", true, 0).validate().is_err());
        assert!(boost("ddr", "", true, 0).validate().is_err());
        assert!(boost("ddr", "max", true, MAX_DURATION_MS + 1).validate().is_err());
        assert!(boost("dd\nr", "max", true, 0).validate().is_err());
        assert!(boost(&"x".repeat(MAX_NAME_LENGTH + 1), "max", true, 0).validate().is_err());
    }

    #[test]
    fn test_validate_mode() {
        let mode = |m: &str| Request::Hint {
            hint: HintRequest::Mode { mode: m.into(), enable: true },
        };
        assert!(mode("power_save").validate().is_ok());
        assert!(mode("turbo").validate().is_err());
    }

    #[test]
    fn test_response_omits_empty_fields() {
        let json = serde_json::to_value(ResponseEnvelope::new(3, Response::ok_applied(true))).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 3, "status": "ok", "applied": true }));

        let parsed: ResponseEnvelope = serde_json::from_str(r#"{"id":3,"status":"error","message":"nope"}"#).unwrap();
        assert!(matches!(parsed.response, Response::Error { ref message } if message == "nope"));
    }
}

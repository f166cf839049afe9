//! Method dispatch for client requests.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::models::prompt::StopReason;
use crate::models::update::ContentBlock;
use crate::orchestrator::SessionManager;
use crate::rpc::protocol::ModelInfo;
use crate::AppError;

/// Client protocol version spoken by this endpoint.
pub const PROTOCOL_VERSION: u64 = 1;

/// JSON-RPC error codes.
pub mod codes {
    /// Request line was not valid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Parameters did not match the method.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Any other failure.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Credentials are missing or invalid.
    pub const AUTH_REQUIRED: i64 = -32000;
    /// Unknown session.
    pub const RESOURCE_NOT_FOUND: i64 = -32002;
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Extra detail.
    pub data: Option<Value>,
}

impl RpcError {
    /// Error without data.
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Wire form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut value = json!({"code": self.code, "message": self.message});
        if let Some(data) = &self.data {
            value["data"] = data.clone();
        }
        value
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        match &err {
            AppError::AuthRequired(details) => Self {
                code: codes::AUTH_REQUIRED,
                message: "Authentication required".into(),
                data: Some(json!({"details": details})),
            },
            AppError::Spawn { program, .. } if err.is_not_installed() => Self::new(
                codes::INTERNAL_ERROR,
                format!("agent executable not installed: {program}"),
            ),
            AppError::NotFound(what) => {
                Self::new(codes::RESOURCE_NOT_FOUND, format!("not found: {what}"))
            }
            _ => Self::new(codes::INTERNAL_ERROR, err.to_string()),
        }
    }
}

type HandlerResult = std::result::Result<Value, RpcError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewSessionParams {
    cwd: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadSessionParams {
    session_id: String,
    cwd: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsParams {
    #[serde(default)]
    cwd: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptParams {
    session_id: String,
    #[serde(default)]
    prompt: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionParams {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetModelParams {
    session_id: String,
    model_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetThinkingLevelParams {
    session_id: String,
    level: String,
}

fn parse<T: DeserializeOwned>(params: Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params)
        .map_err(|err| RpcError::new(codes::INVALID_PARAMS, format!("invalid params: {err}")))
}

/// Handle one request (or notification) and produce its result.
///
/// # Errors
///
/// Returns the JSON-RPC error to send back to the client.
pub async fn handle(manager: &SessionManager, method: &str, params: Value) -> HandlerResult {
    match method {
        "initialize" => Ok(initialize()),
        "authenticate" => Ok(json!({})),
        "session/new" => {
            let params: NewSessionParams = parse(params)?;
            let info = manager.new_session(params.cwd).await?;
            let models = match manager.available_models(&info.session_id).await {
                Ok(models) => models,
                Err(err) => {
                    debug!(session_id = info.session_id, %err, "model list unavailable");
                    Vec::new()
                }
            };
            Ok(json!({
                "sessionId": info.session_id,
                "models": models_value(info.state.model.as_ref(), &models),
            }))
        }
        "session/load" => {
            let params: LoadSessionParams = parse(params)?;
            manager.load_session(&params.session_id, params.cwd).await?;
            Ok(json!({}))
        }
        "session/list" => {
            let params: ListSessionsParams = if params.is_null() {
                ListSessionsParams::default()
            } else {
                parse(params)?
            };
            let sessions: Vec<Value> = manager
                .stored_sessions()?
                .into_iter()
                .filter(|record| params.cwd.is_none() || params.cwd.as_ref() == Some(&record.cwd))
                .map(|record| {
                    json!({
                        "sessionId": record.session_id,
                        "cwd": record.cwd,
                        "title": record.title,
                        "updatedAt": record.updated_at.to_rfc3339(),
                    })
                })
                .collect();
            Ok(json!({ "sessions": sessions }))
        }
        "session/prompt" => {
            let params: PromptParams = parse(params)?;
            let blocks: Vec<ContentBlock> = params
                .prompt
                .into_iter()
                .filter_map(|block| match serde_json::from_value(block) {
                    Ok(block) => Some(block),
                    Err(err) => {
                        debug!(%err, "unsupported prompt block skipped");
                        None
                    }
                })
                .collect();
            match manager.prompt(&params.session_id, &blocks).await? {
                StopReason::Error(err) => Err(err.into()),
                reason => Ok(json!({ "stopReason": reason.wire_name() })),
            }
        }
        "session/cancel" => {
            let params: SessionParams = parse(params)?;
            if let Err(err) = manager.cancel(&params.session_id).await {
                warn!(session_id = params.session_id, %err, "cancel incomplete");
            }
            Ok(Value::Null)
        }
        "session/set_model" => {
            let params: SetModelParams = parse(params)?;
            let (provider, model_id) = params.model_id.split_once('/').ok_or_else(|| {
                RpcError::new(
                    codes::INVALID_PARAMS,
                    format!("model id must be provider/model: {}", params.model_id),
                )
            })?;
            manager
                .set_model(&params.session_id, provider, model_id)
                .await?;
            Ok(json!({}))
        }
        "session/set_thinking_level" => {
            let params: SetThinkingLevelParams = parse(params)?;
            manager
                .set_thinking_level(&params.session_id, &params.level)
                .await?;
            Ok(json!({}))
        }
        other => Err(RpcError::new(
            codes::METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

fn initialize() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "agentCapabilities": {
            "loadSession": true,
            "promptCapabilities": {
                "image": true,
                "audio": false,
                "embeddedContext": true,
            },
        },
        "authMethods": [{
            "id": "agent-login",
            "name": "Log in with the agent",
            "description": "Run the agent interactively once and complete its login flow",
        }],
        "agentInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

fn model_id(model: &ModelInfo) -> String {
    format!("{}/{}", model.provider, model.id)
}

fn models_value(current: Option<&ModelInfo>, available: &[ModelInfo]) -> Value {
    let available: Vec<Value> = available
        .iter()
        .map(|m| {
            json!({
                "modelId": model_id(m),
                "name": m.name.clone().unwrap_or_else(|| m.id.clone()),
            })
        })
        .collect();
    json!({
        "currentModelId": current.map(model_id),
        "availableModels": available,
    })
}

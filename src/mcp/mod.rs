//! Storage service connector over MCP.
//!
//! parse_target -> TargetSpec { LocalCommand | RemoteUrl }
//! McpConnector::connect spawns the bridge process and initialises an rmcp
//! client session; McpManager::send turns one `Request` into one `tools/call`
//! (tool name = wire command, arguments = serialized request).
//!
//! Remote URL targets are recognised but not supported.
//!
use anyhow::{Context, Result, bail};
use rmcp::model::{CallToolRequestParam, CallToolResult};
use rmcp::service::RunningService;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::{RoleClient, ServiceError, ServiceExt};
use serde_json::Value;
use shell_words::split as shell_split;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use url::Url;

use crate::cmd::request::Request;
use crate::manager::{
    CancelHandle, CancelSignal, Connect, ConnectionError, Exchange, Interrupted, Manager, Outcome,
    TransportError, bounded, classify, status_code, status_message,
};

/// Code reported for a tool result flagged `isError` that carries no status of its own.
pub const TOOL_ERROR_CODE: i64 = -1;

/* -------------------------------------------------------------------------- */
/* Target parsing                                                             */
/* -------------------------------------------------------------------------- */

/// A parsed `--target` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// Bridge process to spawn: program + arguments.
    LocalCommand {
        original: String,
        program: String,
        args: Vec<String>,
    },
    /// http(s) or ws(s) endpoint.
    RemoteUrl { original: String, url: Url },
}

impl TargetSpec {
    pub fn original(&self) -> &str {
        match self {
            TargetSpec::LocalCommand { original, .. } | TargetSpec::RemoteUrl { original, .. } => {
                original
            }
        }
    }
}

impl fmt::Display for TargetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSpec::LocalCommand { program, args, .. } if args.is_empty() => {
                write!(f, "local: {program}")
            }
            TargetSpec::LocalCommand { program, args, .. } => {
                write!(f, "local: {program} {}", args.join(" "))
            }
            TargetSpec::RemoteUrl { url, .. } => write!(f, "remote: {url}"),
        }
    }
}

/// Parse a target string.
///
/// http/https/ws/wss URLs become `RemoteUrl`; anything else is split with
/// shell-word rules into a local command line.
pub fn parse_target(raw: &str) -> Result<TargetSpec> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("target string is empty");
    }

    if let Ok(url) = Url::parse(trimmed) {
        if matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Ok(TargetSpec::RemoteUrl {
                original: raw.to_string(),
                url,
            });
        }
    }

    let mut parts = shell_split(trimmed).context("failed to split target command line")?;
    if parts.is_empty() || parts[0].is_empty() {
        bail!("target command line has no program");
    }
    let program = parts.remove(0);
    Ok(TargetSpec::LocalCommand {
        original: raw.to_string(),
        program,
        args: parts,
    })
}

/// Set `handle` on the first Ctrl-C. Spawned once per process so every call
/// of a run, and the gaps between calls, observe the same interruption.
pub async fn cancel_on_ctrl_c(handle: CancelHandle) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupted, stopping");
            handle.cancel();
        }
        Err(e) => debug!(error = %e, "Ctrl-C handler unavailable"),
    }
}

/* -------------------------------------------------------------------------- */
/* Connector                                                                  */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct McpConnector {
    target: Option<String>,
    timeout: Option<Duration>,
    cancel: CancelSignal,
}

impl McpConnector {
    pub fn new(target: Option<String>, timeout: Option<Duration>, cancel: CancelSignal) -> Self {
        McpConnector {
            target,
            timeout,
            cancel,
        }
    }
}

impl Connect for McpConnector {
    type Manager = McpManager;

    async fn connect(&self) -> Result<McpManager, ConnectionError> {
        let raw = self.target.as_deref().ok_or(ConnectionError::NoTarget)?;
        let spec = parse_target(raw).map_err(|e| ConnectionError::InvalidTarget {
            target: raw.to_string(),
            reason: format!("{e:#}"),
        })?;
        let (program, args) = match &spec {
            TargetSpec::LocalCommand { program, args, .. } => (program, args),
            TargetSpec::RemoteUrl { url, .. } => {
                return Err(ConnectionError::Unsupported(url.to_string()));
            }
        };

        debug!(bridge = %spec, "spawning storage service bridge");
        let transport = TokioChildProcess::new(Command::new(program).configure(|c| {
            c.args(args);
            // stdout carries the protocol.
            c.stderr(Stdio::null());
        }))
        .map_err(|e| ConnectionError::Spawn {
            target: spec.original().to_string(),
            reason: e.to_string(),
        })?;

        let started = bounded(().serve(transport), self.timeout, self.cancel.cancelled()).await;
        let service = match started {
            Ok(Ok(service)) => service,
            Ok(Err(e)) => {
                return Err(ConnectionError::Spawn {
                    target: spec.original().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(Interrupted::TimedOut(timeout)) => {
                return Err(ConnectionError::Timeout {
                    target: spec.original().to_string(),
                    timeout,
                });
            }
            Err(Interrupted::Cancelled) => {
                return Err(ConnectionError::Cancelled(spec.original().to_string()));
            }
        };
        info!(bridge = %spec, "connected to storage service");

        Ok(McpManager {
            service,
            timeout: self.timeout,
            cancel: self.cancel.clone(),
        })
    }
}

/* -------------------------------------------------------------------------- */
/* Manager                                                                    */
/* -------------------------------------------------------------------------- */

/// Connected rmcp client session.
pub struct McpManager {
    service: RunningService<RoleClient, ()>,
    timeout: Option<Duration>,
    cancel: CancelSignal,
}

impl McpManager {
    async fn call(&self, request: &Request) -> Outcome {
        // Built requests always encode; see `build::build`.
        let arguments = match request.arguments() {
            Ok(arguments) => arguments,
            Err(e) => return Outcome::TransportError(TransportError::Encode(e.to_string())),
        };
        let param = CallToolRequestParam {
            name: request.command.into(),
            arguments: Some(arguments),
        };
        outcome_of(bounded(self.service.call_tool(param), self.timeout, self.cancel.cancelled()).await)
    }
}

/// Map what came back from one bounded `tools/call` to an `Outcome`.
///
/// A JSON-RPC error object is the service refusing the call; every other
/// `ServiceError` leaves the remote effect unknown.
pub fn outcome_of(result: Result<Result<CallToolResult, ServiceError>, Interrupted>) -> Outcome {
    match result {
        Err(cut) => Outcome::TransportError(cut.into()),
        Ok(Err(ServiceError::McpError(e))) => Outcome::ApplicationError {
            code: i64::from(e.code.0),
            message: e.message.to_string(),
        },
        Ok(Err(e)) => Outcome::TransportError(TransportError::Disconnected(e.to_string())),
        Ok(Ok(result)) => match serde_json::to_value(&result) {
            Ok(value) => decode_tool_result(value),
            Err(e) => Outcome::TransportError(TransportError::Malformed(e.to_string())),
        },
    }
}

impl Manager for McpManager {
    async fn send(&self, request: Request) -> Exchange {
        let outcome = self.call(&request).await;
        Exchange { request, outcome }
    }

    async fn shutdown(self) {
        if let Err(e) = self.service.cancel().await {
            debug!(error = %e, "bridge session did not shut down cleanly");
        }
    }
}

/// Classify a serialized `CallToolResult`.
///
/// The payload is `structuredContent` when present, else the first text
/// content item (parsed as JSON when possible), else the whole result.
pub fn decode_tool_result(result: Value) -> Outcome {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let payload = tool_payload(&result).unwrap_or(result);

    if is_error {
        return Outcome::ApplicationError {
            code: status_code(&payload).unwrap_or(TOOL_ERROR_CODE),
            message: status_message(&payload),
        };
    }
    classify(payload)
}

fn tool_payload(result: &Value) -> Option<Value> {
    if let Some(structured) = result.get("structuredContent").filter(|v| !v.is_null()) {
        return Some(structured.clone());
    }
    let text = result
        .get("content")?
        .as_array()?
        .iter()
        .find_map(|item| item.get("text").and_then(Value::as_str))?;
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::{Content, ErrorCode, ErrorData};
    use serde_json::json;

    #[test]
    fn parse_remote_targets() {
        for raw in ["https://example.com/mcp", "wss://bridge.example/ws"] {
            assert!(matches!(parse_target(raw).unwrap(), TargetSpec::RemoteUrl { .. }));
        }
    }

    #[test]
    fn parse_local_quoted() {
        let spec = parse_target(r#"pos-bridge --socket "/var/run/pos sock""#).unwrap();
        match spec {
            TargetSpec::LocalCommand { program, args, .. } => {
                assert_eq!(program, "pos-bridge");
                assert_eq!(args, vec!["--socket", "/var/run/pos sock"]);
            }
            other => panic!("expected local command, got {other:?}"),
        }
    }

    #[test]
    fn other_schemes_are_commands() {
        let spec = parse_target("unix:///var/run/pos.sock").unwrap();
        assert!(matches!(spec, TargetSpec::LocalCommand { .. }));
    }

    #[test]
    fn empty_target_rejected() {
        assert!(parse_target("   ").unwrap_err().to_string().contains("empty"));
    }

    #[tokio::test]
    async fn connect_without_target_fails() {
        let err = McpConnector::new(None, None, CancelSignal::never()).connect().await.err().unwrap();
        assert!(matches!(err, ConnectionError::NoTarget));
    }

    #[tokio::test]
    async fn connect_to_url_is_unsupported() {
        let err = McpConnector::new(Some("https://pos.example/mcp".into()), None, CancelSignal::never())
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::Unsupported(_)));
    }

    #[tokio::test]
    async fn connect_to_missing_program_is_spawn_error() {
        let err = McpConnector::new(
            Some("/nonexistent/pos-bridge".into()),
            Some(Duration::from_secs(5)),
            CancelSignal::never(),
        )
        .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::Spawn { .. }), "{err}");
    }

    #[test]
    fn json_rpc_error_is_rejection_verbatim() {
        let error = ErrorData::new(
            ErrorCode(-32602),
            "array \"array9\" does not exist\n",
            None,
        );
        assert_eq!(
            outcome_of(Ok(Err(ServiceError::McpError(error)))),
            Outcome::ApplicationError {
                code: -32602,
                message: "array \"array9\" does not exist\n".into()
            }
        );
    }

    #[test]
    fn other_service_errors_are_transport_failures() {
        for err in [ServiceError::TransportClosed, ServiceError::UnexpectedResponse] {
            assert!(matches!(
                outcome_of(Ok(Err(err))),
                Outcome::TransportError(TransportError::Disconnected(_))
            ));
        }
    }

    #[test]
    fn interrupted_calls_are_transport_failures() {
        assert_eq!(
            outcome_of(Err(Interrupted::TimedOut(Duration::from_secs(180)))),
            Outcome::TransportError(TransportError::TimedOut(Duration::from_secs(180)))
        );
        assert_eq!(
            outcome_of(Err(Interrupted::Cancelled)),
            Outcome::TransportError(TransportError::Cancelled)
        );
    }

    #[test]
    fn tool_results_are_decoded() {
        let body = json!({"result": {"status": {"code": 2509, "description": "array not found"}}});
        let rejected = CallToolResult::success(vec![Content::text(body.to_string())]);
        assert_eq!(
            outcome_of(Ok(Ok(rejected))),
            Outcome::ApplicationError {
                code: 2509,
                message: "array not found".into()
            }
        );

        let ok = json!({"result": {"status": {"code": 0}}});
        let accepted = CallToolResult::success(vec![Content::text(ok.to_string())]);
        assert_eq!(outcome_of(Ok(Ok(accepted))), Outcome::Success(ok));

        let flagged = CallToolResult::error(vec![Content::text("bridge refused ADDDEVICE")]);
        assert_eq!(
            outcome_of(Ok(Ok(flagged))),
            Outcome::ApplicationError {
                code: TOOL_ERROR_CODE,
                message: "bridge refused ADDDEVICE".into()
            }
        );
    }

    #[test]
    fn text_content_with_status_envelope() {
        let body = json!({"result": {"status": {"code": 0, "description": "done"}}});
        let result = json!({"content": [{"type": "text", "text": body.to_string()}], "isError": false});
        assert_eq!(decode_tool_result(result), Outcome::Success(body));
    }

    #[test]
    fn non_zero_status_is_rejection() {
        let body = json!({"result": {"status": {"code": 2509, "description": "array not found"}}});
        let result = json!({"content": [{"type": "text", "text": body.to_string()}]});
        assert_eq!(
            decode_tool_result(result),
            Outcome::ApplicationError {
                code: 2509,
                message: "array not found".into()
            }
        );
    }

    #[test]
    fn is_error_with_plain_text() {
        let result = json!({"content": [{"type": "text", "text": "unknown tool ADDDEVICE"}], "isError": true});
        assert_eq!(
            decode_tool_result(result),
            Outcome::ApplicationError {
                code: TOOL_ERROR_CODE,
                message: "unknown tool ADDDEVICE".into()
            }
        );
    }

    #[test]
    fn structured_content_preferred() {
        let structured = json!({"result": {"status": {"code": 0}, "data": {"arrays": []}}});
        let result = json!({"content": [{"type": "text", "text": "summary"}], "structuredContent": structured});
        assert_eq!(decode_tool_result(result), Outcome::Success(structured));
    }

    #[test]
    fn empty_content_yields_whole_result() {
        let result = json!({"content": []});
        assert_eq!(decode_tool_result(result.clone()), Outcome::Success(result));
    }
}

/*!
render.rs - request and outcome traces.

Every dispatched invocation produces two blocks, in this order:

  request trace   the request exactly as sent, every declared field present
  outcome trace   success payload | remote rejection | transport failure

JSON mode (one document per line):
  {"trace":"request","request":{...}}
  {"trace":"outcome","status":"ok","response":{...}}
  {"trace":"outcome","status":"rejected","code":2509,"message":"..."}
  {"trace":"outcome","status":"unreachable","message":"could not reach storage service","cause":"..."}

Human mode: a framed header per block followed by pretty JSON (success) or
the remote message as received (rejection).

Rendering is a pure function of its input and the style, so rendering the
same value twice yields the same bytes. Serialization failures surface as
`RenderError`, never as an empty block.
*/

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use super::format::{Role, StyleOptions, box_header, color, tagged};
use crate::manager::Outcome;

/// Fixed wording for transport failures; never used for rejections.
pub const UNREACHABLE: &str = "could not reach storage service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Json,
    Human,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {what}: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Renderer {
    mode: Mode,
    style: StyleOptions,
}

impl Renderer {
    pub fn new(mode: Mode, style: StyleOptions) -> Self {
        Renderer { mode, style }
    }

    /* ---- request trace ---- */

    pub fn render_request<T: Serialize + ?Sized>(&self, request: &T) -> Result<String, RenderError> {
        const WHAT: &str = "request trace";
        let value = serde_json::to_value(request)
            .map_err(|source| RenderError::Serialize { what: WHAT, source })?;
        match self.mode {
            Mode::Json => line(&json!({"trace": "request", "request": value}), WHAT),
            Mode::Human => {
                let header = box_header(
                    tagged("request", "Request", &self.style),
                    value.get("command").and_then(Value::as_str),
                    Role::Primary,
                    &self.style,
                );
                Ok(format!("{header}\n{}", pretty(&value, WHAT)?))
            }
        }
    }

    /* ---- outcome trace ---- */

    pub fn render_outcome(&self, outcome: &Outcome) -> Result<String, RenderError> {
        const WHAT: &str = "outcome trace";
        match self.mode {
            Mode::Json => {
                let doc = match outcome {
                    Outcome::Success(payload) => {
                        json!({"trace": "outcome", "status": "ok", "response": payload})
                    }
                    Outcome::ApplicationError { code, message } => json!({
                        "trace": "outcome",
                        "status": "rejected",
                        "code": code,
                        "message": message,
                    }),
                    Outcome::TransportError(cause) => json!({
                        "trace": "outcome",
                        "status": "unreachable",
                        "message": UNREACHABLE,
                        "cause": cause.to_string(),
                    }),
                };
                line(&doc, WHAT)
            }
            Mode::Human => match outcome {
                Outcome::Success(payload) => {
                    let header = box_header(
                        tagged("success", "Success", &self.style),
                        None::<&str>,
                        Role::Success,
                        &self.style,
                    );
                    Ok(format!("{header}\n{}", pretty(payload, WHAT)?))
                }
                Outcome::ApplicationError { code, message } => {
                    let header = box_header(
                        tagged("error", "Rejected by storage service", &self.style),
                        Some(format!("code {code}")),
                        Role::Error,
                        &self.style,
                    );
                    Ok(format!("{header}\n{message}"))
                }
                Outcome::TransportError(cause) => {
                    let header = box_header(
                        tagged("error", UNREACHABLE, &self.style),
                        None::<&str>,
                        Role::Error,
                        &self.style,
                    );
                    Ok(format!(
                        "{header}\n{}\n{}",
                        color(Role::Warning, cause.to_string(), &self.style),
                        color(
                            Role::Dim,
                            tagged(
                                "info",
                                "The operation may or may not have taken effect.",
                                &self.style
                            ),
                            &self.style
                        ),
                    ))
                }
            },
        }
    }

    /* ---- abort and failure notices ---- */

    /// Message for an invocation that stopped before dispatch.
    pub fn render_abort(&self, stage: &str, message: &str, hint: Option<&str>) -> String {
        match self.mode {
            Mode::Json => json!({"status": "error", "stage": stage, "error": message}).to_string(),
            Mode::Human => {
                let header = box_header(
                    tagged("error", format!("{stage} error"), &self.style),
                    Some(color(Role::Error, message, &self.style)),
                    Role::Primary,
                    &self.style,
                );
                match hint {
                    Some(h) => format!("{header}\n{}", color(Role::Dim, tagged("info", h, &self.style), &self.style)),
                    None => header,
                }
            }
        }
    }

    /// Written in place of a trace that could not be rendered.
    pub fn render_failure(&self, trace: &str, err: &RenderError) -> String {
        match self.mode {
            Mode::Json => {
                json!({"trace": trace, "status": "render_error", "error": err.to_string()}).to_string()
            }
            Mode::Human => color(
                Role::Error,
                tagged("error", format!("could not render {trace} trace: {err}"), &self.style),
                &self.style,
            ),
        }
    }
}

fn line(doc: &Value, what: &'static str) -> Result<String, RenderError> {
    serde_json::to_string(doc).map_err(|source| RenderError::Serialize { what, source })
}

fn pretty(doc: &Value, what: &'static str) -> Result<String, RenderError> {
    serde_json::to_string_pretty(doc).map_err(|source| RenderError::Serialize { what, source })
}

/* -------------------------------------------------------------------------- */
/* Tests                                                                      */
/* -------------------------------------------------------------------------- */

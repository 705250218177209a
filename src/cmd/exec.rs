/*!
`exec.rs`

Command executor: runs one invocation through the pipeline

  Init -> Validated -> Built -> Dispatched -> Rendered -> Done
    \________\__________\_________________________> Aborted

  Init -> Validated     field validator        (UsageError      -> exit 1)
  Validated -> Built    request builder        (BuildError      -> exit 1)
  Built -> Dispatched   acquire handle, call   (ConnectionError -> exit 3,
                                                bad target setting -> exit 1)
  Dispatched -> Rendered  request trace, then outcome trace
  Rendered -> Done      exit status from the outcome (0 / 2 / 3)

Aborts write a single message to the error stream and nothing to the trace
stream. Once a request has been dispatched both traces are always written,
request first. If the request trace cannot be rendered a failure notice
takes its place and the outcome is still rendered.
*/

use std::io::Write;
use std::process::ExitCode;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::args::BoundArguments;
use super::build::{BuildError, build};
use super::catalog::CommandDescriptor;
use super::render::{RenderError, Renderer};
use super::request::Request;
use super::validate::{UsageError, validate};
use crate::manager::{ConnectionError, Connect, Manager, Outcome, invoke};

/* -------------------------------------------------------------------------- */
/* Exit status                                                                */
/* -------------------------------------------------------------------------- */

/// Process exit status. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitStatus {
    Success = 0,
    Usage = 1,
    Rejected = 2,
    Unreachable = 3,
    RenderFailure = 4,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

/* -------------------------------------------------------------------------- */
/* Invocation / state                                                         */
/* -------------------------------------------------------------------------- */

/// One operation plus the arguments bound for this run.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub descriptor: &'static CommandDescriptor,
    pub args: BoundArguments,
}

impl Invocation {
    pub fn new(descriptor: &'static CommandDescriptor, args: BoundArguments) -> Self {
        Invocation { descriptor, args }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Validated,
    Built,
    Dispatched,
    Rendered,
    Done,
    Aborted,
}

/// Why an invocation stopped before dispatch.
#[derive(Debug, Error)]
pub enum Abort {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("cancelled by operator; {skipped} remaining entries skipped")]
    Cancelled { skipped: usize },
}

impl Abort {
    pub fn status(&self) -> ExitStatus {
        match self {
            Abort::Usage(_) | Abort::Build(_) => ExitStatus::Usage,
            Abort::Connection(e) if e.is_config() => ExitStatus::Usage,
            Abort::Connection(_) | Abort::Cancelled { .. } => ExitStatus::Unreachable,
        }
    }

    fn stage(&self) -> &'static str {
        match self {
            Abort::Usage(_) => "usage",
            Abort::Build(_) => "build",
            Abort::Connection(_) => "connection",
            Abort::Cancelled { .. } => "cancelled",
        }
    }
}

/// Final state of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub stage: Stage,
    pub status: ExitStatus,
}

/* -------------------------------------------------------------------------- */
/* Executor                                                                   */
/* -------------------------------------------------------------------------- */

/// Drives one invocation. `out` receives the traces, `err` abort messages.
pub struct Executor<'r, O, E> {
    renderer: &'r Renderer,
    out: O,
    err: E,
    stage: Stage,
    hint: Option<String>,
}

impl<'r, O: Write, E: Write> Executor<'r, O, E> {
    pub fn new(renderer: &'r Renderer, out: O, err: E) -> Self {
        Executor {
            renderer,
            out,
            err,
            stage: Stage::Init,
            hint: None,
        }
    }

    /// Full pipeline for a single invocation with its own connection.
    pub async fn run<C: Connect>(mut self, invocation: &Invocation, connector: &C) -> Report {
        let request = match self.prepare(invocation) {
            Ok(request) => request,
            Err(abort) => return self.abort(abort),
        };
        let manager = match connector.connect().await {
            Ok(manager) => manager,
            Err(e) => return self.abort(e.into()),
        };
        let report = self.dispatch(&manager, request).await;
        manager.shutdown().await;
        report
    }

    /// Init -> Validated -> Built.
    pub fn prepare(&mut self, invocation: &Invocation) -> Result<Request, Abort> {
        let descriptor = invocation.descriptor;
        self.hint = Some(format!("Run 'storctl {} --help' for usage.", descriptor.path()));

        validate(descriptor, &invocation.args)?;
        self.advance(Stage::Validated);

        let request = build(descriptor.kind, &invocation.args)?;
        self.advance(Stage::Built);
        Ok(request)
    }

    /// Built -> Dispatched -> Rendered -> Done, over an already acquired handle.
    pub async fn dispatch<M: Manager>(&mut self, manager: &M, request: Request) -> Report {
        let command = request.command;
        info!(command, operation = %request.kind(), "dispatching request");
        let exchange = invoke(manager, request).await;
        self.advance(Stage::Dispatched);

        match &exchange.outcome {
            Outcome::Success(_) => info!(command, "request succeeded"),
            Outcome::ApplicationError { code, message } => {
                warn!(command, code, %message, "request rejected by storage service")
            }
            Outcome::TransportError(cause) => warn!(command, %cause, "request did not complete"),
        }

        let rendered = emit_traces(self.renderer, &mut self.out, &exchange.request, &exchange.outcome);
        self.advance(Stage::Rendered);

        let status = match rendered {
            Ok(()) => exchange.outcome.exit_status(),
            Err(e) => {
                error!(command, error = %e, "trace rendering failed");
                let _ = writeln!(self.err, "{}", self.renderer.render_failure("trace", &e));
                match exchange.outcome.exit_status() {
                    ExitStatus::Success => ExitStatus::RenderFailure,
                    other => other,
                }
            }
        };
        self.advance(Stage::Done);
        Report {
            stage: self.stage,
            status,
        }
    }

    /// Any non-terminal stage -> Aborted. Writes only to the error stream.
    pub fn abort(mut self, abort: Abort) -> Report {
        debug!(from = ?self.stage, reason = %abort, "aborting invocation");
        self.stage = Stage::Aborted;
        let hint = match abort {
            Abort::Usage(_) | Abort::Build(_) => self.hint.as_deref(),
            Abort::Connection(_) | Abort::Cancelled { .. } => None,
        };
        let text = self
            .renderer
            .render_abort(abort.stage(), &abort.to_string(), hint);
        if let Err(e) = writeln!(self.err, "{text}").and_then(|_| self.err.flush()) {
            error!(error = %e, "could not write abort message");
        }
        Report {
            stage: self.stage,
            status: abort.status(),
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(from = ?self.stage, to = ?next, "stage transition");
        self.stage = next;
    }
}

/// Write the request trace, then the outcome trace.
///
/// A block that fails to render is replaced by a failure notice and the next
/// block is still attempted. Returns the first failure.
pub fn emit_traces<T, W>(
    renderer: &Renderer,
    out: &mut W,
    request: &T,
    outcome: &Outcome,
) -> Result<(), RenderError>
where
    T: serde::Serialize + ?Sized,
    W: Write,
{
    let mut first: Option<RenderError> = None;

    let request_block = renderer.render_request(request).unwrap_or_else(|e| {
        let notice = renderer.render_failure("request", &e);
        first.get_or_insert(e);
        notice
    });
    if let Err(source) = writeln!(out, "{request_block}") {
        first.get_or_insert(RenderError::Write {
            what: "request trace",
            source,
        });
    }

    let outcome_block = renderer.render_outcome(outcome).unwrap_or_else(|e| {
        let notice = renderer.render_failure("outcome", &e);
        first.get_or_insert(e);
        notice
    });
    if let Err(source) = writeln!(out, "{outcome_block}").and_then(|_| out.flush()) {
        first.get_or_insert(RenderError::Write {
            what: "outcome trace",
            source,
        });
    }

    match first {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

/* -------------------------------------------------------------------------- */
/* Tests                                                                      */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cmd::catalog::{CATALOG, OperationKind, descriptor};
    use crate::cmd::format::StyleOptions;
    use crate::cmd::render::{Mode, UNREACHABLE};
    use crate::manager::{CancelHandle, CancelSignal, Exchange, TransportError};
    use crate::mcp::McpConnector;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /* ---- test doubles ---- */

    /// What the stub service does with every call.
    #[derive(Clone)]
    pub(crate) enum Behavior {
        Succeed(Value),
        Reject(i64, &'static str),
        DropConnection,
        /// Operator hits Ctrl-C while the call is in flight.
        Interrupt(Arc<CancelHandle>),
    }

    pub(crate) struct StubManager {
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl Manager for StubManager {
        async fn send(&self, request: Request) -> Exchange {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = match &self.behavior {
                Behavior::Succeed(payload) => Outcome::Success(payload.clone()),
                Behavior::Reject(code, message) => Outcome::ApplicationError {
                    code: *code,
                    message: message.to_string(),
                },
                Behavior::DropConnection => {
                    Outcome::TransportError(TransportError::Disconnected("connection reset by peer".into()))
                }
                Behavior::Interrupt(handle) => {
                    handle.cancel();
                    Outcome::TransportError(TransportError::Cancelled)
                }
            };
            Exchange { request, outcome }
        }

        async fn shutdown(self) {}
    }

    /// Hands out stub managers and counts connections and calls.
    pub(crate) struct StubConnector {
        pub behavior: Behavior,
        pub refuse: bool,
        pub calls: Arc<AtomicUsize>,
        pub connects: Arc<AtomicUsize>,
    }

    impl StubConnector {
        pub fn new(behavior: Behavior) -> Self {
            StubConnector {
                behavior,
                refuse: false,
                calls: Arc::default(),
                connects: Arc::default(),
            }
        }

        pub fn refusing() -> Self {
            StubConnector {
                refuse: true,
                ..StubConnector::new(Behavior::DropConnection)
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    impl Connect for StubConnector {
        type Manager = StubManager;

        async fn connect(&self) -> Result<StubManager, ConnectionError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(ConnectionError::Spawn {
                    target: "stub".into(),
                    reason: "refused".into(),
                });
            }
            Ok(StubManager {
                behavior: self.behavior.clone(),
                calls: self.calls.clone(),
            })
        }
    }

    /* ---- helpers ---- */

    pub(crate) fn json_renderer() -> Renderer {
        Renderer::new(Mode::Json, StyleOptions::plain())
    }

    fn add_spare(pairs: &[(&str, &str)]) -> Invocation {
        let d = descriptor(OperationKind::AddSpare);
        Invocation::new(d, BoundArguments::bind(d, pairs.iter().copied()))
    }

    struct Run {
        report: Report,
        out: String,
        err: String,
    }

    async fn run(renderer: &Renderer, inv: &Invocation, connector: &StubConnector) -> Run {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let report = Executor::new(renderer, &mut out, &mut err)
            .run(inv, connector)
            .await;
        Run {
            report,
            out: String::from_utf8(out).unwrap(),
            err: String::from_utf8(err).unwrap(),
        }
    }

    fn traces(out: &str) -> Vec<Value> {
        out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    fn full_args() -> Invocation {
        add_spare(&[("array-name", "array0"), ("spare", "nvme5")])
    }

    /* ---- exit-code scenarios ---- */

    #[tokio::test]
    async fn missing_array_name_is_usage_error_without_trace() {
        let connector = StubConnector::new(Behavior::Succeed(json!({})));
        let r = run(&json_renderer(), &add_spare(&[("spare", "nvme5")]), &connector).await;
        assert_eq!(r.report.status, ExitStatus::Usage);
        assert_eq!(r.report.stage, Stage::Aborted);
        assert!(r.out.is_empty(), "no request trace expected: {}", r.out);
        assert!(r.err.contains("array-name"));
        assert_eq!(connector.calls(), 0);
        assert_eq!(connector.connects(), 0);
    }

    #[tokio::test]
    async fn rejection_exits_two_with_message_verbatim() {
        let connector = StubConnector::new(Behavior::Reject(2509, "array not found"));
        let r = run(&json_renderer(), &full_args(), &connector).await;
        assert_eq!(r.report.status, ExitStatus::Rejected);
        assert_eq!(r.report.stage, Stage::Done);
        let t = traces(&r.out);
        assert_eq!(t.len(), 2);
        assert_eq!(t[0]["trace"], "request");
        assert_eq!(t[1]["message"], "array not found");
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn dropped_connection_exits_three_as_unreachable() {
        let connector = StubConnector::new(Behavior::DropConnection);
        let r = run(&json_renderer(), &full_args(), &connector).await;
        assert_eq!(r.report.status, ExitStatus::Unreachable);
        let t = traces(&r.out);
        assert_eq!(t[0]["request"]["param"]["array"], "array0");
        assert_eq!(t[1]["status"], "unreachable");
        assert_eq!(t[1]["message"], UNREACHABLE);
    }

    #[tokio::test]
    async fn success_exits_zero_with_full_payload() {
        let payload = json!({
            "command": "ADDDEVICE",
            "result": {"status": {"code": 0, "description": "spare added"}, "data": null}
        });
        let connector = StubConnector::new(Behavior::Succeed(payload.clone()));
        let r = run(&json_renderer(), &full_args(), &connector).await;
        assert_eq!(r.report.status, ExitStatus::Success);
        assert_eq!(traces(&r.out)[1]["response"], payload);
        assert!(r.err.is_empty());
    }

    #[tokio::test]
    async fn connection_failure_aborts_before_any_trace() {
        let connector = StubConnector::refusing();
        let r = run(&json_renderer(), &full_args(), &connector).await;
        assert_eq!(r.report.status, ExitStatus::Unreachable);
        assert_eq!(r.report.stage, Stage::Aborted);
        assert!(r.out.is_empty());
        let v: Value = serde_json::from_str(r.err.trim()).unwrap();
        assert_eq!(v["stage"], "connection");
        assert_eq!(connector.calls(), 0);
    }

    #[tokio::test]
    async fn missing_target_is_a_usage_error() {
        let connector = McpConnector::new(None, None, CancelSignal::never());
        let renderer = json_renderer();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let report = Executor::new(&renderer, &mut out, &mut err)
            .run(&full_args(), &connector)
            .await;
        assert_eq!(report.status, ExitStatus::Usage);
        assert_eq!(report.stage, Stage::Aborted);
        assert!(out.is_empty());
        let v: Value = serde_json::from_slice(&err).unwrap();
        assert_eq!(v["stage"], "connection");
        assert!(v["error"].as_str().unwrap().contains("no target"));
    }

    #[test]
    fn unreachable_bridge_stays_exit_three() {
        let spawn = ConnectionError::Spawn {
            target: "pos-bridge".into(),
            reason: "No such file or directory".into(),
        };
        assert_eq!(Abort::from(spawn).status(), ExitStatus::Unreachable);
        assert_eq!(Abort::from(ConnectionError::NoTarget).status(), ExitStatus::Usage);
        assert_eq!(Abort::Cancelled { skipped: 2 }.status(), ExitStatus::Unreachable);
    }

    #[tokio::test]
    async fn build_error_aborts_with_usage_status() {
        let d = descriptor(OperationKind::CreateArray);
        let inv = Invocation::new(
            d,
            BoundArguments::bind(
                d,
                [
                    ("array-name", "array0"),
                    ("buffer", "uram0"),
                    ("data-devs", "nvme0"),
                    ("raid", "RAID10"),
                    ("no-raid", "true"),
                ],
            ),
        );
        let connector = StubConnector::new(Behavior::Succeed(json!({})));
        let r = run(&json_renderer(), &inv, &connector).await;
        assert_eq!(r.report.status, ExitStatus::Usage);
        assert!(r.err.contains("build"));
        assert_eq!(connector.connects(), 0);
    }

    /* ---- invariants ---- */

    #[tokio::test]
    async fn every_required_field_blocks_the_network() {
        for d in CATALOG {
            for p in d.params.iter().filter(|p| p.required) {
                let pairs = d
                    .params
                    .iter()
                    .filter(|q| q.required && q.name != p.name)
                    .map(|q| (q.name, "8"));
                let inv = Invocation::new(d, BoundArguments::bind(d, pairs));
                let connector = StubConnector::new(Behavior::Succeed(json!({})));
                let r = run(&json_renderer(), &inv, &connector).await;
                assert_eq!(r.report.status, ExitStatus::Usage, "{} --{}", d.path(), p.name);
                assert_eq!(connector.calls(), 0);
            }
        }
    }

    #[tokio::test]
    async fn request_trace_precedes_outcome_for_every_variant() {
        let behaviors = [
            Behavior::Succeed(json!({"ok": true})),
            Behavior::Reject(1, "no"),
            Behavior::DropConnection,
        ];
        for behavior in behaviors {
            for mode in [Mode::Json, Mode::Human] {
                let renderer = Renderer::new(mode, StyleOptions::plain());
                let connector = StubConnector::new(behavior.clone());
                let r = run(&renderer, &full_args(), &connector).await;
                match mode {
                    Mode::Json => {
                        let t = traces(&r.out);
                        assert_eq!(t.len(), 2);
                        assert_eq!(t[0]["trace"], "request");
                        assert_eq!(t[1]["trace"], "outcome");
                    }
                    Mode::Human => {
                        let request_at = r.out.find("Request").unwrap();
                        let outcome_at = ["Success", "Rejected", UNREACHABLE]
                            .iter()
                            .filter_map(|m| r.out.find(m))
                            .min()
                            .unwrap();
                        assert!(request_at < outcome_at, "{}", r.out);
                        assert_eq!(r.out.matches("Request").count(), 1);
                    }
                }
                assert_eq!(connector.calls(), 1);
            }
        }
    }

    /* ---- render failures ---- */

    struct Unencodable;

    impl serde::Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("request poisoned"))
        }
    }

    #[test]
    fn request_trace_failure_still_renders_outcome() {
        let renderer = json_renderer();
        let mut out = Vec::new();
        let outcome = Outcome::ApplicationError {
            code: 2509,
            message: "array not found".into(),
        };
        let err = emit_traces(&renderer, &mut out, &Unencodable, &outcome).unwrap_err();
        assert!(matches!(err, RenderError::Serialize { .. }));

        let t = traces(&String::from_utf8(out).unwrap());
        assert_eq!(t.len(), 2);
        assert_eq!(t[0]["trace"], "request");
        assert_eq!(t[0]["status"], "render_error");
        assert!(t[0]["error"].as_str().unwrap().contains("request poisoned"));
        assert_eq!(t[1]["message"], "array not found");
    }

    /// Accepts nothing.
    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unwritable_trace_after_success_is_render_failure() {
        let renderer = json_renderer();
        let connector = StubConnector::new(Behavior::Succeed(json!({})));
        let mut err = Vec::new();
        let report = Executor::new(&renderer, ClosedPipe, &mut err)
            .run(&full_args(), &connector)
            .await;
        assert_eq!(report.status, ExitStatus::RenderFailure);
        assert!(String::from_utf8(err).unwrap().contains("render_error"));
    }

    #[tokio::test]
    async fn unwritable_trace_keeps_rejection_status() {
        let renderer = json_renderer();
        let connector = StubConnector::new(Behavior::Reject(3, "busy"));
        let report = Executor::new(&renderer, ClosedPipe, Vec::new())
            .run(&full_args(), &connector)
            .await;
        assert_eq!(report.status, ExitStatus::Rejected);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::Usage.code(), 1);
        assert_eq!(ExitStatus::Rejected.code(), 2);
        assert_eq!(ExitStatus::Unreachable.code(), 3);
        assert_eq!(ExitStatus::RenderFailure.code(), 4);
        assert!(ExitStatus::Unreachable > ExitStatus::Usage);
    }
}

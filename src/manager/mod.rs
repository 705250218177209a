//! Manager facade: the client-side capability interface to the storage
//! management service.
//!
//! `Manager` exposes one method per operation kind. Each performs exactly one
//! call through the transport hook `send` and always hands back the request
//! it sent together with the `Outcome`. `Connect` produces a manager handle;
//! failing to obtain one is a `ConnectionError`, distinct from a per-call
//! `TransportError`.
//!
//! Nothing here retries.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

use crate::cmd::exec::ExitStatus;
use crate::cmd::request::*;

/* -------------------------------------------------------------------------- */
/* Errors and outcomes                                                        */
/* -------------------------------------------------------------------------- */

/// Handle acquisition failed; no request was attempted.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no target specified (use --target, STORCTL_TARGET or a config file)")]
    NoTarget,

    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("remote targets are not supported yet: {0}")]
    Unsupported(String),

    #[error("failed to start storage service bridge '{target}': {reason}")]
    Spawn { target: String, reason: String },

    #[error("timed out after {timeout:?} connecting to '{target}'")]
    Timeout { target: String, timeout: Duration },

    #[error("cancelled while connecting to '{0}'")]
    Cancelled(String),
}

impl ConnectionError {
    /// The target setting itself is wrong; retrying cannot help.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            ConnectionError::NoTarget
                | ConnectionError::InvalidTarget { .. }
                | ConnectionError::Unsupported(_)
        )
    }
}

/// The call was attempted but did not complete; the remote effect is unknown.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection lost: {0}")]
    Disconnected(String),

    #[error("no response within {0:?}")]
    TimedOut(Duration),

    #[error("cancelled before a response arrived")]
    Cancelled,

    #[error("request could not be encoded, nothing was sent: {0}")]
    Encode(String),

    #[error("response could not be decoded: {0}")]
    Malformed(String),
}

/// Result of one dispatched request. Exactly one variant per invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    TransportError(TransportError),
    ApplicationError { code: i64, message: String },
}

impl Outcome {
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            Outcome::Success(_) => ExitStatus::Success,
            Outcome::ApplicationError { .. } => ExitStatus::Rejected,
            Outcome::TransportError(_) => ExitStatus::Unreachable,
        }
    }
}

/// What `send` returns: the request as sent, and what came of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub request: Request,
    pub outcome: Outcome,
}

/* -------------------------------------------------------------------------- */
/* Facade traits                                                              */
/* -------------------------------------------------------------------------- */

/// A connected handle to the storage service.
///
/// Implementors provide `send` (one network call, no retry) and `shutdown`;
/// the per-operation methods route through `send`.
pub trait Manager {
    fn send(&self, request: Request) -> impl Future<Output = Exchange>;

    fn shutdown(self) -> impl Future<Output = ()>;

    fn create_array(&self, p: CreateArrayParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::CreateArray(p)))
    }
    fn delete_array(&self, p: ArrayName) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::DeleteArray(p)))
    }
    fn mount_array(&self, p: MountArrayParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::MountArray(p)))
    }
    fn unmount_array(&self, p: ArrayName) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::UnmountArray(p)))
    }
    fn add_spare(&self, p: SpareParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::AddSpare(p)))
    }
    fn remove_spare(&self, p: SpareParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::RemoveSpare(p)))
    }
    fn replace_device(&self, p: ReplaceDeviceParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::ReplaceDevice(p)))
    }
    fn array_info(&self, p: ArrayName) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::ArrayInfo(p)))
    }
    fn list_array(&self) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::ListArray(Empty {})))
    }
    fn create_device(&self, p: CreateDeviceParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::CreateDevice(p)))
    }
    fn scan_device(&self) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::ScanDevice(Empty {})))
    }
    fn list_device(&self) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::ListDevice(Empty {})))
    }
    fn smart_log(&self, p: DeviceParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::SmartLog(p)))
    }
    fn create_volume(&self, p: CreateVolumeParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::CreateVolume(p)))
    }
    fn delete_volume(&self, p: VolumeParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::DeleteVolume(p)))
    }
    fn mount_volume(&self, p: MountVolumeParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::MountVolume(p)))
    }
    fn unmount_volume(&self, p: VolumeParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::UnmountVolume(p)))
    }
    fn rename_volume(&self, p: RenameVolumeParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::RenameVolume(p)))
    }
    fn list_volume(&self, p: ArrayRef) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::ListVolume(p)))
    }
    fn create_subsystem(&self, p: CreateSubsystemParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::CreateSubsystem(p)))
    }
    fn delete_subsystem(&self, p: SubsystemParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::DeleteSubsystem(p)))
    }
    fn add_listener(&self, p: AddListenerParam) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::AddListener(p)))
    }
    fn list_subsystem(&self) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::ListSubsystem(Empty {})))
    }
    fn system_info(&self) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::SystemInfo(Empty {})))
    }
    fn stop_system(&self) -> impl Future<Output = Exchange> {
        self.send(Request::new(Param::StopSystem(Empty {})))
    }
}

/// Produces a connected `Manager`.
pub trait Connect {
    type Manager: Manager;

    fn connect(&self) -> impl Future<Output = Result<Self::Manager, ConnectionError>>;
}

/// Route a built request to the facade method of its operation kind.
pub async fn invoke<M: Manager>(manager: &M, request: Request) -> Exchange {
    match request.param {
        Param::CreateArray(p) => manager.create_array(p).await,
        Param::DeleteArray(p) => manager.delete_array(p).await,
        Param::MountArray(p) => manager.mount_array(p).await,
        Param::UnmountArray(p) => manager.unmount_array(p).await,
        Param::AddSpare(p) => manager.add_spare(p).await,
        Param::RemoveSpare(p) => manager.remove_spare(p).await,
        Param::ReplaceDevice(p) => manager.replace_device(p).await,
        Param::ArrayInfo(p) => manager.array_info(p).await,
        Param::ListArray(_) => manager.list_array().await,
        Param::CreateDevice(p) => manager.create_device(p).await,
        Param::ScanDevice(_) => manager.scan_device().await,
        Param::ListDevice(_) => manager.list_device().await,
        Param::SmartLog(p) => manager.smart_log(p).await,
        Param::CreateVolume(p) => manager.create_volume(p).await,
        Param::DeleteVolume(p) => manager.delete_volume(p).await,
        Param::MountVolume(p) => manager.mount_volume(p).await,
        Param::UnmountVolume(p) => manager.unmount_volume(p).await,
        Param::RenameVolume(p) => manager.rename_volume(p).await,
        Param::ListVolume(p) => manager.list_volume(p).await,
        Param::CreateSubsystem(p) => manager.create_subsystem(p).await,
        Param::DeleteSubsystem(p) => manager.delete_subsystem(p).await,
        Param::AddListener(p) => manager.add_listener(p).await,
        Param::ListSubsystem(_) => manager.list_subsystem().await,
        Param::SystemInfo(_) => manager.system_info().await,
        Param::StopSystem(_) => manager.stop_system().await,
    }
}

/* -------------------------------------------------------------------------- */
/* Shared transport helpers                                                   */
/* -------------------------------------------------------------------------- */

/// Why a bounded wait ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut(Duration),
    Cancelled,
}

impl From<Interrupted> for TransportError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::TimedOut(d) => TransportError::TimedOut(d),
            Interrupted::Cancelled => TransportError::Cancelled,
        }
    }
}

/// Await `call`, giving up after `timeout` (if any) or when `cancel` resolves.
pub async fn bounded<T>(
    call: impl Future<Output = T>,
    timeout: Option<Duration>,
    cancel: impl Future<Output = ()>,
) -> Result<T, Interrupted> {
    let deadline = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        value = call => Ok(value),
        _ = cancel => Err(Interrupted::Cancelled),
        _ = deadline => Err(Interrupted::TimedOut(timeout.unwrap_or_default())),
    }
}

/// Sets the shared cancellation flag. Owned by whoever listens for Ctrl-C.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Read side of the cancellation flag, shared by every call of a run.
///
/// Once set it stays set, so a Ctrl-C seen during one call also stops
/// everything after it.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal nothing can set.
    pub fn never() -> Self {
        cancel_pair().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone unset.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|set| *set).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Classify a decoded response payload.
///
/// The storage service reports its own verdict in `result.status`; a
/// non-zero `code` is a rejection even when the call itself succeeded.
pub fn classify(payload: Value) -> Outcome {
    match status_code(&payload) {
        Some(code) if code != 0 => Outcome::ApplicationError {
            code,
            message: status_message(&payload),
        },
        _ => Outcome::Success(payload),
    }
}

pub fn status_code(payload: &Value) -> Option<i64> {
    payload.pointer("/result/status/code")?.as_i64()
}

/// The remote description, verbatim; the whole payload when there is none.
pub fn status_message(payload: &Value) -> String {
    match payload.pointer("/result/status/description") {
        Some(Value::String(s)) => s.clone(),
        _ => match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

/*!
batch.rs - several operations from one file, one connection.

File format (YAML or JSON, chosen by extension):

  - command: array addspare
    args:
      array-name: array0
      spare: nvme5
  - command: array info
    args: { array-name: array0 }

Entries run in file order, each through the full executor pipeline with its
own request. The connection is acquired on the first entry that reaches
dispatch and shared by the rest. A connection failure stops the batch, and
so does the cancel signal, which is checked before every entry.
The batch exits with the most severe status any entry produced.
*/

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::args::BoundArguments;
use super::catalog::{self, Group};
use super::exec::{Abort, ExitStatus, Executor, Invocation};
use super::render::Renderer;
use super::validate::UsageError;
use crate::manager::{CancelSignal, Connect, Manager};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchEntry {
    /// `"<group> <operation>"`, e.g. `"array addspare"`.
    pub command: String,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

impl BatchEntry {
    /// Resolve the command and bind its arguments.
    ///
    /// Scalars are bound by their text form; `null` counts as not supplied.
    /// A list of scalars is bound comma-joined, like `--spare nvme5,nvme6`.
    pub fn invocation(&self) -> Result<Invocation, UsageError> {
        let unknown = || UsageError::UnknownCommand(self.command.clone());
        let mut words = self.command.split_whitespace();
        let (Some(group), Some(op), None) = (words.next(), words.next(), words.next()) else {
            return Err(unknown());
        };
        let group = Group::from_str_ci(group).ok_or_else(unknown)?;
        let descriptor = catalog::find(group, op).ok_or_else(unknown)?;

        let mut supplied = Vec::with_capacity(self.args.len());
        for (name, value) in &self.args {
            if let Some(text) = bound_text(name, value)? {
                supplied.push((name.clone(), text));
            }
        }
        Ok(Invocation::new(descriptor, BoundArguments::bind(descriptor, supplied)))
    }
}

fn bound_text(name: &str, value: &Value) -> Result<Option<String>, UsageError> {
    let unsupported = |shape| UsageError::UnsupportedValue {
        name: name.to_string(),
        shape,
    };
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Object(_) => return Err(unsupported("map")),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Bool(_) | Value::Number(_) => Ok(item.to_string()),
                Value::Null => Err(unsupported("null list item")),
                Value::Array(_) | Value::Object(_) => Err(unsupported("nested list or map")),
            })
            .collect::<Result<Vec<_>, _>>()?
            .join(","),
    };
    Ok(Some(text))
}

pub fn load(path: &Path) -> Result<Vec<BatchEntry>> {
    crate::config::load_document(path)
}

/// Run every entry; returns the most severe exit status.
pub async fn run<C, O, E>(
    entries: &[BatchEntry],
    connector: &C,
    cancel: &CancelSignal,
    renderer: &Renderer,
    mut out: O,
    mut err: E,
) -> ExitStatus
where
    C: Connect,
    O: Write,
    E: Write,
{
    let mut manager: Option<C::Manager> = None;
    let mut worst = ExitStatus::Success;

    for (index, entry) in entries.iter().enumerate() {
        let mut executor = Executor::new(renderer, &mut out, &mut err);
        if cancel.is_cancelled() {
            let skipped = entries.len() - index;
            warn!(index, skipped, "batch cancelled");
            worst = worst.max(executor.abort(Abort::Cancelled { skipped }).status);
            break;
        }
        info!(index, command = %entry.command, "batch entry");

        let request = match entry
            .invocation()
            .map_err(Abort::from)
            .and_then(|inv| executor.prepare(&inv))
        {
            Ok(request) => request,
            Err(abort) => {
                worst = worst.max(executor.abort(abort).status);
                continue;
            }
        };

        if manager.is_none() {
            match connector.connect().await {
                Ok(m) => manager = Some(m),
                Err(e) => {
                    warn!(index, "connection failed; remaining entries skipped");
                    worst = worst.max(executor.abort(e.into()).status);
                    break;
                }
            }
        }
        let Some(handle) = manager.as_ref() else {
            break;
        };
        worst = worst.max(executor.dispatch(handle, request).await.status);
    }

    if let Some(m) = manager {
        m.shutdown().await;
    }
    worst
}

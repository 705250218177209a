use std::io::{Write, stderr, stdout};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::FromArgMatches;

mod cmd;
mod config;
mod manager;
mod mcp;
mod utils;

use cmd::format::StyleOptions;
use cmd::render::{Mode, Renderer};
use cmd::{ExitStatus, Executor, Selection};
use config::{GlobalArgs, Settings};
use manager::cancel_pair;
use mcp::McpConnector;

/// storctl - operator CLI for the storage array management service.
///
/// Command layout:
///   storctl [GLOBAL FLAGS] <group> <operation> [FLAGS]
///   storctl [GLOBAL FLAGS] batch <FILE>
///
/// Groups: array, device, volume, subsystem, system.
///
/// Global flags / env (given before the group):
///   -v / -vv        Increase verbosity (RUST_LOG overrides)
///   -q / --quiet    Errors only
///   -t / --target   Bridge command line (or STORCTL_TARGET)
///   --timeout SECS  Per-call timeout, 0 disables (default 180)
///   --json          One JSON document per trace line
///   --config PATH   YAML/JSON settings file (or STORCTL_CONFIG)
///
/// Exit codes:
///   0 success, 1 usage/build error, 2 rejected by the storage service,
///   3 transport or connection failure, 4 trace rendering failed after success
///
/// Examples:
///   storctl -t "pos-bridge --stdio" array addspare -a array0 -s nvme5
///   storctl --json -t "pos-bridge --stdio" volume create -v vol1 -a array0 --size 10GB
///   storctl -t "pos-bridge --stdio" batch ops.yaml
fn main() -> ExitCode {
    let matches = match cmd::build_cli().try_get_matches() {
        Ok(m) => m,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitStatus::Usage.into()
            } else {
                ExitStatus::Success.into()
            };
        }
    };

    match run(&matches) {
        Ok(status) => status.into(),
        Err(e) => {
            let _ = writeln!(stderr(), "storctl: {e:#}");
            ExitStatus::Usage.into()
        }
    }
}

fn run(matches: &clap::ArgMatches) -> Result<ExitStatus> {
    let globals = GlobalArgs::from_arg_matches(matches).context("failed to read global flags")?;
    utils::init_logging(utils::derive_level(globals.verbose, globals.quiet));

    let settings = Settings::resolve(&globals, |key| std::env::var(key).ok())?;
    tracing::debug!(?settings, "resolved settings");

    let renderer = if settings.json {
        Renderer::new(Mode::Json, StyleOptions::plain())
    } else {
        Renderer::new(Mode::Human, StyleOptions::detect())
    };

    let selection = cmd::select(matches);
    let runtime = tokio::runtime::Runtime::new().context("failed to create Tokio runtime")?;

    let (handle, cancel) = cancel_pair();
    runtime.spawn(mcp::cancel_on_ctrl_c(handle));
    let connector = McpConnector::new(settings.target, settings.timeout, cancel.clone());

    let status = match selection {
        Ok(Selection::Operation(invocation)) => {
            let executor = Executor::new(&renderer, stdout().lock(), stderr().lock());
            let report = runtime.block_on(executor.run(&invocation, &connector));
            tracing::debug!(stage = ?report.stage, status = ?report.status, "invocation finished");
            report.status
        }
        Ok(Selection::Batch(path)) => {
            let entries = cmd::batch::load(&path)?;
            runtime.block_on(cmd::batch::run(
                &entries,
                &connector,
                &cancel,
                &renderer,
                stdout().lock(),
                stderr().lock(),
            ))
        }
        Err(e) => {
            let text = renderer.render_abort("usage", &e.to_string(), None);
            let _ = writeln!(stderr(), "{text}");
            ExitStatus::Usage
        }
    };
    Ok(status)
}

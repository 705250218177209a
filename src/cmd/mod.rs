/*!
Command layer: everything between parsed flags and the manager facade.

Layout:
  src/cmd/
    mod.rs        (this file)
    catalog.rs    (static CommandDescriptor table, one entry per operation)
    args.rs       (clap tree generated from the catalog + BoundArguments)
    validate.rs   (field validator -> UsageError)
    request.rs    (Request envelope + typed Param per operation)
    build.rs      (request builder -> BuildError)
    format.rs     (human-mode styling helpers)
    render.rs     (request / outcome traces, JSON or human)
    exec.rs       (executor state machine + exit status)
    batch.rs      (several operations over one connection)

Conventions:
  - Each stage owns a closed `thiserror` enum for its failures.
  - Only `exec.rs` and `batch.rs` write to the output streams.
*/

pub mod args;
pub mod batch;
pub mod build;
pub mod catalog;
pub mod exec;
pub mod format;
pub mod render;
pub mod request;
pub mod validate;

pub use args::{Selection, build_cli, select};
pub use exec::{ExitStatus, Executor};

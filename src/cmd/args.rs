/*!
Command tree construction and per-invocation argument binding.

The clap tree is generated from `catalog::CATALOG`: one subcommand per
group, one nested subcommand per operation, one flag per `ParamSpec`.
Required parameters are deliberately *not* marked required in clap so the
field validator owns that check (and its exit status).

  storctl [GLOBAL FLAGS] <group> <operation> [FLAGS]
  storctl [GLOBAL FLAGS] batch <FILE>

Parsed values land in a `BoundArguments` value owned by the invocation;
nothing is stored in globals.
*/

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Args, Command};

use super::catalog::{self, CommandDescriptor, Group, ParamKind, ParamSpec};
use super::exec::Invocation;
use super::validate::UsageError;
use crate::config::GlobalArgs;

/// Name of the batch subcommand.
pub const BATCH: &str = "batch";

/* -------------------------------------------------------------------------- */
/* Bound arguments                                                            */
/* -------------------------------------------------------------------------- */

/// Parameter name -> value supplied for one invocation (or its default).
///
/// Flags are bound as `"true"` when set and left absent otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundArguments {
    values: BTreeMap<String, String>,
}

impl BoundArguments {
    /// Bind supplied pairs, filling declared defaults for anything absent.
    pub fn bind<I, K, V>(descriptor: &CommandDescriptor, supplied: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values: BTreeMap<String, String> = supplied
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for p in descriptor.params {
            if let Some(default) = p.default {
                values
                    .entry(p.name.to_string())
                    .or_insert_with(|| default.to_string());
            }
        }
        BoundArguments { values }
    }

    /// Bind from the matches of one operation subcommand.
    pub fn from_matches(descriptor: &CommandDescriptor, matches: &ArgMatches) -> Self {
        let supplied = descriptor.params.iter().filter_map(|p| match p.kind {
            ParamKind::Flag => matches
                .get_flag(p.name)
                .then(|| (p.name, "true".to_string())),
            ParamKind::Text => matches
                .get_one::<String>(p.name)
                .map(|v| (p.name, v.clone())),
        });
        Self::bind(descriptor, supplied)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/* -------------------------------------------------------------------------- */
/* Command tree                                                               */
/* -------------------------------------------------------------------------- */

pub fn build_cli() -> Command {
    let root = Command::new("storctl")
        .version(env!("CARGO_PKG_VERSION"))
        .about("storctl - operator CLI for the storage array management service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .disable_help_subcommand(true);
    let mut root = GlobalArgs::augment_args(root);

    for group in Group::variants() {
        let mut group_cmd = Command::new(group.name())
            .about(group.about())
            .subcommand_required(true)
            .arg_required_else_help(true);
        for descriptor in catalog::in_group(*group) {
            group_cmd = group_cmd.subcommand(operation_command(descriptor));
        }
        root = root.subcommand(group_cmd);
    }

    root.subcommand(
        Command::new(BATCH)
            .about("Run several operations from a YAML or JSON file over one connection")
            .arg(
                Arg::new("file")
                    .value_name("FILE")
                    .required(true)
                    .value_parser(clap::value_parser!(PathBuf)),
            ),
    )
}

fn operation_command(descriptor: &'static CommandDescriptor) -> Command {
    descriptor.params.iter().fold(
        Command::new(descriptor.name).about(descriptor.about),
        |cmd, p| cmd.arg(param_arg(p)),
    )
}

fn param_arg(p: &'static ParamSpec) -> Arg {
    let help = if p.required {
        format!("{} [required]", p.help)
    } else {
        p.help.to_string()
    };
    let mut arg = Arg::new(p.name).long(p.name).help(help);
    if let Some(short) = p.short {
        arg = arg.short(short);
    }
    match p.kind {
        ParamKind::Flag => arg.action(ArgAction::SetTrue),
        ParamKind::Text => {
            arg = arg.value_name("VALUE").action(ArgAction::Set);
            match p.default {
                Some(default) => arg.default_value(default),
                None => arg,
            }
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Selection                                                                  */
/* -------------------------------------------------------------------------- */

/// What the operator asked for.
#[derive(Debug)]
pub enum Selection {
    Operation(Invocation),
    Batch(PathBuf),
}

pub fn select(matches: &ArgMatches) -> Result<Selection, UsageError> {
    let Some((name, sub)) = matches.subcommand() else {
        return Err(UsageError::UnknownCommand(String::new()));
    };

    if name == BATCH {
        return sub
            .get_one::<PathBuf>("file")
            .cloned()
            .map(Selection::Batch)
            .ok_or(UsageError::MissingRequiredField("file"));
    }

    let group = Group::from_str_ci(name).ok_or_else(|| UsageError::UnknownCommand(name.into()))?;
    let (op, op_matches) = sub
        .subcommand()
        .ok_or_else(|| UsageError::UnknownCommand(name.into()))?;
    let descriptor =
        catalog::find(group, op).ok_or_else(|| UsageError::UnknownCommand(format!("{name} {op}")))?;

    Ok(Selection::Operation(Invocation::new(
        descriptor,
        BoundArguments::from_matches(descriptor, op_matches),
    )))
}

//! CLI runtime for the labeling-service control utility.
//!
//! The runtime parses arguments, opens one kernel session for the lifetime
//! of the invocation, dispatches to the subsystem handlers in
//! `labelctl-core`, and renders the returned structured results. All text
//! rendering, verbosity gating, and exit-code selection happens here; the
//! core only ever sees typed parameters and returns typed results or
//! errors.

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;

use labelctl_core::cipso::{
    CategoryMapping, Definitions, DoiDefinition, DoiKind, LevelMapping,
};
use labelctl_core::map::{MappingUpdate, Mappings, SelectorLabel};
use labelctl_core::mgmt::Management;
use labelctl_core::unlabeled::{StaticLabel, Unlabeled};
use labelctl_core::{Endpoint, Error as CoreError, Session, SessionOptions};

mod cli;
mod render;
mod telemetry;

use cli::{
    CipsoAction, CipsoAddArgs, CipsoKind, Cli, Command, MapAction, MapAddArgs,
    ResolvedOutputFormat, UnlabeledAction,
};
use render::{
    DefinitionReport, DefinitionsReport, HumanRender, MappingsReport, ProtocolsReport,
    UnlabeledReport, VersionReport,
};

/// Failures surfaced to the operator, with their exit-code mapping.
#[derive(Debug, Error)]
enum AppError {
    /// The command itself failed: transport, service refusal, or parameter
    /// validation.
    #[error(transparent)]
    Core(#[from] CoreError),
    /// Rendered output could not be written.
    #[error("failed to write output: {0}")]
    Write(#[source] io::Error),
    /// A report could not be serialised as JSON.
    #[error("failed to serialise output: {0}")]
    Serialise(#[source] serde_json::Error),
    /// The platform has no labeling-service transport.
    #[cfg(not(unix))]
    #[error("this platform does not support the labeling-service transport")]
    UnsupportedPlatform,
}

impl AppError {
    /// Exit codes: 1 usage/validation or local failure, 2 service refusal,
    /// 3 transport failure.
    fn exit_code(&self) -> ExitCode {
        match self {
            Self::Core(CoreError::Service(_)) => ExitCode::from(2),
            Self::Core(CoreError::Transport(_)) => ExitCode::from(3),
            _ => ExitCode::from(1),
        }
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            let _ = writeln!(stderr, "{error}");
            return ExitCode::from(1);
        }
        // Help and version output belong on stdout with a zero exit.
        Err(error) => {
            let _ = write!(stdout, "{error}");
            return ExitCode::SUCCESS;
        }
    };

    telemetry::initialise(cli.verbose);
    let format = cli.output.resolve(io::stdout().is_terminal());
    let timeout = Duration::from_secs(cli.timeout);

    match execute(cli.command, timeout, format, stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "labelctl: {error}");
            error.exit_code()
        }
    }
}

#[cfg(unix)]
fn execute<W: Write>(
    command: Command,
    timeout: Duration,
    format: ResolvedOutputFormat,
    stdout: &mut W,
) -> Result<(), AppError> {
    let mut session = Session::open(SessionOptions { timeout }).map_err(CoreError::from)?;
    dispatch(command, &mut session, format, stdout)
}

#[cfg(not(unix))]
fn execute<W: Write>(
    _command: Command,
    _timeout: Duration,
    _format: ResolvedOutputFormat,
    _stdout: &mut W,
) -> Result<(), AppError> {
    Err(AppError::UnsupportedPlatform)
}

fn dispatch<E: Endpoint, W: Write>(
    command: Command,
    session: &mut Session<E>,
    format: ResolvedOutputFormat,
    stdout: &mut W,
) -> Result<(), AppError> {
    match command {
        Command::Mgmt { action } => match action {
            cli::MgmtAction::Version => {
                let version = Management::open(session)?.version(session)?;
                emit(stdout, format, &VersionReport { version })
            }
            cli::MgmtAction::Protocols => {
                let protocols = Management::open(session)?.protocols(session)?;
                emit(stdout, format, &ProtocolsReport { protocols })
            }
        },
        Command::Map { action } => {
            let mappings = Mappings::open(session)?;
            match action {
                MapAction::List => {
                    let entries = mappings.list(session)?;
                    emit(stdout, format, &MappingsReport { mappings: entries })
                }
                MapAction::Add(args) => {
                    let update = mapping_update(args);
                    mappings.add(session, &update)?;
                    Ok(())
                }
                MapAction::Del { domain } => {
                    mappings.remove(session, domain.as_deref())?;
                    Ok(())
                }
            }
        }
        Command::Unlabeled { action } => {
            let unlabeled = Unlabeled::open(session)?;
            match action {
                UnlabeledAction::List => {
                    let accept = unlabeled.accept(session)?;
                    let static_labels = unlabeled.list_static(session)?;
                    emit(
                        stdout,
                        format,
                        &UnlabeledReport {
                            accept,
                            static_labels,
                        },
                    )
                }
                UnlabeledAction::Accept { state } => {
                    unlabeled.set_accept(session, state.into())?;
                    Ok(())
                }
                UnlabeledAction::Add {
                    address,
                    interface,
                    label,
                } => {
                    let entry = StaticLabel {
                        interface,
                        network: address,
                        context: label,
                    };
                    unlabeled.add_static(session, &entry)?;
                    Ok(())
                }
                UnlabeledAction::Del { address, interface } => {
                    unlabeled.remove_static(session, interface.as_deref(), &address)?;
                    Ok(())
                }
            }
        }
        Command::Cipso { action } => {
            let definitions = Definitions::open(session)?;
            match action {
                CipsoAction::List => {
                    let summaries = definitions.list(session)?;
                    emit(
                        stdout,
                        format,
                        &DefinitionsReport {
                            definitions: summaries,
                        },
                    )
                }
                CipsoAction::Describe { doi } => {
                    let definition = definitions.describe(session, doi)?;
                    emit(stdout, format, &DefinitionReport { definition })
                }
                CipsoAction::Add(args) => {
                    let definition = doi_definition(args);
                    definitions.add(session, &definition)?;
                    Ok(())
                }
                CipsoAction::Del { doi } => {
                    definitions.remove(session, doi)?;
                    Ok(())
                }
            }
        }
    }
}

/// Assembles the core update type from parsed `map add` arguments.
fn mapping_update(args: MapAddArgs) -> MappingUpdate {
    // The argument group guarantees exactly one of `--doi`/`--unlabeled`.
    let label = match args.doi {
        Some(doi) => SelectorLabel::CipsoV4 { doi },
        None => SelectorLabel::Unlabeled,
    };
    MappingUpdate {
        domain: args.domain,
        family: args.family.into(),
        label,
        network: args.address,
    }
}

/// Assembles the core definition type from parsed `cipso add` arguments.
fn doi_definition(args: CipsoAddArgs) -> DoiDefinition {
    let kind = match args.kind {
        CipsoKind::Trans => DoiKind::Translated {
            tags: args.tags,
            levels: args
                .levels
                .into_iter()
                .map(|pair| LevelMapping {
                    local: pair.local,
                    remote: pair.remote,
                })
                .collect(),
            categories: args
                .categories
                .into_iter()
                .map(|pair| CategoryMapping {
                    local: pair.local,
                    remote: pair.remote,
                })
                .collect(),
        },
        CipsoKind::Pass => DoiKind::PassThrough { tags: args.tags },
        CipsoKind::Local => DoiKind::Local,
    };
    DoiDefinition {
        doi: args.doi,
        kind,
    }
}

fn emit<W, R>(stdout: &mut W, format: ResolvedOutputFormat, report: &R) -> Result<(), AppError>
where
    W: Write,
    R: HumanRender + Serialize,
{
    match format {
        ResolvedOutputFormat::Human => stdout
            .write_all(report.render_human().as_bytes())
            .map_err(AppError::Write),
        ResolvedOutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *stdout, report).map_err(AppError::Serialise)?;
            stdout.write_all(b"\n").map_err(AppError::Write)
        }
    }
}

#[cfg(test)]
mod tests;

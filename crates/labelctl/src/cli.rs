//! Command-line argument definitions for the labeling-service control
//! utility.
//!
//! Arguments are parsed into typed values here and handed to the core
//! library as structured parameters; no raw command-line text crosses that
//! boundary.

use std::str::FromStr;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;

use labelctl_core::{AddressFamily, NetworkSelector};

/// Output format selection for command results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Selects `human` for terminal output and `json` for redirected output.
    #[default]
    Auto,
    /// Always render human-readable output.
    Human,
    /// Always emit JSON.
    Json,
}

impl OutputFormat {
    /// Resolves `Auto` against whether stdout is a terminal.
    pub(crate) const fn resolve(self, stdout_is_terminal: bool) -> ResolvedOutputFormat {
        match self {
            Self::Human => ResolvedOutputFormat::Human,
            Self::Json => ResolvedOutputFormat::Json,
            Self::Auto => {
                if stdout_is_terminal {
                    ResolvedOutputFormat::Human
                } else {
                    ResolvedOutputFormat::Json
                }
            }
        }
    }
}

/// A fully resolved output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ResolvedOutputFormat {
    Human,
    Json,
}

/// Command-line interface for the labeling-service control utility.
#[derive(Parser, Debug)]
#[command(name = "labelctl", version, about = "Query and configure the kernel network-labeling service")]
pub(crate) struct Cli {
    /// Increases log verbosity; repeat for trace-level detail.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub(crate) verbose: u8,
    /// Seconds to wait for the labeling service to answer.
    #[arg(short, long, global = true, default_value_t = 10)]
    pub(crate) timeout: u64,
    /// Controls how results are rendered.
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Auto)]
    pub(crate) output: OutputFormat,
    /// The subsystem to operate on.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Subsystem selection.
#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Management queries: service version and capabilities.
    Mgmt {
        #[command(subcommand)]
        action: MgmtAction,
    },
    /// Domain-to-label mappings.
    Map {
        #[command(subcommand)]
        action: MapAction,
    },
    /// Unlabeled-traffic policy: the accept switch and static labels.
    Unlabeled {
        #[command(subcommand)]
        action: UnlabeledAction,
    },
    /// CIPSO/IPv4 label definitions.
    Cipso {
        #[command(subcommand)]
        action: CipsoAction,
    },
}

/// Management verbs.
#[derive(Subcommand, Debug)]
pub(crate) enum MgmtAction {
    /// Prints the protocol version of the running service.
    Version,
    /// Lists the labeling protocols the service supports.
    Protocols,
}

/// Domain-mapping verbs.
#[derive(Subcommand, Debug)]
pub(crate) enum MapAction {
    /// Lists every mapping, the default mapping included.
    List,
    /// Adds a mapping entry.
    Add(MapAddArgs),
    /// Removes a mapping entry.
    Del {
        /// Domain to unmap; omit to remove the default mapping.
        #[arg(long)]
        domain: Option<String>,
    },
}

/// Parameters for `map add`.
#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("label").required(true).args(["unlabeled", "doi"])))]
pub(crate) struct MapAddArgs {
    /// Domain to map; omit to set the default mapping.
    #[arg(long)]
    pub(crate) domain: Option<String>,
    /// Pass the domain's traffic unlabeled.
    #[arg(long)]
    pub(crate) unlabeled: bool,
    /// Label the domain's traffic with this CIPSO/IPv4 DOI.
    #[arg(long)]
    pub(crate) doi: Option<u32>,
    /// Restrict the mapping to one network (`address` or `address/prefix`).
    #[arg(long)]
    pub(crate) address: Option<NetworkSelector>,
    /// Address-family scope of the mapping.
    #[arg(long, value_enum, default_value_t = FamilyArg::Any)]
    pub(crate) family: FamilyArg,
}

/// Unlabeled-traffic verbs.
#[derive(Subcommand, Debug)]
pub(crate) enum UnlabeledAction {
    /// Shows the accept switch and every static label.
    List,
    /// Turns acceptance of unlabeled inbound traffic on or off.
    Accept {
        /// Desired state.
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Adds a static label for unlabeled traffic from a network.
    Add {
        /// Source network (`address` or `address/prefix`).
        #[arg(long)]
        address: NetworkSelector,
        /// Interface to scope the entry to; omit for the wildcard table.
        #[arg(long)]
        interface: Option<String>,
        /// Security context to apply.
        #[arg(long)]
        label: String,
    },
    /// Removes a static label.
    Del {
        /// Source network of the entry.
        #[arg(long)]
        address: NetworkSelector,
        /// Interface the entry is scoped to; omit for the wildcard table.
        #[arg(long)]
        interface: Option<String>,
    },
}

/// Label-definition verbs.
#[derive(Subcommand, Debug)]
pub(crate) enum CipsoAction {
    /// Lists every definition as a DOI/map-type pair.
    List,
    /// Prints the full definition of one DOI.
    Describe {
        /// Domain-of-interpretation id.
        #[arg(long)]
        doi: u32,
    },
    /// Adds a definition.
    Add(CipsoAddArgs),
    /// Removes a definition.
    Del {
        /// Domain-of-interpretation id.
        #[arg(long)]
        doi: u32,
    },
}

/// Parameters for `cipso add`.
#[derive(Args, Debug)]
pub(crate) struct CipsoAddArgs {
    /// Domain-of-interpretation id.
    #[arg(long)]
    pub(crate) doi: u32,
    /// Translation style of the definition.
    #[arg(long, value_enum)]
    pub(crate) kind: CipsoKind,
    /// Tags packets under this DOI may carry.
    #[arg(long, value_delimiter = ',', default_values_t = [1u8])]
    pub(crate) tags: Vec<u8>,
    /// Level translations as `local=remote` pairs.
    #[arg(long, value_delimiter = ',')]
    pub(crate) levels: Vec<LevelPair>,
    /// Category translations as `local=remote` pairs.
    #[arg(long, value_delimiter = ',')]
    pub(crate) categories: Vec<CategoryPair>,
}

/// Translation style accepted by `cipso add`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum CipsoKind {
    /// Translate levels and categories through explicit tables.
    Trans,
    /// Pass wire values straight through.
    Pass,
    /// Keep labels entirely host-side.
    Local,
}

/// On/off switch argument.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum Toggle {
    /// Enable.
    On,
    /// Disable.
    Off,
}

impl From<Toggle> for bool {
    fn from(toggle: Toggle) -> Self {
        matches!(toggle, Toggle::On)
    }
}

/// Address-family scope argument.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum FamilyArg {
    /// Both IPv4 and IPv6.
    #[default]
    Any,
    /// IPv4 only.
    V4,
    /// IPv6 only.
    V6,
}

impl From<FamilyArg> for AddressFamily {
    fn from(family: FamilyArg) -> Self {
        match family {
            FamilyArg::Any => Self::Any,
            FamilyArg::V4 => Self::V4,
            FamilyArg::V6 => Self::V6,
        }
    }
}

/// Failure parsing a `local=remote` translation pair.
#[derive(Debug, Clone, Error)]
#[error("expected a local=remote pair, got `{0}`")]
pub(crate) struct PairParseError(String);

fn parse_pair(input: &str) -> Result<(u32, u32), PairParseError> {
    let Some((local, remote)) = input.split_once('=') else {
        return Err(PairParseError(input.to_owned()));
    };
    let local = local
        .trim()
        .parse()
        .map_err(|_| PairParseError(input.to_owned()))?;
    let remote = remote
        .trim()
        .parse()
        .map_err(|_| PairParseError(input.to_owned()))?;
    Ok((local, remote))
}

/// A `local=remote` level translation argument.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct LevelPair {
    pub(crate) local: u32,
    pub(crate) remote: u32,
}

impl FromStr for LevelPair {
    type Err = PairParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (local, remote) = parse_pair(input)?;
        Ok(Self { local, remote })
    }
}

/// A `local=remote` category translation argument.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct CategoryPair {
    pub(crate) local: u32,
    pub(crate) remote: u32,
}

impl FromStr for CategoryPair {
    type Err = PairParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (local, remote) = parse_pair(input)?;
        Ok(Self { local, remote })
    }
}

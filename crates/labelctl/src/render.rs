//! Rendering of command results.
//!
//! Every query produces a report type that serialises for `--output json`
//! and renders a compact text form for terminals. Mutations print nothing
//! on success; the exit code is the answer.

use std::fmt::Write as _;

use serde::Serialize;

use labelctl_core::LabelProtocol;
use labelctl_core::cipso::{DoiDefinition, DoiKind, DoiSummary};
use labelctl_core::map::{DomainMapping, MappingLabel, SelectorLabel};
use labelctl_core::unlabeled::StaticLabel;

/// Text rendering for terminal output.
pub(crate) trait HumanRender {
    /// Renders the report as lines of text, trailing newline included.
    fn render_human(&self) -> String;
}

/// Result of `mgmt version`.
#[derive(Debug, Serialize)]
pub(crate) struct VersionReport {
    /// Protocol version of the running service.
    pub(crate) version: u32,
}

impl HumanRender for VersionReport {
    fn render_human(&self) -> String {
        format!("protocol version {}\n", self.version)
    }
}

/// Result of `mgmt protocols`.
#[derive(Debug, Serialize)]
pub(crate) struct ProtocolsReport {
    /// Supported labeling protocols.
    pub(crate) protocols: Vec<LabelProtocol>,
}

impl HumanRender for ProtocolsReport {
    fn render_human(&self) -> String {
        let mut output = String::new();
        for protocol in &self.protocols {
            let _ = writeln!(output, "{protocol}");
        }
        output
    }
}

/// Result of `map list`.
#[derive(Debug, Serialize)]
pub(crate) struct MappingsReport {
    /// Every configured mapping, default mapping included.
    pub(crate) mappings: Vec<DomainMapping>,
}

impl HumanRender for MappingsReport {
    fn render_human(&self) -> String {
        let mut output = String::new();
        for mapping in &self.mappings {
            let domain = mapping
                .domain
                .as_deref()
                .map_or_else(|| String::from("default"), |name| format!("\"{name}\""));
            match &mapping.label {
                MappingLabel::Unlabeled => {
                    let _ = writeln!(output, "{domain} ({}): unlabeled", mapping.family);
                }
                MappingLabel::CipsoV4 { doi } => {
                    let _ = writeln!(output, "{domain} ({}): cipso4 doi={doi}", mapping.family);
                }
                MappingLabel::AddressSelect { selectors } => {
                    let _ = writeln!(output, "{domain} ({}):", mapping.family);
                    for selector in selectors {
                        match selector.label {
                            SelectorLabel::Unlabeled => {
                                let _ =
                                    writeln!(output, "  {}: unlabeled", selector.network);
                            }
                            SelectorLabel::CipsoV4 { doi } => {
                                let _ = writeln!(
                                    output,
                                    "  {}: cipso4 doi={doi}",
                                    selector.network
                                );
                            }
                        }
                    }
                }
            }
        }
        output
    }
}

/// Result of `unlabeled list`.
#[derive(Debug, Serialize)]
pub(crate) struct UnlabeledReport {
    /// Whether unlabeled inbound traffic is accepted.
    pub(crate) accept: bool,
    /// Configured static labels.
    pub(crate) static_labels: Vec<StaticLabel>,
}

impl HumanRender for UnlabeledReport {
    fn render_human(&self) -> String {
        let mut output = format!(
            "accept unlabeled traffic: {}\n",
            if self.accept { "on" } else { "off" }
        );
        for entry in &self.static_labels {
            let interface = entry.interface.as_deref().unwrap_or("*");
            let _ = writeln!(
                output,
                "{interface} {} {}",
                entry.network, entry.context
            );
        }
        output
    }
}

/// Result of `cipso list`.
#[derive(Debug, Serialize)]
pub(crate) struct DefinitionsReport {
    /// DOI/map-type pairs.
    pub(crate) definitions: Vec<DoiSummary>,
}

impl HumanRender for DefinitionsReport {
    fn render_human(&self) -> String {
        let mut output = String::new();
        for definition in &self.definitions {
            let _ = writeln!(output, "doi {}: {}", definition.doi, definition.map_type);
        }
        output
    }
}

/// Result of `cipso describe`.
#[derive(Debug, Serialize)]
pub(crate) struct DefinitionReport {
    /// The full definition.
    #[serde(flatten)]
    pub(crate) definition: DoiDefinition,
}

impl HumanRender for DefinitionReport {
    fn render_human(&self) -> String {
        let mut output = format!("doi {}\n", self.definition.doi);
        match &self.definition.kind {
            DoiKind::Translated {
                tags,
                levels,
                categories,
            } => {
                let _ = writeln!(output, "type: translated");
                let _ = writeln!(output, "tags: {}", join(tags));
                for level in levels {
                    let _ = writeln!(output, "level {} = {}", level.local, level.remote);
                }
                for category in categories {
                    let _ =
                        writeln!(output, "category {} = {}", category.local, category.remote);
                }
            }
            DoiKind::PassThrough { tags } => {
                let _ = writeln!(output, "type: pass-through");
                let _ = writeln!(output, "tags: {}", join(tags));
            }
            DoiKind::Local => {
                let _ = writeln!(output, "type: local");
            }
        }
        output
    }
}

fn join(tags: &[u8]) -> String {
    tags.iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

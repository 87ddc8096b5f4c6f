//! Unit tests for argument parsing, rendering, and exit-code mapping.

use std::net::{IpAddr, Ipv4Addr};

use clap::Parser;
use rstest::rstest;

use labelctl_core::cipso::{DoiKind, DoiSummary, LevelMapping};
use labelctl_core::map::{DomainMapping, MappingLabel};
use labelctl_core::{
    AddressFamily, Error as CoreError, ErrorKind, ServiceError, TransportError,
    ValidationError,
};

use crate::cli::{
    CipsoAction, CipsoKind, Cli, Command, LevelPair, MapAction, OutputFormat,
    ResolvedOutputFormat, Toggle, UnlabeledAction,
};
use crate::render::{DefinitionsReport, HumanRender, MappingsReport, VersionReport};
use crate::{AppError, doi_definition, mapping_update};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args.iter().copied()).expect("arguments should parse")
}

#[test]
fn parses_global_options_before_the_subcommand() {
    let cli = parse(&["labelctl", "-v", "--timeout", "3", "--output", "json", "mgmt", "version"]);
    assert_eq!(cli.verbose, 1);
    assert_eq!(cli.timeout, 3);
    assert_eq!(cli.output, OutputFormat::Json);
    assert!(matches!(
        cli.command,
        Command::Mgmt {
            action: crate::cli::MgmtAction::Version
        }
    ));
}

#[test]
fn map_add_requires_exactly_one_label_choice() {
    assert!(Cli::try_parse_from(["labelctl", "map", "add", "--domain", "example"]).is_err());
    assert!(
        Cli::try_parse_from([
            "labelctl", "map", "add", "--domain", "example", "--doi", "1", "--unlabeled",
        ])
        .is_err()
    );
    let cli = parse(&["labelctl", "map", "add", "--domain", "example", "--doi", "1"]);
    let Command::Map {
        action: MapAction::Add(args),
    } = cli.command
    else {
        panic!("expected map add");
    };
    let update = mapping_update(args);
    assert_eq!(update.domain.as_deref(), Some("example"));
    assert_eq!(
        update.label,
        labelctl_core::map::SelectorLabel::CipsoV4 { doi: 1 }
    );
}

#[test]
fn map_add_parses_an_address_selector() {
    let cli = parse(&[
        "labelctl", "map", "add", "--domain", "example", "--unlabeled", "--address",
        "10.0.0.0/8",
    ]);
    let Command::Map {
        action: MapAction::Add(args),
    } = cli.command
    else {
        panic!("expected map add");
    };
    let update = mapping_update(args);
    let network = update.network.expect("selector should be present");
    assert_eq!(network.address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)));
    assert_eq!(network.prefix, 8);
}

#[test]
fn rejects_a_malformed_address_selector() {
    assert!(
        Cli::try_parse_from([
            "labelctl", "map", "add", "--unlabeled", "--address", "not-an-address",
        ])
        .is_err()
    );
}

#[test]
fn cipso_add_assembles_a_translated_definition() {
    let cli = parse(&[
        "labelctl", "cipso", "add", "--doi", "3", "--kind", "trans", "--levels", "0=0,1=5",
        "--categories", "0=10",
    ]);
    let Command::Cipso {
        action: CipsoAction::Add(args),
    } = cli.command
    else {
        panic!("expected cipso add");
    };
    assert_eq!(args.kind, CipsoKind::Trans);
    let definition = doi_definition(args);
    assert_eq!(definition.doi, 3);
    let DoiKind::Translated {
        tags,
        levels,
        categories,
    } = definition.kind
    else {
        panic!("expected a translated definition");
    };
    assert_eq!(tags, [1]);
    assert_eq!(
        levels,
        [
            LevelMapping { local: 0, remote: 0 },
            LevelMapping { local: 1, remote: 5 },
        ]
    );
    assert_eq!(categories.len(), 1);
}

#[rstest]
#[case("0=0", 0, 0)]
#[case("3 = 12", 3, 12)]
fn level_pairs_parse_local_and_remote(#[case] input: &str, #[case] local: u32, #[case] remote: u32) {
    let pair: LevelPair = input.parse().expect("pair should parse");
    assert_eq!(pair.local, local);
    assert_eq!(pair.remote, remote);
}

#[rstest]
#[case("")]
#[case("1")]
#[case("a=b")]
fn malformed_level_pairs_are_rejected(#[case] input: &str) {
    assert!(input.parse::<LevelPair>().is_err());
}

#[test]
fn unlabeled_accept_parses_the_toggle() {
    let cli = parse(&["labelctl", "unlabeled", "accept", "off"]);
    let Command::Unlabeled {
        action: UnlabeledAction::Accept { state },
    } = cli.command
    else {
        panic!("expected unlabeled accept");
    };
    assert_eq!(state, Toggle::Off);
    assert!(!bool::from(state));
}

#[rstest]
#[case(OutputFormat::Auto, true, ResolvedOutputFormat::Human)]
#[case(OutputFormat::Auto, false, ResolvedOutputFormat::Json)]
#[case(OutputFormat::Human, false, ResolvedOutputFormat::Human)]
#[case(OutputFormat::Json, true, ResolvedOutputFormat::Json)]
fn output_format_resolves_against_the_terminal(
    #[case] format: OutputFormat,
    #[case] terminal: bool,
    #[case] expected: ResolvedOutputFormat,
) {
    assert_eq!(format.resolve(terminal), expected);
}

#[test]
fn exit_codes_follow_the_error_family() {
    let validation = AppError::Core(CoreError::Validation(ValidationError::ZeroDoi));
    let service = AppError::Core(CoreError::Service(ServiceError {
        kind: ErrorKind::Conflict,
        code: Some(17),
        subsystem: "cipso",
    }));
    let transport = AppError::Core(CoreError::Transport(TransportError::Interrupted));

    assert_eq!(validation.exit_code(), std::process::ExitCode::from(1));
    assert_eq!(service.exit_code(), std::process::ExitCode::from(2));
    assert_eq!(transport.exit_code(), std::process::ExitCode::from(3));
}

#[test]
fn renders_mappings_for_terminals() {
    let report = MappingsReport {
        mappings: vec![
            DomainMapping {
                domain: Some(String::from("example")),
                family: AddressFamily::Any,
                label: MappingLabel::CipsoV4 { doi: 1 },
            },
            DomainMapping {
                domain: None,
                family: AddressFamily::Any,
                label: MappingLabel::Unlabeled,
            },
        ],
    };
    let text = report.render_human();
    assert_eq!(text, "\"example\" (any): cipso4 doi=1\ndefault (any): unlabeled\n");
}

#[test]
fn renders_definition_summaries_one_per_line() {
    let report = DefinitionsReport {
        definitions: vec![DoiSummary {
            doi: 3,
            map_type: labelctl_core::cipso::MapType::Translated,
        }],
    };
    assert_eq!(report.render_human(), "doi 3: translated\n");
}

#[test]
fn version_report_serialises_for_json_output() {
    let report = VersionReport { version: 3 };
    let json = serde_json::to_value(&report).expect("report should serialise");
    assert_eq!(json["version"], 3);
}

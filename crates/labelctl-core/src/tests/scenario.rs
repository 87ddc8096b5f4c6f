//! End-to-end scenario against a stateful fake labeling service.
//!
//! The fake implements the domain-mapping verbs over an in-memory table
//! with the same refusal semantics as the kernel: duplicate adds collide,
//! removals of absent entries fail, listings reflect the live table.

use std::collections::HashMap;

use labelctl_proto::{Message, Nla, find_attr};

use crate::error::ErrorKind;
use crate::map::{DomainMapping, MappingLabel, MappingUpdate, Mappings, SelectorLabel};
use crate::tests::support::{MGMT_FAMILY, Reply, scripted_session};
use crate::transport::Session;
use crate::types::AddressFamily;

fn fake_mapping_service() -> Session<crate::tests::support::ScriptedEndpoint> {
    let mut table: HashMap<String, (u32, Option<u32>)> = HashMap::new();
    scripted_session(move |request: &Message| match request.command {
        // add
        1 => {
            let Some(domain) = find_attr(&request.attrs, 1).and_then(|a| a.as_str().ok()) else {
                return vec![Reply::Errno(22)];
            };
            let Some(protocol) = find_attr(&request.attrs, 2).and_then(|a| a.as_u32().ok())
            else {
                return vec![Reply::Errno(22)];
            };
            let doi = find_attr(&request.attrs, 4).and_then(|a| a.as_u32().ok());
            if table.contains_key(domain) {
                return vec![Reply::Errno(17)];
            }
            table.insert(domain.to_owned(), (protocol, doi));
            vec![Reply::Ack]
        }
        // remove
        2 => {
            let Some(domain) = find_attr(&request.attrs, 1).and_then(|a| a.as_str().ok()) else {
                return vec![Reply::Errno(22)];
            };
            if table.remove(domain).is_some() {
                vec![Reply::Ack]
            } else {
                vec![Reply::Errno(2)]
            }
        }
        // listall
        3 => {
            let mut replies: Vec<Reply> = table
                .iter()
                .map(|(domain, (protocol, doi))| {
                    let mut attrs = vec![Nla::string(1, domain), Nla::u32(2, *protocol)];
                    if let Some(doi) = doi {
                        attrs.push(Nla::u32(4, *doi));
                    }
                    Reply::Data {
                        family: MGMT_FAMILY,
                        command: 3,
                        attrs,
                        multi: true,
                    }
                })
                .collect();
            replies.push(Reply::Done);
            replies
        }
        // listdef: no default mapping configured
        6 => vec![Reply::Errno(2)],
        other => panic!("fake service got unexpected command {other}"),
    })
}

#[test]
fn add_list_remove_list_round_trip() {
    let mut session = fake_mapping_service();
    let mappings = Mappings::open(&mut session).unwrap();
    let update = MappingUpdate {
        domain: Some(String::from("example")),
        family: AddressFamily::Any,
        label: SelectorLabel::CipsoV4 { doi: 1 },
        network: None,
    };

    mappings.add(&mut session, &update).unwrap();

    let entries = mappings.list(&mut session).unwrap();
    assert_eq!(
        entries,
        [DomainMapping {
            domain: Some(String::from("example")),
            family: AddressFamily::Any,
            label: MappingLabel::CipsoV4 { doi: 1 },
        }]
    );

    mappings.remove(&mut session, Some("example")).unwrap();

    let entries = mappings.list(&mut session).unwrap();
    assert!(entries.is_empty());

    // The fake saw the verbs in order: add, list, listdef, remove, list,
    // listdef.
    let commands: Vec<u8> = session
        .endpoint()
        .requests
        .iter()
        .map(|request| request.command)
        .collect();
    assert_eq!(commands, [1, 3, 6, 2, 3, 6]);
}

#[test]
fn re_adding_the_same_domain_collides_and_leaves_the_entry_alone() {
    let mut session = fake_mapping_service();
    let mappings = Mappings::open(&mut session).unwrap();
    let update = MappingUpdate {
        domain: Some(String::from("example")),
        family: AddressFamily::Any,
        label: SelectorLabel::CipsoV4 { doi: 1 },
        network: None,
    };

    mappings.add(&mut session, &update).unwrap();
    let second = MappingUpdate {
        label: SelectorLabel::CipsoV4 { doi: 2 },
        ..update
    };
    let error = mappings.add(&mut session, &second).unwrap_err();
    assert_eq!(error.service_kind(), Some(ErrorKind::Conflict));

    // The original mapping must be unchanged.
    let entries = mappings.list(&mut session).unwrap();
    assert_eq!(entries[0].label, MappingLabel::CipsoV4 { doi: 1 });
}

#[test]
fn removal_of_an_absent_domain_is_not_a_silent_success() {
    let mut session = fake_mapping_service();
    let mappings = Mappings::open(&mut session).unwrap();

    let error = mappings.remove(&mut session, Some("nothere")).unwrap_err();
    assert_eq!(error.service_kind(), Some(ErrorKind::NotFound));
}

//! Transport suite: correlation, dump collection, deadlines.

use std::io;

use labelctl_proto::{Message, NLM_F_DUMP, NLM_F_MULTI, NLM_F_REQUEST, Nla, encode_done};

use crate::error::{Error, TransportError};
use crate::tests::support::{FakeEndpoint, MGMT_FAMILY, PORT, fake_session, scripted_session};

fn request(flags: u16) -> Message {
    Message::request(MGMT_FAMILY, 3, crate::SERVICE_VERSION, flags, Vec::new())
}

fn reply(sequence: u32, port: u32, attrs: Vec<Nla>, multi: bool) -> Vec<u8> {
    Message {
        family: MGMT_FAMILY,
        command: 3,
        version: crate::SERVICE_VERSION,
        flags: if multi { NLM_F_MULTI } else { 0 },
        sequence,
        port,
        attrs,
    }
    .encode()
}

#[test]
fn discards_frames_with_a_foreign_sequence_number() {
    let mut endpoint = FakeEndpoint::default();
    // The first transact on a fresh session uses sequence 1; an unrelated
    // broadcast with sequence 99 arrives first and must be skipped.
    endpoint.push(reply(99, PORT, vec![Nla::u32(2, 5)], false));
    endpoint.push(reply(1, PORT, vec![Nla::u32(2, 7)], false));
    let mut session = fake_session(endpoint);

    let frames = session.transact(request(NLM_F_REQUEST), false).unwrap();

    assert_eq!(frames.len(), 1);
    let message = Message::decode(&frames[0]).unwrap();
    assert_eq!(message.attrs[0].as_u32().unwrap(), 7);
}

#[test]
fn discards_frames_addressed_to_another_port() {
    let mut endpoint = FakeEndpoint::default();
    endpoint.push(reply(1, PORT + 1, Vec::new(), false));
    endpoint.push(reply(1, PORT, vec![Nla::u32(2, 3)], false));
    let mut session = fake_session(endpoint);

    let frames = session.transact(request(NLM_F_REQUEST), false).unwrap();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].port, PORT);
}

#[test]
fn collects_a_dump_until_the_terminator_in_emission_order() {
    let mut endpoint = FakeEndpoint::default();
    for value in [10, 20, 30] {
        endpoint.push(reply(1, PORT, vec![Nla::u32(2, value)], true));
    }
    endpoint.push(encode_done(1, PORT));
    let mut session = fake_session(endpoint);

    let frames = session
        .transact(request(NLM_F_REQUEST | NLM_F_DUMP), true)
        .unwrap();

    let values: Vec<u32> = frames
        .iter()
        .map(|frame| {
            Message::decode(frame)
                .unwrap()
                .attrs[0]
                .as_u32()
                .unwrap()
        })
        .collect();
    assert_eq!(values, [10, 20, 30]);
}

#[test]
fn an_empty_dump_yields_no_frames() {
    let mut endpoint = FakeEndpoint::default();
    endpoint.push(encode_done(1, PORT));
    let mut session = fake_session(endpoint);

    let frames = session
        .transact(request(NLM_F_REQUEST | NLM_F_DUMP), true)
        .unwrap();

    assert!(frames.is_empty());
}

#[test]
fn a_batched_datagram_carries_a_whole_dump() {
    let mut datagram = reply(1, PORT, vec![Nla::u32(2, 1)], true);
    datagram.extend_from_slice(&reply(1, PORT, vec![Nla::u32(2, 2)], true));
    datagram.extend_from_slice(&encode_done(1, PORT));
    let mut endpoint = FakeEndpoint::default();
    endpoint.push(datagram);
    let mut session = fake_session(endpoint);

    let frames = session
        .transact(request(NLM_F_REQUEST | NLM_F_DUMP), true)
        .unwrap();

    assert_eq!(frames.len(), 2);
}

#[test]
fn times_out_when_no_matching_frame_arrives() {
    let mut session = fake_session(FakeEndpoint::default());

    let error = session.transact(request(NLM_F_REQUEST), false).unwrap_err();

    assert!(matches!(error, TransportError::Timeout(_)));
}

#[test]
fn an_interrupted_wait_is_reported_as_such() {
    let endpoint = FakeEndpoint {
        recv_error: Some(io::ErrorKind::Interrupted),
        ..FakeEndpoint::default()
    };
    let mut session = fake_session(endpoint);

    let error = session.transact(request(NLM_F_REQUEST), false).unwrap_err();

    assert!(matches!(error, TransportError::Interrupted));
}

#[test]
fn a_status_frame_ends_the_collection_and_is_returned_as_data() {
    let mut endpoint = FakeEndpoint::default();
    endpoint.push(labelctl_proto::encode_error(-13, 1, PORT));
    let mut session = fake_session(endpoint);

    let frames = session.transact(request(NLM_F_REQUEST), false).unwrap();

    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_status());
}

#[test]
fn sequence_numbers_increase_across_requests() {
    let mut endpoint = FakeEndpoint::default();
    endpoint.push(reply(1, PORT, Vec::new(), false));
    endpoint.push(reply(2, PORT, Vec::new(), false));
    let mut session = fake_session(endpoint);

    session.transact(request(NLM_F_REQUEST), false).unwrap();
    session.transact(request(NLM_F_REQUEST), false).unwrap();
}

#[test]
fn resolve_family_returns_the_controller_assigned_id() {
    let mut session = scripted_session(|_| Vec::new());

    let family = session.resolve_family("NLBL_MGMT").unwrap();

    assert_eq!(family, MGMT_FAMILY);
}

#[test]
fn resolving_an_unregistered_family_means_the_service_is_absent() {
    let mut session = scripted_session(|_| Vec::new());

    let error = session.resolve_family("NLBL_NOSUCH").unwrap_err();

    assert!(matches!(
        error,
        Error::Transport(TransportError::Unavailable { family }) if family == "NLBL_NOSUCH"
    ));
}

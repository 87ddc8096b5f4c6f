//! Status suite: the errno classification table.

use rstest::rstest;

use labelctl_proto::{Frame, NLMSG_ERROR, encode_error, split_frames};

use crate::error::ErrorKind;
use crate::status::{Disposition, classify};
use crate::tests::support::PORT;

fn status_frame(code: i32) -> Frame {
    let frames = split_frames(&encode_error(code, 5, PORT)).unwrap();
    frames.into_iter().next().unwrap()
}

#[rstest]
#[case(-1, ErrorKind::PermissionDenied)]
#[case(-13, ErrorKind::PermissionDenied)]
#[case(-2, ErrorKind::NotFound)]
#[case(-17, ErrorKind::Conflict)]
#[case(-16, ErrorKind::InUse)]
#[case(-22, ErrorKind::InvalidArgument)]
#[case(-34, ErrorKind::InvalidArgument)]
#[case(-95, ErrorKind::Unknown(95))]
fn maps_errnos_to_the_fixed_taxonomy(#[case] code: i32, #[case] expected: ErrorKind) {
    match classify(&status_frame(code), "management") {
        Disposition::Failed(error) => {
            assert_eq!(error.kind, expected);
            assert_eq!(error.code, Some(code.unsigned_abs() as i32));
            assert_eq!(error.subsystem, "management");
        }
        other => panic!("expected a refusal, got {other:?}"),
    }
}

#[test]
fn a_zero_code_is_an_acknowledgement() {
    assert_eq!(classify(&status_frame(0), "management"), Disposition::Ack);
}

#[test]
fn data_frames_are_not_status_reports() {
    let frame = Frame {
        message_type: 0x18,
        flags: 0,
        sequence: 5,
        port: PORT,
        payload: vec![3, 3, 0, 0],
    };
    assert_eq!(classify(&frame, "management"), Disposition::Data);
}

#[test]
fn a_report_too_short_for_a_code_is_malformed_not_guessed() {
    let frame = Frame {
        message_type: NLMSG_ERROR,
        flags: 0,
        sequence: 5,
        port: PORT,
        payload: vec![0, 0],
    };
    match classify(&frame, "cipso") {
        Disposition::Failed(error) => {
            assert_eq!(error.kind, ErrorKind::MalformedResponse);
            assert_eq!(error.code, None);
        }
        other => panic!("expected a malformed-response refusal, got {other:?}"),
    }
}

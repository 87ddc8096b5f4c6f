//! Classification of kernel status reports.
//!
//! The kernel answers every acknowledged request, and refuses any request,
//! with a status frame whose payload starts with a native-endian signed
//! code: zero for success, a negated errno otherwise. This module is the
//! only place that table lives; handlers never look at raw codes.

use byteorder::{ByteOrder, NativeEndian};

use labelctl_proto::Frame;

use crate::error::{ErrorKind, ServiceError};

/// What a received frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// An ordinary data frame; not a status report at all.
    Data,
    /// A positive acknowledgement.
    Ack,
    /// A refusal, already classified.
    Failed(ServiceError),
}

/// Inspects a frame and classifies it.
///
/// Returns [`Disposition::Data`] for anything that is not a status report.
/// A frame claiming to be a status report but too short to carry a code is
/// classified as [`ErrorKind::MalformedResponse`] rather than guessed at.
#[must_use]
pub fn classify(frame: &Frame, subsystem: &'static str) -> Disposition {
    if !frame.is_status() {
        return Disposition::Data;
    }
    if frame.payload.len() < 4 {
        return Disposition::Failed(ServiceError::malformed(subsystem));
    }
    let code = NativeEndian::read_i32(&frame.payload[..4]);
    if code == 0 {
        return Disposition::Ack;
    }
    let errno = code.unsigned_abs() as i32;
    Disposition::Failed(ServiceError {
        kind: kind_for_errno(errno),
        code: Some(errno),
        subsystem,
    })
}

/// The fixed errno-to-kind table.
///
/// Codes without an entry stay visible as [`ErrorKind::Unknown`]; inventing
/// a specific kind for an unmapped code would misdirect the operator.
const fn kind_for_errno(errno: i32) -> ErrorKind {
    match errno {
        libc_consts::EPERM | libc_consts::EACCES => ErrorKind::PermissionDenied,
        libc_consts::ENOENT => ErrorKind::NotFound,
        libc_consts::EEXIST => ErrorKind::Conflict,
        libc_consts::EBUSY => ErrorKind::InUse,
        libc_consts::EINVAL | libc_consts::ERANGE => ErrorKind::InvalidArgument,
        other => ErrorKind::Unknown(other),
    }
}

/// The handful of errno values the classification table names.
///
/// Spelled out locally so the classification logic is identical on every
/// platform the client builds on, kernel or not.
mod libc_consts {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EACCES: i32 = 13;
    pub const EEXIST: i32 = 17;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ERANGE: i32 = 34;
}

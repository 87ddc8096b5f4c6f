//! Request execution helpers shared by the subsystem handlers.
//!
//! Every verb is one of three shapes: a mutation that expects only an
//! acknowledgement, a query that expects a single data message, or a dump
//! that expects a run of data messages. The helpers here own the shared
//! plumbing (submit, classify, decode) so the handlers only build
//! requests and pick attributes out of typed messages.

use labelctl_proto::{Message, Nla, find_attr};

use crate::error::{Error, ErrorKind, ServiceError};
use crate::status::{Disposition, classify};
use crate::transport::{Endpoint, Session};

/// Executes a mutation: success is an acknowledgement, anything else is a
/// classified refusal.
pub(crate) fn execute_ack<E: Endpoint>(
    session: &mut Session<E>,
    message: Message,
    subsystem: &'static str,
) -> Result<(), Error> {
    let frames = session.transact(message, false)?;
    let frame = frames
        .first()
        .ok_or_else(|| ServiceError::malformed(subsystem))?;
    match classify(frame, subsystem) {
        Disposition::Ack => Ok(()),
        Disposition::Failed(error) => Err(error.into()),
        // A data frame where an acknowledgement belongs means the reply did
        // not line up with the request shape.
        Disposition::Data => Err(ServiceError::malformed(subsystem).into()),
    }
}

/// Executes a single-message query and decodes the reply.
pub(crate) fn execute_fetch<E: Endpoint>(
    session: &mut Session<E>,
    message: Message,
    subsystem: &'static str,
) -> Result<Message, Error> {
    let frames = session.transact(message, false)?;
    let frame = frames
        .first()
        .ok_or_else(|| ServiceError::malformed(subsystem))?;
    match classify(frame, subsystem) {
        Disposition::Data => Ok(Message::decode(frame)
            .map_err(|_| ServiceError::malformed(subsystem))?),
        Disposition::Failed(error) => Err(error.into()),
        Disposition::Ack => Err(ServiceError::malformed(subsystem).into()),
    }
}

/// Executes a dump and decodes every data message in emission order.
pub(crate) fn execute_dump<E: Endpoint>(
    session: &mut Session<E>,
    message: Message,
    subsystem: &'static str,
) -> Result<Vec<Message>, Error> {
    let frames = session.transact(message, true)?;
    let mut messages = Vec::with_capacity(frames.len());
    for frame in &frames {
        match classify(frame, subsystem) {
            Disposition::Data => messages.push(
                Message::decode(frame).map_err(|_| ServiceError::malformed(subsystem))?,
            ),
            Disposition::Failed(error) => return Err(error.into()),
            Disposition::Ack => {}
        }
    }
    Ok(messages)
}

/// Picks a required four-byte scalar out of a reply.
pub(crate) fn required_u32(
    message: &Message,
    kind: u16,
    subsystem: &'static str,
) -> Result<u32, ServiceError> {
    find_attr(&message.attrs, kind)
        .and_then(|attr| attr.as_u32().ok())
        .ok_or_else(|| ServiceError::malformed(subsystem))
}

/// Picks a required one-byte scalar out of a reply.
pub(crate) fn required_u8(
    message: &Message,
    kind: u16,
    subsystem: &'static str,
) -> Result<u8, ServiceError> {
    find_attr(&message.attrs, kind)
        .and_then(|attr| attr.as_u8().ok())
        .ok_or_else(|| ServiceError::malformed(subsystem))
}

/// Picks a required scalar out of an attribute list (nested containers).
pub(crate) fn required_nested_u32(
    attrs: &[Nla],
    kind: u16,
    subsystem: &'static str,
) -> Result<u32, ServiceError> {
    find_attr(attrs, kind)
        .and_then(|attr| attr.as_u32().ok())
        .ok_or_else(|| ServiceError::malformed(subsystem))
}

/// Translates a `NotFound` refusal into `None`; used by queries where an
/// absent entry is an answer, not a failure.
pub(crate) fn optional<T>(result: Result<T, Error>) -> Result<Option<T>, Error> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.service_kind() == Some(ErrorKind::NotFound) => Ok(None),
        Err(error) => Err(error),
    }
}

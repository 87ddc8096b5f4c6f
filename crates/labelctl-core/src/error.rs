//! Error taxonomy for labeling-service operations.
//!
//! Three families of failure exist: the transport could not complete an
//! exchange ([`TransportError`]), the service processed the request and
//! refused it ([`ServiceError`]), or the parameters never left this process
//! ([`ValidationError`]). [`Error`] unions them for callers that only need
//! to render and pick an exit code.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use labelctl_proto::DecodeError;

/// Failures completing a request/response exchange with the kernel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The datagram endpoint could not be created or bound.
    #[error("cannot open a labeling-service endpoint: {0}")]
    Endpoint(#[source] io::Error),
    /// The named service family is not registered, meaning the labeling
    /// service is not present or not loaded.
    #[error("the {family} service is not available")]
    Unavailable { family: String },
    /// Writing the request datagram failed.
    #[error("failed to send request to the labeling service: {0}")]
    Send(#[source] io::Error),
    /// Reading a response datagram failed.
    #[error("failed to receive from the labeling service: {0}")]
    Receive(#[source] io::Error),
    /// No matching terminal response arrived before the deadline.
    #[error("no response from the labeling service within {0:?}")]
    Timeout(Duration),
    /// The wait was cancelled by an interrupt.
    #[error("interrupted while waiting for the labeling service")]
    Interrupted,
    /// A received datagram could not be framed.
    #[error("unintelligible response from the labeling service: {0}")]
    Frame(#[from] DecodeError),
}

/// Classified refusals reported by the labeling service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller lacks the privilege for this operation.
    PermissionDenied,
    /// The addressed entry does not exist.
    NotFound,
    /// An entry with the same key already exists.
    Conflict,
    /// The target is still referenced and cannot be removed.
    InUse,
    /// The service rejected a request parameter.
    InvalidArgument,
    /// A response was missing a required attribute or carried one with the
    /// wrong shape.
    MalformedResponse,
    /// A code with no entry in the classification table.
    Unknown(i32),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(formatter, "permission denied"),
            Self::NotFound => write!(formatter, "no matching entry"),
            Self::Conflict => write!(formatter, "entry already exists"),
            Self::InUse => write!(formatter, "entry is still in use"),
            Self::InvalidArgument => write!(formatter, "invalid argument"),
            Self::MalformedResponse => write!(formatter, "malformed response"),
            Self::Unknown(code) => write!(formatter, "unclassified failure (code {code})"),
        }
    }
}

/// A refusal with its classification, the raw code when one was reported,
/// and the subsystem it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// Classified failure kind.
    pub kind: ErrorKind,
    /// Raw numeric code preserved for diagnostics.
    pub code: Option<i32>,
    /// Subsystem the operation was addressed to.
    pub subsystem: &'static str,
}

impl ServiceError {
    /// Builds a malformed-response error for `subsystem`.
    #[must_use]
    pub const fn malformed(subsystem: &'static str) -> Self {
        Self {
            kind: ErrorKind::MalformedResponse,
            code: None,
            subsystem,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.subsystem, self.kind)?;
        if let Some(code) = self.code {
            write!(formatter, " (errno {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ServiceError {}

/// Parameter-shape failures caught before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A domain name was supplied but empty.
    #[error("domain name must not be empty")]
    EmptyDomain,
    /// A DOI id of zero is reserved and never valid.
    #[error("DOI id must be a positive integer")]
    ZeroDoi,
    /// An interface name was supplied but empty.
    #[error("interface name must not be empty")]
    EmptyInterface,
    /// A security context was supplied but empty.
    #[error("security context must not be empty")]
    EmptyContext,
    /// A network prefix length exceeds what its address family allows.
    #[error("prefix length {prefix} exceeds the maximum of {max} for this address family")]
    PrefixTooLong { prefix: u8, max: u8 },
    /// A translated definition needs at least one level mapping.
    #[error("a translated definition requires at least one level mapping")]
    EmptyLevelTable,
    /// Tag lists must name at least one tag.
    #[error("at least one tag must be supplied")]
    EmptyTagList,
}

/// Union of every failure a handler operation can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// The exchange itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The service refused the request.
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// The parameters were rejected locally.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// The service-side classification, when this is a service refusal.
    #[must_use]
    pub const fn service_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Service(error) => Some(error.kind),
            Self::Transport(_) | Self::Validation(_) => None,
        }
    }
}

//! Client library for the kernel network-labeling service.
//!
//! Each invocation opens one [`Session`], a datagram endpoint with a
//! kernel-assigned port identity, and drives it with the four subsystem
//! handles: [`mgmt::Management`] for service capabilities,
//! [`map::Mappings`] for domain-to-label mappings,
//! [`unlabeled::Unlabeled`] for unlabeled-traffic policy, and
//! [`cipso::Definitions`] for CIPSO/IPv4 label definitions. Handlers build
//! validated requests, the session correlates replies by sequence number
//! and port identity, and the status layer classifies kernel refusals into
//! the [`ErrorKind`] taxonomy.
//!
//! The library holds no cached view of kernel state: every read re-queries
//! the live configuration, and every operation either fully succeeds or
//! surfaces exactly one typed error.

pub mod cipso;
pub mod map;
pub mod mgmt;
pub mod unlabeled;

mod error;
mod exchange;
mod status;
mod transport;
mod types;

pub use error::{Error, ErrorKind, ServiceError, TransportError, ValidationError};
pub use status::{Disposition, classify};
#[cfg(unix)]
pub use transport::NetlinkSocket;
pub use transport::{Endpoint, Session, SessionOptions};
pub use types::{AddressFamily, LabelProtocol, NetworkSelector, SelectorParseError};

/// Protocol version spoken by every labeling-service family.
pub(crate) const SERVICE_VERSION: u8 = 3;

#[cfg(test)]
mod tests;

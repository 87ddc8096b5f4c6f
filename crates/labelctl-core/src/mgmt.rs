//! Management subsystem: service version and protocol capability queries.

use tracing::debug;

use labelctl_proto::{Message, NLM_F_DUMP, NLM_F_REQUEST};

use crate::SERVICE_VERSION;
use crate::error::Error;
use crate::exchange::{execute_dump, execute_fetch, required_u32};
use crate::transport::{Endpoint, Session};
use crate::types::LabelProtocol;

/// Family name the management subsystem registers under.
pub(crate) const FAMILY_NAME: &str = "NLBL_MGMT";

pub(crate) const NLBL_MGMT_C_ADD: u8 = 1;
pub(crate) const NLBL_MGMT_C_REMOVE: u8 = 2;
pub(crate) const NLBL_MGMT_C_LISTALL: u8 = 3;
pub(crate) const NLBL_MGMT_C_ADDDEF: u8 = 4;
pub(crate) const NLBL_MGMT_C_REMOVEDEF: u8 = 5;
pub(crate) const NLBL_MGMT_C_LISTDEF: u8 = 6;
pub(crate) const NLBL_MGMT_C_PROTOCOLS: u8 = 7;
pub(crate) const NLBL_MGMT_C_VERSION: u8 = 8;

pub(crate) const NLBL_MGMT_A_DOMAIN: u16 = 1;
pub(crate) const NLBL_MGMT_A_PROTOCOL: u16 = 2;
pub(crate) const NLBL_MGMT_A_VERSION: u16 = 3;
pub(crate) const NLBL_MGMT_A_CV4DOI: u16 = 4;
pub(crate) const NLBL_MGMT_A_IPV6ADDR: u16 = 5;
pub(crate) const NLBL_MGMT_A_IPV6MASK: u16 = 6;
pub(crate) const NLBL_MGMT_A_IPV4ADDR: u16 = 7;
pub(crate) const NLBL_MGMT_A_IPV4MASK: u16 = 8;
pub(crate) const NLBL_MGMT_A_ADDRSELECTOR: u16 = 9;
pub(crate) const NLBL_MGMT_A_SELECTORLIST: u16 = 10;
pub(crate) const NLBL_MGMT_A_FAMILY: u16 = 11;

const SUBSYSTEM: &str = "management";

/// Handle for management verbs, bound to the resolved family id.
#[derive(Debug, Clone, Copy)]
pub struct Management {
    family: u16,
}

impl Management {
    /// Resolves the management family and returns a handle for it.
    pub fn open<E: Endpoint>(session: &mut Session<E>) -> Result<Self, Error> {
        let family = session.resolve_family(FAMILY_NAME)?;
        Ok(Self { family })
    }

    /// Builds the protocol-version query.
    #[must_use]
    pub const fn build_version_request(&self) -> Message {
        Message::request(
            self.family,
            NLBL_MGMT_C_VERSION,
            SERVICE_VERSION,
            NLM_F_REQUEST,
            Vec::new(),
        )
    }

    /// Queries the protocol version of the running labeling service.
    pub fn version<E: Endpoint>(&self, session: &mut Session<E>) -> Result<u32, Error> {
        let reply = execute_fetch(session, self.build_version_request(), SUBSYSTEM)?;
        Ok(required_u32(&reply, NLBL_MGMT_A_VERSION, SUBSYSTEM)?)
    }

    /// Builds the capability dump request.
    #[must_use]
    pub const fn build_protocols_request(&self) -> Message {
        Message::request(
            self.family,
            NLBL_MGMT_C_PROTOCOLS,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_DUMP,
            Vec::new(),
        )
    }

    /// Lists the labeling protocols the running service supports.
    ///
    /// Protocols this client does not know about are logged and skipped so a
    /// newer kernel does not break the listing.
    pub fn protocols<E: Endpoint>(
        &self,
        session: &mut Session<E>,
    ) -> Result<Vec<LabelProtocol>, Error> {
        let replies = execute_dump(session, self.build_protocols_request(), SUBSYSTEM)?;
        let mut protocols = Vec::with_capacity(replies.len());
        for reply in &replies {
            let raw = required_u32(reply, NLBL_MGMT_A_PROTOCOL, SUBSYSTEM)?;
            match LabelProtocol::from_raw(raw) {
                Ok(protocol) => protocols.push(protocol),
                Err(unknown) => debug!(%unknown, "skipping unrecognised protocol"),
            }
        }
        Ok(protocols)
    }
}

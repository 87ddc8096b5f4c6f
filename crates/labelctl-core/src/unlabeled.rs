//! Unlabeled-traffic subsystem: the global accept switch and static labels.
//!
//! Two concerns live here. The accept flag decides whether inbound traffic
//! without a label is let through at all. Static labels go further: they
//! assign a security context to unlabeled traffic from a given network,
//! optionally scoped to one interface; entries without an interface form
//! the wildcard table consulted when no interface-specific entry matches.

use tracing::debug;

use labelctl_proto::{Message, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, Nla, find_attr};
use serde::Serialize;

use crate::SERVICE_VERSION;
use crate::error::{Error, ServiceError, ValidationError};
use crate::exchange::{execute_ack, execute_dump, execute_fetch, required_u8};
use crate::transport::{Endpoint, Session};
use crate::types::NetworkSelector;

/// Family name the unlabeled subsystem registers under.
const FAMILY_NAME: &str = "NLBL_UNLBL";

const NLBL_UNLABEL_C_STATICADD: u8 = 1;
const NLBL_UNLABEL_C_STATICREMOVE: u8 = 2;
const NLBL_UNLABEL_C_STATICLIST: u8 = 3;
const NLBL_UNLABEL_C_STATICADDDEF: u8 = 4;
const NLBL_UNLABEL_C_STATICREMOVEDEF: u8 = 5;
const NLBL_UNLABEL_C_STATICLISTDEF: u8 = 6;
const NLBL_UNLABEL_C_ACCEPT: u8 = 7;
const NLBL_UNLABEL_C_LIST: u8 = 8;

const NLBL_UNLABEL_A_ACPTFLG: u16 = 1;
const NLBL_UNLABEL_A_IPV6ADDR: u16 = 2;
const NLBL_UNLABEL_A_IPV6MASK: u16 = 3;
const NLBL_UNLABEL_A_IPV4ADDR: u16 = 4;
const NLBL_UNLABEL_A_IPV4MASK: u16 = 5;
const NLBL_UNLABEL_A_IFACE: u16 = 6;
const NLBL_UNLABEL_A_SECCTX: u16 = 7;

const SUBSYSTEM: &str = "unlabeled";

/// A static label entry: a security context for unlabeled traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticLabel {
    /// Interface the entry is scoped to; `None` is the wildcard table.
    pub interface: Option<String>,
    /// Source network the entry covers.
    pub network: NetworkSelector,
    /// Security context applied to matching traffic.
    pub context: String,
}

/// Handle for unlabeled-traffic verbs, bound to the resolved family id.
#[derive(Debug, Clone, Copy)]
pub struct Unlabeled {
    family: u16,
}

impl Unlabeled {
    /// Resolves the unlabeled family and returns a handle for it.
    pub fn open<E: Endpoint>(session: &mut Session<E>) -> Result<Self, Error> {
        let family = session.resolve_family(FAMILY_NAME)?;
        Ok(Self { family })
    }

    /// Builds the accept-flag query.
    #[must_use]
    pub const fn build_accept_query(&self) -> Message {
        Message::request(
            self.family,
            NLBL_UNLABEL_C_LIST,
            SERVICE_VERSION,
            NLM_F_REQUEST,
            Vec::new(),
        )
    }

    /// Queries whether unlabeled inbound traffic is currently accepted.
    pub fn accept<E: Endpoint>(&self, session: &mut Session<E>) -> Result<bool, Error> {
        let reply = execute_fetch(session, self.build_accept_query(), SUBSYSTEM)?;
        Ok(required_u8(&reply, NLBL_UNLABEL_A_ACPTFLG, SUBSYSTEM)? != 0)
    }

    /// Builds the accept-flag update.
    #[must_use]
    pub fn build_set_accept_request(&self, accept: bool) -> Message {
        Message::request(
            self.family,
            NLBL_UNLABEL_C_ACCEPT,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_ACK,
            vec![Nla::u8(NLBL_UNLABEL_A_ACPTFLG, u8::from(accept))],
        )
    }

    /// Sets whether unlabeled inbound traffic is accepted.
    pub fn set_accept<E: Endpoint>(
        &self,
        session: &mut Session<E>,
        accept: bool,
    ) -> Result<(), Error> {
        execute_ack(session, self.build_set_accept_request(accept), SUBSYSTEM)
    }

    /// Builds a static-label add request after validating locally.
    pub fn build_add_static_request(
        &self,
        entry: &StaticLabel,
    ) -> Result<Message, ValidationError> {
        if entry.context.is_empty() {
            return Err(ValidationError::EmptyContext);
        }
        let mut attrs = Vec::new();
        let command = match &entry.interface {
            Some(interface) => {
                if interface.is_empty() {
                    return Err(ValidationError::EmptyInterface);
                }
                attrs.push(Nla::string(NLBL_UNLABEL_A_IFACE, interface));
                NLBL_UNLABEL_C_STATICADD
            }
            None => NLBL_UNLABEL_C_STATICADDDEF,
        };
        attrs.push(Nla::string(NLBL_UNLABEL_A_SECCTX, &entry.context));
        push_network(&mut attrs, &entry.network);
        Ok(Message::request(
            self.family,
            command,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_ACK,
            attrs,
        ))
    }

    /// Adds a static label. `Conflict` when the network is already covered.
    pub fn add_static<E: Endpoint>(
        &self,
        session: &mut Session<E>,
        entry: &StaticLabel,
    ) -> Result<(), Error> {
        let request = self.build_add_static_request(entry)?;
        execute_ack(session, request, SUBSYSTEM)
    }

    /// Builds a static-label remove request.
    pub fn build_remove_static_request(
        &self,
        interface: Option<&str>,
        network: &NetworkSelector,
    ) -> Result<Message, ValidationError> {
        let mut attrs = Vec::new();
        let command = match interface {
            Some(interface) => {
                if interface.is_empty() {
                    return Err(ValidationError::EmptyInterface);
                }
                attrs.push(Nla::string(NLBL_UNLABEL_A_IFACE, interface));
                NLBL_UNLABEL_C_STATICREMOVE
            }
            None => NLBL_UNLABEL_C_STATICREMOVEDEF,
        };
        push_network(&mut attrs, network);
        Ok(Message::request(
            self.family,
            command,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_ACK,
            attrs,
        ))
    }

    /// Removes a static label. `NotFound` when no entry matches.
    pub fn remove_static<E: Endpoint>(
        &self,
        session: &mut Session<E>,
        interface: Option<&str>,
        network: &NetworkSelector,
    ) -> Result<(), Error> {
        let request = self.build_remove_static_request(interface, network)?;
        execute_ack(session, request, SUBSYSTEM)
    }

    /// Builds the interface-scoped static-label dump.
    #[must_use]
    pub const fn build_list_static_request(&self) -> Message {
        Message::request(
            self.family,
            NLBL_UNLABEL_C_STATICLIST,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_DUMP,
            Vec::new(),
        )
    }

    /// Builds the wildcard static-label dump.
    #[must_use]
    pub const fn build_list_static_default_request(&self) -> Message {
        Message::request(
            self.family,
            NLBL_UNLABEL_C_STATICLISTDEF,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_DUMP,
            Vec::new(),
        )
    }

    /// Lists every static label, wildcard entries included.
    pub fn list_static<E: Endpoint>(
        &self,
        session: &mut Session<E>,
    ) -> Result<Vec<StaticLabel>, Error> {
        let mut entries = Vec::new();
        let scoped = execute_dump(session, self.build_list_static_request(), SUBSYSTEM)?;
        for reply in &scoped {
            if let Some(entry) = decode_static(reply)? {
                entries.push(entry);
            }
        }
        let wildcard = execute_dump(
            session,
            self.build_list_static_default_request(),
            SUBSYSTEM,
        )?;
        for reply in &wildcard {
            if let Some(entry) = decode_static(reply)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

fn push_network(attrs: &mut Vec<Nla>, network: &NetworkSelector) {
    let (addr_kind, mask_kind) = match network.address {
        std::net::IpAddr::V4(_) => (NLBL_UNLABEL_A_IPV4ADDR, NLBL_UNLABEL_A_IPV4MASK),
        std::net::IpAddr::V6(_) => (NLBL_UNLABEL_A_IPV6ADDR, NLBL_UNLABEL_A_IPV6MASK),
    };
    attrs.push(Nla::bytes(addr_kind, &network.address_bytes()));
    attrs.push(Nla::bytes(mask_kind, &network.mask_bytes()));
}

fn decode_static(reply: &Message) -> Result<Option<StaticLabel>, Error> {
    let interface = match find_attr(&reply.attrs, NLBL_UNLABEL_A_IFACE) {
        Some(attr) => Some(
            attr.as_str()
                .map_err(|_| ServiceError::malformed(SUBSYSTEM))?
                .to_owned(),
        ),
        None => None,
    };
    let context = match find_attr(&reply.attrs, NLBL_UNLABEL_A_SECCTX) {
        Some(attr) => attr
            .as_str()
            .map_err(|_| ServiceError::malformed(SUBSYSTEM))?
            .to_owned(),
        None => return Err(ServiceError::malformed(SUBSYSTEM).into()),
    };
    let network = match decode_network(reply) {
        Some(network) => network,
        None => {
            debug!("skipping static label without a usable network selector");
            return Ok(None);
        }
    };
    Ok(Some(StaticLabel {
        interface,
        network,
        context,
    }))
}

fn decode_network(reply: &Message) -> Option<NetworkSelector> {
    if let (Some(address), Some(mask)) = (
        find_attr(&reply.attrs, NLBL_UNLABEL_A_IPV4ADDR),
        find_attr(&reply.attrs, NLBL_UNLABEL_A_IPV4MASK),
    ) {
        return NetworkSelector::from_v4_bytes(address.payload()?, mask.payload()?).ok();
    }
    if let (Some(address), Some(mask)) = (
        find_attr(&reply.attrs, NLBL_UNLABEL_A_IPV6ADDR),
        find_attr(&reply.attrs, NLBL_UNLABEL_A_IPV6MASK),
    ) {
        return NetworkSelector::from_v6_bytes(address.payload()?, mask.payload()?).ok();
    }
    None
}

//! Domain-mapping subsystem: security domains to label protocols.
//!
//! Mappings are keyed by domain (a process security context); the entry with
//! no domain is the default applied when nothing more specific matches. A
//! mapping either names a label protocol outright or carries a list of
//! per-network selectors. The verbs here ride on the management family.

use tracing::debug;

use labelctl_proto::{Message, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, Nla, find_attr};
use serde::Serialize;

use crate::SERVICE_VERSION;
use crate::error::{Error, ServiceError, ValidationError};
use crate::exchange::{execute_ack, execute_dump, execute_fetch, optional, required_nested_u32};
use crate::mgmt::{
    FAMILY_NAME, NLBL_MGMT_A_ADDRSELECTOR, NLBL_MGMT_A_CV4DOI, NLBL_MGMT_A_DOMAIN,
    NLBL_MGMT_A_FAMILY, NLBL_MGMT_A_IPV4ADDR, NLBL_MGMT_A_IPV4MASK, NLBL_MGMT_A_IPV6ADDR,
    NLBL_MGMT_A_IPV6MASK, NLBL_MGMT_A_PROTOCOL, NLBL_MGMT_A_SELECTORLIST, NLBL_MGMT_C_ADD,
    NLBL_MGMT_C_ADDDEF, NLBL_MGMT_C_LISTALL, NLBL_MGMT_C_LISTDEF, NLBL_MGMT_C_REMOVE,
    NLBL_MGMT_C_REMOVEDEF,
};
use crate::transport::{Endpoint, Session};
use crate::types::{AddressFamily, LabelProtocol, NetworkSelector};

const SUBSYSTEM: &str = "domain-mapping";

/// The label a mapping or selector resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum SelectorLabel {
    /// Traffic passes unlabeled.
    Unlabeled,
    /// CIPSO/IPv4 with the given DOI.
    CipsoV4 {
        /// Domain-of-interpretation id.
        doi: u32,
    },
}

/// One per-network selector inside an address-selected mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddressMapping {
    /// Network this selector covers.
    pub network: NetworkSelector,
    /// Label applied to traffic matching the network.
    pub label: SelectorLabel,
}

/// How a domain's traffic is labeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum MappingLabel {
    /// Traffic passes unlabeled.
    Unlabeled,
    /// CIPSO/IPv4 with the given DOI.
    CipsoV4 {
        /// Domain-of-interpretation id.
        doi: u32,
    },
    /// Per-network selection.
    AddressSelect {
        /// Selectors in kernel order.
        selectors: Vec<AddressMapping>,
    },
}

/// A domain-mapping entry as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainMapping {
    /// Mapped domain; `None` is the default mapping.
    pub domain: Option<String>,
    /// Address-family scope.
    pub family: AddressFamily,
    /// The label side of the mapping.
    pub label: MappingLabel,
}

/// Parameters for adding a mapping entry.
///
/// A selector network turns the entry into (or extends) an address-selected
/// mapping for the domain; without one the label applies to all of the
/// domain's traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingUpdate {
    /// Domain to map; `None` targets the default mapping.
    pub domain: Option<String>,
    /// Address-family scope.
    pub family: AddressFamily,
    /// Label to apply.
    pub label: SelectorLabel,
    /// Optional network selector restricting the label.
    pub network: Option<NetworkSelector>,
}

/// Handle for domain-mapping verbs, bound to the resolved family id.
#[derive(Debug, Clone, Copy)]
pub struct Mappings {
    family: u16,
}

impl Mappings {
    /// Resolves the management family and returns a mapping handle.
    pub fn open<E: Endpoint>(session: &mut Session<E>) -> Result<Self, Error> {
        let family = session.resolve_family(FAMILY_NAME)?;
        Ok(Self { family })
    }

    /// Builds an add request after validating the parameters locally.
    pub fn build_add_request(&self, update: &MappingUpdate) -> Result<Message, ValidationError> {
        let mut attrs = Vec::new();
        let command = match &update.domain {
            Some(domain) => {
                if domain.is_empty() {
                    return Err(ValidationError::EmptyDomain);
                }
                attrs.push(Nla::string(NLBL_MGMT_A_DOMAIN, domain));
                NLBL_MGMT_C_ADD
            }
            None => NLBL_MGMT_C_ADDDEF,
        };
        if update.family != AddressFamily::Any {
            attrs.push(Nla::u16(NLBL_MGMT_A_FAMILY, update.family.raw()));
        }
        match update.label {
            SelectorLabel::Unlabeled => {
                attrs.push(Nla::u32(NLBL_MGMT_A_PROTOCOL, LabelProtocol::Unlabeled.raw()));
            }
            SelectorLabel::CipsoV4 { doi } => {
                if doi == 0 {
                    return Err(ValidationError::ZeroDoi);
                }
                attrs.push(Nla::u32(NLBL_MGMT_A_PROTOCOL, LabelProtocol::CipsoV4.raw()));
                attrs.push(Nla::u32(NLBL_MGMT_A_CV4DOI, doi));
            }
        }
        if let Some(network) = &update.network {
            push_network(&mut attrs, network);
        }
        Ok(Message::request(
            self.family,
            command,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_ACK,
            attrs,
        ))
    }

    /// Adds a mapping entry. `Conflict` when the key already exists.
    pub fn add<E: Endpoint>(
        &self,
        session: &mut Session<E>,
        update: &MappingUpdate,
    ) -> Result<(), Error> {
        let request = self.build_add_request(update)?;
        execute_ack(session, request, SUBSYSTEM)
    }

    /// Builds a remove request; a missing domain targets the default
    /// mapping.
    pub fn build_remove_request(
        &self,
        domain: Option<&str>,
    ) -> Result<Message, ValidationError> {
        let (command, attrs) = match domain {
            Some(domain) => {
                if domain.is_empty() {
                    return Err(ValidationError::EmptyDomain);
                }
                (
                    NLBL_MGMT_C_REMOVE,
                    vec![Nla::string(NLBL_MGMT_A_DOMAIN, domain)],
                )
            }
            None => (NLBL_MGMT_C_REMOVEDEF, Vec::new()),
        };
        Ok(Message::request(
            self.family,
            command,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_ACK,
            attrs,
        ))
    }

    /// Removes a mapping entry. `NotFound` when no entry matches; removal
    /// is never silently idempotent.
    pub fn remove<E: Endpoint>(
        &self,
        session: &mut Session<E>,
        domain: Option<&str>,
    ) -> Result<(), Error> {
        let request = self.build_remove_request(domain)?;
        execute_ack(session, request, SUBSYSTEM)
    }

    /// Builds the full-table dump request.
    #[must_use]
    pub const fn build_list_request(&self) -> Message {
        Message::request(
            self.family,
            NLBL_MGMT_C_LISTALL,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_DUMP,
            Vec::new(),
        )
    }

    /// Builds the default-mapping query.
    #[must_use]
    pub const fn build_list_default_request(&self) -> Message {
        Message::request(
            self.family,
            NLBL_MGMT_C_LISTDEF,
            SERVICE_VERSION,
            NLM_F_REQUEST,
            Vec::new(),
        )
    }

    /// Lists every mapping entry, default mapping included when one is
    /// configured. Entries using protocols this client does not recognise
    /// are logged and skipped.
    pub fn list<E: Endpoint>(
        &self,
        session: &mut Session<E>,
    ) -> Result<Vec<DomainMapping>, Error> {
        let replies = execute_dump(session, self.build_list_request(), SUBSYSTEM)?;
        let mut entries = Vec::with_capacity(replies.len() + 1);
        for reply in &replies {
            if let Some(entry) = decode_entry(reply, true)? {
                entries.push(entry);
            }
        }
        let default_reply = optional(execute_fetch(
            session,
            self.build_list_default_request(),
            SUBSYSTEM,
        ))?;
        if let Some(reply) = default_reply
            && let Some(entry) = decode_entry(&reply, false)?
        {
            entries.push(entry);
        }
        Ok(entries)
    }
}

fn push_network(attrs: &mut Vec<Nla>, network: &NetworkSelector) {
    let (addr_kind, mask_kind) = match network.address {
        std::net::IpAddr::V4(_) => (NLBL_MGMT_A_IPV4ADDR, NLBL_MGMT_A_IPV4MASK),
        std::net::IpAddr::V6(_) => (NLBL_MGMT_A_IPV6ADDR, NLBL_MGMT_A_IPV6MASK),
    };
    attrs.push(Nla::bytes(addr_kind, &network.address_bytes()));
    attrs.push(Nla::bytes(mask_kind, &network.mask_bytes()));
}

/// Decodes one listing reply into an entry. `Ok(None)` means the entry uses
/// a vocabulary this client does not know and was skipped.
fn decode_entry(reply: &Message, expect_domain: bool) -> Result<Option<DomainMapping>, Error> {
    let domain = if expect_domain {
        match find_attr(&reply.attrs, NLBL_MGMT_A_DOMAIN) {
            Some(attr) => Some(
                attr.as_str()
                    .map_err(|_| ServiceError::malformed(SUBSYSTEM))?
                    .to_owned(),
            ),
            None => None,
        }
    } else {
        None
    };
    let family = match find_attr(&reply.attrs, NLBL_MGMT_A_FAMILY) {
        Some(attr) => {
            let raw = attr.as_u16().map_err(|_| ServiceError::malformed(SUBSYSTEM))?;
            match AddressFamily::from_raw(raw) {
                Ok(family) => family,
                Err(unknown) => {
                    debug!(%unknown, "skipping mapping with unrecognised address family");
                    return Ok(None);
                }
            }
        }
        None => AddressFamily::Any,
    };

    let label = if let Some(list) = find_attr(&reply.attrs, NLBL_MGMT_A_SELECTORLIST) {
        let mut selectors = Vec::new();
        for selector in list
            .children()
            .map_err(|_| ServiceError::malformed(SUBSYSTEM))?
        {
            if selector.kind() != NLBL_MGMT_A_ADDRSELECTOR {
                debug!(kind = selector.kind(), "ignoring unrecognised selector attribute");
                continue;
            }
            match decode_selector(&selector)? {
                Some(mapping) => selectors.push(mapping),
                None => return Ok(None),
            }
        }
        MappingLabel::AddressSelect { selectors }
    } else {
        let raw = required_nested_u32(&reply.attrs, NLBL_MGMT_A_PROTOCOL, SUBSYSTEM)?;
        match LabelProtocol::from_raw(raw) {
            Ok(LabelProtocol::Unlabeled) => MappingLabel::Unlabeled,
            Ok(LabelProtocol::CipsoV4) => MappingLabel::CipsoV4 {
                doi: required_nested_u32(&reply.attrs, NLBL_MGMT_A_CV4DOI, SUBSYSTEM)?,
            },
            Ok(other) => {
                debug!(%other, "skipping mapping with unsupported protocol");
                return Ok(None);
            }
            Err(unknown) => {
                debug!(%unknown, "skipping mapping with unrecognised protocol");
                return Ok(None);
            }
        }
    };

    Ok(Some(DomainMapping {
        domain,
        family,
        label,
    }))
}

fn decode_selector(selector: &Nla) -> Result<Option<AddressMapping>, Error> {
    let attrs = selector
        .children()
        .map_err(|_| ServiceError::malformed(SUBSYSTEM))?;
    let network = decode_network(&attrs)?;
    let raw = required_nested_u32(&attrs, NLBL_MGMT_A_PROTOCOL, SUBSYSTEM)?;
    let label = match LabelProtocol::from_raw(raw) {
        Ok(LabelProtocol::Unlabeled) => SelectorLabel::Unlabeled,
        Ok(LabelProtocol::CipsoV4) => SelectorLabel::CipsoV4 {
            doi: required_nested_u32(&attrs, NLBL_MGMT_A_CV4DOI, SUBSYSTEM)?,
        },
        Ok(other) => {
            debug!(%other, "skipping selector with unsupported protocol");
            return Ok(None);
        }
        Err(unknown) => {
            debug!(%unknown, "skipping selector with unrecognised protocol");
            return Ok(None);
        }
    };
    Ok(Some(AddressMapping { network, label }))
}

fn decode_network(attrs: &[Nla]) -> Result<NetworkSelector, Error> {
    if let (Some(address), Some(mask)) = (
        find_attr(attrs, NLBL_MGMT_A_IPV4ADDR),
        find_attr(attrs, NLBL_MGMT_A_IPV4MASK),
    ) {
        return selector_from(address, mask, NetworkSelector::from_v4_bytes);
    }
    if let (Some(address), Some(mask)) = (
        find_attr(attrs, NLBL_MGMT_A_IPV6ADDR),
        find_attr(attrs, NLBL_MGMT_A_IPV6MASK),
    ) {
        return selector_from(address, mask, NetworkSelector::from_v6_bytes);
    }
    Err(ServiceError::malformed(SUBSYSTEM).into())
}

fn selector_from(
    address: &Nla,
    mask: &Nla,
    build: impl Fn(&[u8], &[u8]) -> Result<NetworkSelector, labelctl_proto::DecodeError>,
) -> Result<NetworkSelector, Error> {
    let address = address
        .payload()
        .ok_or_else(|| ServiceError::malformed(SUBSYSTEM))?;
    let mask = mask
        .payload()
        .ok_or_else(|| ServiceError::malformed(SUBSYSTEM))?;
    build(address, mask).map_err(|_| ServiceError::malformed(SUBSYSTEM).into())
}

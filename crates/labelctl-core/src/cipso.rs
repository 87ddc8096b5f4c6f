//! Label-definition subsystem: CIPSO/IPv4 domains of interpretation.
//!
//! A definition names a DOI, the tags its packets may carry, and how MLS
//! levels and categories translate between the local security module and
//! the on-the-wire encoding. Pass-through definitions skip translation;
//! local definitions keep the label entirely host-side.

use tracing::debug;

use labelctl_proto::{Message, NLM_F_ACK, NLM_F_DUMP, NLM_F_REQUEST, Nla, find_attr};
use serde::Serialize;

use crate::SERVICE_VERSION;
use crate::error::{Error, ServiceError, ValidationError};
use crate::exchange::{
    execute_ack, execute_dump, execute_fetch, required_nested_u32, required_u32,
};
use crate::transport::{Endpoint, Session};

/// Family name the CIPSO/IPv4 subsystem registers under.
const FAMILY_NAME: &str = "NLBL_CIPSOv4";

const NLBL_CIPSOV4_C_ADD: u8 = 1;
const NLBL_CIPSOV4_C_REMOVE: u8 = 2;
const NLBL_CIPSOV4_C_LIST: u8 = 3;
const NLBL_CIPSOV4_C_LISTALL: u8 = 4;

const NLBL_CIPSOV4_A_DOI: u16 = 1;
const NLBL_CIPSOV4_A_MTYPE: u16 = 2;
const NLBL_CIPSOV4_A_TAG: u16 = 3;
const NLBL_CIPSOV4_A_TAGLST: u16 = 4;
const NLBL_CIPSOV4_A_MLSLVLLOC: u16 = 5;
const NLBL_CIPSOV4_A_MLSLVLREM: u16 = 6;
const NLBL_CIPSOV4_A_MLSLVL: u16 = 7;
const NLBL_CIPSOV4_A_MLSLVLLST: u16 = 8;
const NLBL_CIPSOV4_A_MLSCATLOC: u16 = 9;
const NLBL_CIPSOV4_A_MLSCATREM: u16 = 10;
const NLBL_CIPSOV4_A_MLSCAT: u16 = 11;
const NLBL_CIPSOV4_A_MLSCATLST: u16 = 12;

/// Tag carried by host-local definitions.
const CIPSO_TAG_LOCAL: u8 = 128;

const SUBSYSTEM: &str = "cipso";

/// Translation style of a definition, as reported in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapType {
    /// Levels and categories translate through explicit tables.
    Translated,
    /// On-the-wire values pass straight through.
    PassThrough,
    /// The label never leaves the host.
    Local,
}

impl MapType {
    const fn raw(self) -> u32 {
        match self {
            Self::Translated => 1,
            Self::PassThrough => 2,
            Self::Local => 3,
        }
    }

    const fn from_raw(raw: u32) -> Result<Self, labelctl_proto::DecodeError> {
        match raw {
            1 => Ok(Self::Translated),
            2 => Ok(Self::PassThrough),
            3 => Ok(Self::Local),
            other => Err(labelctl_proto::DecodeError::UnknownType(other)),
        }
    }
}

impl std::fmt::Display for MapType {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Translated => "translated",
            Self::PassThrough => "pass-through",
            Self::Local => "local",
        };
        formatter.write_str(name)
    }
}

/// One level translation: local MLS level to wire sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelMapping {
    /// Level as the local security module numbers it.
    pub local: u32,
    /// Level as encoded on the wire.
    pub remote: u32,
}

/// One category translation: local MLS category to wire category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryMapping {
    /// Category as the local security module numbers it.
    pub local: u32,
    /// Category as encoded on the wire.
    pub remote: u32,
}

/// The translation rules of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "map_type", rename_all = "snake_case")]
pub enum DoiKind {
    /// Explicit level and category tables.
    Translated {
        /// Tags packets under this DOI may carry.
        tags: Vec<u8>,
        /// Level translation table; never empty.
        levels: Vec<LevelMapping>,
        /// Category translation table; may be empty.
        categories: Vec<CategoryMapping>,
    },
    /// Wire values used as-is.
    PassThrough {
        /// Tags packets under this DOI may carry.
        tags: Vec<u8>,
    },
    /// Host-local labels; the tag is fixed by the protocol.
    Local,
}

/// A full label-set definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoiDefinition {
    /// Domain-of-interpretation id; never zero.
    pub doi: u32,
    /// Translation rules.
    pub kind: DoiKind,
}

/// One row of the definition listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DoiSummary {
    /// Domain-of-interpretation id.
    pub doi: u32,
    /// Translation style.
    pub map_type: MapType,
}

/// Handle for label-definition verbs, bound to the resolved family id.
#[derive(Debug, Clone, Copy)]
pub struct Definitions {
    family: u16,
}

impl Definitions {
    /// Resolves the CIPSO/IPv4 family and returns a handle for it.
    pub fn open<E: Endpoint>(session: &mut Session<E>) -> Result<Self, Error> {
        let family = session.resolve_family(FAMILY_NAME)?;
        Ok(Self { family })
    }

    /// Builds an add request after validating the definition locally.
    pub fn build_add_request(
        &self,
        definition: &DoiDefinition,
    ) -> Result<Message, ValidationError> {
        if definition.doi == 0 {
            return Err(ValidationError::ZeroDoi);
        }
        let mut attrs = vec![Nla::u32(NLBL_CIPSOV4_A_DOI, definition.doi)];
        match &definition.kind {
            DoiKind::Translated {
                tags,
                levels,
                categories,
            } => {
                if tags.is_empty() {
                    return Err(ValidationError::EmptyTagList);
                }
                if levels.is_empty() {
                    return Err(ValidationError::EmptyLevelTable);
                }
                attrs.push(Nla::u32(NLBL_CIPSOV4_A_MTYPE, MapType::Translated.raw()));
                attrs.push(tag_list(tags));
                attrs.push(Nla::nested(
                    NLBL_CIPSOV4_A_MLSLVLLST,
                    levels
                        .iter()
                        .map(|level| {
                            Nla::nested(
                                NLBL_CIPSOV4_A_MLSLVL,
                                vec![
                                    Nla::u32(NLBL_CIPSOV4_A_MLSLVLLOC, level.local),
                                    Nla::u32(NLBL_CIPSOV4_A_MLSLVLREM, level.remote),
                                ],
                            )
                        })
                        .collect(),
                ));
                if !categories.is_empty() {
                    attrs.push(Nla::nested(
                        NLBL_CIPSOV4_A_MLSCATLST,
                        categories
                            .iter()
                            .map(|category| {
                                Nla::nested(
                                    NLBL_CIPSOV4_A_MLSCAT,
                                    vec![
                                        Nla::u32(NLBL_CIPSOV4_A_MLSCATLOC, category.local),
                                        Nla::u32(NLBL_CIPSOV4_A_MLSCATREM, category.remote),
                                    ],
                                )
                            })
                            .collect(),
                    ));
                }
            }
            DoiKind::PassThrough { tags } => {
                if tags.is_empty() {
                    return Err(ValidationError::EmptyTagList);
                }
                attrs.push(Nla::u32(NLBL_CIPSOV4_A_MTYPE, MapType::PassThrough.raw()));
                attrs.push(tag_list(tags));
            }
            DoiKind::Local => {
                attrs.push(Nla::u32(NLBL_CIPSOV4_A_MTYPE, MapType::Local.raw()));
                attrs.push(tag_list(&[CIPSO_TAG_LOCAL]));
            }
        }
        Ok(Message::request(
            self.family,
            NLBL_CIPSOV4_C_ADD,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_ACK,
            attrs,
        ))
    }

    /// Adds a definition. `Conflict` when the DOI already exists; the
    /// existing definition is left untouched.
    pub fn add<E: Endpoint>(
        &self,
        session: &mut Session<E>,
        definition: &DoiDefinition,
    ) -> Result<(), Error> {
        let request = self.build_add_request(definition)?;
        execute_ack(session, request, SUBSYSTEM)
    }

    /// Builds a remove request for one DOI.
    pub fn build_remove_request(&self, doi: u32) -> Result<Message, ValidationError> {
        if doi == 0 {
            return Err(ValidationError::ZeroDoi);
        }
        Ok(Message::request(
            self.family,
            NLBL_CIPSOV4_C_REMOVE,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_ACK,
            vec![Nla::u32(NLBL_CIPSOV4_A_DOI, doi)],
        ))
    }

    /// Removes a definition. `NotFound` when the DOI does not exist and
    /// `InUse` while a domain mapping still references it.
    pub fn remove<E: Endpoint>(&self, session: &mut Session<E>, doi: u32) -> Result<(), Error> {
        let request = self.build_remove_request(doi)?;
        execute_ack(session, request, SUBSYSTEM)
    }

    /// Builds the definition-listing dump.
    #[must_use]
    pub const fn build_list_request(&self) -> Message {
        Message::request(
            self.family,
            NLBL_CIPSOV4_C_LISTALL,
            SERVICE_VERSION,
            NLM_F_REQUEST | NLM_F_DUMP,
            Vec::new(),
        )
    }

    /// Lists every definition as a DOI/map-type pair. Definitions with a
    /// map type this client does not recognise are logged and skipped.
    pub fn list<E: Endpoint>(&self, session: &mut Session<E>) -> Result<Vec<DoiSummary>, Error> {
        let replies = execute_dump(session, self.build_list_request(), SUBSYSTEM)?;
        let mut summaries = Vec::with_capacity(replies.len());
        for reply in &replies {
            let doi = required_u32(reply, NLBL_CIPSOV4_A_DOI, SUBSYSTEM)?;
            let raw = required_u32(reply, NLBL_CIPSOV4_A_MTYPE, SUBSYSTEM)?;
            match MapType::from_raw(raw) {
                Ok(map_type) => summaries.push(DoiSummary { doi, map_type }),
                Err(unknown) => debug!(%unknown, doi, "skipping definition with unrecognised map type"),
            }
        }
        Ok(summaries)
    }

    /// Builds the single-DOI query.
    pub fn build_describe_request(&self, doi: u32) -> Result<Message, ValidationError> {
        if doi == 0 {
            return Err(ValidationError::ZeroDoi);
        }
        Ok(Message::request(
            self.family,
            NLBL_CIPSOV4_C_LIST,
            SERVICE_VERSION,
            NLM_F_REQUEST,
            vec![Nla::u32(NLBL_CIPSOV4_A_DOI, doi)],
        ))
    }

    /// Fetches the full definition of one DOI. `NotFound` when it does not
    /// exist.
    pub fn describe<E: Endpoint>(
        &self,
        session: &mut Session<E>,
        doi: u32,
    ) -> Result<DoiDefinition, Error> {
        let request = self.build_describe_request(doi)?;
        let reply = execute_fetch(session, request, SUBSYSTEM)?;
        let raw = required_u32(&reply, NLBL_CIPSOV4_A_MTYPE, SUBSYSTEM)?;
        let map_type =
            MapType::from_raw(raw).map_err(|_| ServiceError::malformed(SUBSYSTEM))?;
        let kind = match map_type {
            MapType::Translated => DoiKind::Translated {
                tags: decode_tags(&reply)?,
                levels: decode_pairs(
                    &reply,
                    NLBL_CIPSOV4_A_MLSLVLLST,
                    NLBL_CIPSOV4_A_MLSLVL,
                    NLBL_CIPSOV4_A_MLSLVLLOC,
                    NLBL_CIPSOV4_A_MLSLVLREM,
                )?
                .into_iter()
                .map(|(local, remote)| LevelMapping { local, remote })
                .collect(),
                categories: decode_pairs(
                    &reply,
                    NLBL_CIPSOV4_A_MLSCATLST,
                    NLBL_CIPSOV4_A_MLSCAT,
                    NLBL_CIPSOV4_A_MLSCATLOC,
                    NLBL_CIPSOV4_A_MLSCATREM,
                )?
                .into_iter()
                .map(|(local, remote)| CategoryMapping { local, remote })
                .collect(),
            },
            MapType::PassThrough => DoiKind::PassThrough {
                tags: decode_tags(&reply)?,
            },
            MapType::Local => DoiKind::Local,
        };
        Ok(DoiDefinition { doi, kind })
    }
}

fn tag_list(tags: &[u8]) -> Nla {
    Nla::nested(
        NLBL_CIPSOV4_A_TAGLST,
        tags.iter()
            .map(|tag| Nla::u8(NLBL_CIPSOV4_A_TAG, *tag))
            .collect(),
    )
}

fn decode_tags(reply: &Message) -> Result<Vec<u8>, Error> {
    let list = find_attr(&reply.attrs, NLBL_CIPSOV4_A_TAGLST)
        .ok_or_else(|| ServiceError::malformed(SUBSYSTEM))?;
    let mut tags = Vec::new();
    for child in list
        .children()
        .map_err(|_| ServiceError::malformed(SUBSYSTEM))?
    {
        if child.kind() != NLBL_CIPSOV4_A_TAG {
            debug!(kind = child.kind(), "ignoring unrecognised tag attribute");
            continue;
        }
        tags.push(child.as_u8().map_err(|_| ServiceError::malformed(SUBSYSTEM))?);
    }
    Ok(tags)
}

/// Decodes a `{ list { entry { local, remote } ... } }` translation table.
/// An absent list is an empty table.
fn decode_pairs(
    reply: &Message,
    list_kind: u16,
    entry_kind: u16,
    local_kind: u16,
    remote_kind: u16,
) -> Result<Vec<(u32, u32)>, Error> {
    let Some(list) = find_attr(&reply.attrs, list_kind) else {
        return Ok(Vec::new());
    };
    let mut pairs = Vec::new();
    for entry in list
        .children()
        .map_err(|_| ServiceError::malformed(SUBSYSTEM))?
    {
        if entry.kind() != entry_kind {
            debug!(kind = entry.kind(), "ignoring unrecognised table attribute");
            continue;
        }
        let attrs = entry
            .children()
            .map_err(|_| ServiceError::malformed(SUBSYSTEM))?;
        pairs.push((
            required_nested_u32(&attrs, local_kind, SUBSYSTEM)?,
            required_nested_u32(&attrs, remote_kind, SUBSYSTEM)?,
        ));
    }
    Ok(pairs)
}

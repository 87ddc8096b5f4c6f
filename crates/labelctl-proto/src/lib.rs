//! Wire format for the kernel labeling service's control protocol.
//!
//! The labeling service speaks generic netlink: a fixed message header, a
//! small command header, then a sequence of type-length-value attributes
//! padded to four-byte boundaries. This crate owns that framing and nothing
//! else: it never interprets what an attribute *means*, only whether it is
//! well formed. Semantic decoding belongs to the subsystem handlers in
//! `labelctl-core`.
//!
//! Decoding is deliberately paranoid. Every header and payload read is
//! bounds-checked against the remaining buffer before it happens, so a
//! truncated or corrupted datagram surfaces as a [`DecodeError`] rather than
//! an out-of-bounds access.

mod attr;
mod message;

pub use attr::{
    DecodeError, NLA_ALIGNTO, NLA_F_NESTED, NLA_HDRLEN, Nla, NlaValue, encode, find_attr,
    nla_align,
};
pub use message::{
    CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME, CTRL_CMD_GETFAMILY, CTRL_VERSION, Frame,
    GENL_HDRLEN, GENL_ID_CTRL, Message, NLM_F_ACK, NLM_F_DUMP, NLM_F_MULTI, NLM_F_REQUEST,
    NLMSG_DONE, NLMSG_ERROR, NLMSG_HDRLEN, NLMSG_NOOP, encode_done, encode_error, split_frames,
};

//! Message envelopes and datagram framing.
//!
//! Every exchange with the labeling service is one or more frames packed
//! into a datagram. A frame is a 16-byte message header (length, type,
//! flags, sequence, port) followed by its payload. Data frames carry a
//! 4-byte command header and then attributes; control frames (`NLMSG_DONE`,
//! `NLMSG_ERROR`) carry control payloads that the transport and status
//! layers interpret.

use byteorder::{ByteOrder, NativeEndian};

use crate::attr::{DecodeError, Nla, encode, nla_align};

/// Size of the message header.
pub const NLMSG_HDRLEN: usize = 16;

/// Size of the command header carried by data frames.
pub const GENL_HDRLEN: usize = 4;

/// No-op control frame; skipped on receive.
pub const NLMSG_NOOP: u16 = 1;

/// Kernel status report, positive acknowledgement or error.
pub const NLMSG_ERROR: u16 = 2;

/// Terminator closing a multi-frame dump response.
pub const NLMSG_DONE: u16 = 3;

/// Frame carries a request the kernel should process.
pub const NLM_F_REQUEST: u16 = 0x01;

/// More frames follow in this response sequence.
pub const NLM_F_MULTI: u16 = 0x02;

/// Request a status report even on success.
pub const NLM_F_ACK: u16 = 0x04;

/// Request a full-table dump (`NLM_F_ROOT | NLM_F_MATCH`).
pub const NLM_F_DUMP: u16 = 0x300;

/// Fixed family id of the generic netlink controller.
pub const GENL_ID_CTRL: u16 = 0x10;

/// Controller command resolving a family name to its runtime id.
pub const CTRL_CMD_GETFAMILY: u8 = 3;

/// Controller attribute: resolved 16-bit family id.
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;

/// Controller attribute: family name being resolved.
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;

/// Protocol version spoken by the controller family.
pub const CTRL_VERSION: u8 = 1;

/// One frame lifted out of a datagram: the parsed header and the raw
/// payload bytes that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type: a runtime family id for data, or a control type.
    pub message_type: u16,
    /// Header flags (`NLM_F_MULTI` and friends).
    pub flags: u16,
    /// Sequence number echoed from the request.
    pub sequence: u32,
    /// Port identity of the addressed endpoint.
    pub port: u32,
    /// Everything after the message header, padding excluded.
    pub payload: Vec<u8>,
}

impl Frame {
    /// True for the dump-terminator control frame.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.message_type == NLMSG_DONE
    }

    /// True for a kernel status report.
    #[must_use]
    pub const fn is_status(&self) -> bool {
        self.message_type == NLMSG_ERROR
    }

    /// True for a no-op control frame.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.message_type == NLMSG_NOOP
    }
}

/// A fully-formed data message: envelope plus decoded attributes.
///
/// Requests are built by the subsystem handlers with `sequence` and `port`
/// left at zero; the transport fills both in as it sends. Responses are
/// produced by [`Message::decode`] from a matching [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Runtime family id this message is addressed to.
    pub family: u16,
    /// Subsystem command code.
    pub command: u8,
    /// Subsystem protocol version.
    pub version: u8,
    /// Header flags.
    pub flags: u16,
    /// Sequence number; assigned by the transport on send.
    pub sequence: u32,
    /// Port identity; assigned by the transport on send.
    pub port: u32,
    /// Ordered top-level attributes.
    pub attrs: Vec<Nla>,
}

impl Message {
    /// Builds a request envelope with transport fields left unassigned.
    #[must_use]
    pub const fn request(family: u16, command: u8, version: u8, flags: u16, attrs: Vec<Nla>) -> Self {
        Self {
            family,
            command,
            version,
            flags,
            sequence: 0,
            port: 0,
            attrs,
        }
    }

    /// Serialises the full frame: message header, command header, attributes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let attrs = encode(&self.attrs);
        let length = NLMSG_HDRLEN + GENL_HDRLEN + attrs.len();
        let mut buf = Vec::with_capacity(nla_align(length));
        buf.resize(NLMSG_HDRLEN, 0);
        debug_assert!(length <= u32::MAX as usize);
        NativeEndian::write_u32(&mut buf[0..4], length as u32);
        NativeEndian::write_u16(&mut buf[4..6], self.family);
        NativeEndian::write_u16(&mut buf[6..8], self.flags);
        NativeEndian::write_u32(&mut buf[8..12], self.sequence);
        NativeEndian::write_u32(&mut buf[12..16], self.port);
        buf.push(self.command);
        buf.push(self.version);
        buf.extend_from_slice(&[0, 0]);
        buf.extend_from_slice(&attrs);
        buf
    }

    /// Decodes a data frame into a message.
    pub fn decode(frame: &Frame) -> Result<Self, DecodeError> {
        if frame.payload.len() < GENL_HDRLEN {
            return Err(DecodeError::Truncated {
                needed: GENL_HDRLEN,
                remaining: frame.payload.len(),
            });
        }
        let attrs = Nla::decode_all(&frame.payload[GENL_HDRLEN..])?;
        Ok(Self {
            family: frame.message_type,
            command: frame.payload[0],
            version: frame.payload[1],
            flags: frame.flags,
            sequence: frame.sequence,
            port: frame.port,
            attrs,
        })
    }
}

/// Splits a received datagram into its constituent frames.
///
/// A single datagram may carry many frames (dump responses are batched this
/// way). Each frame's declared length is validated against the remaining
/// buffer before any payload is touched.
pub fn split_frames(datagram: &[u8]) -> Result<Vec<Frame>, DecodeError> {
    let mut frames = Vec::new();
    let mut rest = datagram;
    while !rest.is_empty() {
        if rest.len() < NLMSG_HDRLEN {
            return Err(DecodeError::Truncated {
                needed: NLMSG_HDRLEN,
                remaining: rest.len(),
            });
        }
        let length = NativeEndian::read_u32(&rest[0..4]) as usize;
        if length < NLMSG_HDRLEN {
            return Err(DecodeError::BadLength {
                declared: length,
                expected: NLMSG_HDRLEN,
            });
        }
        if length > rest.len() {
            return Err(DecodeError::Truncated {
                needed: length,
                remaining: rest.len(),
            });
        }
        frames.push(Frame {
            message_type: NativeEndian::read_u16(&rest[4..6]),
            flags: NativeEndian::read_u16(&rest[6..8]),
            sequence: NativeEndian::read_u32(&rest[8..12]),
            port: NativeEndian::read_u32(&rest[12..16]),
            payload: rest[NLMSG_HDRLEN..length].to_vec(),
        });
        rest = &rest[nla_align(length).min(rest.len())..];
    }
    Ok(frames)
}

fn encode_control(message_type: u16, sequence: u32, port: u32, payload: &[u8]) -> Vec<u8> {
    let length = NLMSG_HDRLEN + payload.len();
    let mut buf = vec![0; NLMSG_HDRLEN];
    debug_assert!(length <= u32::MAX as usize);
    NativeEndian::write_u32(&mut buf[0..4], length as u32);
    NativeEndian::write_u16(&mut buf[4..6], message_type);
    NativeEndian::write_u32(&mut buf[8..12], sequence);
    NativeEndian::write_u32(&mut buf[12..16], port);
    buf.extend_from_slice(payload);
    buf
}

/// Encodes a dump-terminator frame addressed to `port`.
#[must_use]
pub fn encode_done(sequence: u32, port: u32) -> Vec<u8> {
    encode_control(NLMSG_DONE, sequence, port, &0i32.to_ne_bytes())
}

/// Encodes a status-report frame carrying `code` (0 for an acknowledgement,
/// a negated errno otherwise) addressed to `port`.
#[must_use]
pub fn encode_error(code: i32, sequence: u32, port: u32) -> Vec<u8> {
    // A real report echoes the offending request header after the code; the
    // code alone is sufficient for classification.
    let mut payload = code.to_ne_bytes().to_vec();
    payload.extend_from_slice(&[0; NLMSG_HDRLEN]);
    encode_control(NLMSG_ERROR, sequence, port, &payload)
}

//! Type-length-value attribute encoding and decoding.
//!
//! Attributes are the payload vocabulary of every labeling-service message: a
//! 16-bit length covering header plus payload, a 16-bit type tag, the payload
//! itself, and zero padding up to the next four-byte boundary. A container
//! attribute sets the high bit of its type tag and nests the same encoding
//! recursively.

use byteorder::{ByteOrder, NativeEndian};
use thiserror::Error;

/// Size of the attribute header (length + type).
pub const NLA_HDRLEN: usize = 4;

/// Alignment unit for attributes within a message.
pub const NLA_ALIGNTO: usize = 4;

/// Type-tag bit marking a container of nested attributes.
pub const NLA_F_NESTED: u16 = 0x8000;

/// Type-tag bit reserved for network-byte-order payloads; never set by the
/// labeling service but masked off defensively on decode.
const NLA_F_NET_BYTEORDER: u16 = 0x4000;

const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Rounds `len` up to the attribute alignment boundary.
#[must_use]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Failures while decoding attribute or message framing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A header or declared payload would read past the end of the buffer.
    #[error("truncated: need {needed} bytes but only {remaining} remain")]
    Truncated { needed: usize, remaining: usize },
    /// A declared length or scalar width is inconsistent with the format.
    #[error("inconsistent length {declared} for a {expected}-byte field")]
    BadLength { declared: usize, expected: usize },
    /// A discriminant value is outside the known set. Non-fatal: callers log
    /// it and skip the carrying attribute.
    #[error("unrecognised discriminant {0}")]
    UnknownType(u32),
}

/// A single decoded attribute: a type tag and either a raw payload or an
/// ordered run of child attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nla {
    kind: u16,
    value: NlaValue,
}

/// Payload of an attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NlaValue {
    /// Raw bytes; scalar interpretation happens through the typed accessors.
    Bytes(Vec<u8>),
    /// An ordered sequence of well-formed child attributes.
    Nested(Vec<Nla>),
}

impl Nla {
    /// Builds an attribute carrying a raw byte payload.
    #[must_use]
    pub fn bytes(kind: u16, payload: &[u8]) -> Self {
        Self {
            kind: kind & NLA_TYPE_MASK,
            value: NlaValue::Bytes(payload.to_vec()),
        }
    }

    /// Builds a one-byte scalar attribute.
    #[must_use]
    pub fn u8(kind: u16, value: u8) -> Self {
        Self::bytes(kind, &[value])
    }

    /// Builds a two-byte native-endian scalar attribute.
    #[must_use]
    pub fn u16(kind: u16, value: u16) -> Self {
        Self::bytes(kind, &value.to_ne_bytes())
    }

    /// Builds a four-byte native-endian scalar attribute.
    #[must_use]
    pub fn u32(kind: u16, value: u32) -> Self {
        Self::bytes(kind, &value.to_ne_bytes())
    }

    /// Builds a NUL-terminated string attribute.
    #[must_use]
    pub fn string(kind: u16, value: &str) -> Self {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        Self {
            kind: kind & NLA_TYPE_MASK,
            value: NlaValue::Bytes(payload),
        }
    }

    /// Builds a zero-length flag attribute; presence is the signal.
    #[must_use]
    pub fn flag(kind: u16) -> Self {
        Self::bytes(kind, &[])
    }

    /// Builds a container attribute holding `children` in order.
    #[must_use]
    pub fn nested(kind: u16, children: Vec<Nla>) -> Self {
        Self {
            kind: kind & NLA_TYPE_MASK,
            value: NlaValue::Nested(children),
        }
    }

    /// The type tag with the container and byte-order bits masked off.
    #[must_use]
    pub const fn kind(&self) -> u16 {
        self.kind
    }

    /// The attribute value.
    #[must_use]
    pub const fn value(&self) -> &NlaValue {
        &self.value
    }

    /// The raw payload bytes of a non-container attribute.
    #[must_use]
    pub fn payload(&self) -> Option<&[u8]> {
        match &self.value {
            NlaValue::Bytes(bytes) => Some(bytes),
            NlaValue::Nested(_) => None,
        }
    }

    /// Reads the payload as a one-byte scalar.
    pub fn as_u8(&self) -> Result<u8, DecodeError> {
        let bytes = self.scalar(1)?;
        Ok(bytes[0])
    }

    /// Reads the payload as a two-byte native-endian scalar.
    pub fn as_u16(&self) -> Result<u16, DecodeError> {
        Ok(NativeEndian::read_u16(self.scalar(2)?))
    }

    /// Reads the payload as a four-byte native-endian scalar.
    pub fn as_u32(&self) -> Result<u32, DecodeError> {
        Ok(NativeEndian::read_u32(self.scalar(4)?))
    }

    /// Reads the payload as a NUL-terminated UTF-8 string.
    ///
    /// The terminator is optional on input; the kernel pads string payloads
    /// and some responses omit the trailing NUL entirely.
    pub fn as_str(&self) -> Result<&str, DecodeError> {
        let bytes = self.payload().ok_or(DecodeError::BadLength {
            declared: 0,
            expected: 1,
        })?;
        let end = bytes.iter().position(|byte| *byte == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end]).map_err(|_| DecodeError::BadLength {
            declared: bytes.len(),
            expected: end,
        })
    }

    /// Returns the child attributes of a container.
    ///
    /// Containers decoded from the wire already hold parsed children; a raw
    /// payload is parsed on demand so callers can treat an unflagged
    /// container the same way.
    pub fn children(&self) -> Result<Vec<Nla>, DecodeError> {
        match &self.value {
            NlaValue::Nested(children) => Ok(children.clone()),
            NlaValue::Bytes(bytes) => decode_all(bytes),
        }
    }

    fn scalar(&self, width: usize) -> Result<&[u8], DecodeError> {
        let bytes = self.payload().ok_or(DecodeError::BadLength {
            declared: 0,
            expected: width,
        })?;
        if bytes.len() == width {
            Ok(bytes)
        } else {
            Err(DecodeError::BadLength {
                declared: bytes.len(),
                expected: width,
            })
        }
    }

    /// Serialises this attribute, including padding, onto `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.extend_from_slice(&[0; NLA_HDRLEN]);
        let raw_kind = match &self.value {
            NlaValue::Bytes(bytes) => {
                buf.extend_from_slice(bytes);
                self.kind
            }
            NlaValue::Nested(children) => {
                for child in children {
                    child.encode_into(buf);
                }
                self.kind | NLA_F_NESTED
            }
        };
        let declared = buf.len() - start;
        debug_assert!(declared <= usize::from(u16::MAX));
        NativeEndian::write_u16(&mut buf[start..start + 2], declared as u16);
        NativeEndian::write_u16(&mut buf[start + 2..start + 4], raw_kind);
        buf.resize(start + nla_align(declared), 0);
    }

    fn decode_one(bytes: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if bytes.len() < NLA_HDRLEN {
            return Err(DecodeError::Truncated {
                needed: NLA_HDRLEN,
                remaining: bytes.len(),
            });
        }
        let declared = usize::from(NativeEndian::read_u16(&bytes[..2]));
        let raw_kind = NativeEndian::read_u16(&bytes[2..4]);
        if declared < NLA_HDRLEN {
            return Err(DecodeError::BadLength {
                declared,
                expected: NLA_HDRLEN,
            });
        }
        if declared > bytes.len() {
            return Err(DecodeError::Truncated {
                needed: declared,
                remaining: bytes.len(),
            });
        }
        let payload = &bytes[NLA_HDRLEN..declared];
        let value = if raw_kind & NLA_F_NESTED == 0 {
            NlaValue::Bytes(payload.to_vec())
        } else {
            NlaValue::Nested(decode_all(payload)?)
        };
        // The final attribute in a buffer may omit its trailing padding.
        let consumed = nla_align(declared).min(bytes.len());
        Ok((
            Self {
                kind: raw_kind & NLA_TYPE_MASK,
                value,
            },
            &bytes[consumed..],
        ))
    }

    /// Decodes an ordered run of attributes covering the whole buffer.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<Self>, DecodeError> {
        decode_all(bytes)
    }
}

fn decode_all(mut bytes: &[u8]) -> Result<Vec<Nla>, DecodeError> {
    let mut attrs = Vec::new();
    while !bytes.is_empty() {
        let (attr, rest) = Nla::decode_one(bytes)?;
        attrs.push(attr);
        bytes = rest;
    }
    Ok(attrs)
}

/// Serialises an ordered run of attributes into a fresh buffer.
#[must_use]
pub fn encode(attrs: &[Nla]) -> Vec<u8> {
    let mut buf = Vec::new();
    for attr in attrs {
        attr.encode_into(&mut buf);
    }
    buf
}

/// Finds the first attribute with the given type tag.
///
/// Handlers use this to pick out the attributes their verb needs; anything
/// they do not look for is ignored, which is what keeps the client tolerant
/// of attributes added by newer kernels.
#[must_use]
pub fn find_attr(attrs: &[Nla], kind: u16) -> Option<&Nla> {
    attrs.iter().find(|attr| attr.kind() == kind)
}

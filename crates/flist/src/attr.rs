//! Attribute packet codec.
//!
//! The attribute record payload is:
//!
//! ```text
//! <file_index> <type> <name>\0<attrs>\0<link>\0<attribs_ex>\0<delta_seq>\0
//! ```
//!
//! `file_index` and `type` are decimal; `attrs` is the encoded stat string
//! of [`crate::stat`]; `link` is the target for link-bearing types and empty
//! otherwise; `attribs_ex` is the platform extension blob (the resource-fork
//! length on HFS+ sources, empty elsewhere); `delta_seq` is decimal.

use crate::base64::from_base64;
use crate::stat::{decode_stat, DecodedStat};
use crate::types::{FileType, UnknownFileType};

/// Parsed attribute record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributePacket {
    /// File index assigned at emission.
    pub file_index: u32,
    /// Classification of the entry.
    pub ftype: FileType,
    /// Wire name (already stripped by the sender).
    pub name: String,
    /// Decoded stat tuple with link index and announced data stream.
    pub decoded: DecodedStat,
    /// Link target, empty for non-link types.
    pub link: String,
    /// Platform extension blob.
    pub attribs_ex: String,
    /// Per-file delta sequence.
    pub delta_seq: u32,
}

impl AttributePacket {
    /// Composes the wire payload for an attribute record.
    #[must_use]
    pub fn compose(
        file_index: u32,
        ftype: FileType,
        name: &str,
        attrs: &str,
        link: &str,
        attribs_ex: &str,
        delta_seq: u32,
    ) -> Vec<u8> {
        let mut out = Vec::with_capacity(name.len() + attrs.len() + link.len() + 32);
        out.extend_from_slice(format!("{file_index} {} ", ftype.code()).as_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(attrs.as_bytes());
        out.push(0);
        out.extend_from_slice(link.as_bytes());
        out.push(0);
        out.extend_from_slice(attribs_ex.as_bytes());
        out.push(0);
        out.extend_from_slice(delta_seq.to_string().as_bytes());
        out.push(0);
        out
    }

    /// Parses an attribute record payload.
    pub fn parse(payload: &[u8]) -> Result<Self, AttrError> {
        let text = std::str::from_utf8(payload).map_err(|_| AttrError::NotUtf8)?;

        let (prefix, rest) = split_prefix(text)?;
        let mut fields = rest.split('\0');
        let name = fields.next().ok_or(AttrError::MissingField("name"))?;
        let attrs = fields.next().ok_or(AttrError::MissingField("attrs"))?;
        let link = fields.next().unwrap_or_default();
        let attribs_ex = fields.next().unwrap_or_default();
        let delta_field = fields.next().unwrap_or("0");
        let delta_seq = delta_field.parse::<u32>().unwrap_or(0);

        Ok(Self {
            file_index: prefix.0,
            ftype: prefix.1,
            name: name.to_owned(),
            decoded: decode_stat(attrs),
            link: link.to_owned(),
            attribs_ex: attribs_ex.to_owned(),
            delta_seq,
        })
    }

    /// Resource-fork length announced by the extension blob, when present.
    #[must_use]
    pub fn fork_length(&self) -> i64 {
        if self.attribs_ex.is_empty() {
            return 0;
        }
        let (value, consumed) = from_base64(self.attribs_ex.as_bytes());
        if consumed == 0 {
            0
        } else {
            value
        }
    }
}

fn split_prefix(text: &str) -> Result<((u32, FileType), &str), AttrError> {
    let mut parts = text.splitn(3, ' ');
    let file_index = parts
        .next()
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or(AttrError::MissingField("file_index"))?;
    let type_code = parts
        .next()
        .and_then(|t| t.parse::<i32>().ok())
        .ok_or(AttrError::MissingField("type"))?;
    let rest = parts.next().ok_or(AttrError::MissingField("name"))?;
    let ftype = FileType::try_from(type_code)?;
    Ok(((file_index, ftype), rest))
}

/// Errors raised while parsing an attribute record.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AttrError {
    /// The payload is not valid UTF-8.
    #[error("attribute record is not valid UTF-8")]
    NotUtf8,
    /// A mandatory field is absent.
    #[error("attribute record is missing the {0} field")]
    MissingField(&'static str),
    /// The classification code is not in the catalog.
    #[error(transparent)]
    UnknownType(#[from] UnknownFileType),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base64::to_base64;
    use crate::stat::{encode_stat, UnixStat};

    fn sample_attrs() -> String {
        let stat = UnixStat {
            mode: 0o100644,
            size: 6,
            mtime: 1_700_000_000,
            ..UnixStat::default()
        };
        encode_stat(&stat, 0, 2)
    }

    #[test]
    fn packet_round_trips_for_a_regular_file() {
        let attrs = sample_attrs();
        let payload =
            AttributePacket::compose(1, FileType::Regular, "/a/b.txt", &attrs, "", "", 0);
        let parsed = AttributePacket::parse(&payload).expect("well-formed packet");

        assert_eq!(parsed.file_index, 1);
        assert_eq!(parsed.ftype, FileType::Regular);
        assert_eq!(parsed.name, "/a/b.txt");
        assert_eq!(parsed.decoded.stat.size, 6);
        assert_eq!(parsed.decoded.data_stream, 2);
        assert!(parsed.link.is_empty());
        assert_eq!(parsed.delta_seq, 0);
    }

    #[test]
    fn packet_preserves_the_link_target() {
        let attrs = sample_attrs();
        let payload = AttributePacket::compose(
            4,
            FileType::SymLink,
            "/a/link",
            &attrs,
            "/a/target",
            "",
            2,
        );
        let parsed = AttributePacket::parse(&payload).expect("well-formed packet");
        assert_eq!(parsed.link, "/a/target");
        assert_eq!(parsed.delta_seq, 2);
    }

    #[test]
    fn payload_layout_matches_the_wire_contract() {
        let payload = AttributePacket::compose(1, FileType::Regular, "/f", "ATTRS", "", "", 0);
        assert_eq!(payload, b"1 3 /f\0ATTRS\0\0\00\0".to_vec());
    }

    #[test]
    fn names_with_spaces_survive() {
        let attrs = sample_attrs();
        let payload = AttributePacket::compose(
            2,
            FileType::Regular,
            "/dir with space/file name.txt",
            &attrs,
            "",
            "",
            0,
        );
        let parsed = AttributePacket::parse(&payload).expect("well-formed packet");
        assert_eq!(parsed.name, "/dir with space/file name.txt");
    }

    #[test]
    fn fork_length_decodes_from_the_extension_blob() {
        let attrs = sample_attrs();
        let ex = to_base64(4711);
        let payload =
            AttributePacket::compose(3, FileType::Regular, "/f", &attrs, "", &ex, 0);
        let parsed = AttributePacket::parse(&payload).expect("well-formed packet");
        assert_eq!(parsed.fork_length(), 4711);
    }

    #[test]
    fn empty_extension_blob_means_no_fork() {
        let attrs = sample_attrs();
        let payload = AttributePacket::compose(3, FileType::Regular, "/f", &attrs, "", "", 0);
        let parsed = AttributePacket::parse(&payload).expect("well-formed packet");
        assert_eq!(parsed.fork_length(), 0);
    }

    #[test]
    fn malformed_prefix_is_rejected() {
        assert!(AttributePacket::parse(b"oops").is_err());
        assert!(AttributePacket::parse(b"1 x name\0a\0\0\00\0").is_err());
    }

    #[test]
    fn unknown_type_code_is_rejected() {
        let err = AttributePacket::parse(b"1 99 name\0a\0\0\00\0").expect_err("unknown type");
        assert_eq!(err, AttrError::UnknownType(UnknownFileType(99)));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        assert_eq!(
            AttributePacket::parse(&[0xff, 0xfe]),
            Err(AttrError::NotUtf8)
        );
    }
}

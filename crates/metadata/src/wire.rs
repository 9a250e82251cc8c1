//! Wire codecs for ACL and xattr payloads.
//!
//! ACL records carry a line-oriented rendering of the entry list:
//!
//! ```text
//! allow:kind:perm_bits:flag_bits:name\n
//! ```
//!
//! with `allow` as `a`/`d`, `kind` as a stable single letter, and the bit
//! sets in hex. The name comes last because it may contain colons.
//!
//! Xattr records pack the whole attribute set of a file into one payload:
//! a big-endian `u32` pair count, then `name_len | name | value_len |
//! value` per pair. Names are raw bytes; values are opaque.

/// Stable single-letter tags for ACL entry kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AclKindRepr {
    /// Named or owning user.
    User,
    /// Named or owning group.
    Group,
    /// POSIX mask entry.
    Mask,
    /// POSIX other entry.
    Other,
    /// NFSv4-style everyone entry.
    Everyone,
    /// Kind this agent does not model; preserved as-is.
    Unknown,
}

impl AclKindRepr {
    const fn tag(self) -> char {
        match self {
            Self::User => 'u',
            Self::Group => 'g',
            Self::Mask => 'm',
            Self::Other => 'o',
            Self::Everyone => 'e',
            Self::Unknown => '?',
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "u" => Some(Self::User),
            "g" => Some(Self::Group),
            "m" => Some(Self::Mask),
            "o" => Some(Self::Other),
            "e" => Some(Self::Everyone),
            "?" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// Platform-neutral rendering of one ACL entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclEntryRepr {
    /// Allow or deny entry.
    pub allow: bool,
    /// Entry kind.
    pub kind: AclKindRepr,
    /// Permission bits, platform-encoded.
    pub perms: u32,
    /// Flag bits, platform-encoded (`DEFAULT` marks default-ACL entries).
    pub flags: u32,
    /// Qualifier name, empty for owner/group/other/mask entries.
    pub name: String,
}

/// Error raised by the metadata wire codecs.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("malformed metadata payload: {0}")]
pub struct WireError(pub String);

/// Renders an entry list into an ACL record payload.
#[must_use]
pub fn encode_acl_text(entries: &[AclEntryRepr]) -> Vec<u8> {
    let mut out = String::new();
    for entry in entries {
        let allow = if entry.allow { 'a' } else { 'd' };
        out.push(allow);
        out.push(':');
        out.push(entry.kind.tag());
        out.push_str(&format!(":{:x}:{:x}:", entry.perms, entry.flags));
        out.push_str(&entry.name);
        out.push('\n');
    }
    out.into_bytes()
}

/// Parses an ACL record payload back into entries.
pub fn decode_acl_text(payload: &[u8]) -> Result<Vec<AclEntryRepr>, WireError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| WireError("ACL payload is not UTF-8".to_owned()))?;
    let mut entries = Vec::new();
    for line in text.split('\n').filter(|line| !line.is_empty()) {
        let mut fields = line.splitn(5, ':');
        let allow = match fields.next() {
            Some("a") => true,
            Some("d") => false,
            other => return Err(WireError(format!("bad allow field {other:?}"))),
        };
        let kind = fields
            .next()
            .and_then(AclKindRepr::from_tag)
            .ok_or_else(|| WireError(format!("bad kind field in {line:?}")))?;
        let perms = fields
            .next()
            .and_then(|f| u32::from_str_radix(f, 16).ok())
            .ok_or_else(|| WireError(format!("bad perms field in {line:?}")))?;
        let flags = fields
            .next()
            .and_then(|f| u32::from_str_radix(f, 16).ok())
            .ok_or_else(|| WireError(format!("bad flags field in {line:?}")))?;
        let name = fields.next().unwrap_or_default().to_owned();
        entries.push(AclEntryRepr {
            allow,
            kind,
            perms,
            flags,
            name,
        });
    }
    Ok(entries)
}

/// One extended attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XattrPair {
    /// Attribute name bytes.
    pub name: Vec<u8>,
    /// Attribute value bytes.
    pub value: Vec<u8>,
}

/// Packs an attribute set into one record payload.
#[must_use]
pub fn encode_xattr_blob(pairs: &[XattrPair]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(pairs.len() as u32).to_be_bytes());
    for pair in pairs {
        out.extend_from_slice(&(pair.name.len() as u32).to_be_bytes());
        out.extend_from_slice(&pair.name);
        out.extend_from_slice(&(pair.value.len() as u32).to_be_bytes());
        out.extend_from_slice(&pair.value);
    }
    out
}

/// Unpacks a record payload into its attribute set.
pub fn decode_xattr_blob(payload: &[u8]) -> Result<Vec<XattrPair>, WireError> {
    fn take<'a>(payload: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], WireError> {
        let end = pos
            .checked_add(len)
            .filter(|&end| end <= payload.len())
            .ok_or_else(|| WireError("xattr blob truncated".to_owned()))?;
        let slice = &payload[*pos..end];
        *pos = end;
        Ok(slice)
    }

    fn take_u32(payload: &[u8], pos: &mut usize) -> Result<usize, WireError> {
        let bytes = take(payload, pos, 4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    let mut pos = 0usize;
    let count = take_u32(payload, &mut pos)?;
    let mut pairs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name_len = take_u32(payload, &mut pos)?;
        let name = take(payload, &mut pos, name_len)?.to_vec();
        let value_len = take_u32(payload, &mut pos)?;
        let value = take(payload, &mut pos, value_len)?.to_vec();
        pairs.push(XattrPair { name, value });
    }
    if pos != payload.len() {
        return Err(WireError("trailing bytes after xattr blob".to_owned()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acl_entries_round_trip() {
        let entries = vec![
            AclEntryRepr {
                allow: true,
                kind: AclKindRepr::User,
                perms: 0x7,
                flags: 0,
                name: String::new(),
            },
            AclEntryRepr {
                allow: true,
                kind: AclKindRepr::User,
                perms: 0x5,
                flags: 0,
                name: "webdata".to_owned(),
            },
            AclEntryRepr {
                allow: false,
                kind: AclKindRepr::Group,
                perms: 0x4,
                flags: 0x1,
                name: "staff".to_owned(),
            },
        ];
        let encoded = encode_acl_text(&entries);
        assert_eq!(decode_acl_text(&encoded).expect("decodable"), entries);
    }

    #[test]
    fn acl_names_may_contain_colons() {
        let entries = vec![AclEntryRepr {
            allow: true,
            kind: AclKindRepr::User,
            perms: 0x7,
            flags: 0,
            name: "odd:name:with:colons".to_owned(),
        }];
        let encoded = encode_acl_text(&entries);
        assert_eq!(decode_acl_text(&encoded).expect("decodable"), entries);
    }

    #[test]
    fn empty_acl_payload_decodes_to_nothing() {
        assert!(decode_acl_text(b"").expect("decodable").is_empty());
    }

    #[test]
    fn malformed_acl_lines_are_rejected() {
        assert!(decode_acl_text(b"x:u:7:0:\n").is_err());
        assert!(decode_acl_text(b"a:z:7:0:\n").is_err());
        assert!(decode_acl_text(b"a:u:nothex:0:\n").is_err());
    }

    #[test]
    fn xattr_blob_round_trips() {
        let pairs = vec![
            XattrPair {
                name: b"user.comment".to_vec(),
                value: b"hello".to_vec(),
            },
            XattrPair {
                name: b"user.binary".to_vec(),
                value: vec![0, 1, 2, 255],
            },
        ];
        let blob = encode_xattr_blob(&pairs);
        assert_eq!(decode_xattr_blob(&blob).expect("decodable"), pairs);
    }

    #[test]
    fn empty_xattr_set_round_trips() {
        let blob = encode_xattr_blob(&[]);
        assert!(decode_xattr_blob(&blob).expect("decodable").is_empty());
    }

    #[test]
    fn truncated_xattr_blob_is_rejected() {
        let blob = encode_xattr_blob(&[XattrPair {
            name: b"user.a".to_vec(),
            value: b"v".to_vec(),
        }]);
        assert!(decode_xattr_blob(&blob[..blob.len() - 1]).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut blob = encode_xattr_blob(&[]);
        blob.push(0);
        assert!(decode_xattr_blob(&blob).is_err());
    }
}

//! Stat-tuple encoding.
//!
//! The attribute record carries the stat tuple as sixteen space-separated
//! base64 integers:
//!
//! ```text
//! dev ino mode nlink uid gid rdev size blksize blocks atime mtime ctime
//! linkFI flags data_stream
//! ```
//!
//! `linkFI` is the file index of the entry that carried a hard link's data;
//! `flags` is reserved for platform file flags and written as zero here. The
//! decoder tolerates packets that end after `ctime` (oldest senders) and
//! after `linkFI` or `flags` (older senders), defaulting the missing fields.

use crate::base64::{from_base64, to_base64};

/// Portable stat tuple carried by every attribute record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UnixStat {
    /// Device number of the containing filesystem.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Mode bits, including the file-type nibble.
    pub mode: u32,
    /// Hard-link count.
    pub nlink: u64,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
    /// Device number for device nodes.
    pub rdev: u64,
    /// Size in bytes.
    pub size: i64,
    /// Preferred I/O block size.
    pub blksize: i64,
    /// Allocated 512-byte blocks.
    pub blocks: i64,
    /// Access time, seconds since the epoch.
    pub atime: i64,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// Status-change time, seconds since the epoch.
    pub ctime: i64,
}

const S_IFMT: u32 = 0o170000;

impl UnixStat {
    /// True for regular files.
    #[must_use]
    pub const fn is_regular(&self) -> bool {
        self.mode & S_IFMT == 0o100000
    }

    /// True for directories.
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.mode & S_IFMT == 0o040000
    }

    /// True for sockets.
    #[must_use]
    pub const fn is_socket(&self) -> bool {
        self.mode & S_IFMT == 0o140000
    }

    /// True for named pipes.
    #[must_use]
    pub const fn is_fifo(&self) -> bool {
        self.mode & S_IFMT == 0o010000
    }

    /// True for block devices.
    #[must_use]
    pub const fn is_block_device(&self) -> bool {
        self.mode & S_IFMT == 0o060000
    }

    /// True for character devices.
    #[must_use]
    pub const fn is_char_device(&self) -> bool {
        self.mode & S_IFMT == 0o020000
    }

    /// Permission bits without the file-type nibble.
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Builds a stat tuple from filesystem metadata.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            dev: meta.dev(),
            ino: meta.ino(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            size: meta.size() as i64,
            blksize: meta.blksize() as i64,
            blocks: meta.blocks() as i64,
            atime: meta.atime(),
            mtime: meta.mtime(),
            ctime: meta.ctime(),
        }
    }
}

/// Encodes the stat tuple plus link index and data stream.
#[must_use]
pub fn encode_stat(stat: &UnixStat, link_index: u32, data_stream: i32) -> String {
    let fields = [
        stat.dev as i64,
        stat.ino as i64,
        i64::from(stat.mode),
        stat.nlink as i64,
        i64::from(stat.uid),
        i64::from(stat.gid),
        stat.rdev as i64,
        stat.size,
        stat.blksize,
        stat.blocks,
        stat.atime,
        stat.mtime,
        stat.ctime,
        i64::from(link_index),
        0, // platform file flags
        i64::from(data_stream),
    ];

    let mut out = String::new();
    for (index, field) in fields.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        out.push_str(&to_base64(*field));
    }
    out
}

/// Result of decoding an encoded stat string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedStat {
    /// The stat tuple.
    pub stat: UnixStat,
    /// File index of the hard-link data holder, zero when unlinked.
    pub link_index: u32,
    /// Data-stream identifier announced for the file, zero when absent.
    pub data_stream: i32,
}

/// Decodes an encoded stat string.
///
/// Fields beyond `ctime` are optional; missing ones decode as zero.
#[must_use]
pub fn decode_stat(encoded: &str) -> DecodedStat {
    let mut values = [0_i64; 16];
    for (slot, token) in values.iter_mut().zip(encoded.split(' ')) {
        let (value, _) = from_base64(token.as_bytes());
        *slot = value;
    }

    DecodedStat {
        stat: UnixStat {
            dev: values[0] as u64,
            ino: values[1] as u64,
            mode: values[2] as u32,
            nlink: values[3] as u64,
            uid: values[4] as u32,
            gid: values[5] as u32,
            rdev: values[6] as u64,
            size: values[7],
            blksize: values[8],
            blocks: values[9],
            atime: values[10],
            mtime: values[11],
            ctime: values[12],
        },
        link_index: values[13] as u32,
        data_stream: values[15] as i32,
    }
}

//! Deterministic archive naming and building.
//!
//! An archive's name depends only on its day and its sorted `(key, size)`
//! members, never on object content, so a re-run of the same task always
//! targets the same object and can detect that the work is already done.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use flate2::{Compression, GzBuilder};
use sha2::{Digest, Sha256};

pub const ARCHIVE_PREFIX: &str = "rollup";
pub const ARCHIVE_EXTENSION: &str = "tgz";
const HASH_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollupArchive {
    pub day: NaiveDate,
    pub name: String,
    pub hash8: String,
    pub member_keys: Vec<String>,
}

impl RollupArchive {
    pub fn new(day: NaiveDate, members: &[(&str, u64)]) -> Self {
        let hash8 = archive_hash8(members);
        let mut member_keys: Vec<String> = members.iter().map(|(key, _)| (*key).to_string()).collect();
        member_keys.sort();
        Self {
            day,
            name: format_archive_name(day, &hash8),
            hash8,
            member_keys,
        }
    }
}

/// First 8 hex characters of SHA-256 over the sorted `key\tsize\n` lines.
pub fn archive_hash8(members: &[(&str, u64)]) -> String {
    let mut sorted = members.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for (key, size) in sorted {
        hasher.update(key.as_bytes());
        hasher.update(b"\t");
        hasher.update(size.to_string().as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..HASH_LEN].to_string()
}

pub fn archive_name_for(day: NaiveDate, members: &[(&str, u64)]) -> String {
    format_archive_name(day, &archive_hash8(members))
}

fn format_archive_name(day: NaiveDate, hash8: &str) -> String {
    format!(
        "{ARCHIVE_PREFIX}-{}-{hash8}.{ARCHIVE_EXTENSION}",
        day.format("%Y-%m-%d")
    )
}

/// A staged file to be written into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub modified: DateTime<Utc>,
    pub path: PathBuf,
}

/// Writes `entries` as a gzip-compressed tar stream, in ascending name order.
///
/// Entry headers carry only deterministic metadata: mode 0644, owner 0:0 and
/// the log's own timestamp as mtime. The gzip header mtime is zero.
pub fn build_archive<W: Write>(entries: &[ArchiveEntry], writer: W) -> io::Result<W> {
    let mut ordered: Vec<&ArchiveEntry> = entries.iter().collect();
    ordered.sort_by(|left, right| left.name.cmp(&right.name));

    let encoder = GzBuilder::new()
        .mtime(0)
        .write(writer, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in ordered {
        let mut file = File::open(&entry.path)?;
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(file.metadata()?.len());
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(u64::try_from(entry.modified.timestamp()).unwrap_or(0));
        builder.append_data(&mut header, &entry.name, &mut file)?;
    }

    builder.into_inner()?.finish()
}

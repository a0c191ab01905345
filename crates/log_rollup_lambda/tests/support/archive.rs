#![allow(dead_code)]

use std::io::Read;

use flate2::read::GzDecoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub name: String,
    pub mtime: u64,
    pub mode: u32,
    pub body: Vec<u8>,
}

/// Unpacks a gzip-compressed tar archive in stored order.
pub fn read_archive(bytes: &[u8]) -> Vec<ArchivedFile> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive
        .entries()
        .expect("archive should be readable")
        .map(|entry| {
            let mut entry = entry.expect("entry should be readable");
            let header = entry.header().clone();
            let mut body = Vec::new();
            entry
                .read_to_end(&mut body)
                .expect("entry body should be readable");
            ArchivedFile {
                name: entry
                    .path()
                    .expect("entry path should decode")
                    .to_string_lossy()
                    .into_owned(),
                mtime: header.mtime().expect("entry mtime"),
                mode: header.mode().expect("entry mode"),
                body,
            }
        })
        .collect()
}

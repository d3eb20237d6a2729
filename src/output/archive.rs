//! Zip bundling of a completed run

use super::{write_atomic, OutputError, OutputResult};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Paths produced by [`create_archive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutput {
    /// `<name>.zip`
    pub archive_path: PathBuf,
    /// `<name>.zip.sha256`
    pub checksum_path: PathBuf,
    /// Hex SHA-256 of the archive
    pub sha256: String,
}

/// SHA-256 of `data` as lowercase hex
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Bundle `filenames` (relative to `dir`) into `dir/<name>.zip` and write a
/// `sha256sum`-style sidecar next to it.
pub fn create_archive(dir: &Path, filenames: &[String], name: &str) -> OutputResult<ArchiveOutput> {
    let archive_name = format!("{name}.zip");
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        for filename in filenames {
            let contents = std::fs::read(dir.join(filename))
                .map_err(|e| OutputError::ArchiveError(format!("failed to read {filename}: {e}")))?;
            zip.start_file(filename.as_str(), options)
                .map_err(|e| OutputError::ArchiveError(e.to_string()))?;
            zip.write_all(&contents)
                .map_err(|e| OutputError::ArchiveError(e.to_string()))?;
        }
        zip.finish()
            .map_err(|e| OutputError::ArchiveError(e.to_string()))?;
    }

    let sha256 = compute_sha256(&buffer);
    let archive_path = dir.join(&archive_name);
    let checksum_path = dir.join(format!("{archive_name}.sha256"));

    write_atomic(&archive_path, &buffer)?;
    write_atomic(&checksum_path, format!("{sha256}  {archive_name}\n").as_bytes())?;

    info!(
        archive = %archive_path.display(),
        files = filenames.len(),
        bytes = buffer.len(),
        "Archive created"
    );

    Ok(ArchiveOutput {
        archive_path,
        checksum_path,
        sha256,
    })
}

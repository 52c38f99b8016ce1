//! Password-protected archives built from uploaded files.
//!
//! The web layer collects uploads with [`EntryCollector`], checks the
//! password pair, and hands the entries to an [`ArchiveBuilder`].

use std::collections::HashSet;
use std::io::{Cursor, Write};

use chrono::NaiveDateTime;
use thiserror::Error;
use zip::unstable::write::FileOptionsExt;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

/// Upper bound on the combined size of all files in one archive (512 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveAlgorithm {
    /// WinZip AES with a 256-bit key.
    Aes256,
    /// Traditional PKWARE encryption. Weak; kept for old unzip tools.
    ZipCrypto,
}

impl ArchiveAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveAlgorithm::Aes256 => "AES-256",
            ArchiveAlgorithm::ZipCrypto => "ZIPCRYPTO",
        }
    }

    /// Parse a form value. Blank selects AES-256.
    pub fn parse(value: Option<&str>) -> Result<Self, ArchiveError> {
        let value = value.map(str::trim).unwrap_or_default();
        if value.is_empty() {
            return Ok(Self::Aes256);
        }
        match value.to_ascii_uppercase().as_str() {
            "AES-256" => Ok(Self::Aes256),
            "ZIPCRYPTO" => Ok(Self::ZipCrypto),
            _ => Err(ArchiveError::InvalidInput(format!(
                "Unsupported encryption method: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path of the file inside the archive.
    pub name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("no usable files were uploaded")]
    NoFiles,
    #[error("total upload size exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("failed to build archive: {0}")]
    Build(String),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::Build(err.to_string())
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Build(err.to_string())
    }
}

pub trait ArchiveBuilder: Send + Sync {
    fn build(
        &self,
        entries: &[ArchiveEntry],
        password: &str,
        algorithm: ArchiveAlgorithm,
    ) -> Result<Vec<u8>, ArchiveError>;
}

/// Deflate-compressed zip archives via the `zip` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiveBuilder;

impl ArchiveBuilder for ZipArchiveBuilder {
    fn build(
        &self,
        entries: &[ArchiveEntry],
        password: &str,
        algorithm: ArchiveAlgorithm,
    ) -> Result<Vec<u8>, ArchiveError> {
        if entries.is_empty() {
            return Err(ArchiveError::NoFiles);
        }

        let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let options = match algorithm {
            ArchiveAlgorithm::Aes256 => base.with_aes_encryption(AesMode::Aes256, password),
            ArchiveAlgorithm::ZipCrypto => base.with_deprecated_encryption(password.as_bytes()),
        };

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for entry in entries {
            writer.start_file(entry.name.as_str(), options.clone())?;
            writer.write_all(&entry.data)?;
        }
        let cursor = writer.finish()?;
        Ok(cursor.into_inner())
    }
}

/// Both fields are required and must match once trimmed.
pub fn check_passwords(password: &str, confirm: &str) -> Result<String, ArchiveError> {
    let password = password.trim();
    let confirm = confirm.trim();
    if password.is_empty() || confirm.is_empty() {
        return Err(ArchiveError::InvalidInput(
            "Enter the password and its confirmation.".to_string(),
        ));
    }
    if password != confirm {
        return Err(ArchiveError::InvalidInput(
            "The passwords do not match.".to_string(),
        ));
    }
    Ok(password.to_string())
}

/// Reduce an uploaded name to a safe, flat ASCII file name. May return an
/// empty string when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> String {
    let flattened: String = name
        .chars()
        .filter(char::is_ascii)
        .map(|ch| if ch == '/' || ch == '\\' { ' ' } else { ch })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    joined
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(*ch, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|ch: char| ch == '.' || ch == '_')
        .to_string()
}

/// Download name for the archive: the sanitized request with `.zip`
/// appended, or a timestamped default.
pub fn archive_file_name(requested: Option<&str>, now: NaiveDateTime) -> String {
    let sanitized = requested.map(sanitize_file_name).unwrap_or_default();
    if sanitized.is_empty() {
        return format!("monozip_{}.zip", now.format("%Y%m%d_%H%M%S"));
    }
    if sanitized.to_ascii_lowercase().ends_with(".zip") {
        sanitized
    } else {
        format!("{sanitized}.zip")
    }
}

/// Accumulates uploads in order while enforcing the size limit.
#[derive(Debug)]
pub struct EntryCollector {
    limit: u64,
    total: u64,
    unnamed: usize,
    names: HashSet<String>,
    entries: Vec<ArchiveEntry>,
}

impl EntryCollector {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            total: 0,
            unnamed: 0,
            names: HashSet::new(),
            entries: Vec::new(),
        }
    }

    /// Add one upload. Empty payloads are skipped.
    pub fn push(&mut self, original_name: Option<&str>, data: Vec<u8>) -> Result<(), ArchiveError> {
        if data.is_empty() {
            return Ok(());
        }

        self.total += data.len() as u64;
        if self.total > self.limit {
            return Err(ArchiveError::TooLarge { limit: self.limit });
        }

        let mut name = original_name.map(sanitize_file_name).unwrap_or_default();
        if name.is_empty() {
            self.unnamed += 1;
            name = format!("file_{}", self.unnamed);
        }
        let name = self.unique_name(name);
        self.names.insert(name.clone());
        self.entries.push(ArchiveEntry { name, data });
        Ok(())
    }

    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    pub fn finish(self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        if self.entries.is_empty() {
            return Err(ArchiveError::NoFiles);
        }
        Ok(self.entries)
    }

    fn unique_name(&self, name: String) -> String {
        if !self.names.contains(&name) {
            return name;
        }
        let (stem, ext) = match name.rfind('.') {
            Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
            _ => (name.as_str(), ""),
        };
        let mut counter = 1;
        loop {
            counter += 1;
            let candidate = format!("{stem}_{counter}{ext}");
            if !self.names.contains(&candidate) {
                return candidate;
            }
        }
    }
}

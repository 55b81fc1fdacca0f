//! Content-derived file properties: BLAKE3 hash, size, MIME type.
//!
//! Everything here is synchronous and reads the file in one pass. Callers
//! on the async side run it through `spawn_blocking`.

use std::io::Read;
use std::path::Path;

use crate::error::{Result, TierflowError};

/// Chunk size for reading files (8MB, optimal for SSDs).
const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Bytes kept from the start of the file for magic detection.
const HEADER_SIZE: usize = 64;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Known file signatures
mod magic {
    pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
    pub const GIF87: &[u8] = b"GIF87a";
    pub const GIF89: &[u8] = b"GIF89a";
    pub const PDF: &[u8] = b"%PDF-";
    pub const ZIP: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
    pub const GZIP: &[u8] = &[0x1F, 0x8B];
    pub const BZIP2: &[u8] = b"BZh";
    pub const XZ: &[u8] = &[0xFD, b'7', b'z', b'X', b'Z', 0x00];
    pub const ZSTD: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];
    pub const SEVEN_ZIP: &[u8] = &[b'7', b'z', 0xBC, 0xAF, 0x27, 0x1C];
    pub const ELF: &[u8] = &[0x7F, b'E', b'L', b'F'];
    pub const SQLITE: &[u8] = b"SQLite format 3\0";
    pub const PARQUET: &[u8] = b"PAR1";
    pub const RIFF: &[u8] = b"RIFF";
}

/// Content-derived properties of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    /// BLAKE3 hash as lowercase hex string
    pub hash: String,
    pub size: u64,
    pub mime_type: String,
}

/// Hash the file and classify its type in a single read.
pub fn inspect(path: &Path) -> Result<ContentInfo> {
    let mut file = std::fs::File::open(path).map_err(|e| TierflowError::io_with_path(e, path))?;

    let mut hasher = blake3::Hasher::new();
    let mut header = Vec::with_capacity(HEADER_SIZE);
    let mut size = 0u64;

    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| TierflowError::io_with_path(e, path))?;
        if bytes_read == 0 {
            break;
        }
        if header.len() < HEADER_SIZE {
            let take = (HEADER_SIZE - header.len()).min(bytes_read);
            header.extend_from_slice(&buffer[..take]);
        }
        hasher.update(&buffer[..bytes_read]);
        size += bytes_read as u64;
    }

    Ok(ContentInfo {
        hash: hasher.finalize().to_hex().to_string(),
        size,
        mime_type: detect_mime(path, &header).to_string(),
    })
}

/// Classify by signature first, then by extension.
pub fn detect_mime(path: &Path, header: &[u8]) -> &'static str {
    sniff(header).unwrap_or_else(|| mime_from_extension(path))
}

fn sniff(header: &[u8]) -> Option<&'static str> {
    let signatures: &[(&[u8], &str)] = &[
        (magic::PNG, "image/png"),
        (magic::JPEG, "image/jpeg"),
        (magic::GIF87, "image/gif"),
        (magic::GIF89, "image/gif"),
        (magic::PDF, "application/pdf"),
        (magic::ZIP, "application/zip"),
        (magic::GZIP, "application/gzip"),
        (magic::BZIP2, "application/x-bzip2"),
        (magic::XZ, "application/x-xz"),
        (magic::ZSTD, "application/zstd"),
        (magic::SEVEN_ZIP, "application/x-7z-compressed"),
        (magic::ELF, "application/x-executable"),
        (magic::SQLITE, "application/vnd.sqlite3"),
        (magic::PARQUET, "application/vnd.apache.parquet"),
    ];
    if let Some((_, mime)) = signatures.iter().find(|(sig, _)| header.starts_with(sig)) {
        return Some(*mime);
    }

    if header.starts_with(magic::RIFF) && header.len() >= 12 {
        return match &header[8..12] {
            b"WEBP" => Some("image/webp"),
            b"WAVE" => Some("audio/wav"),
            b"AVI " => Some("video/x-msvideo"),
            _ => None,
        };
    }
    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        return Some("video/mp4");
    }
    None
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("txt") | Some("log") => "text/plain",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("py") => "text/x-python",
        Some("sh") => "text/x-shellscript",
        Some("html") | Some("htm") => "text/html",
        Some("yaml") | Some("yml") => "application/yaml",
        Some("toml") => "application/toml",
        _ => OCTET_STREAM,
    }
}

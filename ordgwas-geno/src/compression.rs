//! Locating genotype files and opening them through a decompressor.
//!
//! A file may be given as-is or as the uncompressed name; in the latter
//! case the supported suffixes are probed in a fixed order.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

/// Problems locating or opening a genotype file.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("File not found: {} (also probed {})", path.display(), probed.join(", "))]
    MissingFile { path: PathBuf, probed: Vec<String> },

    #[error("Ambiguous input: {} all exist", candidates.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    Ambiguous { candidates: Vec<PathBuf> },

    #[error("Unsupported compression suffix '{suffix}' on {}", path.display())]
    UnsupportedCompression { path: PathBuf, suffix: String },

    #[error("{} has no {field} field in FORMAT (record {record})", path.display())]
    MissingFormatField {
        path: PathBuf,
        field: String,
        record: usize,
    },
}

/// Supported compression formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gz,
    Zstd,
    Xz,
    Bzip2,
}

/// Suffixes that look like compression but are not readable here.
const UNSUPPORTED_SUFFIXES: [&str; 5] = ["zip", "lz4", "zlib", "zz", "bgz"];

impl Compression {
    /// Order in which suffixes are probed.
    pub const PROBE_ORDER: [Compression; 5] = [
        Compression::None,
        Compression::Gz,
        Compression::Zstd,
        Compression::Xz,
        Compression::Bzip2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gz => "gzip",
            Compression::Zstd => "zstd",
            Compression::Xz => "xz",
            Compression::Bzip2 => "bzip2",
        }
    }

    /// File suffix including the leading dot ("" for none).
    pub fn suffix(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gz => ".gz",
            Compression::Zstd => ".zst",
            Compression::Xz => ".xz",
            Compression::Bzip2 => ".bz2",
        }
    }

    /// Infer compression from a path's final extension.
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("gz") => Ok(Compression::Gz),
            Some("zst") => Ok(Compression::Zstd),
            Some("xz") => Ok(Compression::Xz),
            Some("bz2") => Ok(Compression::Bzip2),
            Some(e) if UNSUPPORTED_SUFFIXES.contains(&e) => {
                Err(SourceError::UnsupportedCompression {
                    path: path.to_path_buf(),
                    suffix: e.to_string(),
                })
            }
            _ => Ok(Compression::None),
        }
    }

    /// Wrap a file handle in the matching decoder.
    pub fn decoder(&self, handle: File) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(match self {
            Compression::None => Box::new(handle),
            // Multi-member so BGZF blocks are read through.
            Compression::Gz => Box::new(flate2::read::MultiGzDecoder::new(handle)),
            Compression::Zstd => Box::new(zstd::stream::read::Decoder::new(handle)?),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(handle)),
            Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(handle)),
        })
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// Resolve a genotype file path.
///
/// An existing path is used as given (its extension decides the
/// decoder). Otherwise every supported suffix is probed; exactly one
/// candidate must exist.
pub fn resolve(path: &Path) -> Result<(PathBuf, Compression), SourceError> {
    if path.is_file() {
        let compression = Compression::from_path(path)?;
        return Ok((path.to_path_buf(), compression));
    }
    // Fails early on e.g. "geno.vcf.zip" even though it does not exist.
    Compression::from_path(path)?;

    let mut candidates: Vec<(PathBuf, Compression)> = Compression::PROBE_ORDER
        .iter()
        .skip(1)
        .map(|c| (with_suffix(path, c.suffix()), *c))
        .filter(|(p, _)| p.is_file())
        .collect();

    if candidates.len() > 1 {
        return Err(SourceError::Ambiguous {
            candidates: candidates.into_iter().map(|(p, _)| p).collect(),
        });
    }
    candidates.pop().ok_or_else(|| SourceError::MissingFile {
        path: path.to_path_buf(),
        probed: Compression::PROBE_ORDER
            .iter()
            .skip(1)
            .map(|c| c.suffix().to_string())
            .collect(),
    })
}

/// Open a resolved file for buffered line reading.
pub fn open_reader(path: &Path, compression: Compression) -> Result<Box<dyn BufRead + Send>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let decoder = compression
        .decoder(file)
        .with_context(|| format!("Failed to start {} decoder for {}", compression.name(), path.display()))?;
    Ok(Box::new(BufReader::new(decoder)))
}

/// Read a whole (possibly compressed) file into memory.
pub fn read_all(path: &Path, compression: Compression) -> Result<Vec<u8>> {
    let mut reader = open_reader(path, compression)?;
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_path() {
        assert_eq!(Compression::from_path(Path::new("a.vcf")).unwrap(), Compression::None);
        assert_eq!(Compression::from_path(Path::new("a.vcf.gz")).unwrap(), Compression::Gz);
        assert_eq!(Compression::from_path(Path::new("a.bed.zst")).unwrap(), Compression::Zstd);
        assert!(matches!(
            Compression::from_path(Path::new("a.vcf.zip")),
            Err(SourceError::UnsupportedCompression { .. })
        ));
    }

    #[test]
    fn test_resolve_probes_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("x.vcf");
        std::fs::write(dir.path().join("x.vcf.gz"), b"").unwrap();
        let (p, c) = resolve(&plain).unwrap();
        assert_eq!(c, Compression::Gz);
        assert!(p.to_string_lossy().ends_with("x.vcf.gz"));
    }

    #[test]
    fn test_resolve_missing_and_ambiguous() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("x.bim");
        assert!(matches!(resolve(&plain), Err(SourceError::MissingFile { .. })));

        std::fs::write(dir.path().join("x.bim.gz"), b"").unwrap();
        std::fs::write(dir.path().join("x.bim.xz"), b"").unwrap();
        assert!(matches!(resolve(&plain), Err(SourceError::Ambiguous { .. })));
    }

    #[test]
    fn test_gzip_roundtrip_through_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt.gz");
        let f = File::create(&path).unwrap();
        let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::default());
        writeln!(enc, "hello").unwrap();
        enc.finish().unwrap();

        let (resolved, c) = resolve(&path).unwrap();
        let mut line = String::new();
        open_reader(&resolved, c).unwrap().read_line(&mut line).unwrap();
        assert_eq!(line.trim_end(), "hello");
    }
}

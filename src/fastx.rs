//! Format sniffing and FASTA/FASTQ normalization for downloaded read files.
//!
//! Repositories do not reliably say what they serve: the same endpoint may
//! hand back FASTA or FASTQ, plain or gzip-compressed. Everything downloaded
//! is inspected here and turned into FASTQ before compression.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use serde::Serialize;

use crate::error::GrabError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Quality character used for reads that arrive without qualities.
pub const DUMMY_QUALITY: u8 = b'I';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Plain,
    Gzip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFormat {
    Fasta,
    Fastq,
    Empty,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub compression: Compression,
    pub format: ReadFormat,
}

/// Result of normalizing one downloaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Plain FASTQ that still needs compressing.
    Plain(PathBuf),
    /// Already gzipped FASTQ, moved into its final place.
    Compressed(PathBuf),
}

pub fn sniff_file(path: &Path) -> Result<Sniffed, GrabError> {
    let mut magic = [0u8; 2];
    let mut file = open(path)?;
    let read = read_up_to(&mut file, &mut magic)?;
    let compression = if read == 2 && magic == GZIP_MAGIC {
        Compression::Gzip
    } else {
        Compression::Plain
    };

    let mut head = Vec::with_capacity(4096);
    open_decoded(path, compression)?
        .take(4096)
        .read_to_end(&mut head)
        .map_err(|err| GrabError::Filesystem(format!("read {}: {err}", path.display())))?;
    Ok(Sniffed {
        compression,
        format: classify(&head),
    })
}

fn classify(head: &[u8]) -> ReadFormat {
    match head.iter().find(|byte| !byte.is_ascii_whitespace()) {
        None => ReadFormat::Empty,
        Some(b'>') => ReadFormat::Fasta,
        Some(b'@') => ReadFormat::Fastq,
        Some(_) => ReadFormat::Unknown,
    }
}

/// Rewrites FASTA records as FASTQ with dummy qualities. Multi-line
/// sequences are joined. Returns the number of records written.
pub fn fasta_to_fastq<R: BufRead, W: Write>(reader: R, mut writer: W) -> io::Result<usize> {
    let mut header: Option<String> = None;
    let mut seq = String::new();
    let mut records = 0usize;

    for line in reader.lines() {
        let line = line?;
        if let Some(rest) = line.strip_prefix('>') {
            if let Some(previous) = header.take() {
                write_fastq_record(&mut writer, &previous, &seq)?;
                records += 1;
            }
            header = Some(rest.trim_end().to_string());
            seq.clear();
        } else if header.is_some() {
            seq.push_str(line.trim());
        }
    }
    if let Some(previous) = header.take() {
        write_fastq_record(&mut writer, &previous, &seq)?;
        records += 1;
    }
    writer.flush()?;
    Ok(records)
}

fn write_fastq_record<W: Write>(writer: &mut W, header: &str, seq: &str) -> io::Result<()> {
    writeln!(writer, "@{header}")?;
    writeln!(writer, "{seq}")?;
    writer.write_all(b"+\n")?;
    let quality = vec![DUMMY_QUALITY; seq.len()];
    writer.write_all(&quality)?;
    writer.write_all(b"\n")
}

/// Turns a raw download into FASTQ at `fastq_path` (or `fastq_path.gz` when
/// the download already was gzipped FASTQ). The raw file is removed.
pub fn normalize_download(
    raw_path: &Path,
    fastq_path: &Path,
    accession: &str,
) -> Result<Normalized, GrabError> {
    let sniffed = sniff_file(raw_path)?;
    let normalized = match (sniffed.format, sniffed.compression) {
        (ReadFormat::Empty, _) => return Err(GrabError::NoReads(accession.to_string())),
        (ReadFormat::Unknown, _) => {
            return Err(GrabError::UnsupportedFormat {
                accession: accession.to_string(),
            });
        }
        (ReadFormat::Fasta, compression) => {
            tracing::info!(accession, "converting FASTA to FASTQ (adding dummy quality scores)");
            let reader = BufReader::new(open_decoded(raw_path, compression)?);
            let writer = BufWriter::new(create(fastq_path)?);
            let records = fasta_to_fastq(reader, writer)
                .map_err(|err| GrabError::Filesystem(err.to_string()))?;
            tracing::debug!(accession, records, "converted records");
            remove(raw_path)?;
            Normalized::Plain(fastq_path.to_path_buf())
        }
        (ReadFormat::Fastq, Compression::Plain) => {
            tracing::info!(accession, "downloaded file in FASTQ format already");
            rename(raw_path, fastq_path)?;
            Normalized::Plain(fastq_path.to_path_buf())
        }
        (ReadFormat::Fastq, Compression::Gzip) => {
            tracing::info!(accession, "downloaded file is gzipped FASTQ already");
            let target = gz_path(fastq_path);
            rename(raw_path, &target)?;
            Normalized::Compressed(target)
        }
    };
    Ok(normalized)
}

pub fn gz_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

fn open_decoded(path: &Path, compression: Compression) -> Result<Box<dyn Read>, GrabError> {
    let file = open(path)?;
    Ok(match compression {
        Compression::Plain => Box::new(file),
        Compression::Gzip => Box::new(MultiGzDecoder::new(BufReader::new(file))),
    })
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize, GrabError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(GrabError::Filesystem(err.to_string())),
        }
    }
    Ok(filled)
}

fn open(path: &Path) -> Result<File, GrabError> {
    File::open(path).map_err(|err| GrabError::Filesystem(format!("open {}: {err}", path.display())))
}

fn create(path: &Path) -> Result<File, GrabError> {
    File::create(path)
        .map_err(|err| GrabError::Filesystem(format!("create {}: {err}", path.display())))
}

fn remove(path: &Path) -> Result<(), GrabError> {
    fs::remove_file(path)
        .map_err(|err| GrabError::Filesystem(format!("remove {}: {err}", path.display())))
}

fn rename(from: &Path, to: &Path) -> Result<(), GrabError> {
    fs::rename(from, to).map_err(|err| {
        GrabError::Filesystem(format!(
            "move {} to {}: {err}",
            from.display(),
            to.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use flate2::Compression as Level;
    use flate2::write::GzEncoder;

    use super::*;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Level::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    fn sniff(bytes: &[u8]) -> Sniffed {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("raw.download");
        fs::write(&path, bytes).unwrap();
        sniff_file(&path).unwrap()
    }

    #[test]
    fn sniffs_plain_and_gzip() {
        assert_eq!(
            sniff(b">r1\nACGT\n"),
            Sniffed {
                compression: Compression::Plain,
                format: ReadFormat::Fasta
            }
        );
        assert_eq!(sniff(b"\n@r1\nACGT\n+\nIIII\n").format, ReadFormat::Fastq);
        assert_eq!(sniff(b"").format, ReadFormat::Empty);
        assert_eq!(sniff(b"<html>").format, ReadFormat::Unknown);

        let sniffed = sniff(&gzip(b"@r1\nACGT\n+\nIIII\n"));
        assert_eq!(sniffed.compression, Compression::Gzip);
        assert_eq!(sniffed.format, ReadFormat::Fastq);
    }

    #[test]
    fn converts_multiline_fasta() {
        let input = ">read1 desc\nACG\nTT\n>read2\nGG\n";
        let mut out = Vec::new();
        let records = fasta_to_fastq(Cursor::new(input), &mut out).unwrap();
        assert_eq!(records, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "@read1 desc\nACGTT\n+\nIIIII\n@read2\nGG\n+\nII\n"
        );
    }

    #[test]
    fn normalizes_gzipped_fasta() {
        let temp = tempfile::tempdir().unwrap();
        let raw = temp.path().join("mgm1.fasta");
        let fastq = temp.path().join("mgm1.fastq");
        fs::write(&raw, gzip(b">a\nAC\n")).unwrap();

        let normalized = normalize_download(&raw, &fastq, "mgm1").unwrap();
        assert_eq!(normalized, Normalized::Plain(fastq.clone()));
        assert!(!raw.exists());
        assert_eq!(fs::read_to_string(&fastq).unwrap(), "@a\nAC\n+\nII\n");
    }

    #[test]
    fn gzipped_fastq_is_moved() {
        let temp = tempfile::tempdir().unwrap();
        let raw = temp.path().join("mgm1.download");
        let fastq = temp.path().join("mgm1.fastq");
        fs::write(&raw, gzip(b"@a\nAC\n+\nII\n")).unwrap();

        let normalized = normalize_download(&raw, &fastq, "mgm1").unwrap();
        assert_eq!(
            normalized,
            Normalized::Compressed(temp.path().join("mgm1.fastq.gz"))
        );
    }

    #[test]
    fn rejects_empty_and_html() {
        let temp = tempfile::tempdir().unwrap();
        let raw = temp.path().join("x.download");
        let fastq = temp.path().join("x.fastq");

        fs::write(&raw, b"").unwrap();
        assert_matches!(
            normalize_download(&raw, &fastq, "x"),
            Err(GrabError::NoReads(_))
        );

        fs::write(&raw, b"<html>private</html>").unwrap();
        assert_matches!(
            normalize_download(&raw, &fastq, "x"),
            Err(GrabError::UnsupportedFormat { .. })
        );
    }
}

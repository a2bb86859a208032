use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::Command;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::GrabError;
use crate::fastx::gz_path;

/// Compresses a FASTQ file in place, replacing `x.fastq` with `x.fastq.gz`.
pub trait Compressor: Send + Sync {
    fn compress(&self, path: &Path) -> Result<PathBuf, GrabError>;
    fn name(&self) -> &'static str;
}

/// Parallel gzip through `pigz -f -p <threads>`.
#[derive(Debug, Clone)]
pub struct PigzCompressor {
    program: PathBuf,
    threads: usize,
}

impl PigzCompressor {
    pub fn new(program: PathBuf, threads: usize) -> Self {
        Self {
            program,
            threads: threads.max(1),
        }
    }
}

impl Compressor for PigzCompressor {
    fn compress(&self, path: &Path) -> Result<PathBuf, GrabError> {
        let output = Command::new(&self.program)
            .arg("-f")
            .arg("-p")
            .arg(self.threads.to_string())
            .arg(path)
            .output()
            .map_err(|err| GrabError::Filesystem(format!("run pigz: {err}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GrabError::Filesystem(format!(
                "pigz failed on {} ({}): {stderr}",
                path.display(),
                output.status
            )));
        }
        let target = gz_path(path);
        // pigz exits zero on some missing-input cases.
        if !target.exists() {
            return Err(GrabError::Filesystem(format!(
                "pigz produced no output for {}",
                path.display()
            )));
        }
        Ok(target)
    }

    fn name(&self) -> &'static str {
        "pigz"
    }
}

/// Single-threaded fallback used when pigz is not installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, path: &Path) -> Result<PathBuf, GrabError> {
        let target = gz_path(path);
        let mut reader = BufReader::new(
            File::open(path)
                .map_err(|err| GrabError::Filesystem(format!("open {}: {err}", path.display())))?,
        );
        let out = File::create(&target)
            .map_err(|err| GrabError::Filesystem(format!("create {}: {err}", target.display())))?;
        let mut encoder = GzEncoder::new(BufWriter::new(out), Compression::default());
        io::copy(&mut reader, &mut encoder)
            .map_err(|err| GrabError::Filesystem(err.to_string()))?;
        encoder
            .finish()
            .and_then(|mut writer| io::Write::flush(&mut writer))
            .map_err(|err| GrabError::Filesystem(err.to_string()))?;
        fs::remove_file(path).map_err(|err| GrabError::Filesystem(err.to_string()))?;
        Ok(target)
    }

    fn name(&self) -> &'static str {
        "gzip"
    }
}

/// Picks pigz when a path to it is known, gzip otherwise.
pub fn select(pigz: Option<PathBuf>, threads: usize) -> Box<dyn Compressor> {
    match pigz {
        Some(program) => Box::new(PigzCompressor::new(program, threads)),
        None => Box::new(GzipCompressor),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::MultiGzDecoder;

    use super::*;

    #[test]
    fn gzip_fallback_replaces_file() {
        let temp = tempfile::tempdir().unwrap();
        let fastq = temp.path().join("SRR1.fastq");
        fs::write(&fastq, "@r\nA\n+\nI\n").unwrap();

        let out = GzipCompressor.compress(&fastq).unwrap();
        assert_eq!(out, temp.path().join("SRR1.fastq.gz"));
        assert!(!fastq.exists());

        let mut text = String::new();
        MultiGzDecoder::new(File::open(&out).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "@r\nA\n+\nI\n");
    }

    #[test]
    fn select_falls_back_without_pigz() {
        assert_eq!(select(None, 4).name(), "gzip");
        assert_eq!(select(Some(PathBuf::from("pigz")), 4).name(), "pigz");
    }
}

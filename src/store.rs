use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::domain::Layout;
use crate::error::GrabError;

/// Which read files for an accession are already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Existing {
    Unpaired,
    Paired,
    Both,
}

/// The directory downloads are written to.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: Utf8PathBuf,
}

impl OutputDir {
    /// An empty `dir` means the current working directory.
    pub fn new(dir: &str) -> Result<Self, GrabError> {
        let root = if dir.trim().is_empty() {
            let cwd =
                std::env::current_dir().map_err(|err| GrabError::Filesystem(err.to_string()))?;
            Utf8PathBuf::from_path_buf(cwd)
                .map_err(|_| GrabError::Filesystem("invalid working directory".to_string()))?
        } else {
            Utf8PathBuf::from(dir)
        };
        Ok(Self { root })
    }

    pub fn from_path(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<(), GrabError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| GrabError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn path(&self, file_name: &str) -> Utf8PathBuf {
        self.root.join(file_name)
    }

    pub fn metadata_table_path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(format!("{name}.csv"))
    }

    /// One path per read file of `layout`, e.g. `acc_1.fastq`, `acc_2.fastq`.
    pub fn build_paths(&self, accession: &str, layout: Layout, ext: &str) -> Vec<Utf8PathBuf> {
        layout
            .suffixes()
            .iter()
            .map(|suffix| self.root.join(format!("{accession}{suffix}{ext}")))
            .collect()
    }

    pub fn check_existing(&self, accession: &str) -> Option<Existing> {
        let names = self.gz_fastq_names()?;
        let unpaired_name = format!("{accession}.fastq.gz");
        let paired_names = [
            format!("{accession}_1.fastq.gz"),
            format!("{accession}_2.fastq.gz"),
        ];
        let unpaired = names.iter().any(|name| name.contains(&unpaired_name));
        let paired = names
            .iter()
            .any(|name| paired_names.iter().any(|p| name.contains(p.as_str())));
        match (unpaired, paired) {
            (true, true) => Some(Existing::Both),
            (false, true) => Some(Existing::Paired),
            (true, false) => Some(Existing::Unpaired),
            (false, false) => None,
        }
    }

    /// Whether every gzipped FASTQ file of `layout` is present.
    pub fn has_all(&self, accession: &str, layout: Layout) -> bool {
        self.build_paths(accession, layout, ".fastq.gz")
            .iter()
            .all(|path| path.as_std_path().is_file())
    }

    /// Looser match used for run-extraction output: any gzipped FASTQ whose
    /// name carries `acc.` or `acc_`.
    pub fn find_run_output(&self, accession: &str) -> Option<String> {
        let dotted = format!("{accession}.");
        let underscored = format!("{accession}_");
        self.gz_fastq_names()?
            .into_iter()
            .find(|name| name.contains(&dotted) || name.contains(&underscored))
    }

    /// Files directly in the directory named `accession.*` or `accession_*`
    /// and ending in `suffix`, sorted by name.
    pub fn accession_files(&self, accession: &str, suffix: &str) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.root.as_std_path()) else {
            return Vec::new();
        };
        let mut out = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                file_name(path)
                    .map(|name| {
                        name.strip_prefix(accession)
                            .map(|rest| rest.starts_with('.') || rest.starts_with('_'))
                            .unwrap_or(false)
                            && name.ends_with(suffix)
                    })
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        out.sort();
        out
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), GrabError> {
        let parent = path
            .parent()
            .ok_or_else(|| GrabError::Filesystem(format!("invalid destination path {path}")))?;
        let parent = if parent.as_str().is_empty() {
            Utf8Path::new(".")
        } else {
            parent
        };
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| GrabError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(".grabseqs")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| GrabError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| GrabError::Filesystem(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| GrabError::Filesystem(format!("write {path}: {err}")))?;
        Ok(())
    }

    fn gz_fastq_names(&self) -> Option<Vec<String>> {
        let entries = fs::read_dir(self.root.as_std_path()).ok()?;
        Some(
            entries
                .flatten()
                .filter_map(|entry| file_name(&entry.path()).map(str::to_string))
                .filter(|name| name.ends_with("fastq.gz"))
                .collect(),
        )
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|value| value.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_output() -> (tempfile::TempDir, OutputDir) {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, OutputDir::from_path(root))
    }

    #[test]
    fn missing_directory_has_nothing() {
        let out = OutputDir::from_path(Utf8PathBuf::from("/nonexistent/grabseqs-test"));
        assert_eq!(out.check_existing("SRR1"), None);
        assert_eq!(out.find_run_output("SRR1"), None);
    }

    #[test]
    fn detects_layouts() {
        let (_temp, out) = temp_output();
        fs::write(out.path("mgm1.fastq.gz").as_std_path(), b"").unwrap();
        fs::write(out.path("mgm2_1.fastq.gz").as_std_path(), b"").unwrap();
        fs::write(out.path("mgm3.fastq.gz").as_std_path(), b"").unwrap();
        fs::write(out.path("mgm3_2.fastq.gz").as_std_path(), b"").unwrap();
        fs::write(out.path("mgm4.fastq").as_std_path(), b"").unwrap();

        assert_eq!(out.check_existing("mgm1"), Some(Existing::Unpaired));
        assert_eq!(out.check_existing("mgm2"), Some(Existing::Paired));
        assert_eq!(out.check_existing("mgm3"), Some(Existing::Both));
        assert_eq!(out.check_existing("mgm4"), None);
    }

    #[test]
    fn half_a_pair_is_incomplete() {
        let (_temp, out) = temp_output();
        fs::write(out.path("mgm2_1.fastq.gz").as_std_path(), b"").unwrap();
        assert!(!out.has_all("mgm2", Layout::Paired));
        fs::write(out.path("mgm2_2.fastq.gz").as_std_path(), b"").unwrap();
        assert!(out.has_all("mgm2", Layout::Paired));
        assert!(!out.has_all("mgm2", Layout::Single));
    }

    #[test]
    fn run_output_needs_separator() {
        let (_temp, out) = temp_output();
        fs::write(out.path("SRR12_1.fastq.gz").as_std_path(), b"").unwrap();
        assert_eq!(out.find_run_output("SRR1"), None);
        assert_eq!(
            out.find_run_output("SRR12").as_deref(),
            Some("SRR12_1.fastq.gz")
        );
    }

    #[test]
    fn accession_files_are_sorted() {
        let (_temp, out) = temp_output();
        fs::write(out.path("SRR5_2.fastq").as_std_path(), b"").unwrap();
        fs::write(out.path("SRR5_1.fastq").as_std_path(), b"").unwrap();
        fs::write(out.path("SRR55.fastq").as_std_path(), b"").unwrap();
        fs::write(out.path("SRR5_1.fastq.gz").as_std_path(), b"").unwrap();

        let files = out.accession_files("SRR5", "fastq");
        let names = files
            .iter()
            .map(|path| file_name(path).unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["SRR5_1.fastq", "SRR5_2.fastq"]);
    }

    #[test]
    fn paths_follow_layout() {
        let out = OutputDir::from_path(Utf8PathBuf::from("reads"));
        let single = out.build_paths("s1", Layout::Single, ".fastq");
        assert_eq!(single, vec![Utf8PathBuf::from("reads/s1.fastq")]);
        let paired = out.build_paths("s1", Layout::Paired, ".fasta");
        assert!(paired[1].ends_with("s1_2.fasta"));
    }
}

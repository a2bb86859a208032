use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::config::ToolPaths;
use crate::error::GrabError;

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub fasterq_dump: Option<String>,
    pub pigz: Option<String>,
}

/// External programs found on this machine.
#[derive(Debug, Clone, Default)]
pub struct Toolbox {
    pub fasterq_dump: Option<PathBuf>,
    pub fastq_dump: Option<PathBuf>,
    pub pigz: Option<PathBuf>,
}

impl Toolbox {
    /// Configured paths are used as-is; anything else is looked up on `PATH`.
    pub fn discover(paths: &ToolPaths) -> Self {
        Self {
            fasterq_dump: paths
                .fasterq_dump
                .clone()
                .or_else(|| find_in_path("fasterq-dump")),
            fastq_dump: paths
                .fastq_dump
                .clone()
                .or_else(|| find_in_path("fastq-dump")),
            pigz: paths.pigz.clone().or_else(|| find_in_path("pigz")),
        }
    }

    pub fn require_fasterq_dump(&self) -> Result<&Path, GrabError> {
        self.fasterq_dump.as_deref().ok_or_else(|| {
            GrabError::MissingTool("fasterq-dump (SRA Toolkit), see --use-fastq-dump".to_string())
        })
    }

    pub fn require_fastq_dump(&self) -> Result<&Path, GrabError> {
        self.fastq_dump
            .as_deref()
            .ok_or_else(|| GrabError::MissingTool("fastq-dump (SRA Toolkit)".to_string()))
    }

    pub fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            fasterq_dump: self
                .fasterq_dump
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
            pigz: self
                .pigz
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
        }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    // pigz prints its version on stderr
    let text = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    let text = String::from_utf8_lossy(&text).trim().to_string();
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_paths_win() {
        let paths = ToolPaths {
            fasterq_dump: Some(PathBuf::from("/opt/sra/fasterq-dump")),
            fastq_dump: None,
            pigz: Some(PathBuf::from("/opt/pigz")),
        };
        let toolbox = Toolbox::discover(&paths);
        assert_eq!(
            toolbox.require_fasterq_dump().unwrap(),
            Path::new("/opt/sra/fasterq-dump")
        );
        assert_eq!(toolbox.pigz, Some(PathBuf::from("/opt/pigz")));
    }

    #[test]
    fn missing_tool_is_reported() {
        let toolbox = Toolbox::default();
        let err = toolbox.require_fastq_dump().unwrap_err();
        assert!(err.to_string().contains("fastq-dump"));
    }
}

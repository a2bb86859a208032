use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GrabError;

static SRA_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(SRR|ERR|DRR)\d+$").expect("valid run regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repository {
    Sra,
    #[serde(rename = "mgrast")]
    MgRast,
    Imicrobe,
}

impl Repository {
    pub fn as_str(&self) -> &'static str {
        match self {
            Repository::Sra => "sra",
            Repository::MgRast => "mgrast",
            Repository::Imicrobe => "imicrobe",
        }
    }

    pub fn default_metadata_name(&self) -> String {
        format!("{}_metadata", self.as_str())
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A search term handed to the SRA run selector. Anything that is not a
/// single run accession is treated as a project-level term (BioProject,
/// study, sample) and expanded through the runinfo table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SraQuery(String);

impl SraQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_run(&self) -> bool {
        SRA_RUN.is_match(&self.0)
    }
}

impl fmt::Display for SraQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SraQuery {
    type Err = GrabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.chars().any(|ch| ch.is_whitespace()) {
            return Err(GrabError::InvalidAccession {
                repository: "SRA",
                value: value.to_string(),
                hint: Some("expected a BioProject, SRP/ERP or SRR/ERR identifier".to_string()),
            });
        }
        if SRA_RUN.is_match(trimmed) {
            return Ok(Self(trimmed.to_uppercase()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MgRastAccession {
    Project(String),
    Metagenome(String),
}

impl MgRastAccession {
    pub fn as_str(&self) -> &str {
        match self {
            MgRastAccession::Project(value) | MgRastAccession::Metagenome(value) => value,
        }
    }
}

impl fmt::Display for MgRastAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MgRastAccession {
    type Err = GrabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let prefix = normalized.get(..3).unwrap_or(normalized.as_str());
        let has_body = normalized.len() > 3;
        match prefix {
            "mgp" if has_body => Ok(MgRastAccession::Project(normalized)),
            "mgm" if has_body => Ok(MgRastAccession::Metagenome(normalized)),
            _ => Err(GrabError::InvalidAccession {
                repository: "MG-RAST",
                value: value.to_string(),
                hint: Some(format!(
                    "unknown prefix '{prefix}', should be 'mgm' (sample) or 'mgp' (project)"
                )),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImicrobeAccession {
    Project(u64),
    Sample(u64),
}

impl fmt::Display for ImicrobeAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImicrobeAccession::Project(id) => write!(f, "p{id}"),
            ImicrobeAccession::Sample(id) => write!(f, "s{id}"),
        }
    }
}

impl FromStr for ImicrobeAccession {
    type Err = GrabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        let invalid = || GrabError::InvalidAccession {
            repository: "iMicrobe",
            value: value.to_string(),
            hint: Some(
                "iMicrobe accessions should be prefixed with 'p' (project) or 's' (sample)"
                    .to_string(),
            ),
        };
        let (kind, digits) = normalized.split_at_checked(1).ok_or_else(invalid)?;
        let id = digits.parse::<u64>().map_err(|_| invalid())?;
        match kind {
            "p" => Ok(ImicrobeAccession::Project(id)),
            "s" => Ok(ImicrobeAccession::Sample(id)),
            _ => Err(invalid()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Single,
    Paired,
}

impl Layout {
    /// Infers the layout from the number of read files a repository offers
    /// for one sample.
    pub fn from_file_count(accession: &str, count: usize) -> Result<Self, GrabError> {
        match count {
            0 => Err(GrabError::NoReads(accession.to_string())),
            1 => Ok(Layout::Single),
            2 => Ok(Layout::Paired),
            count => Err(GrabError::TooManyReadFiles {
                accession: accession.to_string(),
                count,
            }),
        }
    }

    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            Layout::Single => &[""],
            Layout::Paired => &["_1", "_2"],
        }
    }

    pub fn output_names(&self, accession: &str) -> Vec<String> {
        self.suffixes()
            .iter()
            .map(|suffix| format!("{accession}{suffix}.fastq.gz"))
            .collect()
    }
}

impl FromStr for Layout {
    type Err = GrabError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "SINGLE" => Ok(Layout::Single),
            "PAIRED" => Ok(Layout::Paired),
            other => Err(GrabError::UnknownLayout(other.to_string())),
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layout::Single => write!(f, "single"),
            Layout::Paired => write!(f, "paired"),
        }
    }
}

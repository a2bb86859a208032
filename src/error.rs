use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GrabError {
    #[error("invalid {repository} accession: {value}")]
    InvalidAccession {
        repository: &'static str,
        value: String,
        #[help]
        hint: Option<String>,
    },

    #[error("unknown library layout: {0}")]
    UnknownLayout(String),

    #[error("no reads found for accession: {0}")]
    NoReads(String),

    #[error("more than two read files found for {accession} ({count}), not sure what to do")]
    TooManyReadFiles { accession: String, count: usize },

    #[error("could not find samples for accession: {0}")]
    #[diagnostic(help("if this accession number is valid, try re-running"))]
    NoSamples(String),

    #[error("{accession} does not appear to be FASTA or FASTQ")]
    #[diagnostic(help("this may be because it is not publicly accessible"))]
    UnsupportedFormat { accession: String },

    #[error("missing config file at {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("SRA request failed: {0}")]
    SraHttp(String),

    #[error("SRA returned status {status}: {message}")]
    SraStatus { status: u16, message: String },

    #[error("MG-RAST request failed: {0}")]
    MgRastHttp(String),

    #[error("MG-RAST returned status {status}: {message}")]
    MgRastStatus { status: u16, message: String },

    #[error("iMicrobe request failed: {0}")]
    ImicrobeHttp(String),

    #[error("iMicrobe returned status {status}: {message}")]
    ImicrobeStatus { status: u16, message: String },

    #[error("unexpected {repository} response: {message}")]
    UnexpectedResponse {
        repository: &'static str,
        message: String,
    },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("download for {accession} failed: {message}")]
    ToolFailed { accession: String, message: String },

    #[error("metadata table error: {0}")]
    Metadata(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl GrabError {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            GrabError::SraHttp(_)
                | GrabError::SraStatus { .. }
                | GrabError::MgRastHttp(_)
                | GrabError::MgRastStatus { .. }
                | GrabError::ImicrobeHttp(_)
                | GrabError::ImicrobeStatus { .. }
                | GrabError::UnexpectedResponse { .. }
        )
    }
}

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;

use crate::compress::Compressor;
use crate::domain::{Layout, SraQuery};
use crate::error::GrabError;
use crate::http::Http;
use crate::metadata::MetadataTable;
use crate::store::OutputDir;

pub trait SraClient: Send + Sync {
    /// Raw runinfo CSV for a search term.
    fn runinfo(&self, query: &SraQuery) -> Result<String, GrabError>;
}

#[derive(Clone)]
pub struct SraHttpClient {
    http: Http,
    base_url: String,
}

impl SraHttpClient {
    pub fn new(base_url: &str) -> Result<Self, GrabError> {
        let http = Http::new(
            Duration::from_secs(120),
            GrabError::SraHttp,
            |status, message| GrabError::SraStatus { status, message },
        )?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn runinfo_url(base_url: &str, query: &SraQuery) -> Result<Url, GrabError> {
        Url::parse_with_params(
            base_url,
            &[
                ("save", "efetch"),
                ("db", "sra"),
                ("rettype", "runinfo"),
                ("term", query.as_str()),
            ],
        )
        .map_err(|err| GrabError::SraHttp(err.to_string()))
    }
}

impl SraClient for SraHttpClient {
    fn runinfo(&self, query: &SraQuery) -> Result<String, GrabError> {
        let url = Self::runinfo_url(&self.base_url, query)?;
        tracing::debug!(%url, "requesting runinfo");
        self.http.get_text(url.as_str())
    }
}

/// One row of a runinfo table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SraRun {
    pub accession: String,
    pub layout: Option<String>,
}

impl SraRun {
    pub fn layout(&self) -> Result<Layout, GrabError> {
        self.layout
            .as_deref()
            .unwrap_or_default()
            .parse::<Layout>()
    }
}

pub fn parse_runinfo(query: &SraQuery, text: &str) -> Result<MetadataTable, GrabError> {
    let no_samples = || GrabError::NoSamples(query.to_string());
    if text.trim().is_empty() {
        return Err(no_samples());
    }
    let table = MetadataTable::from_csv_str(text).map_err(|_| no_samples())?;
    if table.column("Run").is_none() {
        return Err(no_samples());
    }
    Ok(table)
}

/// Runs listed in a runinfo table, skipping rows with an empty `Run`.
pub fn resolve_runs(table: &MetadataTable) -> Vec<SraRun> {
    table
        .rows()
        .filter_map(|row| {
            let accession = row.get("Run").map(|value| value.trim()).unwrap_or("");
            if accession.is_empty() {
                return None;
            }
            Some(SraRun {
                accession: accession.to_string(),
                layout: row
                    .get("LibraryLayout")
                    .map(|value| value.trim().to_string()),
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub enum DumpTool {
    Fasterq { program: PathBuf, threads: usize },
    /// Legacy single-threaded `fastq-dump`, which gzips on its own.
    FastqDump { program: PathBuf },
    /// A user-supplied fasterq-dump command line, used verbatim ahead of
    /// `-O <dir> <acc>`.
    Custom { program: PathBuf, args: Vec<String> },
}

impl DumpTool {
    /// Splits a `--custom-fqd` command: the first word is the program.
    pub fn custom(command: &str) -> Result<Self, GrabError> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| GrabError::InvalidCommand("empty custom fasterq-dump command".to_string()))?;
        Ok(DumpTool::Custom {
            program: PathBuf::from(program),
            args: words.collect(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            DumpTool::Fasterq { .. } => "fasterq-dump",
            DumpTool::FastqDump { .. } => "fastq-dump",
            DumpTool::Custom { .. } => "custom fasterq-dump",
        }
    }

    /// Whether the tool leaves plain `.fastq` files that still need gzip.
    fn writes_plain_fastq(&self) -> bool {
        !matches!(self, DumpTool::FastqDump { .. })
    }

    pub fn command_args(&self, accession: &str, outdir: Option<&Path>) -> Vec<String> {
        let mut args = match self {
            DumpTool::Fasterq { threads, .. } => vec![
                "-e".to_string(),
                threads.max(&1).to_string(),
                "-f".to_string(),
                "-3".to_string(),
            ],
            DumpTool::Custom { args, .. } => args.clone(),
            DumpTool::FastqDump { .. } => vec![
                "--gzip".to_string(),
                "--split-3".to_string(),
                "--skip-technical".to_string(),
            ],
        };
        if let Some(dir) = outdir {
            args.push("-O".to_string());
            args.push(dir.to_string_lossy().to_string());
        }
        args.push(accession.to_string());
        args
    }

    fn program(&self) -> &Path {
        match self {
            DumpTool::Fasterq { program, .. }
            | DumpTool::FastqDump { program }
            | DumpTool::Custom { program, .. } => program,
        }
    }
}

/// Extracts a run into gzipped FASTQ files inside `outdir`.
pub trait SraDumper: Send + Sync {
    fn dump(&self, accession: &str, outdir: &OutputDir) -> Result<Vec<PathBuf>, GrabError>;
}

pub struct SystemSraDumper {
    tool: DumpTool,
    compressor: Box<dyn Compressor>,
}

impl SystemSraDumper {
    pub fn new(tool: DumpTool, compressor: Box<dyn Compressor>) -> Self {
        Self { tool, compressor }
    }

    fn run_tool(&self, accession: &str, outdir: &OutputDir) -> Result<(), GrabError> {
        let args = self
            .tool
            .command_args(accession, Some(outdir.root().as_std_path()));
        tracing::info!("downloading {accession} using {}", self.tool.name());
        let output = Command::new(self.tool.program())
            .args(&args)
            .output()
            .map_err(|err| GrabError::ToolFailed {
                accession: accession.to_string(),
                message: format!("could not run {}: {err}", self.tool.name()),
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let mut message = format!("{} returned {}", self.tool.name(), exit_code(&output.status));
        if !stderr.is_empty() {
            message.push_str(": ");
            message.push_str(&stderr);
        }
        Err(GrabError::ToolFailed {
            accession: accession.to_string(),
            message,
        })
    }
}

impl SraDumper for SystemSraDumper {
    fn dump(&self, accession: &str, outdir: &OutputDir) -> Result<Vec<PathBuf>, GrabError> {
        self.run_tool(accession, outdir)?;

        if self.tool.writes_plain_fastq() {
            for fastq in outdir.accession_files(accession, ".fastq") {
                self.compressor
                    .compress(&fastq)
                    .map_err(|err| GrabError::ToolFailed {
                        accession: accession.to_string(),
                        message: format!(
                            "{} returned 0, {} failed: {err}",
                            self.tool.name(),
                            self.compressor.name()
                        ),
                    })?;
            }
        }

        let produced = outdir.accession_files(accession, "fastq.gz");
        if produced.is_empty() {
            return Err(GrabError::ToolFailed {
                accession: accession.to_string(),
                message: format!("{} produced no FASTQ files", self.tool.name()),
            });
        }
        Ok(produced)
    }
}

fn exit_code(status: &std::process::ExitStatus) -> String {
    status
        .code()
        .map(|code| code.to_string())
        .unwrap_or_else(|| "a signal".to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::compress::GzipCompressor;

    const RUNINFO: &str = "Run,ReleaseDate,LibraryLayout,SampleName\n\
SRR1804203,2015-02-26,PAIRED,S1\n\
SRR1804204,2015-02-26,SINGLE,S2\n\
,,,\n";

    #[test]
    fn parses_runs() {
        let query: SraQuery = "PRJNA271013".parse().unwrap();
        let table = parse_runinfo(&query, RUNINFO).unwrap();
        let runs = resolve_runs(&table);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].accession, "SRR1804203");
        assert_eq!(runs[0].layout().unwrap(), Layout::Paired);
        assert_eq!(runs[1].layout().unwrap(), Layout::Single);
    }

    #[test]
    fn empty_runinfo_has_no_samples() {
        let query: SraQuery = "PRJNA0".parse().unwrap();
        assert_matches!(parse_runinfo(&query, "\n"), Err(GrabError::NoSamples(_)));
        assert_matches!(
            parse_runinfo(&query, "Error,Message\nx,y\n"),
            Err(GrabError::NoSamples(_))
        );
    }

    #[test]
    fn unknown_layout_is_an_error() {
        let run = SraRun {
            accession: "SRR1".to_string(),
            layout: Some("TRIPLE".to_string()),
        };
        assert_matches!(run.layout(), Err(GrabError::UnknownLayout(_)));
    }

    #[test]
    fn runinfo_url_encodes_term() {
        let query: SraQuery = "PRJNA271013".parse().unwrap();
        let url = SraHttpClient::runinfo_url(crate::config::DEFAULT_SRA_BASE_URL, &query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://trace.ncbi.nlm.nih.gov/Traces/sra/sra.cgi?save=efetch&db=sra&rettype=runinfo&term=PRJNA271013"
        );
    }

    #[test]
    fn fasterq_args() {
        let tool = DumpTool::Fasterq {
            program: PathBuf::from("fasterq-dump"),
            threads: 4,
        };
        assert_eq!(
            tool.command_args("SRR1", Some(Path::new("out"))),
            vec!["-e", "4", "-f", "-3", "-O", "out", "SRR1"]
        );
    }

    #[test]
    fn custom_command_replaces_defaults() {
        let tool = DumpTool::custom("/opt/sra/fasterq-dump -e 8 --split-files").unwrap();
        assert_eq!(tool.program(), Path::new("/opt/sra/fasterq-dump"));
        assert_eq!(
            tool.command_args("SRR1", None),
            vec!["-e", "8", "--split-files", "SRR1"]
        );
        assert_matches!(DumpTool::custom("  "), Err(GrabError::InvalidCommand(_)));
    }

    #[test]
    fn legacy_args() {
        let tool = DumpTool::FastqDump {
            program: PathBuf::from("fastq-dump"),
        };
        assert_eq!(
            tool.command_args("ERR9", None),
            vec!["--gzip", "--split-3", "--skip-technical", "ERR9"]
        );
    }

    fn shell_tool(script: &str) -> DumpTool {
        // arguments after the script: -O <dir> <acc>
        DumpTool::Custom {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string(), "tool".to_string()],
        }
    }

    fn temp_output() -> (tempfile::TempDir, OutputDir) {
        let temp = tempfile::tempdir().unwrap();
        let root = camino::Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, OutputDir::from_path(root))
    }

    #[test]
    fn dumper_requires_fastq_output() {
        let (_temp, out) = temp_output();
        let dumper = SystemSraDumper::new(shell_tool("exit 0"), Box::new(GzipCompressor));
        let err = dumper.dump("SRR1", &out).unwrap_err();
        assert_matches!(err, GrabError::ToolFailed { message, .. } if message.contains("no FASTQ"));
    }

    #[test]
    fn dumper_compresses_plain_fastq() {
        let (_temp, out) = temp_output();
        let script = r#"cd "$2" && printf '@r\nA\n+\nI\n' > "$3_1.fastq" && printf '@r\nC\n+\nI\n' > "$3_2.fastq""#;
        let dumper = SystemSraDumper::new(shell_tool(script), Box::new(GzipCompressor));

        let files = dumper.dump("SRR1", &out).unwrap();
        let names = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["SRR1_1.fastq.gz", "SRR1_2.fastq.gz"]);
        assert!(out.accession_files("SRR1", ".fastq").is_empty());
    }

    #[test]
    fn dumper_reports_exit_code() {
        let (_temp, out) = temp_output();
        let dumper = SystemSraDumper::new(
            shell_tool("echo 'disk full' >&2; exit 3"),
            Box::new(GzipCompressor),
        );
        let err = dumper.dump("SRR1", &out).unwrap_err();
        assert_matches!(
            err,
            GrabError::ToolFailed { accession, message }
                if accession == "SRR1" && message.contains("returned 3") && message.contains("disk full")
        );
    }
}

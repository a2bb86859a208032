use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use grabseqs::app::{App, GrabOptions, GrabResult};
use grabseqs::compress::{self, GzipCompressor};
use grabseqs::config::{ConfigLoader, DEFAULT_SRA_RETRIES, Settings};
use grabseqs::domain::{ImicrobeAccession, MgRastAccession, Repository, SraQuery};
use grabseqs::error::GrabError;
use grabseqs::imicrobe::ImicrobeHttpClient;
use grabseqs::mgrast::MgRastHttpClient;
use grabseqs::output::{JsonOutput, LogSink, OutputMode, TextOutput};
use grabseqs::retry::RetryPolicy;
use grabseqs::sra::{DumpTool, SraDumper, SraHttpClient, SystemSraDumper};
use grabseqs::store::OutputDir;
use grabseqs::tools::Toolbox;

#[derive(Parser)]
#[command(name = "grabseqs")]
#[command(about = "Download metagenomic sequences from public datasets")]
#[command(version)]
struct Cli {
    /// Print the result as JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a grabseqs.json config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download from SRA")]
    Sra(SraArgs),
    #[command(about = "Download from MG-RAST")]
    Mgrast(MgRastArgs),
    #[command(about = "Download from iMicrobe")]
    Imicrobe(ImicrobeArgs),
}

#[derive(Args, Clone)]
struct CommonArgs {
    /// Directory in which to save output, created if it doesn't exist
    #[arg(short = 'o', value_name = "DIR")]
    outdir: Option<String>,

    /// Number of times to retry a download
    #[arg(short = 'r', value_name = "N")]
    retries: Option<u32>,

    /// Threads to use (for fasterq-dump/pigz)
    #[arg(short = 't', value_name = "N")]
    threads: Option<usize>,

    /// Force re-download of files
    #[arg(short = 'f')]
    force: bool,

    /// List (but do not download) samples to be grabbed
    #[arg(short = 'l')]
    list: bool,

    /// Save metadata
    #[arg(short = 'm')]
    metadata: bool,

    /// File name (without extension) of the aggregated metadata table
    #[arg(long, value_name = "NAME")]
    metadata_name: Option<String>,
}

#[derive(Args)]
struct SraArgs {
    /// One or more BioProject, ERR/SRR or ERP/SRP number(s)
    #[arg(required = true)]
    ids: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,

    /// Do not parse SRR/ERR (pass straight to fasterq-dump)
    #[arg(long)]
    no_parsing: bool,

    /// Use legacy fastq-dump instead of fasterq-dump (no multithreaded downloading)
    #[arg(long)]
    use_fastq_dump: bool,

    /// Custom fasterq-dump command (program and arguments), replacing the
    /// default "fasterq-dump -e <threads> -f -3"; "-O <dir> <acc>" is appended
    #[arg(long, value_name = "CMD", allow_hyphen_values = true, conflicts_with = "use_fastq_dump")]
    custom_fqd: Option<String>,
}

#[derive(Args)]
struct MgRastArgs {
    /// One or more MG-RAST project or sample identifiers (mgp####/mgm######)
    #[arg(required = true)]
    ids: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct ImicrobeArgs {
    /// One or more iMicrobe project or sample identifiers (p##/s###)
    #[arg(required = true)]
    ids: Vec<String>,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<GrabError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &GrabError) -> u8 {
    match error {
        GrabError::InvalidAccession { .. }
        | GrabError::InvalidCommand(_)
        | GrabError::UnknownLayout(_)
        | GrabError::TooManyReadFiles { .. }
        | GrabError::UnsupportedFormat { .. }
        | GrabError::NoSamples(_)
        | GrabError::NoReads(_)
        | GrabError::MissingConfig(_) => 2,
        GrabError::MissingTool(_) | GrabError::ToolFailed { .. } => 3,
        error if error.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };
    let settings = ConfigLoader::resolve(cli.config.as_deref())?;
    let toolbox = Toolbox::discover(&settings.tools);
    tracing::debug!(tools = ?toolbox.tool_info(), "discovered tools");

    let result = match cli.command {
        Commands::Sra(args) => run_sra(args, &settings, &toolbox)?,
        Commands::Mgrast(args) => run_mgrast(args, &settings, &toolbox)?,
        Commands::Imicrobe(args) => run_imicrobe(args, &settings, &toolbox)?,
    };

    match output_mode {
        OutputMode::Json => JsonOutput::print_grab(&result).into_diagnostic(),
        OutputMode::Text => TextOutput::print_grab(&result).into_diagnostic(),
    }
}

fn run_sra(args: SraArgs, settings: &Settings, toolbox: &Toolbox) -> miette::Result<GrabResult> {
    let queries = args
        .ids
        .iter()
        .map(|value| value.parse::<SraQuery>())
        .collect::<Result<Vec<_>, GrabError>>()?;
    let options = build_options(&args.common, settings, Repository::Sra, args.no_parsing)?;
    let threads = threads(&args.common, settings);

    let sra = SraHttpClient::new(&settings.endpoints.sra)?;
    let mgrast = MgRastHttpClient::new(&settings.endpoints.mgrast)?;
    let imicrobe = imicrobe_client(settings)?;

    if options.list_only {
        let app = App::new(sra, mgrast, imicrobe, NopDumper, Box::new(GzipCompressor));
        return Ok(app.grab_sra(&queries, &options, &LogSink)?);
    }

    let tool = match (&args.custom_fqd, args.use_fastq_dump) {
        (_, true) => DumpTool::FastqDump {
            program: toolbox.require_fastq_dump()?.to_path_buf(),
        },
        (Some(command), false) => DumpTool::custom(command)?,
        (None, false) => DumpTool::Fasterq {
            program: toolbox.require_fasterq_dump()?.to_path_buf(),
            threads,
        },
    };
    if !matches!(tool, DumpTool::FastqDump { .. }) {
        warn_without_pigz(toolbox);
    }
    let dumper = SystemSraDumper::new(tool, compress::select(toolbox.pigz.clone(), threads));
    let app = App::new(
        sra,
        mgrast,
        imicrobe,
        dumper,
        compress::select(toolbox.pigz.clone(), threads),
    );
    Ok(app.grab_sra(&queries, &options, &LogSink)?)
}

fn run_mgrast(
    args: MgRastArgs,
    settings: &Settings,
    toolbox: &Toolbox,
) -> miette::Result<GrabResult> {
    let accessions = args
        .ids
        .iter()
        .map(|value| value.parse::<MgRastAccession>())
        .collect::<Result<Vec<_>, GrabError>>()?;
    let options = build_options(&args.common, settings, Repository::MgRast, false)?;
    let threads = threads(&args.common, settings);
    if !options.list_only {
        warn_without_pigz(toolbox);
    }

    let app = App::new(
        SraHttpClient::new(&settings.endpoints.sra)?,
        MgRastHttpClient::new(&settings.endpoints.mgrast)?,
        imicrobe_client(settings)?,
        NopDumper,
        compress::select(toolbox.pigz.clone(), threads),
    );
    Ok(app.grab_mgrast(&accessions, &options, &LogSink)?)
}

fn run_imicrobe(
    args: ImicrobeArgs,
    settings: &Settings,
    toolbox: &Toolbox,
) -> miette::Result<GrabResult> {
    let accessions = args
        .ids
        .iter()
        .map(|value| value.parse::<ImicrobeAccession>())
        .collect::<Result<Vec<_>, GrabError>>()?;
    let options = build_options(&args.common, settings, Repository::Imicrobe, false)?;
    let threads = threads(&args.common, settings);
    if !options.list_only {
        warn_without_pigz(toolbox);
    }

    let app = App::new(
        SraHttpClient::new(&settings.endpoints.sra)?,
        MgRastHttpClient::new(&settings.endpoints.mgrast)?,
        imicrobe_client(settings)?,
        NopDumper,
        compress::select(toolbox.pigz.clone(), threads),
    );
    Ok(app.grab_imicrobe(&accessions, &options, &LogSink)?)
}

fn imicrobe_client(settings: &Settings) -> miette::Result<ImicrobeHttpClient> {
    Ok(ImicrobeHttpClient::new(
        &settings.endpoints.imicrobe,
        &settings.endpoints.imicrobe_data,
    )?)
}

fn warn_without_pigz(toolbox: &Toolbox) {
    if toolbox.pigz.is_none() {
        tracing::warn!("pigz not found, compressing with a single thread");
    }
}

fn threads(common: &CommonArgs, settings: &Settings) -> usize {
    common.threads.unwrap_or(settings.threads).max(1)
}

fn build_options(
    common: &CommonArgs,
    settings: &Settings,
    repository: Repository,
    no_parsing: bool,
) -> miette::Result<GrabOptions> {
    let outdir = common
        .outdir
        .clone()
        .unwrap_or_else(|| settings.outdir.clone());
    let default_retries = match repository {
        Repository::Sra => DEFAULT_SRA_RETRIES,
        Repository::MgRast | Repository::Imicrobe => 0,
    };
    let retries = common
        .retries
        .or(settings.retries)
        .unwrap_or(default_retries);
    Ok(GrabOptions {
        outdir: OutputDir::new(&outdir)?,
        retry: RetryPolicy::new(retries, settings.retry_delay),
        force: common.force,
        list_only: common.list,
        metadata: common.metadata,
        metadata_name: common.metadata_name.clone(),
        no_parsing,
    })
}

/// Stands in for the run extractor where no run is ever extracted.
struct NopDumper;

impl SraDumper for NopDumper {
    fn dump(
        &self,
        _accession: &str,
        _outdir: &OutputDir,
    ) -> Result<Vec<PathBuf>, GrabError> {
        Err(GrabError::MissingTool(
            "run extraction is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_input_exits_with_two() {
        let errors = [
            GrabError::UnknownLayout("TRIPLE".to_string()),
            GrabError::TooManyReadFiles {
                accession: "s1".to_string(),
                count: 3,
            },
            GrabError::UnsupportedFormat {
                accession: "mgm1.3".to_string(),
            },
            GrabError::InvalidCommand("empty".to_string()),
            GrabError::NoReads("mgm1.3".to_string()),
        ];
        for error in &errors {
            assert_eq!(map_exit_code(error), 2, "{error}");
        }
    }

    #[test]
    fn remote_and_tool_failures_exit_with_three() {
        assert_eq!(
            map_exit_code(&GrabError::MgRastStatus {
                status: 503,
                message: "busy".to_string(),
            }),
            3
        );
        assert_eq!(
            map_exit_code(&GrabError::MissingTool("pigz".to_string())),
            3
        );
        assert_eq!(map_exit_code(&GrabError::Filesystem("full".to_string())), 1);
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::compress::Compressor;
use crate::domain::{ImicrobeAccession, Layout, MgRastAccession, Repository, SraQuery};
use crate::error::GrabError;
use crate::fastx::{Normalized, gz_path, normalize_download};
use crate::imicrobe::{self, ImicrobeClient};
use crate::metadata::MetadataTable;
use crate::mgrast::{self, MgRastClient};
use crate::retry::RetryPolicy;
use crate::sra::{self, SraClient, SraDumper, SraRun};
use crate::store::{Existing, OutputDir};

#[derive(Debug, Clone)]
pub struct GrabOptions {
    pub outdir: OutputDir,
    pub retry: RetryPolicy,
    pub force: bool,
    pub list_only: bool,
    pub metadata: bool,
    pub metadata_name: Option<String>,
    /// Pass run accessions straight to the dump tool without a runinfo lookup.
    pub no_parsing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Listed,
    Skipped,
    Downloaded,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrabItem {
    pub repository: Repository,
    pub accession: String,
    pub action: Action,
    pub layout: Option<Layout>,
    pub existing: Option<Existing>,
    pub files: Vec<String>,
}

impl GrabItem {
    /// The `-l` listing line: comma-separated file names.
    pub fn list_line(&self) -> String {
        self.files
            .iter()
            .map(|file| {
                Path::new(file)
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.clone())
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GrabResult {
    pub repository: Repository,
    pub started_at: String,
    pub list_only: bool,
    pub items: Vec<GrabItem>,
    pub metadata_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<S: SraClient, M: MgRastClient, I: ImicrobeClient, D: SraDumper> {
    sra: S,
    mgrast: M,
    imicrobe: I,
    dumper: D,
    compressor: Box<dyn Compressor>,
}

impl<S: SraClient, M: MgRastClient, I: ImicrobeClient, D: SraDumper> App<S, M, I, D> {
    pub fn new(sra: S, mgrast: M, imicrobe: I, dumper: D, compressor: Box<dyn Compressor>) -> Self {
        Self {
            sra,
            mgrast,
            imicrobe,
            dumper,
            compressor,
        }
    }

    pub fn sra_client(&self) -> &S {
        &self.sra
    }

    pub fn imicrobe_client(&self) -> &I {
        &self.imicrobe
    }

    pub fn dumper(&self) -> &D {
        &self.dumper
    }

    pub fn grab_sra(
        &self,
        queries: &[SraQuery],
        options: &GrabOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GrabResult, GrabError> {
        let mut run = Run::start(Repository::Sra, options)?;

        for query in queries {
            let runs = self.resolve_sra(query, options, &mut run.table, sink)?;
            for sra_run in runs {
                let item = if options.list_only {
                    let layout = sra_run.layout()?;
                    listed(Repository::Sra, &sra_run.accession, layout)
                } else {
                    self.dump_run(&sra_run.accession, options, sink)?
                };
                run.items.push(item);
            }
        }

        run.finish(options, sink)
    }

    pub fn grab_mgrast(
        &self,
        accessions: &[MgRastAccession],
        options: &GrabOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GrabResult, GrabError> {
        let mut run = Run::start(Repository::MgRast, options)?;

        for accession in accessions {
            let samples = match accession {
                MgRastAccession::Metagenome(id) => vec![id.clone()],
                MgRastAccession::Project(project) => {
                    sink.event(progress(format!("phase=Resolve; MG-RAST project {project}")));
                    let export = self.mgrast.project_metadata(project)?;
                    if options.metadata {
                        save_raw_json(&options.outdir, project, &export)?;
                        run.table
                            .merge(mgrast::project_metadata_table(project, &export));
                    }
                    mgrast::project_samples(&export)?
                }
            };

            for sample in samples {
                let listing = self.mgrast.download_listing(&sample)?;
                let stages = mgrast::read_stages(&listing);
                let layout = Layout::from_file_count(&sample, stages.len())?;
                let item = self.materialize(
                    Repository::MgRast,
                    &sample,
                    layout,
                    options,
                    sink,
                    |index, destination| {
                        self.mgrast
                            .download_stage(&sample, &stages[index], destination)
                    },
                )?;
                run.items.push(item);
            }
        }

        run.finish(options, sink)
    }

    pub fn grab_imicrobe(
        &self,
        accessions: &[ImicrobeAccession],
        options: &GrabOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GrabResult, GrabError> {
        let mut run = Run::start(Repository::Imicrobe, options)?;

        for accession in accessions {
            let samples = match accession {
                ImicrobeAccession::Sample(id) => vec![*id],
                ImicrobeAccession::Project(id) => {
                    sink.event(progress(format!("phase=Resolve; iMicrobe project p{id}")));
                    imicrobe::project_samples(&self.imicrobe.project(*id)?)?
                }
            };

            for id in samples {
                let sample_acc = ImicrobeAccession::Sample(id).to_string();
                let record = self.imicrobe.sample(id)?;
                if options.metadata {
                    run.table
                        .merge(imicrobe::sample_metadata_table(&sample_acc, &record));
                }
                let files = imicrobe::read_files(&record);
                let layout = match imicrobe::sample_layout(&sample_acc, &files) {
                    Err(GrabError::NoReads(acc)) => {
                        return Err(GrabError::NoReads(format!(
                            "{acc} (check {} to confirm that it exists)",
                            imicrobe::sample_page(id)
                        )));
                    }
                    other => other?,
                };
                let item = self.materialize(
                    Repository::Imicrobe,
                    &sample_acc,
                    layout,
                    options,
                    sink,
                    |index, destination| {
                        let url = self.imicrobe.file_url(&files[index]);
                        self.imicrobe.download(&url, destination)
                    },
                )?;
                run.items.push(item);
            }
        }

        run.finish(options, sink)
    }

    fn resolve_sra(
        &self,
        query: &SraQuery,
        options: &GrabOptions,
        table: &mut MetadataTable,
        sink: &dyn ProgressSink,
    ) -> Result<Vec<SraRun>, GrabError> {
        let passthrough = options.no_parsing && query.is_run();
        if passthrough && !options.list_only && !options.metadata {
            return Ok(vec![SraRun {
                accession: query.to_string(),
                layout: None,
            }]);
        }

        sink.event(progress(format!("phase=Resolve; SRA runinfo for {query}")));
        let start = Instant::now();
        let text = self.sra.runinfo(query)?;
        let parsed = sra::parse_runinfo(query, &text)?;
        sink.event(ProgressEvent {
            message: format!("sra.response runs={}", parsed.len()),
            elapsed: Some(start.elapsed()),
        });
        let runs = sra::resolve_runs(&parsed);
        if options.metadata {
            table.merge(parsed);
        }

        if passthrough && !options.list_only {
            return Ok(vec![SraRun {
                accession: query.to_string(),
                layout: None,
            }]);
        }
        Ok(runs)
    }

    fn dump_run(
        &self,
        accession: &str,
        options: &GrabOptions,
        sink: &dyn ProgressSink,
    ) -> Result<GrabItem, GrabError> {
        if !options.force {
            if let Some(found) = options.outdir.find_run_output(accession) {
                tracing::info!(
                    "found file: {found} matching {accession}, skipping download. Pass -f to force download"
                );
                return Ok(GrabItem {
                    repository: Repository::Sra,
                    accession: accession.to_string(),
                    action: Action::Skipped,
                    layout: None,
                    existing: options.outdir.check_existing(accession),
                    files: vec![found],
                });
            }
        }

        let start = Instant::now();
        let files = options.retry.run(&format!("SRA download for {accession}"), |_| {
            self.dumper.dump(accession, &options.outdir)
        })?;
        sink.event(ProgressEvent {
            message: format!("phase=Store; {accession} extracted"),
            elapsed: Some(start.elapsed()),
        });
        let layout = match files.len() {
            1 => Some(Layout::Single),
            2 => Some(Layout::Paired),
            _ => None,
        };
        Ok(GrabItem {
            repository: Repository::Sra,
            accession: accession.to_string(),
            action: Action::Downloaded,
            layout,
            existing: None,
            files: files.iter().map(|path| path.display().to_string()).collect(),
        })
    }

    /// Downloads every read file of a sample, normalizes it to FASTQ and
    /// compresses it, unless the sample is only listed or already present.
    fn materialize<F>(
        &self,
        repository: Repository,
        accession: &str,
        layout: Layout,
        options: &GrabOptions,
        sink: &dyn ProgressSink,
        download: F,
    ) -> Result<GrabItem, GrabError>
    where
        F: Fn(usize, &Path) -> Result<(), GrabError>,
    {
        if options.list_only {
            return Ok(listed(repository, accession, layout));
        }
        if !options.force {
            if let Some(existing) = options.outdir.check_existing(accession) {
                if options.outdir.has_all(accession, layout) {
                    tracing::info!(
                        "found existing file matching acc: {accession}, skipping download. Pass -f to force download"
                    );
                    return Ok(GrabItem {
                        repository,
                        accession: accession.to_string(),
                        action: Action::Skipped,
                        layout: Some(layout),
                        existing: Some(existing),
                        files: Vec::new(),
                    });
                }
                tracing::warn!(
                    "found incomplete {layout} download for {accession}, downloading again"
                );
            }
        }

        let raw_paths = options.outdir.build_paths(accession, layout, ".download");
        let fastq_paths = options.outdir.build_paths(accession, layout, ".fastq");
        let mut files: Vec<PathBuf> = Vec::new();
        for (index, (raw, fastq)) in raw_paths.iter().zip(&fastq_paths).enumerate() {
            sink.event(progress(format!(
                "phase=Download; {accession} from {repository} ({}/{})",
                index + 1,
                raw_paths.len()
            )));
            let fetched = self.fetch_file(
                accession,
                raw.as_std_path(),
                fastq.as_std_path(),
                options,
                sink,
                |destination| download(index, destination),
            );
            match fetched {
                Ok(path) => files.push(path),
                Err(err) => {
                    // a sample is kept whole or not at all
                    for done in &files {
                        remove_quietly(done);
                    }
                    remove_quietly(raw.as_std_path());
                    remove_quietly(fastq.as_std_path());
                    remove_quietly(&gz_path(fastq.as_std_path()));
                    return Err(err);
                }
            }
        }

        Ok(GrabItem {
            repository,
            accession: accession.to_string(),
            action: Action::Downloaded,
            layout: Some(layout),
            existing: None,
            files: files.iter().map(|path| path.display().to_string()).collect(),
        })
    }

    /// Downloads one read file with retries and leaves it as `<fastq>.gz`.
    fn fetch_file<F>(
        &self,
        accession: &str,
        raw: &Path,
        fastq: &Path,
        options: &GrabOptions,
        sink: &dyn ProgressSink,
        download: F,
    ) -> Result<PathBuf, GrabError>
    where
        F: Fn(&Path) -> Result<(), GrabError>,
    {
        let start = Instant::now();
        let normalized = options
            .retry
            .run(&format!("download for {accession}"), |_| {
                download(raw)?;
                normalize_download(raw, fastq, accession)
            })?;
        let compressed = match normalized {
            Normalized::Compressed(path) => path,
            Normalized::Plain(path) => {
                sink.event(progress(format!("phase=Compress; {}", path.display())));
                self.compressor.compress(&path)?
            }
        };
        sink.event(ProgressEvent {
            message: format!("phase=Store; {}", compressed.display()),
            elapsed: Some(start.elapsed()),
        });
        Ok(compressed)
    }
}

/// Per-invocation accumulator for items and the aggregated metadata table.
struct Run {
    repository: Repository,
    started_at: String,
    items: Vec<GrabItem>,
    table: MetadataTable,
}

impl Run {
    fn start(repository: Repository, options: &GrabOptions) -> Result<Self, GrabError> {
        if !options.list_only || options.metadata {
            options.outdir.ensure()?;
        }
        Ok(Self {
            repository,
            started_at: Utc::now().to_rfc3339(),
            items: Vec::new(),
            table: MetadataTable::new(),
        })
    }

    fn finish(self, options: &GrabOptions, sink: &dyn ProgressSink) -> Result<GrabResult, GrabError> {
        let mut metadata_path = None;
        if options.metadata && !self.table.is_empty() {
            let name = options
                .metadata_name
                .clone()
                .unwrap_or_else(|| self.repository.default_metadata_name());
            let path = options.outdir.metadata_table_path(&name);
            sink.event(progress(format!("phase=Metadata; writing {path}")));
            self.table.save(&path)?;
            metadata_path = Some(path.to_string());
        }
        Ok(GrabResult {
            repository: self.repository,
            started_at: self.started_at,
            list_only: options.list_only,
            items: self.items,
            metadata_path,
        })
    }
}

fn listed(repository: Repository, accession: &str, layout: Layout) -> GrabItem {
    GrabItem {
        repository,
        accession: accession.to_string(),
        action: Action::Listed,
        layout: Some(layout),
        existing: None,
        files: layout.output_names(accession),
    }
}

fn save_raw_json(
    outdir: &OutputDir,
    name: &str,
    value: &serde_json::Value,
) -> Result<(), GrabError> {
    let path = outdir.path(&format!("{name}.json"));
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|err| GrabError::Metadata(err.to_string()))?;
    OutputDir::write_bytes_atomic(&path, &bytes)
}

fn remove_quietly(path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
}

fn progress(message: String) -> ProgressEvent {
    ProgressEvent {
        message,
        elapsed: None,
    }
}

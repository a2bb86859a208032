use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::domain::Layout;
use crate::error::GrabError;
use crate::http::Http;
use crate::metadata::MetadataTable;

/// File-type labels iMicrobe uses for read files, in order of preference.
pub const READ_FILE_TYPES: [&str; 3] = ["Reads", "Reads FASTQ", "upload.fastq"];

pub trait ImicrobeClient: Send + Sync {
    fn project(&self, id: u64) -> Result<Value, GrabError>;
    fn sample(&self, id: u64) -> Result<Value, GrabError>;
    fn download(&self, url: &str, destination: &Path) -> Result<(), GrabError>;
    /// Public URL for a data-store path listed in a sample record.
    fn file_url(&self, path: &str) -> String;
}

#[derive(Clone)]
pub struct ImicrobeHttpClient {
    http: Http,
    base_url: String,
    data_url: String,
}

impl ImicrobeHttpClient {
    pub fn new(base_url: &str, data_url: &str) -> Result<Self, GrabError> {
        let http = Http::new(
            Duration::from_secs(600),
            GrabError::ImicrobeHttp,
            |status, message| GrabError::ImicrobeStatus { status, message },
        )?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            data_url: data_url.to_string(),
        })
    }
}

impl ImicrobeClient for ImicrobeHttpClient {
    fn project(&self, id: u64) -> Result<Value, GrabError> {
        self.http.get_json(&format!("{}/projects/{id}", self.base_url))
    }

    fn sample(&self, id: u64) -> Result<Value, GrabError> {
        self.http.get_json(&format!("{}/samples/{id}", self.base_url))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<(), GrabError> {
        self.http.download_to(url, destination).map(|_| ())
    }

    fn file_url(&self, path: &str) -> String {
        data_store_url(&self.data_url, path)
    }
}

pub fn data_store_url(data_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", data_url, path.trim_start_matches('/'))
}

pub fn sample_page(id: u64) -> String {
    format!("https://www.imicrobe.us/#/samples/{id}")
}

/// Sample ids (without prefix) belonging to a project record.
pub fn project_samples(project: &Value) -> Result<Vec<u64>, GrabError> {
    let samples = project
        .get("samples")
        .and_then(Value::as_array)
        .ok_or_else(|| unexpected("project record has no samples"))?;
    samples
        .iter()
        .map(|sample| {
            let id = sample.get("sample_id").unwrap_or(&Value::Null);
            id.as_u64()
                .or_else(|| id.as_str().and_then(|text| text.parse().ok()))
                .ok_or_else(|| unexpected("sample without a sample_id"))
        })
        .collect()
}

/// Read file paths of a sample record. The first file-type label with any
/// hits wins; paths are sorted so R1 precedes R2.
pub fn read_files(sample: &Value) -> Vec<String> {
    let files = sample
        .get("sample_files")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for label in READ_FILE_TYPES {
        let mut hits = files
            .iter()
            .filter(|file| {
                file.pointer("/sample_file_type/type")
                    .and_then(Value::as_str)
                    .map(|value| value == label)
                    .unwrap_or(false)
            })
            .filter_map(|file| file.get("file").and_then(Value::as_str))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !hits.is_empty() {
            hits.sort();
            return hits;
        }
    }
    Vec::new()
}

pub fn sample_layout(accession: &str, files: &[String]) -> Result<Layout, GrabError> {
    Layout::from_file_count(accession, files.len())
}

pub fn sample_metadata_table(accession: &str, sample: &Value) -> MetadataTable {
    let mut row = vec![("sample_acc".to_string(), accession.to_string())];
    for key in ["sample_name", "sample_type", "sample_description"] {
        if let Some(value) = sample.get(key).and_then(text) {
            row.push((key.to_string(), value));
        }
    }
    if let Some(value) = sample.pointer("/project/project_name").and_then(text) {
        row.push(("project_name".to_string(), value));
    }
    if let Some(attrs) = sample.get("sample_attrs").and_then(Value::as_array) {
        for attr in attrs {
            let name = attr
                .pointer("/sample_attr_type/type_")
                .or_else(|| attr.pointer("/sample_attr_type/type"))
                .and_then(Value::as_str);
            let value = attr.get("attr_value").and_then(text);
            if let (Some(name), Some(value)) = (name, value) {
                if !row.iter().any(|(existing, _)| existing == name) {
                    row.push((name.to_string(), value));
                }
            }
        }
    }
    MetadataTable::from_records([row])
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn unexpected(message: &str) -> GrabError {
    GrabError::UnexpectedResponse {
        repository: "iMicrobe",
        message: message.to_string(),
    }
}

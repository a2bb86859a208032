use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::error::GrabError;
use crate::http::Http;
use crate::metadata::MetadataTable;

/// Upload stages holding the original reads: R1 and, if paired, R2.
pub const READ_STAGES: [&str; 2] = ["050.1", "050.2"];

pub trait MgRastClient: Send + Sync {
    fn project_metadata(&self, project: &str) -> Result<Value, GrabError>;
    fn download_listing(&self, metagenome: &str) -> Result<Value, GrabError>;
    fn download_stage(
        &self,
        metagenome: &str,
        stage: &str,
        destination: &Path,
    ) -> Result<(), GrabError>;
}

#[derive(Clone)]
pub struct MgRastHttpClient {
    http: Http,
    base_url: String,
}

impl MgRastHttpClient {
    pub fn new(base_url: &str) -> Result<Self, GrabError> {
        let http = Http::new(
            Duration::from_secs(600),
            GrabError::MgRastHttp,
            |status, message| GrabError::MgRastStatus { status, message },
        )?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
        })
    }

    pub fn stage_url(&self, metagenome: &str, stage: &str) -> String {
        format!("{}/download/{metagenome}?file={stage}", self.base_url)
    }
}

impl MgRastClient for MgRastHttpClient {
    fn project_metadata(&self, project: &str) -> Result<Value, GrabError> {
        self.http
            .get_json(&format!("{}/metadata/export/{project}", self.base_url))
    }

    fn download_listing(&self, metagenome: &str) -> Result<Value, GrabError> {
        self.http
            .get_json(&format!("{}/download/{metagenome}", self.base_url))
    }

    fn download_stage(
        &self,
        metagenome: &str,
        stage: &str,
        destination: &Path,
    ) -> Result<(), GrabError> {
        self.http
            .download_to(&self.stage_url(metagenome, stage), destination)
            .map(|_| ())
    }
}

/// Metagenome ids of every sample in a project export.
pub fn project_samples(export: &Value) -> Result<Vec<String>, GrabError> {
    let samples = export
        .get("samples")
        .and_then(Value::as_array)
        .ok_or_else(|| unexpected("project export has no samples"))?;
    samples
        .iter()
        .map(|sample| {
            sample
                .pointer("/libraries/0/data/metagenome_id/value")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| unexpected("sample without a metagenome id"))
        })
        .collect()
}

/// One row per sample: sample fields, then library and environmental
/// package fields not already present.
pub fn project_metadata_table(project: &str, export: &Value) -> MetadataTable {
    let samples = export
        .get("samples")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let rows = samples.iter().map(|sample| {
        let mut row: Vec<(String, String)> = vec![("project_id".to_string(), project.to_string())];
        if let Some(id) = sample
            .pointer("/libraries/0/data/metagenome_id/value")
            .and_then(Value::as_str)
        {
            row.push(("metagenome_id".to_string(), id.to_string()));
        }
        for key in ["id", "name"] {
            if let Some(value) = sample.get(key) {
                row.push((format!("sample_{key}"), cell(value)));
            }
        }
        for section in ["/data", "/libraries/0/data", "/envPackage/data"] {
            let Some(fields) = sample.pointer(section).and_then(Value::as_object) else {
                continue;
            };
            for (key, field) in fields {
                if row.iter().any(|(existing, _)| existing == key) {
                    continue;
                }
                let value = field.get("value").unwrap_or(field);
                row.push((key.clone(), cell(value)));
            }
        }
        row
    });
    MetadataTable::from_records(rows)
}

/// Read stages available for a metagenome, sorted so R1 precedes R2.
pub fn read_stages(listing: &Value) -> Vec<String> {
    let mut stages = listing
        .get("data")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("file_id").and_then(Value::as_str))
                .filter(|file_id| READ_STAGES.contains(file_id))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    stages.sort();
    stages.dedup();
    stages
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn unexpected(message: &str) -> GrabError {
    GrabError::UnexpectedResponse {
        repository: "MG-RAST",
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn export() -> Value {
        json!({
            "id": "mgp85479",
            "samples": [
                {
                    "id": "mgs1",
                    "name": "gut A",
                    "data": {"biome": {"value": "human gut"}, "depth": {"value": 0}},
                    "libraries": [{"data": {
                        "metagenome_id": {"value": "mgm4793571.3"},
                        "seq_meth": {"value": "illumina"}
                    }}]
                },
                {
                    "id": "mgs2",
                    "data": {"biome": {"value": "soil"}},
                    "libraries": [{"data": {"metagenome_id": {"value": "mgm4793572.3"}}}],
                    "envPackage": {"data": {"ph": {"value": "6.5"}}}
                }
            ]
        })
    }

    #[test]
    fn samples_from_export() {
        let samples = project_samples(&export()).unwrap();
        assert_eq!(samples, vec!["mgm4793571.3", "mgm4793572.3"]);
    }

    #[test]
    fn metadata_rows_union_fields() {
        let table = project_metadata_table("mgp85479", &export());
        assert_eq!(table.len(), 2);
        assert_eq!(table.column("biome").unwrap(), vec!["human gut", "soil"]);
        assert_eq!(table.column("depth").unwrap(), vec!["0", ""]);
        assert_eq!(table.column("ph").unwrap(), vec!["", "6.5"]);
        assert_eq!(
            table.column("project_id").unwrap(),
            vec!["mgp85479", "mgp85479"]
        );
    }

    #[test]
    fn stages_are_filtered_and_sorted() {
        let listing = json!({"data": [
            {"file_id": "050.2"},
            {"file_id": "100.1"},
            {"file_id": "050.1"}
        ]});
        assert_eq!(read_stages(&listing), vec!["050.1", "050.2"]);
        assert!(read_stages(&json!({"data": []})).is_empty());
    }
}

use std::path::PathBuf;
use std::time::Duration;

use assert_matches::assert_matches;

use grabseqs::config::{ConfigLoader, DEFAULT_IMICROBE_DATA_URL, DEFAULT_SRA_BASE_URL};
use grabseqs::error::GrabError;

#[test]
fn explicit_config_must_exist() {
    let temp = tempfile::tempdir().unwrap();
    let missing = temp.path().join("nope.json");
    let err = ConfigLoader::resolve(Some(&missing)).unwrap_err();
    assert_matches!(err, GrabError::MissingConfig(path) if path == missing);
}

#[test]
fn explicit_config_is_loaded() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("grabseqs.json");
    std::fs::write(
        &path,
        r#"{
            "retries": 5,
            "retry_delay_secs": 0,
            "threads": 8,
            "outdir": "reads",
            "tools": {"fasterq_dump": "/opt/sra/bin/fasterq-dump"},
            "endpoints": {"imicrobe": "http://localhost:8080/api/v1/"}
        }"#,
    )
    .unwrap();

    let settings = ConfigLoader::resolve(Some(&path)).unwrap();
    assert_eq!(settings.retries, Some(5));
    assert_eq!(settings.retry_delay, Duration::ZERO);
    assert_eq!(settings.threads, 8);
    assert_eq!(settings.outdir, "reads");
    assert_eq!(
        settings.tools.fasterq_dump,
        Some(PathBuf::from("/opt/sra/bin/fasterq-dump"))
    );
    assert_eq!(settings.tools.pigz, None);
    assert_eq!(settings.endpoints.imicrobe, "http://localhost:8080/api/v1");
    assert_eq!(settings.endpoints.sra, DEFAULT_SRA_BASE_URL);
    assert_eq!(settings.endpoints.imicrobe_data, DEFAULT_IMICROBE_DATA_URL);
}

#[test]
fn malformed_config_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("grabseqs.json");
    std::fs::write(&path, "{\"threads\": \"many\"}").unwrap();
    let err = ConfigLoader::resolve(Some(&path)).unwrap_err();
    assert_matches!(err, GrabError::ConfigParse(_));
}

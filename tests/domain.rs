use assert_matches::assert_matches;

use grabseqs::domain::{ImicrobeAccession, Layout, MgRastAccession, Repository, SraQuery};
use grabseqs::error::GrabError;

#[test]
fn sra_queries() {
    let run: SraQuery = " err1234 ".parse().unwrap();
    assert_eq!(run.as_str(), "ERR1234");
    assert!(run.is_run());

    let project: SraQuery = "PRJNA388263".parse().unwrap();
    assert!(!project.is_run());

    assert_matches!(
        "".parse::<SraQuery>(),
        Err(GrabError::InvalidAccession { repository: "SRA", .. })
    );
    assert_matches!(
        "SRR1 SRR2".parse::<SraQuery>(),
        Err(GrabError::InvalidAccession { .. })
    );
}

#[test]
fn mgrast_accessions() {
    assert_eq!(
        "mgp2592".parse::<MgRastAccession>().unwrap(),
        MgRastAccession::Project("mgp2592".to_string())
    );
    assert_eq!(
        "mgm4793571.3".parse::<MgRastAccession>().unwrap().as_str(),
        "mgm4793571.3"
    );
    let err = "mgx1".parse::<MgRastAccession>().unwrap_err();
    assert_matches!(
        err,
        GrabError::InvalidAccession { repository: "MG-RAST", hint: Some(hint), .. }
            if hint.contains("'mgx'")
    );
}

#[test]
fn imicrobe_accessions() {
    assert_eq!(
        "P1".parse::<ImicrobeAccession>().unwrap(),
        ImicrobeAccession::Project(1)
    );
    let sample = "s6397".parse::<ImicrobeAccession>().unwrap();
    assert_eq!(sample, ImicrobeAccession::Sample(6397));
    assert_eq!(sample.to_string(), "s6397");
    assert_matches!(
        "x12".parse::<ImicrobeAccession>(),
        Err(GrabError::InvalidAccession { repository: "iMicrobe", .. })
    );
    assert_matches!(
        "s".parse::<ImicrobeAccession>(),
        Err(GrabError::InvalidAccession { .. })
    );
}

#[test]
fn layouts() {
    assert_eq!("PAIRED".parse::<Layout>().unwrap(), Layout::Paired);
    assert_eq!(Layout::Single.output_names("mgm1.3"), vec!["mgm1.3.fastq.gz"]);
    assert_matches!(
        Layout::from_file_count("s9", 3),
        Err(GrabError::TooManyReadFiles { count: 3, .. })
    );
}

#[test]
fn repository_names() {
    assert_eq!(Repository::Imicrobe.default_metadata_name(), "imicrobe_metadata");
    assert_eq!(Repository::MgRast.to_string(), "mgrast");
}

//! Changes the process working directory; kept in its own test binary.

#![cfg(unix)]

use rootjail::{Importer, ImporterOptions};
use std::fs;

const NO_JPATHS: &[&str] = &[];

#[test]
fn absolute_construction_survives_deleted_cwd() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("main.jsonnet"), "{ok: true}").unwrap();

    let doomed = tempfile::tempdir().unwrap();
    let doomed_path = doomed.path().to_path_buf();
    std::env::set_current_dir(&doomed_path).unwrap();
    drop(doomed);
    assert!(!doomed_path.exists());
    assert!(std::env::current_dir().is_err());

    let options = ImporterOptions::new().working_dir(root.path());
    let imp = Importer::new(root.path(), NO_JPATHS, options).unwrap();
    let found = imp.resolve("", "main.jsonnet").unwrap();
    assert_eq!(found.as_str(), Some("{ok: true}"));

    let err = Importer::new(root.path(), NO_JPATHS, ImporterOptions::new().working_dir("relative"))
        .unwrap_err();
    assert_eq!(err.code(), "CannotResolveAbsolutePath");

    std::env::set_current_dir(root.path()).unwrap();
}

use assert_fs::prelude::*;
use assert_fs::TempDir;
use rootjail::{DynImporter, FileImporter, ImportError, Importer, ImporterOptions};
use std::sync::Arc;

fn s(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

struct Fixture {
    root: TempDir,
    cwd: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        root.child("lib").create_dir_all().unwrap();
        root.child("main.jsonnet").write_str("local util = import 'lib/util.jsonnet'; util").unwrap();
        root.child("lib/util.jsonnet").write_str("{y:2}").unwrap();
        Self { root, cwd: TempDir::new().unwrap() }
    }

    fn importer(&self) -> Importer {
        let lib = s(self.root.child("lib").path());
        Importer::new(self.root.path(), &[lib], ImporterOptions::new().working_dir(self.cwd.path())).unwrap()
    }
}

#[test]
fn entrypoint_then_nested_library_import() {
    let fx = Fixture::new();
    let imp = fx.importer();

    let main = imp.resolve("", &s(fx.root.child("main.jsonnet").path())).unwrap();
    assert_eq!(main.found_at, fx.root.child("main.jsonnet").path());

    let util = imp.resolve(&s(&main.found_at), "lib/util.jsonnet").unwrap();
    assert_eq!(util.as_str(), Some("{y:2}"));

    let via_jpath = imp.resolve(&s(&main.found_at), "util.jsonnet").unwrap();
    assert_eq!(via_jpath.found_at, fx.root.child("lib/util.jsonnet").path());
    imp.close().unwrap();
}

#[test]
fn misaligned_entrypoint_falls_back_to_library() {
    let fx = Fixture::new();
    let imp = fx.importer();
    let found = imp.resolve("", "util.jsonnet").unwrap();
    assert_eq!(found.as_str(), Some("{y:2}"));
}

#[test]
fn forbidden_is_distinguishable_from_missing() {
    let fx = Fixture::new();
    let outside = TempDir::new().unwrap();
    outside.child("secret.jsonnet").write_str("{secret: true}").unwrap();
    let imp = fx.importer();
    let main = s(fx.root.child("main.jsonnet").path());

    let forbidden = imp.resolve(&main, &s(outside.child("secret.jsonnet").path())).unwrap_err();
    assert!(matches!(forbidden, ImportError::ForbiddenAbsolutePath { .. }));

    let traversal = imp.resolve(&s(fx.root.child("lib/util.jsonnet").path()), "../../x.jsonnet").unwrap_err();
    assert!(matches!(traversal, ImportError::ForbiddenRelativePathTraversal { .. }));

    let missing = imp.resolve(&main, "nope.jsonnet").unwrap_err();
    assert!(matches!(missing, ImportError::FileNotFound { .. }));
    assert!(!missing.is_forbidden());
}

#[test]
fn shared_importer_across_threads() {
    let fx = Fixture::new();
    let target = s(fx.root.child("lib/util.jsonnet").path());
    let imp: DynImporter = Arc::new(fx.importer());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let imp = Arc::clone(&imp);
            let target = target.clone();
            std::thread::spawn(move || imp.resolve("", &target).unwrap())
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn trait_object_matches_inherent_resolve() {
    let fx = Fixture::new();
    let imp = fx.importer();
    let as_trait: &dyn FileImporter = &imp;
    let path = s(fx.root.child("main.jsonnet").path());
    assert_eq!(as_trait.resolve("", &path).unwrap(), imp.resolve("", &path).unwrap());
}

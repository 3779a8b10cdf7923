//! Seed scenario (f) and reload semantics.

use ember_catalog::{check_catalog, Catalog, CheckWarning};
use std::fs;
use tempfile::TempDir;

fn catalog_from(files: &[(&str, &str)]) -> (Catalog, TempDir) {
    let root = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(root.path().join(name), content).unwrap();
    }
    let mut catalog = Catalog::new(vec![root.path().to_path_buf()]);
    catalog.load_all();
    (catalog, root)
}

#[test]
fn check_config_reports_unknown_job_and_event() {
    let (catalog, _root) = catalog_from(&[(
        "x.conf",
        "start on (starting y and wibble)\nexec /bin/true\n",
    )]);

    let report = check_catalog(&catalog);
    assert_eq!(report.entries.len(), 1);
    let (class, warnings) = &report.entries[0];
    assert_eq!(class, "x");
    // Two lines: unknown job y, unknown event wibble
    let lines: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();
    assert_eq!(lines, vec!["unknown job y", "unknown event wibble"]);
}

#[test]
fn emits_declarations_satisfy_the_checker() {
    let (catalog, _root) = catalog_from(&[
        ("x.conf", "start on wibble\nexec /bin/true\n"),
        ("y.conf", "emits wibble\nexec /bin/true\n"),
    ]);
    assert!(check_catalog(&catalog).is_clean());
}

#[test]
fn reload_twice_without_changes_is_bit_identical() {
    let (mut catalog, _root) = catalog_from(&[
        ("a.conf", "exec a\n"),
        ("b.conf", "start on started a\nexec b\nkill timeout 9\n"),
    ]);

    let hashes = catalog.hashes();
    let classes: Vec<String> = catalog.classes().iter().map(|c| c.name.clone()).collect();

    catalog.load_all();
    catalog.load_all();

    assert_eq!(catalog.hashes(), hashes);
    assert_eq!(
        catalog
            .classes()
            .iter()
            .map(|c| c.name.clone())
            .collect::<Vec<_>>(),
        classes
    );
}

#[test]
fn check_warning_wording_matches_the_cli_contract() {
    assert_eq!(
        CheckWarning::UnknownJob { job: "y".into() }.to_string(),
        "unknown job y"
    );
    assert_eq!(
        CheckWarning::UnknownEvent {
            event: "wibble".into()
        }
        .to_string(),
        "unknown event wibble"
    );
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;
use tempfile::TempDir;

fn catalog_with(files: &[(&str, &str)]) -> Catalog {
    let root = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(root.path().join(name), content).unwrap();
    }
    let mut catalog = Catalog::new(vec![root.path().to_path_buf()]);
    let report = catalog.load_all();
    assert!(report.is_clean(), "{:?}", report.errors);
    // Leak the tempdir so files outlive this helper for the catalog's life
    std::mem::forget(root);
    catalog
}

#[test]
fn clean_catalog_produces_no_warnings() {
    let catalog = catalog_with(&[
        ("a.conf", "exec /bin/true\nemits wibble\n"),
        ("b.conf", "start on wibble\nexec /bin/true\n"),
    ]);
    assert!(check_catalog(&catalog).is_clean());
}

#[test]
fn unknown_job_and_event_are_both_reported() {
    let catalog = catalog_with(&[(
        "x.conf",
        "start on (starting y and wibble)\nexec /bin/true\n",
    )]);

    let report = check_catalog(&catalog);
    assert_eq!(report.entries.len(), 1);
    let (class, warnings) = &report.entries[0];
    assert_eq!(class, "x");
    assert_eq!(
        warnings,
        &vec![
            CheckWarning::UnknownJob { job: "y".into() },
            CheckWarning::UnknownEvent {
                event: "wibble".into()
            },
        ]
    );
}

#[test]
fn synthetic_events_are_well_known() {
    let catalog = catalog_with(&[
        ("a.conf", "exec /bin/true\n"),
        (
            "b.conf",
            "start on started a\nstop on stopping a\nexec /bin/true\n",
        ),
    ]);
    assert!(check_catalog(&catalog).is_clean());
}

#[test]
fn glob_operands_are_not_checked() {
    let catalog = catalog_with(&[(
        "a.conf",
        "start on net-* JOB=gl?b\nexec /bin/true\n",
    )]);
    // Both the event and the job matcher carry globs: unverifiable, no noise
    assert!(check_catalog(&catalog).is_clean());
}

#[test]
fn stop_on_expressions_are_checked_too() {
    let catalog = catalog_with(&[("a.conf", "stop on vanished\nexec /bin/true\n")]);
    let report = check_catalog(&catalog);
    assert_eq!(
        report.entries[0].1,
        vec![CheckWarning::UnknownEvent {
            event: "vanished".into()
        }]
    );
}

#[test]
fn duplicate_warnings_collapse() {
    let catalog = catalog_with(&[(
        "a.conf",
        "start on wibble or wibble\nexec /bin/true\n",
    )]);
    let report = check_catalog(&catalog);
    assert_eq!(report.entries[0].1.len(), 1);
}

#[test]
fn warning_display_matches_cli_wording() {
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

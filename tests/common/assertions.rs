//! Custom assertions for integration tests

use cfdi_dl::RunSummary;
use std::path::Path;

/// File names of the archives listed in a run summary
pub fn archive_names(summary: &RunSummary) -> Vec<String> {
    summary
        .archives
        .iter()
        .filter_map(|a| a.path.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

/// Assert that `dir` holds no leftover partial downloads
pub fn assert_no_partial_files(dir: &Path) {
    let leftovers: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect();
    assert!(leftovers.is_empty(), "partial files left behind: {leftovers:?}");
}

/// Assert that the counters of a summary match
pub fn assert_stats(summary: &RunSummary, requests: u64, packages: u64, documents: u64, errors: u64) {
    let stats = &summary.stats;
    assert_eq!(
        (
            stats.requests_sent,
            stats.packages_downloaded,
            stats.documents_extracted,
            stats.errors
        ),
        (requests, packages, documents, errors),
        "requests_sent, packages_downloaded, documents_extracted, errors"
    );
}

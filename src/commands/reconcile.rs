use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::ReconcileArgs;
use crate::commands::aggregate::{locate_image, subdirectories_sorted};
use crate::model::{ImageMetadataDocument, ReconcileCounts, ReconcileRunManifest};
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

pub fn run(args: ReconcileArgs) -> Result<()> {
    let started_ts = Utc::now();

    if !args.figures_root.is_dir() {
        bail!("figures root not found: {}", args.figures_root.display());
    }

    let metadata_path = args
        .metadata_path
        .clone()
        .unwrap_or_else(|| args.work_root.join("figure_metadata.json"));
    let mut document = load_metadata_document(&metadata_path)?;

    info!(
        figures_root = %args.figures_root.display(),
        records = document.records.len(),
        "starting reconcile"
    );

    let folders = subdirectories_sorted(&args.figures_root)?;
    let folder_names = folders
        .iter()
        .map(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(ToOwned::to_owned)
                .with_context(|| format!("invalid UTF-8 folder name: {}", path.display()))
        })
        .collect::<Result<Vec<String>>>()?;

    let mut counts = ReconcileCounts {
        records_total: document.records.len(),
        ..ReconcileCounts::default()
    };
    let mut warnings = Vec::new();
    let mut matched_folders = HashSet::new();

    for record in &mut document.records {
        let Some(matched) = match_folder(&record.folder_name, &folder_names) else {
            counts.records_unmatched += 1;
            continue;
        };

        if matched.candidate_count > 1 {
            counts.ambiguous_matches += 1;
            warnings.push(format!(
                "{}: {} prefix-match candidates, selected {}",
                record.folder_name, matched.candidate_count, matched.name
            ));
            warn!(
                record = %record.folder_name,
                selected = %matched.name,
                candidates = matched.candidate_count,
                "ambiguous folder match"
            );
        }

        matched_folders.insert(matched.name.clone());
        let folder_path = args.figures_root.join(&matched.name);

        let lookup = match locate_image(&folder_path) {
            Ok(lookup) => lookup,
            Err(error) => {
                warn!(folder = %matched.name, error = %error, "folder scan failed");
                warnings.push(format!("{}: folder scan failed: {error}", matched.name));
                counts.skipped_no_image += 1;
                continue;
            }
        };

        let Some(image_path) = lookup.path else {
            warn!(folder = %matched.name, "no image found in matched folder");
            counts.skipped_no_image += 1;
            continue;
        };

        let image_filename = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 image filename: {}", image_path.display()))?;
        let resolved_path = fs::canonicalize(&image_path).unwrap_or(image_path);
        let resolved = resolved_path.display().to_string();

        if record.image_path == resolved && record.image_filename == image_filename {
            counts.unchanged += 1;
            continue;
        }

        record.image_path = resolved;
        record.image_filename = image_filename;
        record.source_sha256 = match sha256_file(&resolved_path) {
            Ok(digest) => Some(digest),
            Err(error) => {
                warn!(folder = %matched.name, error = %error, "image hash unavailable");
                None
            }
        };
        counts.updated += 1;
    }

    counts.folders_unmatched = folder_names
        .iter()
        .filter(|name| !matched_folders.contains(*name))
        .count();

    document.generated_at = now_utc_string();
    document.source_root = args.figures_root.display().to_string();
    document.record_count = document.records.len();
    write_json_pretty(&metadata_path, &document)?;
    info!(path = %metadata_path.display(), "rewrote figure metadata document");

    let manifest = ReconcileRunManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        figures_root: args.figures_root.display().to_string(),
        metadata_path: metadata_path.display().to_string(),
        counts: counts.clone(),
        warnings,
    };
    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.work_root
            .join("manifests")
            .join(format!("reconcile_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        updated = counts.updated,
        unchanged = counts.unchanged,
        skipped_no_image = counts.skipped_no_image,
        records_unmatched = counts.records_unmatched,
        folders_unmatched = counts.folders_unmatched,
        "reconcile completed"
    );

    Ok(())
}

pub(crate) fn load_metadata_document(path: &Path) -> Result<ImageMetadataDocument> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    ImageMetadataDocument::parse(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))
}

struct FolderMatch {
    name: String,
    candidate_count: usize,
}

/// Exact folder-name equality wins outright. Otherwise prefix candidates
/// (either name a prefix of the other) are ranked longest-name-first with
/// lexicographic tie-break, so re-runs pick the same winner.
fn match_folder(folder_name: &str, folder_names: &[String]) -> Option<FolderMatch> {
    if folder_names.iter().any(|name| name == folder_name) {
        return Some(FolderMatch {
            name: folder_name.to_string(),
            candidate_count: 1,
        });
    }

    let mut candidates = folder_names
        .iter()
        .filter(|name| name.starts_with(folder_name) || folder_name.starts_with(name.as_str()))
        .collect::<Vec<&String>>();

    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    candidates.first().map(|name| FolderMatch {
        name: (*name).clone(),
        candidate_count: candidates.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::model::ImageRecord;

    fn record(folder_name: &str) -> ImageRecord {
        ImageRecord {
            folder_name: folder_name.to_string(),
            context_before: Vec::new(),
            caption: String::new(),
            context_after: Vec::new(),
            image_path: String::new(),
            image_filename: String::new(),
            source_sha256: None,
        }
    }

    #[test]
    fn match_folder_prefers_exact_over_prefix() {
        let names = vec!["FigA_old".to_string(), "FigA".to_string()];

        let matched = match_folder("FigA", &names).expect("match");
        assert_eq!(matched.name, "FigA");
        assert_eq!(matched.candidate_count, 1);
    }

    #[test]
    fn match_folder_prefix_candidates_ranked_deterministically() {
        let names = vec![
            "Fig".to_string(),
            "FigA_renamed".to_string(),
            "FigA_moved".to_string(),
        ];

        let matched = match_folder("FigA", &names).expect("match");
        assert_eq!(matched.name, "FigA_renamed");
        assert_eq!(matched.candidate_count, 3);
    }

    #[test]
    fn match_folder_returns_none_without_candidates() {
        let names = vec!["Unrelated".to_string()];
        assert!(match_folder("FigA", &names).is_none());
    }

    #[test]
    fn reconcile_rewrites_paths_and_second_run_is_idempotent() {
        let root = tempfile::tempdir().expect("tempdir");
        let figures = root.path().join("figures");
        let fig_a = figures.join("FigA");
        fs::create_dir_all(&fig_a).expect("mkdir");
        fs::write(fig_a.join("figure.png"), b"png-bytes").expect("write image");

        let work_root = root.path().join("work");
        let metadata_path = work_root.join("figure_metadata.json");
        let mut stale = record("FigA");
        stale.image_path = "/old/location/figure.png".to_string();
        stale.image_filename = "figure.png".to_string();
        let document = crate::model::ImageMetadataDocument {
            manifest_version: 1,
            generated_at: String::new(),
            source_root: "/old/location".to_string(),
            record_count: 1,
            records: vec![stale, record("FigGone")],
        };
        crate::util::write_json_pretty(&metadata_path, &document).expect("seed metadata");

        let args = crate::cli::ReconcileArgs {
            figures_root: figures.clone(),
            work_root: work_root.clone(),
            metadata_path: Some(metadata_path.clone()),
            manifest_path: Some(work_root.join("manifests").join("reconcile_run.json")),
        };

        run(args.clone()).expect("first reconcile");

        let reloaded = load_metadata_document(&metadata_path).expect("reload");
        assert_eq!(reloaded.records.len(), 2);
        assert!(reloaded.records[0].image_path.ends_with("figure.png"));
        assert_ne!(reloaded.records[0].image_path, "/old/location/figure.png");
        // records without a matching folder survive untouched
        assert_eq!(reloaded.records[1].folder_name, "FigGone");
        assert!(reloaded.records[1].image_path.is_empty());

        run(args).expect("second reconcile");
        let after_second = load_metadata_document(&metadata_path).expect("reload");
        assert_eq!(
            reloaded.records[0].image_path,
            after_second.records[0].image_path
        );
    }
}

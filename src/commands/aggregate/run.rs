use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::AggregateArgs;
use crate::model::{AggregateCounts, AggregateRunManifest, ImageMetadataDocument, ImageRecord};
use crate::util::{now_utc_string, sha256_file, utc_compact_string, write_json_pretty};

use super::context::parse_context_file;
use super::locate::locate_image;

pub fn run(args: AggregateArgs) -> Result<()> {
    let started_ts = Utc::now();

    if !args.figures_root.is_dir() {
        bail!("figures root not found: {}", args.figures_root.display());
    }

    info!(figures_root = %args.figures_root.display(), "starting aggregate");

    let mut counts = AggregateCounts::default();
    let mut warnings = Vec::new();
    let mut records = Vec::new();

    for folder in subdirectories_sorted(&args.figures_root)? {
        counts.folders_scanned += 1;

        let folder_name = folder
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 folder name: {}", folder.display()))?;

        let context_path = folder.join(&args.context_filename);
        let context = match parse_context_file(&context_path) {
            Ok(context) => context,
            Err(error) => {
                warn!(folder = %folder_name, error = %error, "skipping folder without readable context file");
                warnings.push(format!("{folder_name}: context file unavailable: {error}"));
                counts.skipped_missing_context += 1;
                continue;
            }
        };

        let lookup = match locate_image(&folder) {
            Ok(lookup) => lookup,
            Err(error) => {
                warn!(folder = %folder_name, error = %error, "skipping unreadable folder");
                warnings.push(format!("{folder_name}: folder scan failed: {error}"));
                counts.skipped_missing_image += 1;
                continue;
            }
        };

        if lookup.candidate_count > 1 {
            counts.multi_image_folders += 1;
            warnings.push(format!(
                "{folder_name}: {} image candidates, first after sort selected",
                lookup.candidate_count
            ));
        }

        let Some(image_path) = lookup.path else {
            warn!(folder = %folder_name, "skipping folder without an image");
            warnings.push(format!("{folder_name}: no png/jpg/jpeg image found"));
            counts.skipped_missing_image += 1;
            continue;
        };

        let image_filename = image_path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid UTF-8 image filename: {}", image_path.display()))?;

        let source_sha256 = match sha256_file(&image_path) {
            Ok(digest) => Some(digest),
            Err(error) => {
                warn!(folder = %folder_name, error = %error, "image hash unavailable");
                warnings.push(format!("{folder_name}: image hash unavailable: {error}"));
                None
            }
        };

        let resolved_path = fs::canonicalize(&image_path).unwrap_or(image_path);

        records.push(ImageRecord {
            folder_name,
            context_before: context.before,
            caption: context.caption,
            context_after: context.after,
            image_path: resolved_path.display().to_string(),
            image_filename,
            source_sha256,
        });
        counts.records_created += 1;
    }

    if args.dry_run {
        info!(
            folders_scanned = counts.folders_scanned,
            records = counts.records_created,
            "aggregate dry-run complete"
        );
        return Ok(());
    }

    let document = ImageMetadataDocument {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_root: args.figures_root.display().to_string(),
        record_count: records.len(),
        records,
    };

    let metadata_path = args
        .metadata_path
        .unwrap_or_else(|| args.work_root.join("figure_metadata.json"));
    write_json_pretty(&metadata_path, &document)?;
    info!(path = %metadata_path.display(), "wrote figure metadata document");

    let manifest = AggregateRunManifest {
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
            .join(format!("aggregate_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&manifest_path, &manifest)?;
    info!(path = %manifest_path.display(), "wrote aggregate run manifest");

    info!(
        folders_scanned = counts.folders_scanned,
        records_created = counts.records_created,
        skipped_missing_context = counts.skipped_missing_context,
        skipped_missing_image = counts.skipped_missing_image,
        multi_image_folders = counts.multi_image_folders,
        "aggregate completed"
    );

    Ok(())
}

pub(crate) fn subdirectories_sorted(root: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", root.display()))?;
        let path = entry.path();

        if entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_dir()
        {
            folders.push(path);
        }
    }

    folders.sort();
    Ok(folders)
}

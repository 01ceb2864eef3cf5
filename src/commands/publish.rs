use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::PublishArgs;
use crate::commands::aggregate::has_image_extension;
use crate::commands::reconcile::load_metadata_document;
use crate::model::{PublishCounts, PublishRunManifest, PublishedMapDocument};
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: PublishArgs) -> Result<()> {
    let started_ts = Utc::now();

    let metadata_path = args
        .metadata_path
        .clone()
        .unwrap_or_else(|| args.work_root.join("figure_metadata.json"));
    let document = load_metadata_document(&metadata_path)?;

    ensure_directory(&args.publish_dir)?;
    info!(
        publish_dir = %args.publish_dir.display(),
        records = document.records.len(),
        "starting publish"
    );

    let mut counts = PublishCounts {
        records_total: document.records.len(),
        ..PublishCounts::default()
    };
    let mut warnings = Vec::new();
    let mut entries = BTreeMap::new();
    let mut claimed = HashMap::<String, String>::new();

    for record in &document.records {
        let published_name = published_filename(&record.folder_name, &record.image_filename);

        // Collisions resolve last-write-wins; they are surfaced in the
        // summary rather than failing the run.
        if let Some(previous) = claimed.insert(published_name.clone(), record.folder_name.clone()) {
            counts.collisions += 1;
            warnings.push(format!(
                "{}: published name {published_name} overwrites output of {previous}",
                record.folder_name
            ));
            warn!(
                folder = %record.folder_name,
                previous = %previous,
                published = %published_name,
                "sanitized filename collision"
            );
        }

        let target = args.publish_dir.join(&published_name);
        if let Err(error) = fs::copy(Path::new(&record.image_path), &target)
            .with_context(|| format!("failed to copy {} to {}", record.image_path, target.display()))
        {
            counts.copy_failures += 1;
            warnings.push(format!("{}: {error:#}", record.folder_name));
            warn!(folder = %record.folder_name, error = %error, "image copy failed");
            continue;
        }

        entries.insert(record.folder_name.clone(), published_name);
        counts.published += 1;
    }

    let map_path = args
        .map_path
        .unwrap_or_else(|| args.work_root.join("published_map.json"));
    let map_document = PublishedMapDocument {
        manifest_version: 1,
        generated_at: now_utc_string(),
        publish_dir: args.publish_dir.display().to_string(),
        entry_count: entries.len(),
        entries,
    };
    write_json_pretty(&map_path, &map_document)?;
    info!(path = %map_path.display(), "wrote published filename map");

    let manifest = PublishRunManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        publish_dir: args.publish_dir.display().to_string(),
        map_path: map_path.display().to_string(),
        counts: counts.clone(),
        warnings,
    };
    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.work_root
            .join("manifests")
            .join(format!("publish_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        published = counts.published,
        copy_failures = counts.copy_failures,
        collisions = counts.collisions,
        "publish completed"
    );

    Ok(())
}

/// Sanitized target filename: folder-derived base plus the source image's
/// extension, both lowercased.
fn published_filename(folder_name: &str, image_filename: &str) -> String {
    let base = sanitize_base(strip_image_extension(folder_name));
    let extension = Path::new(image_filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    format!("{base}.{extension}")
}

fn strip_image_extension(folder_name: &str) -> &str {
    if !has_image_extension(folder_name) {
        return folder_name;
    }

    match folder_name.rfind('.') {
        Some(index) => &folder_name[..index],
        None => folder_name,
    }
}

/// Restricts a name to `[a-z0-9._-]`: every other character becomes `_`,
/// runs of `_` collapse, and edge underscores are trimmed. Applying this
/// twice yields the same result.
fn sanitize_base(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    let mut previous_underscore = false;

    for character in name.chars() {
        let mapped = if character.is_ascii_alphanumeric() || matches!(character, '.' | '-') {
            character.to_ascii_lowercase()
        } else {
            '_'
        };

        if mapped == '_' {
            if previous_underscore {
                continue;
            }
            previous_underscore = true;
        } else {
            previous_underscore = false;
        }

        sanitized.push(mapped);
    }

    sanitized.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn sanitize_base_restricts_character_set_and_collapses_runs() {
        assert_eq!(sanitize_base("Fig 1: A/B (v2)"), "fig_1_a_b_v2");
        assert_eq!(sanitize_base("already-safe_name.v1"), "already-safe_name.v1");
        assert_eq!(sanitize_base("___edges___"), "edges");
    }

    #[test]
    fn sanitize_base_is_idempotent() {
        let once = sanitize_base("Fig 1: A/B (v2)");
        assert_eq!(sanitize_base(&once), once);
    }

    #[test]
    fn published_filename_keeps_source_extension_lowercased() {
        assert_eq!(
            published_filename("Fig 1: A/B (v2).PNG", "shot.PNG"),
            "fig_1_a_b_v2.png"
        );
        assert_eq!(published_filename("FigA", "photo.JPeG"), "figa.jpeg");
    }

    #[test]
    fn strip_image_extension_only_removes_image_suffixes() {
        assert_eq!(strip_image_extension("diagram.png"), "diagram");
        assert_eq!(strip_image_extension("section 2.1"), "section 2.1");
        assert_eq!(strip_image_extension("plain"), "plain");
    }

    #[test]
    fn publish_copies_images_and_survives_missing_sources() {
        let root = tempfile::tempdir().expect("tempdir");
        let source = root.path().join("source.png");
        fs::write(&source, b"png-bytes").expect("write source");

        let records = vec![
            crate::model::ImageRecord {
                folder_name: "Fig One".to_string(),
                context_before: Vec::new(),
                caption: String::new(),
                context_after: Vec::new(),
                image_path: source.display().to_string(),
                image_filename: "source.png".to_string(),
                source_sha256: None,
            },
            crate::model::ImageRecord {
                folder_name: "Fig Two".to_string(),
                context_before: Vec::new(),
                caption: String::new(),
                context_after: Vec::new(),
                image_path: root.path().join("missing.png").display().to_string(),
                image_filename: "missing.png".to_string(),
                source_sha256: None,
            },
        ];
        let work_root = root.path().join("work");
        let metadata_path = work_root.join("figure_metadata.json");
        let document = crate::model::ImageMetadataDocument {
            manifest_version: 1,
            generated_at: String::new(),
            source_root: String::new(),
            record_count: records.len(),
            records,
        };
        crate::util::write_json_pretty(&metadata_path, &document).expect("seed metadata");

        let publish_dir = root.path().join("public");
        let map_path = work_root.join("published_map.json");
        let args = crate::cli::PublishArgs {
            work_root: work_root.clone(),
            metadata_path: Some(metadata_path),
            publish_dir: publish_dir.clone(),
            map_path: Some(map_path.clone()),
            manifest_path: Some(work_root.join("manifests").join("publish_run.json")),
        };

        run(args).expect("publish run");

        assert!(publish_dir.join("fig_one.png").is_file());
        assert!(!publish_dir.join("fig_two.png").exists());

        let raw = fs::read(&map_path).expect("read map");
        let map: crate::model::PublishedMapDocument =
            serde_json::from_slice(&raw).expect("parse map");
        assert_eq!(map.entry_count, 1);
        assert_eq!(map.entries.get("Fig One").map(String::as_str), Some("fig_one.png"));
    }
}

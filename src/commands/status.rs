use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::aggregate::has_image_extension;
use crate::model::{ContentDocument, ImageMetadataDocument, PublishedMapDocument};

pub fn run(args: StatusArgs) -> Result<()> {
    let metadata_path = args.work_root.join("figure_metadata.json");
    let map_path = args.work_root.join("published_map.json");
    let content_path = args.work_root.join("content.json");

    info!(work_root = %args.work_root.display(), "status requested");

    if metadata_path.exists() {
        let raw = fs::read(&metadata_path)
            .with_context(|| format!("failed to read {}", metadata_path.display()))?;
        let document = ImageMetadataDocument::parse(&raw)
            .with_context(|| format!("failed to parse {}", metadata_path.display()))?;

        let hashed = document
            .records
            .iter()
            .filter(|record| record.source_sha256.is_some())
            .count();
        info!(
            generated_at = %document.generated_at,
            source_root = %document.source_root,
            records = document.records.len(),
            hashed = hashed,
            "loaded figure metadata document"
        );
    } else {
        warn!(path = %metadata_path.display(), "figure metadata document missing");
    }

    if map_path.exists() {
        let raw = fs::read(&map_path)
            .with_context(|| format!("failed to read {}", map_path.display()))?;
        let map: PublishedMapDocument = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", map_path.display()))?;

        info!(
            generated_at = %map.generated_at,
            entries = map.entry_count,
            publish_dir = %map.publish_dir,
            "loaded published filename map"
        );
    } else {
        warn!(path = %map_path.display(), "published filename map missing");
    }

    if content_path.exists() {
        let raw = fs::read(&content_path)
            .with_context(|| format!("failed to read {}", content_path.display()))?;
        let document: ContentDocument = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", content_path.display()))?;

        for (key, section) in document.sections() {
            info!(
                section = key,
                title = %section.title,
                blocks = section.content.len(),
                "content section"
            );
        }
    } else {
        warn!(path = %content_path.display(), "content document missing");
    }

    if args.publish_dir.is_dir() {
        let published = fs::read_dir(&args.publish_dir)
            .with_context(|| format!("failed to read {}", args.publish_dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(has_image_extension)
                    .unwrap_or(false)
            })
            .count();

        info!(
            path = %args.publish_dir.display(),
            images = published,
            "published image directory"
        );
    } else {
        warn!(path = %args.publish_dir.display(), "published image directory missing");
    }

    Ok(())
}

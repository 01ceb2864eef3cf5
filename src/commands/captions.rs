use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use crate::cli::{CaptionMode, CaptionsArgs};
use crate::model::{
    CaptionCounts, CaptionMapping, CaptionsRunManifest, ContentBlock, ContentDocument,
};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

// Fixed contract with the image-extraction tooling.
const IMAGE_NAME_PATTERN: &str = r"(?i)page_(\d+)_img_(\d+)\.(?:png|jpe?g)$";

pub(crate) fn image_name_regex() -> Result<Regex> {
    Regex::new(IMAGE_NAME_PATTERN).context("failed to compile image filename regex")
}

pub(crate) fn decode_page_image(src: &str, pattern: &Regex) -> Option<(u64, u64)> {
    let captures = pattern.captures(src)?;
    let page = captures.get(1)?.as_str().parse::<u64>().ok()?;
    let index = captures.get(2)?.as_str().parse::<u64>().ok()?;
    Some((page, index))
}

pub(crate) fn derived_alt(page: u64, caption: &str) -> String {
    format!("Page {page} Image - {caption}")
}

/// Numeric-keyed view of the caption lookup table. Entries with
/// non-numeric keys are dropped with a warning, never fatal.
pub(crate) fn numeric_caption_lookup(
    mapping: &CaptionMapping,
) -> (BTreeMap<u64, BTreeMap<u64, String>>, usize) {
    let mut lookup = BTreeMap::<u64, BTreeMap<u64, String>>::new();
    let mut dropped = 0usize;

    for (page_key, images) in mapping {
        let Ok(page) = page_key.trim().parse::<u64>() else {
            warn!(page = %page_key, "dropping caption entry with non-numeric page key");
            dropped += 1;
            continue;
        };

        for (index_key, caption) in images {
            let Ok(index) = index_key.trim().parse::<u64>() else {
                warn!(
                    page = %page_key,
                    index = %index_key,
                    "dropping caption entry with non-numeric image index"
                );
                dropped += 1;
                continue;
            };
            lookup.entry(page).or_default().insert(index, caption.clone());
        }
    }

    (lookup, dropped)
}

pub fn run(args: CaptionsArgs) -> Result<()> {
    let started_ts = Utc::now();

    let mapping = load_caption_mapping(&args.captions_path)?;
    let (lookup, dropped_keys) = numeric_caption_lookup(&mapping);

    let content_path = args
        .content_path
        .clone()
        .unwrap_or_else(|| args.work_root.join("content.json"));
    let raw = fs::read(&content_path)
        .with_context(|| format!("failed to read {}", content_path.display()))?;
    let mut document: ContentDocument = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", content_path.display()))?;

    info!(
        mode = args.mode.as_str(),
        content = %content_path.display(),
        "starting caption reconciliation"
    );

    let pattern = image_name_regex()?;
    let mut counts = CaptionCounts::default();
    let mut warnings = Vec::new();
    if dropped_keys > 0 {
        warnings.push(format!("{dropped_keys} caption entries had non-numeric keys"));
    }
    let mut changed = false;

    for (section_key, section) in document.sections_mut() {
        for block in &mut section.content {
            let ContentBlock::Image { src, alt, caption } = block else {
                continue;
            };
            counts.image_blocks += 1;

            let Some((page, index)) = decode_page_image(src, &pattern) else {
                counts.undecodable += 1;
                warn!(section = section_key, src = %src, "image src does not decode to page/index");
                warnings.push(format!("{section_key}: undecodable image src {src}"));
                continue;
            };

            let Some(expected_caption) = lookup.get(&page).and_then(|images| images.get(&index))
            else {
                counts.missing_mapping += 1;
                warn!(section = section_key, page, index, "no caption mapping entry");
                continue;
            };

            let expected_alt = derived_alt(page, expected_caption);
            if *caption == *expected_caption && *alt == expected_alt {
                counts.matched += 1;
                continue;
            }

            counts.mismatched += 1;
            if args.mode == CaptionMode::Fix {
                *caption = expected_caption.clone();
                *alt = expected_alt;
                counts.fixed += 1;
                changed = true;
            }
        }
    }

    if args.mode == CaptionMode::Fix {
        if changed {
            write_json_pretty(&content_path, &document)?;
            info!(path = %content_path.display(), "rewrote content document");
        } else {
            info!("content document already consistent, nothing rewritten");
        }
    }

    let manifest = CaptionsRunManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        mode: args.mode.as_str().to_string(),
        content_path: content_path.display().to_string(),
        counts: counts.clone(),
        warnings,
    };
    let manifest_path = args.manifest_path.unwrap_or_else(|| {
        args.work_root
            .join("manifests")
            .join(format!("captions_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        image_blocks = counts.image_blocks,
        matched = counts.matched,
        mismatched = counts.mismatched,
        fixed = counts.fixed,
        undecodable = counts.undecodable,
        missing_mapping = counts.missing_mapping,
        "caption reconciliation completed"
    );

    Ok(())
}

pub(crate) fn load_caption_mapping(path: &Path) -> Result<CaptionMapping> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

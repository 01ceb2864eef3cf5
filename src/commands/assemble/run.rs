use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::cli::AssembleArgs;
use crate::commands::captions::{
    decode_page_image, derived_alt, image_name_regex, load_caption_mapping,
    numeric_caption_lookup,
};
use crate::model::{
    AssembleCounts, AssembleRunManifest, ContentBlock, ContentDocument, ContentSection,
    SectionPlan, SectionSpec,
};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

use super::clean::PageCleaner;

pub fn run(args: AssembleArgs) -> Result<()> {
    let started_ts = Utc::now();

    let raw = fs::read(&args.pages_path)
        .with_context(|| format!("failed to read {}", args.pages_path.display()))?;
    let pages: Vec<String> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse {}", args.pages_path.display()))?;

    let plan = load_section_plan(args.section_plan_path.as_deref())?;

    info!(
        pages = pages.len(),
        pages_path = %args.pages_path.display(),
        "starting assemble"
    );

    let cleaner = PageCleaner::new()?;
    let paragraphs = cleaner.clean_pages(&pages);

    let mut counts = AssembleCounts {
        pages_loaded: pages.len(),
        paragraphs_cleaned: paragraphs.len(),
        ..AssembleCounts::default()
    };
    let mut warnings = Vec::new();

    let mut section_images =
        collect_image_blocks(&args, &plan, &mut counts, &mut warnings)?;

    let mut build = |key: &'static str,
                     spec: &SectionSpec,
                     counts: &mut AssembleCounts,
                     warnings: &mut Vec<String>| {
        let section_paragraphs =
            cleaner.extract_section(&paragraphs, spec, args.min_paragraph_chars);
        if section_paragraphs.is_empty() {
            counts.empty_sections += 1;
            warnings.push(format!("{key}: no paragraphs between section markers"));
            warn!(section = key, "no paragraphs between section markers");
        }

        counts.text_blocks += section_paragraphs.len();
        let mut content = section_paragraphs
            .into_iter()
            .map(|value| ContentBlock::Text { value })
            .collect::<Vec<ContentBlock>>();
        content.extend(section_images.remove(key).unwrap_or_default());

        ContentSection {
            title: spec.title.clone(),
            content,
        }
    };

    let document = ContentDocument {
        introduction: build("introduction", &plan.introduction, &mut counts, &mut warnings),
        methodology: build("methodology", &plan.methodology, &mut counts, &mut warnings),
        results: build("results", &plan.results, &mut counts, &mut warnings),
        conclusions: build("conclusions", &plan.conclusions, &mut counts, &mut warnings),
    };

    let content_path = args
        .content_path
        .clone()
        .unwrap_or_else(|| args.work_root.join("content.json"));
    write_json_pretty(&content_path, &document)?;
    info!(path = %content_path.display(), "wrote content document");

    let manifest = AssembleRunManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        pages_path: args.pages_path.display().to_string(),
        content_path: content_path.display().to_string(),
        counts: counts.clone(),
        warnings,
    };
    let manifest_path = args.manifest_path.clone().unwrap_or_else(|| {
        args.work_root
            .join("manifests")
            .join(format!("assemble_run_{}.json", utc_compact_string(started_ts)))
    });
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        paragraphs = counts.paragraphs_cleaned,
        text_blocks = counts.text_blocks,
        image_blocks = counts.image_blocks,
        images_unassigned = counts.images_unassigned,
        empty_sections = counts.empty_sections,
        "assemble completed"
    );

    Ok(())
}

fn load_section_plan(path: Option<&Path>) -> Result<SectionPlan> {
    let Some(path) = path else {
        return Ok(default_section_plan());
    };

    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub(crate) fn default_section_plan() -> SectionPlan {
    SectionPlan {
        introduction: SectionSpec {
            title: "Introduction".to_string(),
            start_marker: "Introduction".to_string(),
            end_marker: "Methodology".to_string(),
            page_start: None,
            page_end: None,
        },
        methodology: SectionSpec {
            title: "Methodology".to_string(),
            start_marker: "Methodology".to_string(),
            end_marker: "Results".to_string(),
            page_start: None,
            page_end: None,
        },
        results: SectionSpec {
            title: "Results".to_string(),
            start_marker: "Results".to_string(),
            end_marker: "Conclusions".to_string(),
            page_start: None,
            page_end: None,
        },
        conclusions: SectionSpec {
            title: "Conclusions".to_string(),
            start_marker: "Conclusions".to_string(),
            end_marker: "References".to_string(),
            page_start: None,
            page_end: None,
        },
    }
}

/// Scans the extracted-image directory for `page_<N>_img_<M>` files and
/// builds image blocks per section, assigned by the plan's page ranges.
fn collect_image_blocks(
    args: &AssembleArgs,
    plan: &SectionPlan,
    counts: &mut AssembleCounts,
    warnings: &mut Vec<String>,
) -> Result<BTreeMap<&'static str, Vec<ContentBlock>>> {
    let mut section_images = BTreeMap::new();
    let Some(images_dir) = args.images_dir.as_deref() else {
        return Ok(section_images);
    };

    let lookup = match args.captions_path.as_deref() {
        Some(path) => Some(numeric_caption_lookup(&load_caption_mapping(path)?).0),
        None => None,
    };

    let pattern = image_name_regex()?;
    let entries = fs::read_dir(images_dir)
        .with_context(|| format!("failed to read {}", images_dir.display()))?;

    let mut decoded = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", images_dir.display()))?;
        let Some(filename) = entry.file_name().to_str().map(ToOwned::to_owned) else {
            continue;
        };
        if let Some((page, index)) = decode_page_image(&filename, &pattern) {
            decoded.push((page, index, filename));
        }
    }
    decoded.sort();

    for (page, index, filename) in decoded {
        let caption = lookup
            .as_ref()
            .and_then(|lookup| lookup.get(&page))
            .and_then(|images| images.get(&index))
            .cloned();
        // Placeholder metadata is repaired later by `captions --mode fix`.
        let (alt, caption) = match caption {
            Some(caption) => (derived_alt(page, &caption), caption),
            None => (format!("Page {page} Image {index}"), String::new()),
        };

        let Some(section_key) = section_for_page(plan, page) else {
            counts.images_unassigned += 1;
            warnings.push(format!("{filename}: page {page} outside all section page ranges"));
            warn!(file = %filename, page, "image page outside all section page ranges");
            continue;
        };

        counts.image_blocks += 1;
        section_images
            .entry(section_key)
            .or_insert_with(Vec::new)
            .push(ContentBlock::Image {
                src: format!("{}{filename}", args.src_prefix),
                alt,
                caption,
            });
    }

    Ok(section_images)
}

pub(crate) fn section_for_page(plan: &SectionPlan, page: u64) -> Option<&'static str> {
    plan.sections()
        .into_iter()
        .find(|(_, spec)| {
            if spec.page_start.is_none() && spec.page_end.is_none() {
                return false;
            }
            let after_start = spec
                .page_start
                .map(|start| page >= u64::from(start))
                .unwrap_or(true);
            let before_end = spec
                .page_end
                .map(|end| page <= u64::from(end))
                .unwrap_or(true);
            after_start && before_end
        })
        .map(|(key, _)| key)
}

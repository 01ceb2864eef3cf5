use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub(crate) struct ImageLookup {
    pub path: Option<PathBuf>,
    pub candidate_count: usize,
}

pub(crate) fn has_image_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Finds the figure image among a folder's immediate children. Candidates
/// are sorted by filename before selection; more than one is reportable.
pub(crate) fn locate_image(folder: &Path) -> Result<ImageLookup> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("failed to read {}", folder.display()))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to read entry in {}", folder.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_file()
        {
            continue;
        }

        let is_image = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(has_image_extension)
            .unwrap_or(false);

        if is_image {
            candidates.push(path);
        }
    }

    candidates.sort();

    if candidates.len() > 1 {
        warn!(
            folder = %folder.display(),
            candidates = candidates.len(),
            "multiple images in folder, selecting first after sort"
        );
    }

    Ok(ImageLookup {
        candidate_count: candidates.len(),
        path: candidates.into_iter().next(),
    })
}

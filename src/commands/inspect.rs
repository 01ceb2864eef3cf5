use std::fs::File;
use std::io::Read;

use anyhow::{Context, Result};
use tracing::{info, warn};
use zip::ZipArchive;

use crate::cli::InspectArgs;

/// Read-only diagnostic over a slide-deck archive: lists the inner entries
/// and prints truncated XML payload excerpts for manual inspection.
pub fn run(args: InspectArgs) -> Result<()> {
    let file = File::open(&args.archive_path)
        .with_context(|| format!("failed to open {}", args.archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("not a readable archive: {}", args.archive_path.display()))?;

    info!(
        archive = %args.archive_path.display(),
        entries = archive.len(),
        "opened slide-deck archive"
    );

    let names = archive
        .file_names()
        .map(ToOwned::to_owned)
        .collect::<Vec<String>>();

    for name in names {
        if !name.starts_with(&args.entry_prefix) {
            continue;
        }

        if args.list_only || !name.to_ascii_lowercase().ends_with(".xml") {
            info!(entry = %name, "archive entry");
            continue;
        }

        match read_entry_to_string(&mut archive, &name) {
            Ok(payload) => {
                let excerpt = truncate_chars(&payload, args.max_chars);
                info!(
                    entry = %name,
                    chars = payload.chars().count(),
                    excerpt = %excerpt,
                    "archive entry payload"
                );
            }
            Err(error) => {
                warn!(entry = %name, error = %error, "failed to read archive entry");
            }
        }
    }

    Ok(())
}

fn read_entry_to_string(archive: &mut ZipArchive<File>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("missing archive entry: {name}"))?;
    let mut buffer = String::new();
    entry
        .read_to_string(&mut buffer)
        .with_context(|| format!("failed to read archive entry: {name}"))?;
    Ok(buffer)
}

fn truncate_chars(payload: &str, max_chars: usize) -> String {
    if payload.chars().count() <= max_chars {
        return payload.to_string();
    }

    let mut truncated = payload.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_limits_long_payloads() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 4), "abcd...");
    }
}

use std::fs;

use super::*;
use super::context::parse_context_text;

#[test]
fn parse_context_text_splits_three_blocks_in_order() {
    let text = "Text Before\nThe network topology is shown below.\n\nIt uses three layers.\nFull Caption\nFigure 3.1: Network topology\nText After\nThe next section describes training.";
    let context = parse_context_text(text);

    assert_eq!(
        context.before,
        vec![
            "The network topology is shown below.".to_string(),
            "It uses three layers.".to_string(),
        ]
    );
    assert_eq!(context.caption, "Figure 3.1: Network topology");
    assert_eq!(
        context.after,
        vec!["The next section describes training.".to_string()]
    );
}

#[test]
fn parse_context_text_caption_is_first_nonempty_line_only() {
    let text = "Full Caption\n\nFigure 7: Results\nThis trailing line is not part of the caption.";
    let context = parse_context_text(text);

    assert_eq!(context.caption, "Figure 7: Results");
    assert!(context.before.is_empty());
    assert!(context.after.is_empty());
}

#[test]
fn parse_context_text_missing_delimiters_degrade_to_empty_fields() {
    let context = parse_context_text("just some prose with no delimiters at all");

    assert!(context.before.is_empty());
    assert_eq!(context.caption, "");
    assert!(context.after.is_empty());
}

#[test]
fn parse_context_text_accepts_trailing_colon_on_labels() {
    let text = "Text Before:\nlead-in line\nFull Caption:\nFigure 2\nText After:\ntrailing line";
    let context = parse_context_text(text);

    assert_eq!(context.before, vec!["lead-in line".to_string()]);
    assert_eq!(context.caption, "Figure 2");
    assert_eq!(context.after, vec!["trailing line".to_string()]);
}

#[test]
fn locate_image_selects_first_sorted_candidate() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("b_figure.PNG"), b"png-bytes").expect("write image");
    fs::write(dir.path().join("a_figure.jpg"), b"jpg-bytes").expect("write image");
    fs::write(dir.path().join("notes.txt"), b"not an image").expect("write text");

    let lookup = locate_image(dir.path()).expect("locate");

    assert_eq!(lookup.candidate_count, 2);
    let selected = lookup.path.expect("image found");
    assert_eq!(
        selected.file_name().and_then(|name| name.to_str()),
        Some("a_figure.jpg")
    );
}

#[test]
fn locate_image_returns_none_without_image_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("context.txt"), b"text only").expect("write text");

    let lookup = locate_image(dir.path()).expect("locate");

    assert_eq!(lookup.candidate_count, 0);
    assert!(lookup.path.is_none());
}

#[test]
fn aggregate_skips_folder_without_image() {
    let root = tempfile::tempdir().expect("tempdir");

    let fig_a = root.path().join("FigA");
    fs::create_dir(&fig_a).expect("mkdir");
    fs::write(fig_a.join("figure.png"), b"png-bytes").expect("write image");
    fs::write(
        fig_a.join("context.txt"),
        "Text Before\nbefore line\nFull Caption\nFigure A\nText After\nafter line",
    )
    .expect("write context");

    let fig_b = root.path().join("FigB");
    fs::create_dir(&fig_b).expect("mkdir");
    fs::write(fig_b.join("context.txt"), "Full Caption\nFigure B").expect("write context");

    let work_root = root.path().join("work");
    let metadata_path = work_root.join("figure_metadata.json");
    let args = crate::cli::AggregateArgs {
        figures_root: root.path().to_path_buf(),
        work_root: work_root.clone(),
        metadata_path: Some(metadata_path.clone()),
        manifest_path: Some(work_root.join("manifests").join("aggregate_run.json")),
        context_filename: "context.txt".to_string(),
        dry_run: false,
    };

    run(args).expect("aggregate run");

    let raw = fs::read(&metadata_path).expect("read metadata");
    let document = crate::model::ImageMetadataDocument::parse(&raw).expect("parse metadata");

    assert_eq!(document.record_count, 1);
    assert_eq!(document.records.len(), 1);
    assert_eq!(document.records[0].folder_name, "FigA");
    assert_eq!(document.records[0].caption, "Figure A");
    assert_eq!(document.records[0].image_filename, "figure.png");
    assert!(document.records[0].source_sha256.is_some());
}

#[test]
fn metadata_document_parse_accepts_bare_record_array() {
    let raw = br#"[
        {
            "folder_name": "FigA",
            "context_before": [],
            "caption": "Figure A",
            "context_after": [],
            "image_path": "/tmp/FigA/figure.png",
            "image_filename": "figure.png"
        }
    ]"#;

    let document = crate::model::ImageMetadataDocument::parse(raw).expect("parse bare array");

    assert_eq!(document.records.len(), 1);
    assert_eq!(document.records[0].folder_name, "FigA");
    assert!(document.records[0].source_sha256.is_none());
}

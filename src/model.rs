use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One source figure folder, resolved to its image and surrounding narrative.
/// `folder_name` is the identity key and is unique within a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRecord {
    pub folder_name: String,
    pub context_before: Vec<String>,
    pub caption: String,
    pub context_after: Vec<String>,
    pub image_path: String,
    pub image_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
}

/// Interchange document passed between pipeline stages. Written as an
/// envelope; older flat-array documents are still accepted on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadataDocument {
    #[serde(default)]
    pub manifest_version: u32,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub source_root: String,
    #[serde(default)]
    pub record_count: usize,
    pub records: Vec<ImageRecord>,
}

impl ImageMetadataDocument {
    pub fn parse(raw: &[u8]) -> serde_json::Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Interchange {
            Envelope(ImageMetadataDocument),
            Records(Vec<ImageRecord>),
        }

        match serde_json::from_slice(raw)? {
            Interchange::Envelope(document) => Ok(document),
            Interchange::Records(records) => Ok(ImageMetadataDocument {
                manifest_version: 0,
                generated_at: String::new(),
                source_root: String::new(),
                record_count: records.len(),
                records,
            }),
        }
    }
}

/// page number (numeric string) -> image index (numeric string) -> caption.
pub type CaptionMapping = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        value: String,
    },
    Image {
        src: String,
        alt: String,
        caption: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentSection {
    pub title: String,
    pub content: Vec<ContentBlock>,
}

/// The artifact the presentation layer renders. The section key set is
/// closed, so the sections are struct fields rather than an open map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentDocument {
    pub introduction: ContentSection,
    pub methodology: ContentSection,
    pub results: ContentSection,
    pub conclusions: ContentSection,
}

impl ContentDocument {
    pub fn sections(&self) -> [(&'static str, &ContentSection); 4] {
        [
            ("introduction", &self.introduction),
            ("methodology", &self.methodology),
            ("results", &self.results),
            ("conclusions", &self.conclusions),
        ]
    }

    pub fn sections_mut(&mut self) -> [(&'static str, &mut ContentSection); 4] {
        [
            ("introduction", &mut self.introduction),
            ("methodology", &mut self.methodology),
            ("results", &mut self.results),
            ("conclusions", &mut self.conclusions),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionSpec {
    pub title: String,
    pub start_marker: String,
    pub end_marker: String,
    #[serde(default)]
    pub page_start: Option<u32>,
    #[serde(default)]
    pub page_end: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionPlan {
    pub introduction: SectionSpec,
    pub methodology: SectionSpec,
    pub results: SectionSpec,
    pub conclusions: SectionSpec,
}

impl SectionPlan {
    pub fn sections(&self) -> [(&'static str, &SectionSpec); 4] {
        [
            ("introduction", &self.introduction),
            ("methodology", &self.methodology),
            ("results", &self.results),
            ("conclusions", &self.conclusions),
        ]
    }
}

/// folder_name -> published filename, for downstream reference substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedMapDocument {
    pub manifest_version: u32,
    pub generated_at: String,
    pub publish_dir: String,
    pub entry_count: usize,
    pub entries: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateCounts {
    pub folders_scanned: usize,
    pub records_created: usize,
    pub skipped_missing_context: usize,
    pub skipped_missing_image: usize,
    pub multi_image_folders: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateRunManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub figures_root: String,
    pub metadata_path: String,
    pub counts: AggregateCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileCounts {
    pub records_total: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_no_image: usize,
    pub records_unmatched: usize,
    pub folders_unmatched: usize,
    pub ambiguous_matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileRunManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub figures_root: String,
    pub metadata_path: String,
    pub counts: ReconcileCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishCounts {
    pub records_total: usize,
    pub published: usize,
    pub copy_failures: usize,
    pub collisions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishRunManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub publish_dir: String,
    pub map_path: String,
    pub counts: PublishCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembleCounts {
    pub pages_loaded: usize,
    pub paragraphs_cleaned: usize,
    pub text_blocks: usize,
    pub image_blocks: usize,
    pub images_unassigned: usize,
    pub empty_sections: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembleRunManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub pages_path: String,
    pub content_path: String,
    pub counts: AssembleCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CaptionCounts {
    pub image_blocks: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub fixed: usize,
    pub undecodable: usize,
    pub missing_mapping: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptionsRunManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub mode: String,
    pub content_path: String,
    pub counts: CaptionCounts,
    pub warnings: Vec<String>,
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "thesispub",
    version,
    about = "Thesis figure and content extraction pipeline"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Aggregate(AggregateArgs),
    Reconcile(ReconcileArgs),
    Publish(PublishArgs),
    Assemble(AssembleArgs),
    Captions(CaptionsArgs),
    Status(StatusArgs),
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    #[arg(long)]
    pub figures_root: PathBuf,

    #[arg(long, default_value = ".cache/thesispub")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub metadata_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long, default_value = "context.txt")]
    pub context_filename: String,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReconcileArgs {
    #[arg(long)]
    pub figures_root: PathBuf,

    #[arg(long, default_value = ".cache/thesispub")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub metadata_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    #[arg(long, default_value = ".cache/thesispub")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub metadata_path: Option<PathBuf>,

    #[arg(long, default_value = "public/images")]
    pub publish_dir: PathBuf,

    #[arg(long)]
    pub map_path: Option<PathBuf>,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct AssembleArgs {
    #[arg(long)]
    pub pages_path: PathBuf,

    #[arg(long, default_value = ".cache/thesispub")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub content_path: Option<PathBuf>,

    #[arg(long)]
    pub section_plan_path: Option<PathBuf>,

    #[arg(long)]
    pub images_dir: Option<PathBuf>,

    #[arg(long)]
    pub captions_path: Option<PathBuf>,

    #[arg(long, default_value = "/images/")]
    pub src_prefix: String,

    #[arg(long, default_value_t = 40)]
    pub min_paragraph_chars: usize,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CaptionMode {
    Verify,
    Fix,
}

impl CaptionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verify => "verify",
            Self::Fix => "fix",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct CaptionsArgs {
    #[arg(long)]
    pub captions_path: PathBuf,

    #[arg(long, default_value = ".cache/thesispub")]
    pub work_root: PathBuf,

    #[arg(long)]
    pub content_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = CaptionMode::Verify)]
    pub mode: CaptionMode,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = ".cache/thesispub")]
    pub work_root: PathBuf,

    #[arg(long, default_value = "public/images")]
    pub publish_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    #[arg(long)]
    pub archive_path: PathBuf,

    #[arg(long, default_value = "ppt/slides/")]
    pub entry_prefix: String,

    #[arg(long, default_value_t = 600)]
    pub max_chars: usize,

    #[arg(long, default_value_t = false)]
    pub list_only: bool,
}

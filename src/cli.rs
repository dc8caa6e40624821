use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::mindmap::LayoutKind;
use crate::mindmap::export::ExportFormat;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Counts of parts, chapters, sections, concepts and pages.
    Stats(CourseArgs),
    /// Case-insensitive search over titles, takeaways and section text.
    Search(SearchArgs),
    /// Navigation outline.
    Tree(TreeArgs),
    /// Mind-map nodes as JSON lines.
    Flatten(CourseArgs),
    /// Render one chapter, section or takeaway.
    Show(ShowArgs),
    Mindmap {
        #[command(subcommand)]
        command: MindmapCommand,
    },
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommand,
    },
    /// Share a chapter; falls back to copying it to the clipboard.
    Share(ShareArgs),
}

#[derive(Debug, Clone, Args)]
pub struct CourseArgs {
    /// Course document: a file path or an http(s) URL.
    #[arg(long)]
    pub course: String,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    /// Text to look for (at least two characters).
    pub query: String,

    /// Print results as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TreeArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    /// Expand every part, chapter and section.
    #[arg(long)]
    pub expand_all: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum PaneFormat {
    #[default]
    Markdown,
    Html,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    #[arg(long)]
    pub chapter: u32,

    /// Dotted section path within the chapter, e.g. `0.1`.
    #[arg(long, conflicts_with = "takeaway")]
    pub section: Option<String>,

    /// Zero-based key takeaway index.
    #[arg(long)]
    pub takeaway: Option<usize>,

    #[arg(long, value_enum, default_value_t = PaneFormat::Markdown)]
    pub format: PaneFormat,
}

#[derive(Debug, Subcommand)]
pub enum MindmapCommand {
    /// Write the mind map as SVG or PNG.
    Export(MindmapExportArgs),
}

#[derive(Debug, Args)]
pub struct MindmapExportArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    #[arg(long, value_enum, default_value_t = LayoutKind::Hierarchical)]
    pub layout: LayoutKind,

    #[arg(long, value_enum, default_value_t = ExportFormat::Svg)]
    pub format: ExportFormat,

    /// Expand every node before exporting.
    #[arg(long)]
    pub expand_all: bool,

    /// Node ids to expand, in order (e.g. `part-1,chapter-1`).
    #[arg(long, value_delimiter = ',')]
    pub expand: Vec<String>,

    /// Output file (default: `mindmap-<timestamp>.<ext>` in the current directory).
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Overwrite the output file if it exists.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Subcommand)]
pub enum BookmarkCommand {
    Add(BookmarkArgs),
    Remove(BookmarkArgs),
    List(BookmarkListArgs),
}

#[derive(Debug, Args)]
pub struct BookmarkArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    #[arg(long)]
    pub chapter: u32,

    /// Storage directory (default: COURSEMAP_DATA_DIR or `.coursemap`).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct BookmarkListArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    /// Storage directory (default: COURSEMAP_DATA_DIR or `.coursemap`).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ShareArgs {
    #[command(flatten)]
    pub course: CourseArgs,

    #[arg(long)]
    pub chapter: u32,

    /// Base URL the shared link points at.
    #[arg(long)]
    pub url: Option<String>,
}

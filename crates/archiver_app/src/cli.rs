//! Command line surface of `post-archiver`.

use std::path::PathBuf;

use archiver_core::{ImageQuality, OutputFormat};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use secrecy::SecretString;

/// Archive the posts of a blog into a local, verifiable directory.
#[derive(Parser, Debug)]
#[command(name = "post-archiver", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// RON settings file; command line flags take precedence over it.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Session cookie sent with every request (`name=value`).
    #[arg(long, global = true, env = "POST_ARCHIVER_COOKIE", hide_env_values = true)]
    pub cookie: Option<SecretString>,

    /// HTTP or SOCKS5 proxy URL.
    #[arg(short = 'x', long, global = true)]
    pub proxy: Option<String>,

    /// Maximum requests started per second.
    #[arg(short, long, global = true)]
    pub rate: Option<u32>,

    /// Only posts published on or after this day (YYYY-MM-DD).
    #[arg(long, global = true)]
    pub after: Option<String>,

    /// Only posts published on or before this day (YYYY-MM-DD).
    #[arg(long, global = true)]
    pub before: Option<String>,

    /// Stop after this many matching posts.
    #[arg(short, long, global = true)]
    pub limit: Option<usize>,

    /// Also write log output to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Debug level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the posts a download would consider.
    List(ListArgs),
    /// Archive posts, images and attachments.
    Download(DownloadArgs),
    /// Verify archived files against the manifest.
    Audit(AuditArgs),
    /// Print shell completions to stdout.
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Blog root URL, e.g. `https://example.blog`.
    #[arg(short, long)]
    pub url: String,
}

#[derive(Args, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DownloadArgs {
    /// Blog root URL, e.g. `https://example.blog`.
    #[arg(short, long)]
    pub url: String,

    /// Archive root directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Document format: html, md or txt.
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Show what would be archived without writing anything.
    #[arg(short, long)]
    pub dry_run: bool,

    /// Store referenced images locally and point documents at them.
    #[arg(long)]
    pub download_images: bool,

    /// Image directory, relative to the archive root.
    #[arg(long)]
    pub images_dir: Option<String>,

    /// Image variant to fetch: high, medium or low.
    #[arg(long)]
    pub image_quality: Option<ImageQuality>,

    /// Store linked attachments locally and point documents at them.
    #[arg(long)]
    pub download_files: bool,

    /// Attachment directory, relative to the archive root.
    #[arg(long)]
    pub files_dir: Option<String>,

    /// Comma separated attachment extensions to keep (e.g. `pdf,docx`).
    #[arg(long)]
    pub file_extensions: Option<String>,

    /// Append the post URL to each document.
    #[arg(long)]
    pub add_source_url: bool,

    /// Write an `index.html` listing the archived posts.
    #[arg(long)]
    pub create_archive: bool,

    /// Posts processed at the same time.
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Archive root holding `manifest.json`.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Manifest to verify; defaults to the one in the archive root.
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(long, default_value = "bash")]
    pub shell: Shell,
}

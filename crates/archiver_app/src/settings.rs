//! Optional RON settings file and its merge with command line flags.
//!
//! Precedence is flag, then file, then [`ArchiveConfig::default`]. The auth cookie
//! is only taken from the command line or the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use archive_logging::archive_info;
use archiver_core::{
    parse_extension_list, ArchiveConfig, ArchiveFlags, DateRange, ImageQuality, OutputFormat,
};
use serde::Deserialize;

use crate::cli::{DownloadArgs, GlobalArgs};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub rate: Option<u32>,
    pub proxy: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub limit: Option<usize>,
    pub download_images: Option<bool>,
    pub images_dir: Option<String>,
    pub image_quality: Option<ImageQuality>,
    pub download_files: Option<bool>,
    pub files_dir: Option<String>,
    pub file_extensions: Option<Vec<String>>,
    pub add_source_url: Option<bool>,
    pub create_archive: Option<bool>,
    pub concurrency: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
}

impl FileSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {path:?}"))?;
        let settings = ron::from_str(&content)
            .with_context(|| format!("failed to parse settings file {path:?}"))?;
        archive_info!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }
}

/// Build the run configuration from flags layered over the settings file.
///
/// `download` is `None` for commands that only list or audit; download-only
/// settings then come from the file alone.
pub fn resolve(
    global: &GlobalArgs,
    download: Option<&DownloadArgs>,
    file: FileSettings,
) -> Result<ArchiveConfig> {
    let defaults = ArchiveConfig::default();

    let after = global.after.as_deref().or(file.after.as_deref());
    let before = global.before.as_deref().or(file.before.as_deref());
    let date_range = DateRange::parse(after, before)?;

    let flag = |cli: bool, file: Option<bool>| cli || file.unwrap_or(false);
    let (flags, allowlist) = match download {
        Some(args) => (
            ArchiveFlags {
                download_images: flag(args.download_images, file.download_images),
                download_files: flag(args.download_files, file.download_files),
                add_source_url: flag(args.add_source_url, file.add_source_url),
                create_archive: flag(args.create_archive, file.create_archive),
                dry_run: args.dry_run,
            },
            args.file_extensions.as_deref().map(parse_extension_list),
        ),
        None => (
            ArchiveFlags {
                download_images: file.download_images.unwrap_or(false),
                download_files: file.download_files.unwrap_or(false),
                add_source_url: file.add_source_url.unwrap_or(false),
                create_archive: file.create_archive.unwrap_or(false),
                dry_run: false,
            },
            None,
        ),
    };
    let file_allowlist = file
        .file_extensions
        .map(|exts| parse_extension_list(&exts.join(",")));

    let config = ArchiveConfig {
        output_dir: download
            .and_then(|a| a.output.clone())
            .or(file.output)
            .unwrap_or(defaults.output_dir),
        format: download
            .and_then(|a| a.format)
            .or(file.format)
            .unwrap_or(defaults.format),
        rate_limit: global.rate.or(file.rate).unwrap_or(defaults.rate_limit),
        date_range,
        proxy: global.proxy.clone().or(file.proxy),
        auth_cookie: global.cookie.clone(),
        image_quality: download
            .and_then(|a| a.image_quality)
            .or(file.image_quality)
            .unwrap_or(defaults.image_quality),
        file_extension_allowlist: allowlist
            .or(file_allowlist)
            .unwrap_or(defaults.file_extension_allowlist),
        flags,
        post_limit: global.limit.or(file.limit),
        images_dir: download
            .and_then(|a| a.images_dir.clone())
            .or(file.images_dir)
            .unwrap_or(defaults.images_dir),
        files_dir: download
            .and_then(|a| a.files_dir.clone())
            .or(file.files_dir)
            .unwrap_or(defaults.files_dir),
        concurrency: download
            .and_then(|a| a.concurrency)
            .or(file.concurrency)
            .unwrap_or(defaults.concurrency),
        request_timeout: file
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
        max_attempts: file.max_attempts.unwrap_or(defaults.max_attempts),
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn download_args() -> DownloadArgs {
        DownloadArgs {
            url: "https://example.blog".to_string(),
            ..DownloadArgs::default()
        }
    }

    #[test]
    fn flags_override_the_file() {
        let file = FileSettings {
            rate: Some(9),
            format: Some(OutputFormat::Txt),
            download_images: Some(true),
            images_dir: Some("pics".to_string()),
            ..FileSettings::default()
        };
        let global = GlobalArgs {
            rate: Some(3),
            ..GlobalArgs::default()
        };
        let args = DownloadArgs {
            format: Some(OutputFormat::Md),
            ..download_args()
        };

        let config = resolve(&global, Some(&args), file).unwrap();
        assert_eq!(config.rate_limit, 3);
        assert_eq!(config.format, OutputFormat::Md);
        assert!(config.flags.download_images);
        assert_eq!(config.images_dir, "pics");
        assert_eq!(config.concurrency, ArchiveConfig::default().concurrency);
    }

    #[test]
    fn invalid_dates_and_escaping_dirs_fail_resolution() {
        let global = GlobalArgs {
            after: Some("2024-05-01".to_string()),
            before: Some("2024-04-01".to_string()),
            ..GlobalArgs::default()
        };
        assert!(resolve(&global, None, FileSettings::default()).is_err());

        let args = DownloadArgs {
            images_dir: Some("../outside".to_string()),
            ..download_args()
        };
        assert!(resolve(&GlobalArgs::default(), Some(&args), FileSettings::default()).is_err());
    }

    #[test]
    fn ron_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"(
    output: Some("archive"),
    format: Some(md),
    file_extensions: Some(["PDF", ".epub"]),
    create_archive: Some(true),
)"#
        )
        .unwrap();

        let settings = FileSettings::load(file.path()).unwrap();
        assert_eq!(settings.format, Some(OutputFormat::Md));
        let config = resolve(&GlobalArgs::default(), Some(&download_args()), settings).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("archive"));
        assert_eq!(config.file_extension_allowlist, vec!["pdf", "epub"]);
        assert!(config.flags.create_archive);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(colour: Some(true))").unwrap();
        assert!(FileSettings::load(file.path()).is_err());
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use archive_logging::{archive_error, archive_info, archive_warn, redact_url};
use archiver_core::{
    ArchiveConfig, ArtifactKind, Asset, AuditReport, ContentBlob, EntryKey, ItemFailure, Manifest,
    ManifestEntry, PlannedAsset, PlannedPost, Post, RunSummary,
};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::audit::audit_manifest_file;
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::index::{build_index, merge_index, parse_index, IndexEntry, INDEX_FILENAME};
use crate::list::{list_posts, ListError, ListQuery};
use crate::manifest::{ManifestHandle, ManifestManager, MANIFEST_FILENAME};
use crate::processor::{ProcessedPost, Processor};
use crate::store::{ContentStore, StoredArtifact};
use crate::ArchiveError;

/// Drives list, download and audit runs for one configuration.
pub struct Archiver {
    config: ArchiveConfig,
    fetcher: Arc<dyn Fetcher>,
    processor: Processor,
}

/// Where a real run puts its output. Absent during dry runs.
struct Sink<'a> {
    store: &'a ContentStore,
    manifest: &'a ManifestHandle,
}

#[derive(Default)]
struct PostReport {
    listed: bool,
    failures: Vec<ItemFailure>,
    flagged: Vec<String>,
    assets_stored: usize,
    assets_unchanged: usize,
    bytes_written: u64,
    manifest_changes: usize,
    outcome: Option<PostOutcome>,
}

enum PostOutcome {
    Archived { entry: IndexEntry, unchanged: bool },
    Planned(PlannedPost),
}

impl PostReport {
    fn record_stored(&mut self, stored: &StoredArtifact) {
        self.bytes_written += stored.bytes_written;
    }
}

impl Archiver {
    pub fn new(config: ArchiveConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, ArchiveError> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            processor: Processor::new(),
        })
    }

    /// Build an archiver with the production HTTP fetcher.
    pub fn from_config(config: ArchiveConfig) -> Result<Self, ArchiveError> {
        config.validate()?;
        let fetcher = ReqwestFetcher::from_config(&config)?;
        Self::new(config, Arc::new(fetcher))
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.config.output_dir.join(MANIFEST_FILENAME)
    }

    fn query(&self) -> ListQuery {
        ListQuery::new(self.config.date_range, self.config.post_limit)
    }

    /// Collect the posts a download of `source` would consider.
    pub async fn list(&self, source: &str) -> Result<Vec<Post>, ArchiveError> {
        let mut posts = Vec::new();
        let mut stream = std::pin::pin!(list_posts(self.fetcher.as_ref(), source, self.query()));
        while let Some(item) = stream.next().await {
            posts.push(item?);
        }
        Ok(posts)
    }

    /// Archive every matching post of `source` into the output directory.
    ///
    /// Per-item failures are collected in the summary. Only an unusable output
    /// directory or manifest ends the run early with an error. Cancelling `cancel`
    /// stops listing; posts already in flight finish and the manifest is saved.
    pub async fn download(
        &self,
        source: &str,
        cancel: CancellationToken,
    ) -> Result<RunSummary, ArchiveError> {
        let dry_run = self.config.flags.dry_run;
        let mut summary = RunSummary {
            dry_run,
            ..RunSummary::default()
        };

        if dry_run {
            archive_info!("dry run: nothing will be written");
            self.run_pass(source, &cancel, None, &mut summary).await;
            summary
                .plan
                .sort_by(|a, b| a.document_path.cmp(&b.document_path));
        } else {
            let store = ContentStore::open(&self.config.output_dir)?;
            let manager = ManifestManager::load(&self.manifest_path())?;
            let manifest = ManifestHandle::spawn(manager);
            let sink = Sink {
                store: &store,
                manifest: &manifest,
            };

            let entries = self.run_pass(source, &cancel, Some(&sink), &mut summary).await;
            if self.config.flags.create_archive && !entries.is_empty() {
                self.store_index(&entries, &sink, &mut summary).await;
            }
            manifest.save().await?;
        }

        summary.cancelled = cancel.is_cancelled();
        archive_info!(
            "run finished: {} listed, {} archived, {} unchanged, {} failure(s), {} bytes written",
            summary.posts_listed,
            summary.posts_archived,
            summary.posts_unchanged,
            summary.failures.len(),
            summary.bytes_written
        );
        Ok(summary)
    }

    /// Verify the archive against its manifest (the configured one by default).
    pub fn audit(&self, manifest_path: Option<&Path>) -> Result<AuditReport, ArchiveError> {
        let path = manifest_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.manifest_path());
        Ok(audit_manifest_file(&path)?)
    }

    async fn run_pass(
        &self,
        source: &str,
        cancel: &CancellationToken,
        sink: Option<&Sink<'_>>,
        summary: &mut RunSummary,
    ) -> Vec<IndexEntry> {
        let posts = list_posts(self.fetcher.as_ref(), source, self.query())
            .take_until(cancel.cancelled());
        let mut reports = std::pin::pin!(posts
            .map(|item| self.handle_item(item, sink))
            .buffer_unordered(self.config.concurrency));

        let mut entries = Vec::new();
        while let Some(report) = reports.next().await {
            if let Some(entry) = absorb(summary, report) {
                entries.push(entry);
            }
        }
        entries
    }

    async fn handle_item(
        &self,
        item: Result<Post, ListError>,
        sink: Option<&Sink<'_>>,
    ) -> PostReport {
        let mut report = PostReport::default();
        let post = match item {
            Ok(post) => post,
            Err(err) => {
                let err = ArchiveError::from(err);
                archive_error!("listing stopped: {}", err);
                report.failures.push(failure("listing", &err));
                return report;
            }
        };
        report.listed = true;

        let result = match sink {
            Some(sink) => self.archive_post(&post, sink, &mut report).await,
            None => self.plan_post(&post).await.map(PostOutcome::Planned),
        };
        match result {
            Ok(outcome) => report.outcome = Some(outcome),
            Err(err) => {
                archive_warn!("{} failed: {}", redact_url(&post.source_url), err);
                report.failures.push(failure(&post.source_url, &err));
            }
        }
        report
    }

    async fn content_for(&self, post: &Post) -> Result<ContentBlob, ArchiveError> {
        if let Some(body) = post.body_html.as_deref() {
            return Ok(ContentBlob::inline_html(body));
        }
        let output = self.fetcher.get(&post.source_url).await?;
        Ok(ContentBlob::new(output.bytes, output.metadata.content_type))
    }

    async fn process(&self, post: &Post) -> Result<ProcessedPost, ArchiveError> {
        let blob = self.content_for(post).await?;
        Ok(self.processor.process(post, &blob, &self.config)?)
    }

    async fn plan_post(&self, post: &Post) -> Result<PlannedPost, ArchiveError> {
        let processed = self.process(post).await?;
        Ok(PlannedPost {
            source_url: post.source_url.clone(),
            title: processed.title,
            document_path: processed.document.relative_path,
            assets: processed
                .assets
                .iter()
                .map(|asset| PlannedAsset {
                    url: asset.source_url.clone(),
                    local_path: asset.local_path.clone(),
                    kind: asset.kind.artifact_kind(),
                })
                .collect(),
        })
    }

    async fn archive_post(
        &self,
        post: &Post,
        sink: &Sink<'_>,
        report: &mut PostReport,
    ) -> Result<PostOutcome, ArchiveError> {
        let processed = self.process(post).await?;

        let results: Vec<(&Asset, Result<(StoredArtifact, bool), ArchiveError>)> =
            stream::iter(processed.assets.iter())
                .map(|asset| async move { (asset, self.archive_asset(asset, sink).await) })
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;

        let mut failed = Vec::new();
        for (asset, result) in results {
            match result {
                Ok((stored, changed)) => {
                    report.record_stored(&stored);
                    if stored.unchanged {
                        report.assets_unchanged += 1;
                    } else {
                        report.assets_stored += 1;
                    }
                    report.manifest_changes += usize::from(changed);
                }
                Err(err) => {
                    archive_warn!(
                        "asset {} failed, keeping remote reference: {}",
                        redact_url(&asset.source_url),
                        err
                    );
                    report.failures.push(failure(&asset.source_url, &err));
                    report.flagged.push(asset.reference.clone());
                    failed.push(asset);
                }
            }
        }

        let document = processed.reconcile(&failed);
        let stored = sink
            .store
            .store(document.body.into_bytes(), &document.relative_path)
            .await?;
        report.record_stored(&stored);
        let changed = self
            .record(sink, &post.source_url, &stored, ArtifactKind::Document)
            .await?;
        report.manifest_changes += usize::from(changed);

        if !stored.unchanged {
            archive_info!("archived {}", stored.relative_path);
        }
        Ok(PostOutcome::Archived {
            entry: IndexEntry {
                title: processed.title,
                published: post.publish_timestamp,
                document_path: stored.relative_path,
            },
            unchanged: stored.unchanged && !changed,
        })
    }

    async fn archive_asset(
        &self,
        asset: &Asset,
        sink: &Sink<'_>,
    ) -> Result<(StoredArtifact, bool), ArchiveError> {
        let output = self.fetcher.get(&asset.source_url).await?;
        let stored = sink.store.store(output.bytes, &asset.local_path).await?;
        let changed = self
            .record(sink, &asset.source_url, &stored, asset.kind.artifact_kind())
            .await?;
        Ok((stored, changed))
    }

    async fn record(
        &self,
        sink: &Sink<'_>,
        url: &str,
        stored: &StoredArtifact,
        kind: ArtifactKind,
    ) -> Result<bool, ArchiveError> {
        let replaced = sink
            .manifest
            .replace(ManifestEntry {
                url: url.to_string(),
                path: stored.relative_path.clone(),
                sha256: stored.sha256.clone(),
                bytes: stored.byte_length,
                kind,
                downloaded_at: Utc::now(),
            })
            .await?;
        if let Some(old_path) = replaced.superseded {
            match sink.store.remove(&old_path).await {
                Ok(true) => archive_info!("removed superseded {}", old_path),
                Ok(false) => {}
                Err(err) => archive_warn!("could not remove superseded {}: {}", old_path, err),
            }
        }
        Ok(replaced.outcome.changed())
    }

    async fn store_index(&self, entries: &[IndexEntry], sink: &Sink<'_>, summary: &mut RunSummary) {
        let result = async {
            let manifest = sink.manifest.snapshot().await?;
            let previous = previous_index(sink.store, &manifest).await;
            let page = build_index(&merge_index(previous, entries, &manifest));
            let stored = sink.store.store(page.into_bytes(), INDEX_FILENAME).await?;
            let changed = self
                .record(sink, INDEX_FILENAME, &stored, ArtifactKind::Document)
                .await?;
            Ok::<_, ArchiveError>((stored, changed))
        }
        .await;
        match result {
            Ok((stored, changed)) => {
                summary.bytes_written += stored.bytes_written;
                summary.manifest_changes += usize::from(changed);
            }
            Err(err) => {
                archive_warn!("archive index not written: {}", err);
                summary.failures.push(failure(INDEX_FILENAME, &err));
            }
        }
    }
}

/// Entries of the index written by an earlier run, if the manifest records one.
async fn previous_index(store: &ContentStore, manifest: &Manifest) -> Vec<IndexEntry> {
    if manifest
        .get(&EntryKey::new(INDEX_FILENAME, ArtifactKind::Document))
        .is_none()
    {
        return Vec::new();
    }
    let path = store.root().join(INDEX_FILENAME);
    let read = tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
        .await
        .unwrap_or_else(|err| Err(std::io::Error::other(err.to_string())));
    match read {
        Ok(page) => parse_index(&page),
        Err(err) => {
            archive_warn!("previous archive index unreadable, rebuilding: {}", err);
            Vec::new()
        }
    }
}

fn failure(item: &str, err: &ArchiveError) -> ItemFailure {
    ItemFailure {
        item: redact_url(item),
        class: err.class(),
        message: err.to_string(),
    }
}

fn absorb(summary: &mut RunSummary, report: PostReport) -> Option<IndexEntry> {
    summary.posts_listed += usize::from(report.listed);
    summary.failures.extend(report.failures);
    summary.flagged_references.extend(report.flagged);
    summary.assets_stored += report.assets_stored;
    summary.assets_unchanged += report.assets_unchanged;
    summary.bytes_written += report.bytes_written;
    summary.manifest_changes += report.manifest_changes;
    match report.outcome? {
        PostOutcome::Archived { entry, unchanged } => {
            if unchanged {
                summary.posts_unchanged += 1;
            } else {
                summary.posts_archived += 1;
            }
            Some(entry)
        }
        PostOutcome::Planned(plan) => {
            summary.plan.push(plan);
            None
        }
    }
}

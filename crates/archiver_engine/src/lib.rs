//! Archiver engine: fetching, listing, processing, storage, manifest and audit I/O.
mod assets;
mod audit;
mod convert;
mod decode;
mod extract;
mod fetch;
mod frontmatter;
mod index;
mod list;
mod manifest;
mod orchestrator;
mod persist;
mod processor;
mod rate_limit;
mod store;
mod text;
mod types;

pub use assets::{discover_assets, resolve_url};
pub use audit::{audit_manifest_file, Auditor};
pub use convert::{renderer_for, DocumentParts, HtmlRenderer, MarkdownRenderer, Renderer, TextRenderer};
pub use decode::{decode_bytes, DecodedText};
pub use extract::{extract_content, ExtractedContent};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, RetryPolicy};
pub use frontmatter::build_front_matter;
pub use index::{build_index, merge_index, parse_index, IndexEntry, INDEX_FILENAME};
pub use list::{list_posts, page_url, ListError, ListQuery, DEFAULT_PAGE_SIZE, MAX_LISTED_POSTS};
pub use manifest::{ManifestError, ManifestHandle, ManifestManager, Replaced, MANIFEST_FILENAME};
pub use orchestrator::Archiver;
pub use persist::{ensure_output_dir, file_digest, AtomicFileWriter, PersistError};
pub use processor::{ProcessError, ProcessedDocument, ProcessedPost, Processor};
pub use rate_limit::RateLimiter;
pub use store::{ContentStore, StoreError, StoredArtifact};
pub use text::html_to_text;
pub use types::{ArchiveError, FailureKind, FetchError, FetchMetadata, FetchOutput};

use archive_logging::{archive_debug, archive_info, redact_url};
use archiver_core::{DateRange, Post};
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::stream::{self, Stream};
use serde::Deserialize;

use crate::fetch::Fetcher;
use crate::FetchError;

pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Hard stop for sources that never report an end.
pub const MAX_LISTED_POSTS: usize = 20_000;

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("listing fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("could not decode post index page {url}: {message}")]
    Parse { url: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub date_range: DateRange,
    pub limit: Option<usize>,
    pub page_size: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            date_range: DateRange::default(),
            limit: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ListQuery {
    pub fn new(date_range: DateRange, limit: Option<usize>) -> Self {
        Self {
            date_range,
            limit,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPage {
    Bare(Vec<RawPost>),
    Wrapped {
        posts: Vec<RawPost>,
        #[serde(default)]
        total: Option<usize>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: RawId,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    title: Option<String>,
    canonical_url: String,
    post_date: String,
    #[serde(default)]
    body_html: Option<String>,
}

impl RawPost {
    fn into_post(self) -> Result<Post, String> {
        let publish_timestamp = parse_post_date(&self.post_date)
            .ok_or_else(|| format!("invalid post_date {:?}", self.post_date))?;
        let slug = self
            .slug
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| slug_from_url(&self.canonical_url));
        Ok(Post {
            stable_id: self.id.into_string(),
            title: self
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| slug.clone()),
            slug,
            source_url: self.canonical_url,
            publish_timestamp,
            body_html: self.body_html.filter(|b| !b.trim().is_empty()),
        })
    }
}

fn parse_post_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn slug_from_url(url: &str) -> String {
    url.split(['?', '#'])
        .next()
        .unwrap_or(url)
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("post")
        .to_string()
}

struct Decoded {
    posts: Vec<Post>,
    total: Option<usize>,
    raw_len: usize,
}

fn decode_page(url: &str, bytes: &[u8]) -> Result<Decoded, ListError> {
    let parse_error = |message: String| ListError::Parse {
        url: redact_url(url),
        message,
    };
    let page: RawPage =
        serde_json::from_slice(bytes).map_err(|err| parse_error(err.to_string()))?;
    let (raw, total) = match page {
        RawPage::Wrapped { posts, total } => (posts, total),
        RawPage::Bare(posts) => (posts, None),
    };
    let raw_len = raw.len();
    let posts = raw
        .into_iter()
        .map(RawPost::into_post)
        .collect::<Result<Vec<_>, _>>()
        .map_err(parse_error)?;
    Ok(Decoded {
        posts,
        total,
        raw_len,
    })
}

/// URL of the index page starting at `offset`.
pub fn page_url(source: &str, page_size: usize, offset: usize) -> String {
    format!(
        "{}/api/v1/posts?limit={page_size}&offset={offset}",
        source.trim_end_matches('/')
    )
}

struct Cursor<'a, F: ?Sized> {
    fetcher: &'a F,
    source: String,
    query: ListQuery,
    offset: usize,
    yielded: usize,
    buffered: std::vec::IntoIter<Post>,
    exhausted: bool,
}

impl<F: Fetcher + ?Sized> Cursor<'_, F> {
    fn limit_reached(&self) -> bool {
        self.query.limit.is_some_and(|limit| self.yielded >= limit)
    }

    async fn next_post(&mut self) -> Option<Result<Post, ListError>> {
        loop {
            if self.limit_reached() {
                return None;
            }
            if let Some(post) = self.buffered.next() {
                if !self.query.date_range.contains(&post.publish_timestamp) {
                    continue;
                }
                self.yielded += 1;
                return Some(Ok(post));
            }
            if self.exhausted {
                return None;
            }
            if let Err(err) = self.load_page().await {
                self.exhausted = true;
                return Some(Err(err));
            }
        }
    }

    async fn load_page(&mut self) -> Result<(), ListError> {
        let page_size = self.query.page_size.max(1);
        let url = page_url(&self.source, page_size, self.offset);
        archive_debug!("listing page {}", redact_url(&url));
        let output = self.fetcher.get(&url).await?;
        let decoded = decode_page(&url, &output.bytes)?;

        self.offset += decoded.raw_len;
        let short_page = decoded.total.is_none() && decoded.raw_len < page_size;
        let past_total = decoded.total.is_some_and(|total| self.offset >= total);
        if decoded.raw_len == 0 || short_page || past_total || self.offset >= MAX_LISTED_POSTS {
            self.exhausted = true;
        }
        self.buffered = decoded.posts.into_iter();
        Ok(())
    }
}

/// Enumerate posts of `source`, newest first.
///
/// The date filter runs before the limit. A page that fails to decode ends the
/// stream after yielding its error.
pub fn list_posts<'a, F>(
    fetcher: &'a F,
    source: &str,
    query: ListQuery,
) -> impl Stream<Item = Result<Post, ListError>> + Send + 'a
where
    F: Fetcher + ?Sized,
{
    archive_info!("listing posts from {}", redact_url(source));
    let cursor = Cursor {
        fetcher,
        source: source.to_string(),
        query,
        offset: 0,
        yielded: 0,
        buffered: Vec::new().into_iter(),
        exhausted: false,
    };
    stream::unfold(cursor, |mut cursor| async move {
        let item = cursor.next_post().await?;
        Some((item, cursor))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_dates_and_rfc3339() {
        let plain = parse_post_date("2024-03-01").unwrap();
        assert_eq!(plain.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let offset = parse_post_date("2024-03-01T23:30:00-02:00").unwrap();
        assert_eq!(offset.date_naive().to_string(), "2024-03-02");
        assert!(parse_post_date("yesterday").is_none());
    }

    #[test]
    fn slug_falls_back_to_last_url_segment() {
        assert_eq!(slug_from_url("https://ex.com/p/hello-world/?utm=1"), "hello-world");
        assert_eq!(slug_from_url(""), "post");
    }

    #[test]
    fn bare_and_wrapped_pages_decode() {
        let bare = br#"[{"id":1,"canonical_url":"https://ex.com/p/a","post_date":"2024-01-01"}]"#;
        let decoded = decode_page("https://ex.com/api", bare).unwrap();
        assert_eq!(decoded.posts[0].stable_id, "1");
        assert_eq!(decoded.posts[0].title, "a");
        assert!(decoded.total.is_none());

        let wrapped = br#"{"posts":[],"total":0}"#;
        let decoded = decode_page("https://ex.com/api", wrapped).unwrap();
        assert_eq!(decoded.total, Some(0));
    }
}

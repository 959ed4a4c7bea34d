//! Thumbnail URL rewriting, Open Graph image lookup and the image proxy.
//!
//! [`ImageService::optimize_image_url`] maps a front matter `thumbnail`
//! to something the browser can load directly:
//!
//! | Input | Output |
//! |-------|--------|
//! | empty | `images.default_thumbnail` |
//! | web page (`http(s)://`, not an image file, not gyazo) | proxied `og:image` of the page, cached |
//! | gyazo | `https://i.gyazo.com/<id>.png?w=<width>` |
//! | `/thumbnails/...` and other site-relative paths | unchanged |
//! | any other absolute URL | `/api/proxy-image?url=<encoded>` |
//!
//! Network access goes through [`PageFetcher`] so tests can run offline.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use doclink_core::cache::Clock;

use crate::cache::{CacheManager, ManagedCache};
use crate::config::{CacheConfig, ImagesConfig};

const USER_AGENT: &str = concat!("doclink/", env!("CARGO_PKG_VERSION"));

const IMAGE_EXTENSIONS: [&str; 7] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".avif"];

/// Characters `encodeURIComponent` leaves alone.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("upstream returned HTTP {0}")]
    Status(u16),
    #[error("not an image: {0}")]
    NotAnImage(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

/// Bytes and content type of a proxied image.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Outbound HTTP used by the image service.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET `url` and return the body as text.
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;

    /// GET `url` and return the raw body with its content type.
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<FetchedImage, FetchError>;
}

/// [`PageFetcher`] backed by `reqwest`.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!("unsupported scheme {}", parsed.scheme())));
        }
        let response = self.client.get(parsed).timeout(timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        Ok(self.get(url, timeout).await?.text().await?)
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<FetchedImage, FetchError> {
        let response = self.get(url, timeout).await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().await?.to_vec();
        Ok(FetchedImage { content_type, bytes })
    }
}

// ============ URL rules ============

pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

pub fn proxied_image_url(url: &str) -> String {
    format!("/api/proxy-image?url={}", encode_component(url))
}

fn is_gyazo(url: &str) -> bool {
    url.contains("gyazo.com")
}

/// An `http(s)` URL that points at a page rather than an image file.
pub fn is_website_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    (lower.starts_with("http://") || lower.starts_with("https://"))
        && !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        && !is_gyazo(&lower)
}

/// Direct, width-limited image URL for a gyazo link.
pub fn optimize_gyazo_url(url: &str, width: u32) -> String {
    if url.contains("i.gyazo.com") {
        let sep = if url.contains('?') { '&' } else { '?' };
        return format!("{}{}w={}", url, sep, width);
    }
    match url.split_once("gyazo.com/") {
        Some((_, id)) => format!("https://i.gyazo.com/{}.png?w={}", id, width),
        None => url.to_string(),
    }
}

/// Rewrite for every input that needs no network access; `None` for
/// web pages, whose thumbnail is their Open Graph image.
pub fn static_image_url(url: &str, width: u32, default_thumbnail: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return Some(default_thumbnail.to_string());
    }
    if is_website_url(url) {
        return None;
    }
    if is_gyazo(url) {
        return Some(optimize_gyazo_url(url, width));
    }
    if url.starts_with('/') {
        return Some(url.to_string());
    }
    Some(proxied_image_url(url))
}

// ============ Open Graph ============

/// Attributes of one tag, names lowercased.
fn tag_attributes(tag: &str) -> Vec<(String, String)> {
    let bytes = tag.as_bytes();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let name_start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && bytes[i] != b'='
            && bytes[i] != b'/'
        {
            i += 1;
        }
        if name_start == i {
            i += 1;
            continue;
        }
        let name = tag[name_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            attrs.push((name, String::new()));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value = match bytes.get(i) {
            Some(&q) if q == b'"' || q == b'\'' => {
                let start = i + 1;
                let end = tag[start..]
                    .find(q as char)
                    .map(|n| start + n)
                    .unwrap_or(tag.len());
                i = end + 1;
                &tag[start..end]
            }
            _ => {
                let start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &tag[start..i]
            }
        };
        attrs.push((name, value.to_string()));
    }
    attrs
}

/// `content` of every `<meta>` whose `property` or `name` is `key`.
fn meta_content(html: &str, key: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut from = 0;
    while let Some(pos) = lower[from..].find("<meta") {
        let start = from + pos + "<meta".len();
        let end = lower[start..].find('>').map(|n| start + n).unwrap_or(lower.len());
        from = end;

        let attrs = tag_attributes(&html[start..end]);
        let matches_key = attrs.iter().any(|(name, value)| {
            (name == "property" || name == "name") && value.eq_ignore_ascii_case(key)
        });
        if !matches_key {
            continue;
        }
        if let Some((_, content)) = attrs.iter().find(|(name, _)| name == "content") {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }
    None
}

/// `og:image`, falling back to `twitter:image`, made absolute against
/// `base_url`.
pub fn extract_og_image(html: &str, base_url: &str) -> Option<String> {
    let found = meta_content(html, "og:image").or_else(|| meta_content(html, "twitter:image"))?;
    if Url::parse(&found).is_ok() {
        return Some(found);
    }
    match Url::parse(base_url).and_then(|base| base.join(&found)) {
        Ok(abs) => Some(abs.to_string()),
        Err(_) => Some(found),
    }
}

// ============ Service ============

pub struct ImageService {
    fetcher: Arc<dyn PageFetcher>,
    config: ImagesConfig,
    og_cache: Arc<CacheManager<String>>,
}

impl ImageService {
    pub fn new(
        images: &ImagesConfig,
        cache: &CacheConfig,
        fetcher: Arc<dyn PageFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = cache.policy_with_ttl(images.og_cache_ttl_secs);
        Self {
            fetcher,
            config: images.clone(),
            og_cache: Arc::new(CacheManager::new("og-image", cache, policy, clock)),
        }
    }

    pub fn default_thumbnail(&self) -> &str {
        &self.config.default_thumbnail
    }

    pub fn caches(&self) -> Vec<Arc<dyn ManagedCache>> {
        vec![self.og_cache.clone() as Arc<dyn ManagedCache>]
    }

    /// Absolute `og:image` URL of the page at `url`, `Ok(None)` if the
    /// page has none.
    pub async fn og_image(&self, url: &str) -> Result<Option<String>, FetchError> {
        let timeout = Duration::from_secs(self.config.og_timeout_secs);
        let html = self.fetcher.fetch_text(url, timeout).await?;
        Ok(extract_og_image(&html, url))
    }

    /// Browser-loadable thumbnail for `url`. Never fails: lookups that go
    /// wrong fall back to the default thumbnail.
    pub async fn optimize_image_url(&self, url: &str, width: Option<u32>) -> String {
        let width = width.unwrap_or(self.config.width);
        if let Some(out) = static_image_url(url, width, &self.config.default_thumbnail) {
            return out;
        }

        let url = url.trim();
        if let Some(cached) = self.og_cache.get(url).await {
            return cached;
        }
        match self.og_image(url).await {
            Ok(Some(image)) => {
                let proxied = proxied_image_url(&image);
                self.og_cache.set(url, proxied.clone());
                proxied
            }
            Ok(None) => {
                debug!(url, "page has no og:image");
                self.config.default_thumbnail.clone()
            }
            Err(e) => {
                warn!(url, error = %e, "og:image lookup failed");
                self.config.default_thumbnail.clone()
            }
        }
    }

    /// Fetch an image for the proxy route; non-image responses are rejected.
    pub async fn fetch_image(&self, url: &str) -> Result<FetchedImage, FetchError> {
        let timeout = Duration::from_secs(self.config.proxy_timeout_secs);
        let image = self.fetcher.fetch_bytes(url, timeout).await?;
        if !image.content_type.starts_with("image/") {
            return Err(FetchError::NotAnImage(image.content_type));
        }
        Ok(image)
    }
}

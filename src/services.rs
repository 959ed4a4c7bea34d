//! Service wiring shared by the CLI and the HTTP server.

use doclink_core::cache::{Clock, SystemClock};
use std::sync::Arc;

use crate::cache::ManagedCache;
use crate::config::Config;
use crate::doc_tree::DocTrees;
use crate::images::{HttpFetcher, ImageService, PageFetcher};
use crate::keywords::KeywordService;
use crate::search::SearchService;

/// Every long-lived service, each owning its own caches.
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub trees: DocTrees,
    pub keywords: Arc<KeywordService>,
    pub search: Arc<SearchService>,
    pub images: Arc<ImageService>,
}

impl Services {
    /// Production wiring: system clock and a `reqwest` fetcher.
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new()?);
        Self::with_parts(config, Arc::new(SystemClock), fetcher)
    }

    pub fn with_parts(
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> anyhow::Result<Self> {
        let trees = DocTrees::new(config.clone());
        let keywords = KeywordService::new(&config, trees.clone(), clock.clone())?;
        let search = SearchService::new(&config, clock.clone());
        let images = ImageService::new(&config.images, &config.cache, fetcher, clock);
        Ok(Self {
            config,
            trees,
            keywords: Arc::new(keywords),
            search: Arc::new(search),
            images: Arc::new(images),
        })
    }

    pub fn caches(&self) -> Vec<Arc<dyn ManagedCache>> {
        let mut all = self.keywords.caches();
        all.extend(self.search.caches());
        all.extend(self.images.caches());
        all
    }

    /// Drop every cached value in every namespace; returns the namespaces.
    pub fn invalidate_all(&self) -> Vec<String> {
        self.caches()
            .iter()
            .map(|cache| {
                cache.invalidate_all();
                cache.namespace().to_string()
            })
            .collect()
    }
}

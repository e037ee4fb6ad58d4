pub mod history;
pub mod prompts;
pub mod refine;
pub mod research;
pub mod subqueries;

mod collect;
mod error;
mod relevance;
mod scrape;
mod synthesis;

pub use error::{Error, Result};
pub use history::{HistoryResponse, HistorySummary};
pub use refine::RefineRequest;
pub use research::{
	ResearchRequest, ResearchResponse, ResearchResult, ResearchStatus, Shortfall,
};
pub use subqueries::{SubqueriesRequest, SubqueriesResponse};
pub use synthesis::NOTHING_FOUND;

use std::{future::Future, pin::Pin, sync::Arc};

use delve_config::{Config, LlmProviderConfig, ScraperConfig, SearchProviderConfig};
use delve_domain::progress::Progress;
use delve_providers::{
	llm::{self, ChatMessage},
	scraper::{self, ScrapedPage},
	search::{self, SearchHit},
};
use delve_storage::HistoryStore;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait LanguageModel
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, delve_providers::Result<String>>;
}

/// Web search. Implementations absorb their own failures and return an empty list.
pub trait SearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		query: &'a str,
		count: u32,
	) -> BoxFuture<'a, Vec<SearchHit>>;
}

/// Page fetching. Failures come back as error-marked pages.
pub trait PageScraper
where
	Self: Send + Sync,
{
	fn scrape<'a>(&'a self, cfg: &'a ScraperConfig, url: &'a str) -> BoxFuture<'a, ScrapedPage>;
}

/// Receives milestone updates while a run progresses.
pub trait ProgressSink
where
	Self: Send + Sync,
{
	fn notify(&self, progress: &Progress);
}

pub struct NoProgress;
impl ProgressSink for NoProgress {
	fn notify(&self, _progress: &Progress) {}
}

#[derive(Clone)]
pub struct Providers {
	pub llm: Arc<dyn LanguageModel>,
	pub search: Arc<dyn SearchProvider>,
	pub scraper: Arc<dyn PageScraper>,
}
impl Providers {
	pub fn new(
		llm: Arc<dyn LanguageModel>,
		search: Arc<dyn SearchProvider>,
		scraper: Arc<dyn PageScraper>,
	) -> Self {
		Self { llm, search, scraper }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { llm: provider.clone(), search: provider.clone(), scraper: provider }
	}
}

pub struct ResearchService {
	pub cfg: Config,
	pub history: HistoryStore,
	pub providers: Providers,
}
impl ResearchService {
	pub fn new(cfg: Config) -> Self {
		let history = HistoryStore::new(&cfg.history.dir);

		Self { cfg, history, providers: Providers::default() }
	}

	pub fn with_providers(cfg: Config, history: HistoryStore, providers: Providers) -> Self {
		Self { cfg, history, providers }
	}

	pub(crate) async fn chat(&self, messages: &[ChatMessage]) -> delve_providers::Result<String> {
		self.providers.llm.complete(&self.cfg.providers.llm, messages).await
	}

	pub(crate) async fn search(&self, query: &str, count: u32) -> Vec<SearchHit> {
		self.providers.search.search(&self.cfg.providers.search, query, count).await
	}

	pub(crate) async fn scrape_page(&self, url: &str) -> ScrapedPage {
		self.providers.scraper.scrape(&self.cfg.providers.scraper, url).await
	}
}

struct DefaultProviders;
impl LanguageModel for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, delve_providers::Result<String>> {
		Box::pin(llm::complete(cfg, messages))
	}
}
impl SearchProvider for DefaultProviders {
	fn search<'a>(
		&'a self,
		cfg: &'a SearchProviderConfig,
		query: &'a str,
		count: u32,
	) -> BoxFuture<'a, Vec<SearchHit>> {
		Box::pin(search::search(cfg, query, count))
	}
}
impl PageScraper for DefaultProviders {
	fn scrape<'a>(&'a self, cfg: &'a ScraperConfig, url: &'a str) -> BoxFuture<'a, ScrapedPage> {
		Box::pin(scraper::scrape(cfg, url))
	}
}

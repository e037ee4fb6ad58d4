mod error;

pub use error::{Error, Result};

use std::{
	collections::HashMap,
	env, fs,
	path::{Path, PathBuf},
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Map;
use uuid::Uuid;

use delve_config::{
	Config, History, LlmProviderConfig, Providers, Research, ScraperConfig, SearchProviderConfig,
	Service,
};
use delve_domain::progress::Progress;
use delve_providers::{llm::ChatMessage, scraper::ScrapedPage, search::SearchHit};
use delve_service::{
	BoxFuture, LanguageModel, PageScraper, ProgressSink, SearchProvider, prompts::PromptKind,
};
use delve_storage::HistoryStore;

pub const RELEVANT_REPLY: &str = r#"{"summary": "A relevant summary.", "is_relevant": true}"#;
pub const IRRELEVANT_REPLY: &str = r#"{"summary": null, "is_relevant": false}"#;
pub const COHERENT_REPLY: &str = r#"{"is_coherent": true, "reason": "Grounded in the sources."}"#;
pub const INCOHERENT_REPLY: &str = r#"{"is_coherent": false, "reason": "Not grounded."}"#;

/// Config with small limits, unreachable providers and the given history directory.
pub fn test_config(history_dir: &Path) -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			bind_localhost_only: true,
			log_level: "info".to_string(),
		},
		providers: Providers {
			llm: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/v1/chat/completions".to_string(),
				model: "test".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			search: SearchProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:1".to_string(),
				api_key: String::new(),
				path: "/search".to_string(),
				timeout_ms: 1_000,
				retries: 1,
				retry_delay_ms: 0,
				default_headers: Map::new(),
				default_params: Map::new(),
			},
			scraper: ScraperConfig::default(),
		},
		research: Research { max_threads: 4, ..Research::default() },
		history: History { dir: history_dir.display().to_string() },
	}
}

#[derive(Debug, Clone)]
enum Script {
	Fail,
	/// Call `i` gets reply `i`; the last reply repeats once the list runs out.
	Replies(Vec<String>),
}
impl Script {
	fn reply(&self, call: usize) -> delve_providers::Result<String> {
		match self {
			Self::Replies(replies) if !replies.is_empty() =>
				Ok(replies[call.min(replies.len() - 1)].clone()),
			_ => Err(delve_providers::Error::InvalidResponse {
				message: "Scripted model failure.".to_string(),
			}),
		}
	}
}

/// Language model that answers each prompt kind from its own script and counts calls.
pub struct ScriptedModel {
	subqueries: Script,
	relevance: Script,
	synthesis: Script,
	validation: Script,
	irrelevant_marker: Option<String>,
	calls: Mutex<HashMap<PromptKind, usize>>,
}
impl ScriptedModel {
	pub fn new(subqueries_reply: impl Into<String>) -> Self {
		Self {
			subqueries: Script::Replies(vec![subqueries_reply.into()]),
			relevance: Script::Replies(vec![RELEVANT_REPLY.to_string()]),
			synthesis: Script::Replies(vec!["Synthesis of the sources.".to_string()]),
			validation: Script::Replies(vec![COHERENT_REPLY.to_string()]),
			irrelevant_marker: None,
			calls: Mutex::new(HashMap::new()),
		}
	}

	pub fn with_relevance(mut self, reply: impl Into<String>) -> Self {
		self.relevance = Script::Replies(vec![reply.into()]);

		self
	}

	/// Documents whose text contains `marker` are judged irrelevant.
	pub fn with_irrelevant_marker(mut self, marker: impl Into<String>) -> Self {
		self.irrelevant_marker = Some(marker.into());

		self
	}

	pub fn with_synthesis(mut self, replies: &[&str]) -> Self {
		self.synthesis = Script::Replies(replies.iter().map(|reply| reply.to_string()).collect());

		self
	}

	pub fn with_validation(mut self, reply: impl Into<String>) -> Self {
		self.validation = Script::Replies(vec![reply.into()]);

		self
	}

	pub fn failing(mut self, kind: PromptKind) -> Self {
		*self.script_mut(kind) = Script::Fail;

		self
	}

	pub fn calls(&self, kind: PromptKind) -> usize {
		let calls = self.calls.lock().unwrap_or_else(|err| err.into_inner());

		calls.get(&kind).copied().unwrap_or(0)
	}

	fn script_mut(&mut self, kind: PromptKind) -> &mut Script {
		match kind {
			PromptKind::Subqueries => &mut self.subqueries,
			PromptKind::Relevance => &mut self.relevance,
			PromptKind::Synthesis => &mut self.synthesis,
			PromptKind::Validation => &mut self.validation,
		}
	}

	fn answer(&self, messages: &[ChatMessage]) -> delve_providers::Result<String> {
		let Some(kind) = PromptKind::of(messages) else {
			return Err(delve_providers::Error::InvalidResponse {
				message: "Unrecognised prompt.".to_string(),
			});
		};
		let call = {
			let mut calls = self.calls.lock().unwrap_or_else(|err| err.into_inner());
			let count = calls.entry(kind).or_insert(0);

			*count += 1;

			*count - 1
		};

		if kind == PromptKind::Relevance
			&& let Some(marker) = &self.irrelevant_marker
			&& messages.iter().any(|message| message.content.contains(marker.as_str()))
		{
			return Ok(IRRELEVANT_REPLY.to_string());
		}

		match kind {
			PromptKind::Subqueries => self.subqueries.reply(call),
			PromptKind::Relevance => self.relevance.reply(call),
			PromptKind::Synthesis => self.synthesis.reply(call),
			PromptKind::Validation => self.validation.reply(call),
		}
	}
}
impl LanguageModel for ScriptedModel {
	fn complete<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		messages: &'a [ChatMessage],
	) -> BoxFuture<'a, delve_providers::Result<String>> {
		let reply = self.answer(messages);

		Box::pin(async move { reply })
	}
}

/// Search provider backed by a query-to-results map. Unknown queries find nothing.
#[derive(Default)]
pub struct StubSearch {
	results: HashMap<String, Vec<SearchHit>>,
	requests: Mutex<Vec<(String, u32)>>,
}
impl StubSearch {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_results(mut self, query: impl Into<String>, urls: &[&str]) -> Self {
		let hits = urls
			.iter()
			.map(|url| SearchHit { title: format!("Result for {url}"), url: url.to_string() })
			.collect();

		self.results.insert(query.into(), hits);

		self
	}

	pub fn calls(&self) -> usize {
		self.requests().len()
	}

	/// Every `(query, count)` pair requested so far, in call order.
	pub fn requests(&self) -> Vec<(String, u32)> {
		self.requests.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl SearchProvider for StubSearch {
	fn search<'a>(
		&'a self,
		_cfg: &'a SearchProviderConfig,
		query: &'a str,
		count: u32,
	) -> BoxFuture<'a, Vec<SearchHit>> {
		self.requests
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push((query.to_string(), count));

		let hits = self
			.results
			.get(query)
			.map(|hits| hits.iter().take(count as usize).cloned().collect())
			.unwrap_or_default();

		Box::pin(async move { hits })
	}
}

/// Scraper backed by a URL-to-page map. Unknown URLs come back as failed pages.
#[derive(Default)]
pub struct StubScraper {
	pages: HashMap<String, ScrapedPage>,
	scraped: Mutex<Vec<String>>,
}
impl StubScraper {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_page(mut self, url: impl Into<String>, title: &str, paragraphs: &str) -> Self {
		let page = ScrapedPage {
			title: title.to_string(),
			paragraphs: paragraphs.to_string(),
			error: None,
		};

		self.pages.insert(url.into(), page);

		self
	}

	pub fn calls(&self) -> usize {
		self.scraped().len()
	}

	pub fn scraped(&self) -> Vec<String> {
		self.scraped.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl PageScraper for StubScraper {
	fn scrape<'a>(&'a self, _cfg: &'a ScraperConfig, url: &'a str) -> BoxFuture<'a, ScrapedPage> {
		self.scraped.lock().unwrap_or_else(|err| err.into_inner()).push(url.to_string());

		let page = self
			.pages
			.get(url)
			.cloned()
			.unwrap_or_else(|| ScrapedPage::failed(format!("No stub page for {url}.")));

		Box::pin(async move { page })
	}
}

#[derive(Default)]
pub struct RecordingProgress {
	events: Mutex<Vec<Progress>>,
}
impl RecordingProgress {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<Progress> {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl ProgressSink for RecordingProgress {
	fn notify(&self, progress: &Progress) {
		self.events.lock().unwrap_or_else(|err| err.into_inner()).push(progress.clone());
	}
}

/// A uniquely named directory under the system temp dir, removed on drop.
pub struct TempHistoryDir {
	path: PathBuf,
}
impl TempHistoryDir {
	pub fn new() -> Result<Self> {
		let path = env::temp_dir().join(format!("delve_test_{}", Uuid::new_v4().simple()));

		if path.exists() {
			return Err(Error::Message(format!("Temp dir {} already exists.", path.display())));
		}

		fs::create_dir_all(&path)?;

		Ok(Self { path })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn store(&self) -> HistoryStore {
		HistoryStore::new(&self.path)
	}
}
impl Drop for TempHistoryDir {
	fn drop(&mut self) {
		let _ = fs::remove_dir_all(&self.path);
	}
}

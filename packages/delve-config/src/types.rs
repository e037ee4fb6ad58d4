use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	#[serde(default)]
	pub research: Research,
	#[serde(default)]
	pub history: History,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	#[serde(default = "default_bind_localhost_only")]
	pub bind_localhost_only: bool,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub llm: LlmProviderConfig,
	pub search: SearchProviderConfig,
	#[serde(default)]
	pub scraper: ScraperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	/// Optional. Sent as a bearer token when non-empty.
	#[serde(default)]
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default = "default_search_retries")]
	pub retries: u32,
	#[serde(default = "default_search_retry_delay_ms")]
	pub retry_delay_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	/// Extra query parameters sent with every search, e.g. `format = "json"`.
	#[serde(default)]
	pub default_params: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
	pub timeout_ms: u64,
	pub max_redirects: usize,
	/// Pool of user agents; one is picked per URL.
	pub user_agents: Vec<String>,
}
impl Default for ScraperConfig {
	fn default() -> Self {
		Self { timeout_ms: 10_000, max_redirects: 5, user_agents: Vec::new() }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Research {
	/// Default subquery count (`k`).
	pub subqueries: u32,
	/// Default relevant documents wanted per subquery (`n`).
	pub results_per_subquery: u32,
	pub max_threads: u32,
	/// Extra search results requested per subquery to absorb duplicates.
	pub search_padding: u32,
	/// Documents at or below this many characters skip the relevance judge.
	pub short_document_chars: usize,
	pub max_new_url_attempts: u32,
	pub max_retry_rounds: u32,
	pub max_synthesis_attempts: u32,
}
impl Default for Research {
	fn default() -> Self {
		Self {
			subqueries: 3,
			results_per_subquery: 2,
			max_threads: 8,
			search_padding: 3,
			short_document_chars: 100,
			max_new_url_attempts: 5,
			max_retry_rounds: 3,
			max_synthesis_attempts: 3,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct History {
	pub dir: String,
}
impl Default for History {
	fn default() -> Self {
		Self { dir: "history".to_string() }
	}
}

fn default_bind_localhost_only() -> bool {
	true
}

fn default_search_retries() -> u32 {
	3
}

fn default_search_retry_delay_ms() -> u64 {
	2_000
}

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, History, LlmProviderConfig, Providers, Research, ScraperConfig, SearchProviderConfig,
	Service,
};

use std::{env, fs, path::Path};

pub const LLM_API_KEY_ENV: &str = "DELVE_LLM_API_KEY";
pub const SEARCH_API_KEY_ENV: &str = "DELVE_SEARCH_API_KEY";
/// Upper bound for `k` and `n`, matching what the research UI accepts.
pub const MAX_FAN_OUT: u32 = 10;

const DEFAULT_USER_AGENT: &str =
	"Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn normalize(cfg: &mut Config) {
	trim_trailing_slashes(&mut cfg.providers.llm.api_base);
	trim_trailing_slashes(&mut cfg.providers.search.api_base);

	if cfg.providers.llm.api_key.trim().is_empty()
		&& let Ok(key) = env::var(LLM_API_KEY_ENV)
	{
		cfg.providers.llm.api_key = key;
	}
	if cfg.providers.search.api_key.trim().is_empty()
		&& let Ok(key) = env::var(SEARCH_API_KEY_ENV)
	{
		cfg.providers.search.api_key = key;
	}

	cfg.providers.scraper.user_agents.retain(|agent| !agent.trim().is_empty());

	if cfg.providers.scraper.user_agents.is_empty() {
		cfg.providers.scraper.user_agents.push(DEFAULT_USER_AGENT.to_string());
	}
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}

	let llm = &cfg.providers.llm;

	if llm.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.llm.api_base must be non-empty.".to_string(),
		});
	}
	if llm.model.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.llm.model must be non-empty.".to_string(),
		});
	}
	if llm.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.llm.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if !llm.temperature.is_finite() {
		return Err(Error::Validation {
			message: "providers.llm.temperature must be a finite number.".to_string(),
		});
	}
	if !(0.0..=2.0).contains(&llm.temperature) {
		return Err(Error::Validation {
			message: "providers.llm.temperature must be in the range 0.0-2.0.".to_string(),
		});
	}

	let search = &cfg.providers.search;

	if search.api_base.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.search.api_base must be non-empty.".to_string(),
		});
	}
	if search.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.search.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if search.retries == 0 {
		return Err(Error::Validation {
			message: "providers.search.retries must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.scraper.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "providers.scraper.timeout_ms must be greater than zero.".to_string(),
		});
	}

	validate_research(&cfg.research)?;

	if cfg.history.dir.trim().is_empty() {
		return Err(Error::Validation { message: "history.dir must be non-empty.".to_string() });
	}

	Ok(())
}

fn validate_research(research: &Research) -> Result<()> {
	if research.subqueries == 0 || research.subqueries > MAX_FAN_OUT {
		return Err(Error::Validation {
			message: format!("research.subqueries must be in the range 1-{MAX_FAN_OUT}."),
		});
	}
	if research.results_per_subquery == 0 || research.results_per_subquery > MAX_FAN_OUT {
		return Err(Error::Validation {
			message: format!("research.results_per_subquery must be in the range 1-{MAX_FAN_OUT}."),
		});
	}
	if research.max_threads == 0 {
		return Err(Error::Validation {
			message: "research.max_threads must be greater than zero.".to_string(),
		});
	}
	if research.max_retry_rounds == 0 {
		return Err(Error::Validation {
			message: "research.max_retry_rounds must be greater than zero.".to_string(),
		});
	}
	if research.max_synthesis_attempts == 0 {
		return Err(Error::Validation {
			message: "research.max_synthesis_attempts must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn trim_trailing_slashes(value: &mut String) {
	let trimmed_len = value.trim_end_matches('/').len();

	value.truncate(trimmed_len);
}

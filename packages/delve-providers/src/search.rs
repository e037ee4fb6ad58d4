use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
	pub title: String,
	pub url: String,
}

/// Searches the web, retrying transient failures. Never fails: after the last retry it
/// yields an empty list.
pub async fn search(
	cfg: &delve_config::SearchProviderConfig,
	query: &str,
	count: u32,
) -> Vec<SearchHit> {
	let retries = cfg.retries.max(1);

	for attempt in 1..=retries {
		match search_once(cfg, query, count).await {
			Ok(hits) => return hits,
			Err(err) => {
				tracing::warn!(error = %err, attempt, retries, query, "Search request failed.");

				if attempt < retries {
					tokio::time::sleep(Duration::from_millis(cfg.retry_delay_ms)).await;
				}
			},
		}
	}

	Vec::new()
}

async fn search_once(
	cfg: &delve_config::SearchProviderConfig,
	query: &str,
	count: u32,
) -> Result<Vec<SearchHit>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut params =
		vec![("q".to_string(), query.to_string()), ("count".to_string(), count.to_string())];

	for (key, value) in &cfg.default_params {
		let value = match value {
			Value::String(text) => text.clone(),
			Value::Number(_) | Value::Bool(_) => value.to_string(),
			_ => {
				return Err(Error::InvalidConfig {
					message: "Default search params must be strings, numbers or booleans."
						.to_string(),
				});
			},
		};

		params.push((key.clone(), value));
	}

	let res = client
		.get(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.query(&params)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_search_response(&json, count as usize)
}

fn parse_search_response(json: &Value, count: usize) -> Result<Vec<SearchHit>> {
	let results = ["/results", "/web/results", "/organic", "/organic_results", "/items"]
		.iter()
		.find_map(|pointer| json.pointer(pointer).and_then(|v| v.as_array()))
		.ok_or_else(|| Error::InvalidResponse {
			message: "Search response is missing a results array.".to_string(),
		})?;
	let mut hits = Vec::with_capacity(count.min(results.len()));

	for item in results {
		if hits.len() >= count {
			break;
		}

		let Some(url) = item.get("url").or_else(|| item.get("link")).and_then(|v| v.as_str())
		else {
			continue;
		};
		let title = item.get("title").and_then(|v| v.as_str()).unwrap_or_default();

		hits.push(SearchHit { title: title.trim().to_string(), url: url.trim().to_string() });
	}

	Ok(hits)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reads_nested_web_results() {
		let json = serde_json::json!({
			"web": { "results": [
				{ "title": "Eiffel Tower", "url": "https://example.com/eiffel" },
				{ "title": "No url" },
				{ "link": "https://example.com/gustave" }
			] }
		});
		let hits = parse_search_response(&json, 5).expect("parse failed");

		assert_eq!(hits.len(), 2);
		assert_eq!(hits[0].title, "Eiffel Tower");
		assert_eq!(
			hits[1],
			SearchHit { title: String::new(), url: "https://example.com/gustave".to_string() }
		);
	}

	#[test]
	fn truncates_to_count() {
		let json = serde_json::json!({
			"results": [
				{ "url": "https://a" }, { "url": "https://b" }, { "url": "https://c" }
			]
		});

		assert_eq!(parse_search_response(&json, 2).expect("parse failed").len(), 2);
	}

	#[test]
	fn rejects_unknown_shape() {
		let json = serde_json::json!({ "hits": [] });

		assert!(parse_search_response(&json, 2).is_err());
	}
}

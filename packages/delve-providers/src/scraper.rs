use std::{sync::LazyLock, time::Duration};

use reqwest::{Client, header::CONTENT_TYPE, redirect::Policy};
use scraper::{ElementRef, Html, Selector};

use crate::{Error, Result};

static HEADING: LazyLock<Selector> =
	LazyLock::new(|| Selector::parse("h1").expect("Heading selector must parse"));
static TITLE: LazyLock<Selector> =
	LazyLock::new(|| Selector::parse("title").expect("Title selector must parse"));
static PARAGRAPH: LazyLock<Selector> =
	LazyLock::new(|| Selector::parse("p").expect("Paragraph selector must parse"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapedPage {
	pub title: String,
	/// Non-empty paragraph texts joined by blank lines.
	pub paragraphs: String,
	/// Set when the page could not be fetched; the page then carries no usable content.
	pub error: Option<String>,
}
impl ScrapedPage {
	pub fn failed(message: impl Into<String>) -> Self {
		Self { title: String::new(), paragraphs: String::new(), error: Some(message.into()) }
	}

	pub fn is_failed(&self) -> bool {
		self.error.is_some()
	}
}

/// Fetches `url` and extracts its heading and paragraph text. Never fails: fetch errors
/// come back as a failed page.
pub async fn scrape(cfg: &delve_config::ScraperConfig, url: &str) -> ScrapedPage {
	match fetch_html(cfg, url).await {
		Ok(html) => extract_page(&html),
		Err(err) => {
			tracing::warn!(error = %err, url, "Scrape failed.");

			ScrapedPage::failed(err.to_string())
		},
	}
}

async fn fetch_html(cfg: &delve_config::ScraperConfig, url: &str) -> Result<String> {
	if !url.starts_with("http://") && !url.starts_with("https://") {
		return Err(Error::InvalidConfig {
			message: format!("Refusing to scrape non-HTTP URL {url}."),
		});
	}

	let mut builder = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.redirect(Policy::limited(cfg.max_redirects));

	if let Some(agent) = pick_user_agent(&cfg.user_agents, url) {
		builder = builder.user_agent(agent);
	}

	let client = builder.build()?;
	let res = client.get(url).send().await?.error_for_status()?;
	let content_type = res
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.unwrap_or("text/html")
		.to_ascii_lowercase();

	if !content_type.contains("html") && !content_type.starts_with("text/") {
		return Err(Error::InvalidResponse {
			message: format!("Unsupported content type {content_type} at {url}."),
		});
	}

	Ok(res.text().await?)
}

/// Picks a user agent deterministically from the pool so retries of a URL look alike.
fn pick_user_agent<'a>(agents: &'a [String], url: &str) -> Option<&'a str> {
	if agents.is_empty() {
		return None;
	}

	let hash = blake3::hash(url.as_bytes());
	let mut prefix = [0_u8; 8];

	prefix.copy_from_slice(&hash.as_bytes()[..8]);

	let index = (u64::from_le_bytes(prefix) % agents.len() as u64) as usize;

	Some(agents[index].as_str())
}

/// Title is the first non-empty `<h1>`, else `<title>`. Paragraphs are the non-empty `<p>`
/// texts joined by blank lines.
pub fn extract_page(html: &str) -> ScrapedPage {
	let document = Html::parse_document(html);
	let title = first_text(&document, &HEADING)
		.or_else(|| first_text(&document, &TITLE))
		.unwrap_or_default();
	let paragraphs = document
		.select(&PARAGRAPH)
		.map(text_content)
		.filter(|text| !text.is_empty())
		.collect::<Vec<_>>()
		.join("\n\n");

	ScrapedPage { title, paragraphs, error: None }
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
	document.select(selector).map(text_content).find(|text| !text.is_empty())
}

fn text_content(element: ElementRef<'_>) -> String {
	element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefers_h1_over_title() {
		let html = "<html><head><title>Site | Page</title></head>\
			<body><h1 class=\"x\">  The <em>Tower</em> </h1><p>Body</p></body></html>";
		let page = extract_page(html);

		assert_eq!(page.title, "The Tower");
		assert_eq!(page.paragraphs, "Body");
	}

	#[test]
	fn falls_back_to_title_and_skips_scripts() {
		let html = "<title>Fallback</title><script>var p = '<p>nope</p>';</script>\
			<p>First &amp; foremost</p><p>   </p><param name=\"x\"><p>Caf&#233; &#x2014; ok</p>";
		let page = extract_page(html);

		assert_eq!(page.title, "Fallback");
		assert_eq!(page.paragraphs, "First & foremost\n\nCafé — ok");
	}

	#[test]
	fn keeps_paragraphs_without_end_tags() {
		let html = "<h1>Eiffel</h1><p>The tower was built for the 1889 World's Fair.\
			<p>It was designed by Eiffel's company.</body>";
		let page = extract_page(html);

		assert_eq!(page.title, "Eiffel");
		assert_eq!(
			page.paragraphs,
			"The tower was built for the 1889 World's Fair.\n\nIt was designed by Eiffel's company."
		);
	}

	#[test]
	fn user_agent_choice_is_stable() {
		let agents = vec!["a".to_string(), "b".to_string(), "c".to_string()];
		let first = pick_user_agent(&agents, "https://example.com/page");

		assert!(first.is_some());
		assert_eq!(first, pick_user_agent(&agents, "https://example.com/page"));
		assert_eq!(pick_user_agent(&[], "https://example.com/page"), None);
	}
}

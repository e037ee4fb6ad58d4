use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use delve_config::ScraperConfig;
use delve_domain::progress::Stage;
use delve_providers::scraper::ScrapedPage;
use delve_service::{
	BoxFuture, Error, NOTHING_FOUND, NoProgress, PageScraper, Providers, RefineRequest,
	ResearchRequest, ResearchService, ResearchStatus, SubqueriesRequest, prompts::PromptKind,
};
use delve_testkit::{
	INCOHERENT_REPLY, RecordingProgress, ScriptedModel, StubScraper, StubSearch, TempHistoryDir,
};

const EIFFEL: &str = "Why was the Eiffel Tower built?";
const DESIGNER: &str = "Who designed the Eiffel Tower?";
const FAIR: &str = "What event was the Eiffel Tower built for?";
const EIFFEL_REPLY: &str =
	"1. Who designed the Eiffel Tower?\n2. What event was the Eiffel Tower built for?";

struct Harness {
	dir: TempHistoryDir,
	model: Arc<ScriptedModel>,
	search: Arc<StubSearch>,
	scraper: Arc<StubScraper>,
	service: ResearchService,
}

fn harness(model: ScriptedModel, search: StubSearch, scraper: StubScraper) -> Harness {
	let dir = TempHistoryDir::new().expect("Failed to create temp history dir.");
	let model = Arc::new(model);
	let search = Arc::new(search);
	let scraper = Arc::new(scraper);
	let providers = Providers::new(model.clone(), search.clone(), scraper.clone());
	let service = ResearchService::with_providers(
		delve_testkit::test_config(dir.path()),
		dir.store(),
		providers,
	);

	Harness { dir, model, search, scraper, service }
}

fn long_text(topic: &str) -> String {
	format!("{topic} ").repeat(20)
}

fn request(query: &str, k: u32, n: u32) -> ResearchRequest {
	ResearchRequest { query: query.to_string(), k: Some(k), n: Some(n), subqueries: None }
}

fn with_subqueries(query: &str, subqueries: &[&str], n: u32) -> ResearchRequest {
	ResearchRequest {
		query: query.to_string(),
		k: None,
		n: Some(n),
		subqueries: Some(subqueries.iter().map(|item| item.to_string()).collect()),
	}
}

fn eiffel_harness() -> Harness {
	let search = StubSearch::new()
		.with_results(DESIGNER, &["https://shared.example/tower", "https://a.example/designer"])
		.with_results(FAIR, &["https://shared.example/tower", "https://b.example/fair"]);
	let scraper = StubScraper::new()
		.with_page("https://shared.example/tower", "Tower", &long_text("Gustave Eiffel"))
		.with_page("https://a.example/designer", "Designer", &long_text("Koechlin"))
		.with_page("https://b.example/fair", "Fair", &long_text("Exposition Universelle"));

	harness(ScriptedModel::new(EIFFEL_REPLY), search, scraper)
}

#[tokio::test]
async fn eiffel_tower_question_cites_one_url_per_subquery() {
	let h = eiffel_harness();
	let response =
		h.service.research(request(EIFFEL, 2, 1), &NoProgress).await.expect("Research failed.");
	let result = response.result;

	assert_eq!(result.subqueries, vec![DESIGNER.to_string(), FAIR.to_string()]);
	assert_eq!(result.sources.len(), 2);
	assert_eq!(result.sources[0].urls, vec!["https://shared.example/tower".to_string()]);
	assert_eq!(result.sources[1].urls, vec!["https://b.example/fair".to_string()]);
	assert_eq!(result.status, ResearchStatus::Complete);
	assert!(result.coherent);
	assert!(result.shortfalls.is_empty());
	assert_eq!(result.synthesis, "Synthesis of the sources.");

	assert_eq!(h.scraper.calls(), 2);
	assert_eq!(h.model.calls(PromptKind::Subqueries), 1);
	assert_eq!(h.model.calls(PromptKind::Relevance), 2);
	assert_eq!(h.model.calls(PromptKind::Synthesis), 1);
	assert_eq!(h.model.calls(PromptKind::Validation), 1);

	let filename = response.filename.expect("Research should be saved.");
	let entries = h.dir.store().load(&filename).await.expect("Failed to load history.");

	assert_eq!(entries.len(), 1);
	assert_eq!(entries[0].display_query, EIFFEL);
	assert_eq!((entries[0].k, entries[0].n), (2, 1));
	assert_eq!(entries[0].sources_by_subquery, result.sources);
}

#[tokio::test]
async fn progress_reports_milestones_in_order() {
	let h = eiffel_harness();
	let progress = RecordingProgress::new();

	h.service.run(request(EIFFEL, 2, 1), &progress).await.expect("Research failed.");

	let events = progress.events();
	let first = events.first().expect("No progress reported.");
	let last = events.last().expect("No progress reported.");

	assert_eq!((first.step_index, first.percent), (Stage::Preparing.index(), 0));
	assert_eq!((last.step_index, last.percent), (Stage::Done.index(), 100));
	assert!(events.windows(2).all(|pair| pair[0].percent <= pair[1].percent));
	assert!(events.windows(2).all(|pair| pair[0].step_index <= pair[1].step_index));
	assert!(events.iter().all(|event| event.step_index != Stage::CheckingRelevance.index()));
	assert!(events.iter().any(|event| {
		event.step_index == Stage::Judging.index()
			&& event.percent == 70
			&& event.message.ends_with(FAIR)
	}));
	assert!(events.iter().any(|event| event.step_index == Stage::Validating.index()));
}

#[tokio::test]
async fn no_search_results_fail_before_scraping() {
	let h = harness(ScriptedModel::new(EIFFEL_REPLY), StubSearch::new(), StubScraper::new());
	let err = h.service.run(request(EIFFEL, 2, 1), &NoProgress).await.expect_err("Run should fail.");

	assert!(matches!(err, Error::NoUrlsToScrape));
	assert_eq!(h.search.calls(), 2);
	assert_eq!(h.scraper.calls(), 0);
	assert_eq!(h.model.calls(PromptKind::Relevance), 0);
	assert_eq!(h.model.calls(PromptKind::Synthesis), 0);
}

#[tokio::test]
async fn empty_pages_fall_back_without_synthesis_calls() {
	let search = StubSearch::new()
		.with_results(DESIGNER, &["https://a.example/empty"])
		.with_results(FAIR, &["https://b.example/empty"]);
	let scraper = StubScraper::new()
		.with_page("https://a.example/empty", "Empty", "")
		.with_page("https://b.example/empty", "Blank", "   ");
	let h = harness(ScriptedModel::new(EIFFEL_REPLY), search, scraper);
	let result = h.service.run(request(EIFFEL, 2, 1), &NoProgress).await.expect("Research failed.");

	assert_eq!(result.synthesis, NOTHING_FOUND);
	assert_eq!(result.status, ResearchStatus::NothingFound);
	assert!(!result.coherent);
	assert!(result.sources.iter().all(|group| group.urls.is_empty()));
	assert_eq!(result.shortfalls.len(), 2);
	assert_eq!(h.model.calls(PromptKind::Relevance), 0);
	assert_eq!(h.model.calls(PromptKind::Synthesis), 0);
	assert_eq!(h.model.calls(PromptKind::Validation), 0);
}

#[tokio::test]
async fn always_incoherent_validation_returns_last_draft() {
	let model = ScriptedModel::new(EIFFEL_REPLY)
		.with_synthesis(&["draft one", "draft two", "draft three"])
		.with_validation(INCOHERENT_REPLY);
	let h = harness(
		model,
		StubSearch::new().with_results("q", &["https://a.example/page"]),
		StubScraper::new().with_page("https://a.example/page", "Page", &long_text("fact")),
	);
	let result = h
		.service
		.run(with_subqueries(EIFFEL, &["q"], 1), &NoProgress)
		.await
		.expect("Research failed.");

	assert_eq!(result.synthesis, "draft three");
	assert!(!result.coherent);
	assert_eq!(result.status, ResearchStatus::Complete);
	assert_eq!(h.model.calls(PromptKind::Synthesis), 3);
	assert_eq!(h.model.calls(PromptKind::Validation), 3);
}

#[tokio::test]
async fn unparseable_validation_counts_as_incoherent() {
	let model = ScriptedModel::new(EIFFEL_REPLY)
		.with_synthesis(&["first", "second"])
		.with_validation("Looks fine to me!");
	let h = harness(
		model,
		StubSearch::new().with_results("q", &["https://a.example/page"]),
		StubScraper::new().with_page("https://a.example/page", "Page", &long_text("fact")),
	);
	let result = h
		.service
		.run(with_subqueries(EIFFEL, &["q"], 1), &NoProgress)
		.await
		.expect("Research failed.");

	assert_eq!(result.synthesis, "second");
	assert!(!result.coherent);
	assert_eq!(h.model.calls(PromptKind::Validation), 3);
}

#[tokio::test]
async fn generator_failure_is_fatal() {
	let h = harness(
		ScriptedModel::new(EIFFEL_REPLY).failing(PromptKind::Synthesis),
		StubSearch::new().with_results("q", &["https://a.example/page"]),
		StubScraper::new().with_page("https://a.example/page", "Page", "Short but useful."),
	);
	let err = h
		.service
		.run(with_subqueries(EIFFEL, &["q"], 1), &NoProgress)
		.await
		.expect_err("Run should fail.");

	assert!(matches!(err, Error::Provider { .. }));
	assert_eq!(h.model.calls(PromptKind::Validation), 0);
}

#[tokio::test]
async fn subquery_failure_is_fatal() {
	let h = harness(
		ScriptedModel::new(EIFFEL_REPLY).failing(PromptKind::Subqueries),
		StubSearch::new(),
		StubScraper::new(),
	);
	let err = h.service.run(request(EIFFEL, 2, 1), &NoProgress).await.expect_err("Run should fail.");

	assert!(matches!(err, Error::Provider { .. }));
	assert_eq!(h.search.calls(), 0);
}

#[tokio::test]
async fn judge_failures_count_as_irrelevant() {
	let h = harness(
		ScriptedModel::new(EIFFEL_REPLY).failing(PromptKind::Relevance),
		StubSearch::new().with_results("q", &["https://a.example/long", "https://b.example/short"]),
		StubScraper::new()
			.with_page("https://a.example/long", "Long", &long_text("detail"))
			.with_page("https://b.example/short", "Short", "Short but useful."),
	);
	let result = h
		.service
		.run(with_subqueries(EIFFEL, &["q"], 2), &NoProgress)
		.await
		.expect("Research failed.");

	assert_eq!(result.sources[0].urls, vec!["https://b.example/short".to_string()]);
	assert_eq!(result.status, ResearchStatus::Partial);
	assert_eq!(result.shortfalls[0].found, 1);
}

#[tokio::test]
async fn replacement_search_fills_the_gap_within_n() {
	let urls = [
		"https://a.example/off-topic",
		"https://b.example/short",
		"https://c.example/long",
		"https://d.example/long",
	];
	let model = ScriptedModel::new(EIFFEL_REPLY).with_irrelevant_marker("OFF-TOPIC");
	let scraper = StubScraper::new()
		.with_page(urls[0], "Off", &long_text("OFF-TOPIC"))
		.with_page(urls[1], "Short", "Short but useful.")
		.with_page(urls[2], "Long", &long_text("on topic"))
		.with_page(urls[3], "Longer", &long_text("also on topic"));
	let h = harness(model, StubSearch::new().with_results("q", &urls), scraper);
	let progress = RecordingProgress::new();
	let result =
		h.service.run(with_subqueries(EIFFEL, &["q"], 2), &progress).await.expect("Research failed.");

	assert_eq!(
		result.sources[0].urls,
		vec!["https://b.example/short".to_string(), "https://c.example/long".to_string()]
	);
	assert_eq!(result.status, ResearchStatus::Complete);
	assert_eq!(h.search.requests(), vec![("q".to_string(), 5), ("q".to_string(), 10)]);

	let mut scraped = h.scraper.scraped();

	scraped.sort();

	assert_eq!(scraped, urls[..3].to_vec());
	assert!(
		progress
			.events()
			.iter()
			.any(|event| event.step_index == Stage::SearchingReplacements.index())
	);
}

#[tokio::test]
async fn replacement_loop_stops_at_attempt_cap() {
	let urls = (0..20).map(|i| format!("https://example.com/{i}")).collect::<Vec<_>>();
	let url_refs = urls.iter().map(String::as_str).collect::<Vec<_>>();
	let scraper = urls.iter().fold(StubScraper::new(), |scraper, url| {
		scraper.with_page(url.as_str(), "Noise", &long_text("OFF-TOPIC"))
	});
	let h = harness(
		ScriptedModel::new(EIFFEL_REPLY).with_irrelevant_marker("OFF-TOPIC"),
		StubSearch::new().with_results("q", &url_refs),
		scraper,
	);
	let result = h
		.service
		.run(with_subqueries(EIFFEL, &["q"], 3), &NoProgress)
		.await
		.expect("Research failed.");

	// Three initial URLs plus the five new URLs one subquery may attempt.
	assert_eq!(h.scraper.calls(), 8);
	assert_eq!(h.search.calls(), 2);
	assert_eq!(result.status, ResearchStatus::NothingFound);
	assert_eq!(result.shortfalls[0].found, 0);
	assert_eq!(result.shortfalls[0].wanted, 3);
}

#[tokio::test]
async fn replacement_loop_stops_when_no_new_url_appears() {
	let h = harness(
		ScriptedModel::new(EIFFEL_REPLY).with_irrelevant_marker("OFF-TOPIC"),
		StubSearch::new().with_results("q", &["https://a.example/only"]),
		StubScraper::new().with_page("https://a.example/only", "Only", &long_text("OFF-TOPIC")),
	);
	let result = h
		.service
		.run(with_subqueries(EIFFEL, &["q"], 1), &NoProgress)
		.await
		.expect("Research failed.");

	assert_eq!(h.search.calls(), 2);
	assert_eq!(h.scraper.calls(), 1);
	assert_eq!(result.synthesis, NOTHING_FOUND);
}

#[tokio::test]
async fn supplied_subqueries_skip_generation() {
	let h = eiffel_harness();
	let result = h
		.service
		.run(with_subqueries(EIFFEL, &[DESIGNER, "  ", FAIR], 1), &NoProgress)
		.await
		.expect("Research failed.");

	assert_eq!(result.subqueries, vec![DESIGNER.to_string(), FAIR.to_string()]);
	assert_eq!(h.model.calls(PromptKind::Subqueries), 0);
}

#[tokio::test]
async fn short_subquery_reply_is_backfilled() {
	let h = harness(ScriptedModel::new("1. Only one"), StubSearch::new(), StubScraper::new());
	let response = h
		.service
		.generate_subqueries(
			SubqueriesRequest { query: EIFFEL.to_string(), k: Some(3) },
			&NoProgress,
		)
		.await
		.expect("Generation failed.");

	assert_eq!(response.subqueries, vec!["Only one", EIFFEL, EIFFEL]);
	assert_eq!(response.backfilled, 2);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
	let h = eiffel_harness();

	for req in [request("   ", 2, 1), request(EIFFEL, 0, 1), request(EIFFEL, 2, 11)] {
		let err = h.service.run(req, &NoProgress).await.expect_err("Request should be rejected.");

		assert!(matches!(err, Error::InvalidRequest { .. }));
	}

	let err = h
		.service
		.run(with_subqueries(EIFFEL, &["  "], 1), &NoProgress)
		.await
		.expect_err("Blank subqueries should be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert_eq!(h.model.calls(PromptKind::Subqueries), 0);
}

#[tokio::test]
async fn refine_appends_to_the_conversation() {
	let h = eiffel_harness();
	let first =
		h.service.research(request(EIFFEL, 2, 1), &NoProgress).await.expect("Research failed.");
	let filename = first.filename.expect("Research should be saved.");
	let refined = h
		.service
		.refine(
			RefineRequest {
				filename: filename.clone(),
				question: "How tall is it?".to_string(),
				k: None,
				n: None,
			},
			&NoProgress,
		)
		.await
		.expect("Refine failed.");

	assert_eq!(refined.filename.as_deref(), Some(filename.as_str()));

	let history = h.service.get_history(&filename).await.expect("Failed to load history.");

	assert_eq!(history.entries.len(), 2);
	assert_eq!(history.entries[1].display_query, "How tall is it?");
	assert_eq!((history.entries[1].k, history.entries[1].n), (2, 1));
	assert!(history.entries[1].full_query.starts_with("Research context:\nQuery: Why was"));
	assert!(history.entries[1].full_query.ends_with("\n\nNew request: How tall is it?"));
	assert_eq!(h.service.list_history().await.expect("Failed to list.").len(), 1);
}

#[tokio::test]
async fn refine_rejects_unknown_or_blank_input() {
	let h = eiffel_harness();
	let missing = h
		.service
		.refine(
			RefineRequest {
				filename: "20240101-000000_abcdef.json".to_string(),
				question: "Anything?".to_string(),
				k: None,
				n: None,
			},
			&NoProgress,
		)
		.await
		.expect_err("Missing file should fail.");

	assert!(matches!(missing, Error::NotFound { .. }));

	let blank = h
		.service
		.refine(
			RefineRequest {
				filename: "20240101-000000_abcdef.json".to_string(),
				question: " ".to_string(),
				k: None,
				n: None,
			},
			&NoProgress,
		)
		.await
		.expect_err("Blank question should fail.");

	assert!(matches!(blank, Error::InvalidRequest { .. }));
}

/// Scraper that holds every page briefly and records the peak number of pages in flight.
#[derive(Default)]
struct GaugedScraper {
	in_flight: AtomicUsize,
	peak: AtomicUsize,
	calls: AtomicUsize,
}
impl PageScraper for GaugedScraper {
	fn scrape<'a>(&'a self, _cfg: &'a ScraperConfig, url: &'a str) -> BoxFuture<'a, ScrapedPage> {
		Box::pin(async move {
			let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;

			self.peak.fetch_max(now, Ordering::SeqCst);
			self.calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(Duration::from_millis(20)).await;
			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			ScrapedPage {
				title: url.to_string(),
				paragraphs: long_text("Exposition Universelle"),
				error: None,
			}
		})
	}
}

#[tokio::test]
async fn failed_scrape_does_not_abort_its_siblings() {
	let h = harness(
		ScriptedModel::new(EIFFEL_REPLY),
		StubSearch::new().with_results("q", &["https://a.example/broken", "https://b.example/ok"]),
		StubScraper::new().with_page("https://b.example/ok", "Ok", &long_text("Gustave Eiffel")),
	);
	let result = h
		.service
		.run(with_subqueries(EIFFEL, &["q"], 2), &NoProgress)
		.await
		.expect("Research failed.");
	let mut scraped = h.scraper.scraped();

	scraped.sort();

	assert_eq!(scraped, vec!["https://a.example/broken", "https://b.example/ok"]);
	assert_eq!(result.sources[0].urls, vec!["https://b.example/ok".to_string()]);
	assert_eq!(result.status, ResearchStatus::Partial);
	assert_eq!(h.model.calls(PromptKind::Relevance), 1);
	assert_eq!(h.model.calls(PromptKind::Synthesis), 1);
}

#[tokio::test]
async fn scrape_fan_out_stays_within_max_threads() {
	let dir = TempHistoryDir::new().expect("Failed to create temp history dir.");
	let cfg = delve_testkit::test_config(dir.path());
	let max_threads = cfg.research.max_threads as usize;
	let subqueries = ["first", "second", "third"];
	let search = subqueries.iter().fold(StubSearch::new(), |search, subquery| {
		let urls = (0..3).map(|i| format!("https://{subquery}.example/{i}")).collect::<Vec<_>>();
		let url_refs = urls.iter().map(String::as_str).collect::<Vec<_>>();

		search.with_results(*subquery, &url_refs)
	});
	let scraper = Arc::new(GaugedScraper::default());
	let providers =
		Providers::new(Arc::new(ScriptedModel::new(EIFFEL_REPLY)), Arc::new(search), scraper.clone());
	let service = ResearchService::with_providers(cfg, dir.store(), providers);
	let result = service
		.run(with_subqueries(EIFFEL, &subqueries, 3), &NoProgress)
		.await
		.expect("Research failed.");
	let peak = scraper.peak.load(Ordering::SeqCst);

	assert_eq!(scraper.calls.load(Ordering::SeqCst), 9);
	assert!(peak <= max_threads, "peak {peak} exceeded {max_threads}");
	assert!(peak > 1, "scrapes never overlapped");
	assert_eq!(result.status, ResearchStatus::Complete);
	assert!(result.sources.iter().all(|group| group.urls.len() == 3));
}

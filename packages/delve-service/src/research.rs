//! The research run as a closed set of phases advanced by one transition function.

use serde::{Deserialize, Serialize};

use crate::{Error, ProgressSink, ResearchService, Result, relevance::SubquerySlot};
use delve_config::MAX_FAN_OUT;
use delve_domain::{
	document::{RelevantDocument, ScrapeTask, ScrapedDocument},
	progress::{Progress, Stage},
	sources::{self, SubquerySources},
	visited::VisitedUrls,
};
use delve_storage::models::HistoryEntry;

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchRequest {
	pub query: String,
	pub k: Option<u32>,
	pub n: Option<u32>,
	/// Pre-generated subqueries; the run then skips generation and `k` is their count.
	#[serde(default)]
	pub subqueries: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
	Complete,
	/// At least one subquery found fewer than `n` relevant documents.
	Partial,
	/// No document survived filtering; the synthesis is the fallback text.
	NothingFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
	pub subquestion: String,
	pub found: usize,
	pub wanted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
	pub query: String,
	pub subqueries: Vec<String>,
	pub sources: Vec<SubquerySources>,
	pub synthesis: String,
	pub status: ResearchStatus,
	pub shortfalls: Vec<Shortfall>,
	pub coherent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResearchResponse {
	/// History file the run was saved to, if it was saved.
	pub filename: Option<String>,
	pub result: ResearchResult,
}

pub(crate) fn validate_query(query: &str) -> Result<&str> {
	let query = query.trim();

	if query.is_empty() {
		return Err(Error::InvalidRequest { message: "query must not be empty.".to_string() });
	}

	Ok(query)
}

pub(crate) fn resolve_count(field: &str, value: Option<u32>, default: u32) -> Result<usize> {
	let value = value.unwrap_or(default);

	if !(1..=MAX_FAN_OUT).contains(&value) {
		return Err(Error::InvalidRequest {
			message: format!("{field} must be in the range 1-{MAX_FAN_OUT}."),
		});
	}

	Ok(value as usize)
}

/// Workflow state between transitions. Each variant carries what the next step consumes.
enum Phase {
	GeneratingSubqueries { k: usize },
	CollectingUrls { subqueries: Vec<String> },
	Scraping { subqueries: Vec<String>, tasks: Vec<ScrapeTask> },
	Filtering { subqueries: Vec<String>, scraped: Vec<Vec<ScrapedDocument>> },
	Synthesizing {
		subqueries: Vec<String>,
		pool: Vec<RelevantDocument>,
		shortfalls: Vec<Shortfall>,
	},
	Done(ResearchResult),
}

/// Run-scoped inputs shared by every phase.
struct Run<'a> {
	service: &'a ResearchService,
	progress: &'a dyn ProgressSink,
	query: &'a str,
	n: usize,
	visited: VisitedUrls,
}
impl Run<'_> {
	async fn advance(&mut self, phase: Phase) -> Result<Phase> {
		match phase {
			Phase::GeneratingSubqueries { k } => {
				self.progress.notify(&Progress::at(Stage::GeneratingSubqueries));

				let generated = self.service.decompose(self.query, k).await?;

				Ok(Phase::CollectingUrls { subqueries: generated.items })
			},
			Phase::CollectingUrls { subqueries } => {
				self.progress.notify(&Progress::at(Stage::CollectingUrls));

				let tasks = self.service.collect_urls(&subqueries, self.n, &mut self.visited).await;

				if tasks.is_empty() {
					tracing::error!(query = self.query, "Search returned no URL for any subquery.");

					return Err(Error::NoUrlsToScrape);
				}

				Ok(Phase::Scraping { subqueries, tasks })
			},
			Phase::Scraping { subqueries, tasks } => {
				self.progress.notify(&Progress::at(Stage::Scraping));

				let scraped = self.service.scrape_all(tasks, subqueries.len()).await;

				Ok(Phase::Filtering { subqueries, scraped })
			},
			Phase::Filtering { subqueries, scraped } => {
				self.progress.notify(&Progress::at(Stage::Judging));

				let total = subqueries.len();
				let mut pool = Vec::new();
				let mut shortfalls = Vec::new();

				for (slot, (subquestion, documents)) in subqueries.iter().zip(scraped).enumerate() {
					let target =
						SubquerySlot { query: self.query, slot, subquestion, total, wanted: self.n };
					let kept = self
						.service
						.filter_subquery(&target, documents, &mut self.visited, self.progress)
						.await?;

					if kept.len() < self.n {
						tracing::warn!(
							subquestion = %subquestion,
							found = kept.len(),
							wanted = self.n,
							"Subquery is short of relevant documents."
						);

						shortfalls.push(Shortfall {
							subquestion: subquestion.clone(),
							found: kept.len(),
							wanted: self.n,
						});
					}

					pool.extend(kept);
				}

				Ok(Phase::Synthesizing { subqueries, pool, shortfalls })
			},
			Phase::Synthesizing { subqueries, pool, shortfalls } => {
				self.progress.notify(&Progress::at(Stage::Synthesizing));

				let synthesis = self.service.synthesize(self.query, &pool, self.progress).await?;
				let status = if pool.is_empty() {
					ResearchStatus::NothingFound
				} else if shortfalls.is_empty() {
					ResearchStatus::Complete
				} else {
					ResearchStatus::Partial
				};

				tracing::info!(
					documents = pool.len(),
					attempts = synthesis.attempts,
					coherent = synthesis.coherent,
					"Research finished."
				);

				Ok(Phase::Done(ResearchResult {
					query: self.query.to_string(),
					sources: sources::group_sources(&subqueries, &pool),
					subqueries,
					synthesis: synthesis.text,
					status,
					shortfalls,
					coherent: synthesis.coherent,
				}))
			},
			Phase::Done(result) => Ok(Phase::Done(result)),
		}
	}
}

impl ResearchService {
	/// Runs the pipeline without touching history.
	pub async fn run(
		&self,
		req: ResearchRequest,
		progress: &dyn ProgressSink,
	) -> Result<ResearchResult> {
		let query = validate_query(&req.query)?;
		let n = resolve_count("n", req.n, self.cfg.research.results_per_subquery)?;
		let mut phase = match req.subqueries {
			Some(subqueries) => {
				let subqueries = subqueries
					.into_iter()
					.map(|item| item.trim().to_string())
					.filter(|item| !item.is_empty())
					.collect::<Vec<_>>();

				resolve_count("subqueries", Some(subqueries.len() as u32), 0)?;

				Phase::CollectingUrls { subqueries }
			},
			None => Phase::GeneratingSubqueries {
				k: resolve_count("k", req.k, self.cfg.research.subqueries)?,
			},
		};
		let mut run = Run { service: self, progress, query, n, visited: VisitedUrls::new() };

		progress.notify(&Progress::at(Stage::Preparing));
		tracing::info!(query, n, "Research started.");

		let result = loop {
			phase = match phase {
				Phase::Done(result) => break result,
				other => run.advance(other).await?,
			};
		};

		progress.notify(&Progress::at(Stage::Done));

		Ok(result)
	}

	/// Runs the pipeline and saves the result as a new conversation.
	pub async fn research(
		&self,
		req: ResearchRequest,
		progress: &dyn ProgressSink,
	) -> Result<ResearchResponse> {
		let display_query = req.query.trim().to_string();
		let n = resolve_count("n", req.n, self.cfg.research.results_per_subquery)?;
		let result = self.run(req, progress).await?;
		let entry = history_entry(&result, &display_query, n)?;
		let filename = self.history.create(entry).await?;

		Ok(ResearchResponse { filename: Some(filename), result })
	}
}

pub(crate) fn history_entry(
	result: &ResearchResult,
	display_query: &str,
	n: usize,
) -> Result<HistoryEntry> {
	Ok(HistoryEntry {
		full_query: result.query.clone(),
		display_query: display_query.to_string(),
		k: result.subqueries.len() as u32,
		n: n as u32,
		result: result.synthesis.clone(),
		subqueries: result.subqueries.clone(),
		sources_by_subquery: result.sources.clone(),
		timestamp: delve_storage::history::now_timestamp()?,
	})
}

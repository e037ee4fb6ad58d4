use crate::{ProgressSink, ResearchService, Result, prompts};
use delve_domain::{
	document::{self, RelevantDocument, ScrapeTask, ScrapedDocument, Triage},
	progress::{self, Progress, Stage},
	reply::{self, RelevanceVerdict},
	retry::{self, Bounded},
	visited::VisitedUrls,
};

/// What filtering one subquery needs to know about its place in the run.
pub(crate) struct SubquerySlot<'a> {
	pub(crate) query: &'a str,
	pub(crate) slot: usize,
	pub(crate) subquestion: &'a str,
	pub(crate) total: usize,
	pub(crate) wanted: usize,
}

impl ResearchService {
	/// Keeps up to `wanted` relevant documents for one subquery, searching for replacements
	/// when the first batch falls short.
	pub(crate) async fn filter_subquery(
		&self,
		target: &SubquerySlot<'_>,
		documents: Vec<ScrapedDocument>,
		visited: &mut VisitedUrls,
		progress: &dyn ProgressSink,
	) -> Result<Vec<RelevantDocument>> {
		let percent = progress::judging_percent(target.slot, target.total);

		progress.notify(&Progress::detailed(Stage::Judging, percent, target.subquestion));

		let mut kept = Vec::with_capacity(target.wanted);

		for document in documents {
			if kept.len() >= target.wanted {
				break;
			}
			if let Some(relevant) = self.judge(target.query, document).await {
				kept.push(relevant);
			}
		}

		if kept.len() >= target.wanted {
			return Ok(kept);
		}

		progress.notify(&Progress::detailed(
			Stage::SearchingReplacements,
			percent,
			target.subquestion,
		));
		tracing::info!(
			subquestion = target.subquestion,
			found = kept.len(),
			wanted = target.wanted,
			"Searching for replacement documents."
		);

		let mut replacement = Replacement {
			service: self,
			target,
			visited,
			kept,
			attempted: 0,
			max_attempts: self.cfg.research.max_new_url_attempts as usize,
		};
		let outcome = retry::attempt(self.cfg.research.max_retry_rounds, &mut replacement).await?;

		tracing::info!(
			subquestion = target.subquestion,
			rounds = outcome.attempts(),
			attempted = replacement.attempted,
			found = replacement.kept.len(),
			"Replacement search finished."
		);

		Ok(replacement.kept)
	}

	/// Triage, then the relevance judge. `None` means the document contributes nothing.
	pub(crate) async fn judge(
		&self,
		query: &str,
		document: ScrapedDocument,
	) -> Option<RelevantDocument> {
		match document::triage(&document.paragraphs, self.cfg.research.short_document_chars) {
			Triage::Discard => {
				tracing::debug!(url = %document.url, "Discarding blank document.");

				None
			},
			Triage::AcceptRaw => Some(document.into_raw_relevant()),
			Triage::Judge => {
				let messages =
					prompts::relevance(query, &document.subquestion, &document.paragraphs);
				let reply = match self.chat(&messages).await {
					Ok(reply) => reply,
					Err(err) => {
						tracing::warn!(url = %document.url, error = %err, "Relevance judge failed.");

						return None;
					},
				};
				let verdict = match reply::parse_json_reply::<RelevanceVerdict>(&reply) {
					Ok(verdict) => verdict,
					Err(err) => {
						tracing::warn!(
							url = %document.url,
							error = %err,
							"Relevance reply is not valid JSON."
						);

						return None;
					},
				};

				if !verdict.is_relevant {
					tracing::debug!(url = %document.url, "Document judged irrelevant.");

					return None;
				}

				match verdict.summary.filter(|summary| !summary.trim().is_empty()) {
					Some(summary) => Some(document.into_relevant(summary)),
					None => Some(document.into_raw_relevant()),
				}
			},
		}
	}
}

/// One replacement round per attempt: a wider search, then new URLs one by one.
struct Replacement<'a, 'v> {
	service: &'a ResearchService,
	target: &'a SubquerySlot<'a>,
	visited: &'v mut VisitedUrls,
	kept: Vec<RelevantDocument>,
	attempted: usize,
	max_attempts: usize,
}
impl Bounded for Replacement<'_, '_> {
	type Error = crate::Error;
	/// Relevant documents held after the round.
	type Output = usize;

	async fn run(&mut self, round: u32) -> Result<Option<usize>> {
		if self.attempted >= self.max_attempts {
			return Ok(None);
		}

		let count = (self.max_attempts as u32).saturating_mul(2).saturating_mul(round);
		let hits = self.service.search(self.target.subquestion, count).await;
		let mut fresh = 0;

		for hit in hits {
			if self.kept.len() >= self.target.wanted || self.attempted >= self.max_attempts {
				break;
			}
			if hit.url.trim().is_empty() || !self.visited.insert(&hit.url) {
				continue;
			}

			fresh += 1;
			self.attempted += 1;

			let task = ScrapeTask {
				slot: self.target.slot,
				url: hit.url,
				subquestion: self.target.subquestion.to_string(),
			};

			if let Some(document) = self.service.scrape_one(&task).await
				&& let Some(relevant) = self.service.judge(self.target.query, document).await
			{
				tracing::info!(url = %task.url, "Replacement document accepted.");

				self.kept.push(relevant);
			}
		}

		if fresh == 0 {
			tracing::info!(round, subquestion = self.target.subquestion, "No new URL found.");

			return Ok(None);
		}

		Ok(Some(self.kept.len()))
	}

	fn is_acceptable(&self, found: &usize) -> bool {
		*found >= self.target.wanted
	}
}

use crate::{Error, ProgressSink, ResearchService, Result, prompts};
use delve_domain::{
	document::RelevantDocument,
	progress::{Progress, Stage},
	reply::{self, CoherenceVerdict},
	retry::{self, Bounded},
};

/// Returned in place of a synthesis when no document survived filtering.
pub const NOTHING_FOUND: &str = "I could not find relevant information on the web to answer \
	your question. Please try another phrasing or a different topic.";

#[derive(Debug, Clone)]
pub(crate) struct Synthesis {
	pub(crate) text: String,
	pub(crate) coherent: bool,
	pub(crate) attempts: u32,
}

#[derive(Debug, Clone)]
struct Draft {
	text: String,
	verdict: CoherenceVerdict,
}

impl ResearchService {
	/// Writes the synthesis and regenerates it until the validator accepts it or the attempt
	/// cap is hit, in which case the last draft is kept.
	pub(crate) async fn synthesize(
		&self,
		query: &str,
		pool: &[RelevantDocument],
		progress: &dyn ProgressSink,
	) -> Result<Synthesis> {
		if pool.is_empty() {
			tracing::warn!("No relevant document to synthesise; returning the fallback answer.");

			return Ok(Synthesis { text: NOTHING_FOUND.to_string(), coherent: false, attempts: 0 });
		}

		let max_attempts = self.cfg.research.max_synthesis_attempts;
		let mut coherence = Coherence { service: self, query, pool, progress, max_attempts };
		let outcome = retry::attempt(max_attempts, &mut coherence).await?;
		let attempts = outcome.attempts();
		let coherent = outcome.is_accepted();
		let Some(draft) = outcome.into_last() else {
			return Err(Error::InvalidRequest {
				message: "research.max_synthesis_attempts must be at least 1.".to_string(),
			});
		};

		if !coherent {
			tracing::warn!(
				attempts,
				reason = %draft.verdict.reason,
				"Synthesis still judged incoherent; keeping the last draft."
			);
		}

		Ok(Synthesis { text: draft.text, coherent, attempts })
	}

	async fn validate(
		&self,
		query: &str,
		synthesis: &str,
		pool: &[RelevantDocument],
	) -> CoherenceVerdict {
		let reply = match self.chat(&prompts::validation(query, synthesis, pool)).await {
			Ok(reply) => reply,
			Err(err) => {
				tracing::warn!(error = %err, "Coherence validator failed.");

				return CoherenceVerdict::format_error();
			},
		};

		reply::parse_json_reply(&reply).unwrap_or_else(|err| {
			tracing::warn!(error = %err, "Coherence reply is not valid JSON.");

			CoherenceVerdict::format_error()
		})
	}
}

/// Each attempt is a full regeneration; earlier drafts and verdicts are not fed back.
struct Coherence<'a> {
	service: &'a ResearchService,
	query: &'a str,
	pool: &'a [RelevantDocument],
	progress: &'a dyn ProgressSink,
	max_attempts: u32,
}
impl Bounded for Coherence<'_> {
	type Error = Error;
	type Output = Draft;

	async fn run(&mut self, attempt: u32) -> Result<Option<Draft>> {
		let detail = format!("attempt {attempt}/{}", self.max_attempts);

		self.progress.notify(&Progress::detailed(
			Stage::Synthesizing,
			Stage::Synthesizing.percent(),
			&detail,
		));

		let text = self.service.chat(&prompts::synthesis(self.query, self.pool)).await.map_err(
			|err| {
				tracing::error!(attempt, error = %err, "Synthesis generation failed.");

				Error::from(err)
			},
		)?;

		self.progress.notify(&Progress::detailed(
			Stage::Validating,
			Stage::Validating.percent(),
			&detail,
		));

		let verdict = self.service.validate(self.query, &text, self.pool).await;

		tracing::info!(
			attempt,
			coherent = verdict.is_coherent,
			reason = %verdict.reason,
			"Synthesis validated."
		);

		Ok(Some(Draft { text, verdict }))
	}

	fn is_acceptable(&self, draft: &Draft) -> bool {
		draft.verdict.is_coherent
	}
}

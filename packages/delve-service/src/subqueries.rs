use serde::{Deserialize, Serialize};

use crate::{Error, ProgressSink, ResearchService, Result, prompts, research};
use delve_domain::{
	progress::{Progress, Stage},
	subquery::{self, Subqueries},
};

#[derive(Debug, Clone, Deserialize)]
pub struct SubqueriesRequest {
	pub query: String,
	pub k: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubqueriesResponse {
	pub subqueries: Vec<String>,
	/// Trailing items that repeat the query because the model returned a short list.
	pub backfilled: usize,
}

impl ResearchService {
	/// Generates subqueries on their own, so a caller can review them before a run.
	pub async fn generate_subqueries(
		&self,
		req: SubqueriesRequest,
		progress: &dyn ProgressSink,
	) -> Result<SubqueriesResponse> {
		let query = research::validate_query(&req.query)?;
		let k = research::resolve_count("k", req.k, self.cfg.research.subqueries)?;

		progress.notify(&Progress::at(Stage::GeneratingSubqueries));

		let generated = self.decompose(query, k).await?;

		Ok(SubqueriesResponse { subqueries: generated.items, backfilled: generated.backfilled })
	}

	/// Asks the model for exactly `k` subqueries. A failed model call ends the run.
	pub(crate) async fn decompose(&self, query: &str, k: usize) -> Result<Subqueries> {
		let reply = self.chat(&prompts::subqueries(query, k)).await.map_err(|err| {
			tracing::error!(error = %err, "Subquery generation failed.");

			Error::from(err)
		})?;
		let generated = subquery::from_reply(&reply, query, k);

		if generated.backfilled > 0 {
			tracing::warn!(
				k,
				backfilled = generated.backfilled,
				"Model returned fewer subqueries than requested; repeating the root query."
			);
		}

		for (index, item) in generated.items.iter().enumerate() {
			tracing::debug!(index, subquery = %item, "Subquery generated.");
		}

		Ok(generated)
	}
}

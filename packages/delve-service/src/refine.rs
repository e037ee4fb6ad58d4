use serde::Deserialize;

use crate::{
	Error, ProgressSink, ResearchRequest, ResearchResponse, ResearchService, Result,
	research::{self, history_entry},
};
use delve_storage::models::HistoryEntry;

#[derive(Debug, Clone, Deserialize)]
pub struct RefineRequest {
	pub filename: String,
	pub question: String,
	/// Defaults to the `k` of the last entry.
	pub k: Option<u32>,
	/// Defaults to the `n` of the last entry.
	pub n: Option<u32>,
}

/// Prior queries and syntheses as context, followed by the new request.
pub fn composite_query(entries: &[HistoryEntry], question: &str) -> String {
	let context = entries
		.iter()
		.map(|entry| format!("Query: {}\nSynthesis: {}", entry.full_query, entry.result))
		.collect::<Vec<_>>()
		.join("\n\n");

	format!("Research context:\n{context}\n\nNew request: {question}")
}

impl ResearchService {
	/// Researches a follow-up question in the context of a saved conversation and appends the
	/// result to it.
	pub async fn refine(
		&self,
		req: RefineRequest,
		progress: &dyn ProgressSink,
	) -> Result<ResearchResponse> {
		let question = research::validate_query(&req.question)?.to_string();
		let entries = self.history.load(&req.filename).await?;
		let Some(last) = entries.last() else {
			return Err(Error::NotFound {
				message: format!("History file {} has no entries.", req.filename),
			});
		};
		let k = req.k.unwrap_or(last.k);
		let n = research::resolve_count("n", req.n.or(Some(last.n)), 0)?;
		let run = ResearchRequest {
			query: composite_query(&entries, &question),
			k: Some(k),
			n: Some(n as u32),
			subqueries: None,
		};

		tracing::info!(filename = %req.filename, prior = entries.len(), "Refining conversation.");

		let result = self.run(run, progress).await?;
		let entry = history_entry(&result, &question, n)?;

		self.history.append(&req.filename, entry).await?;

		Ok(ResearchResponse { filename: Some(req.filename), result })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(full_query: &str, result: &str) -> HistoryEntry {
		HistoryEntry {
			full_query: full_query.to_string(),
			display_query: full_query.to_string(),
			k: 2,
			n: 1,
			result: result.to_string(),
			subqueries: Vec::new(),
			sources_by_subquery: Vec::new(),
			timestamp: "20240131-154502".to_string(),
		}
	}

	#[test]
	fn composite_query_lists_every_prior_turn() {
		let entries = [entry("Why was it built?", "For the fair."), entry("Who built it?", "Eiffel.")];

		assert_eq!(
			composite_query(&entries, "How tall is it?"),
			"Research context:\nQuery: Why was it built?\nSynthesis: For the fair.\n\n\
			Query: Who built it?\nSynthesis: Eiffel.\n\nNew request: How tall is it?"
		);
	}
}

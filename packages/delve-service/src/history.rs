use serde::Serialize;

use crate::{ResearchService, Result};
use delve_storage::models::HistoryEntry;

pub use delve_storage::models::HistorySummary;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
	pub filename: String,
	pub entries: Vec<HistoryEntry>,
}

impl ResearchService {
	pub async fn list_history(&self) -> Result<Vec<HistorySummary>> {
		Ok(self.history.list().await?)
	}

	pub async fn get_history(&self, filename: &str) -> Result<HistoryResponse> {
		let entries = self.history.load(filename).await?;

		Ok(HistoryResponse { filename: filename.to_string(), entries })
	}

	pub async fn delete_history(&self, filename: &str) -> Result<()> {
		Ok(self.history.delete(filename).await?)
	}
}

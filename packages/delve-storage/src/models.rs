use serde::{Deserialize, Serialize};

use delve_domain::sources::SubquerySources;

/// One completed research run as persisted in a conversation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
	/// The query the pipeline actually ran, including any refinement context.
	#[serde(alias = "query")]
	pub full_query: String,
	#[serde(default)]
	pub display_query: String,
	#[serde(default)]
	pub k: u32,
	#[serde(default)]
	pub n: u32,
	/// Synthesis text.
	#[serde(default)]
	pub result: String,
	#[serde(default)]
	pub subqueries: Vec<String>,
	#[serde(default)]
	pub sources_by_subquery: Vec<SubquerySources>,
	#[serde(default)]
	pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryFile {
	pub initial_query: String,
	pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySummary {
	pub filename: String,
	pub display_name: String,
	pub timestamp: Option<String>,
}

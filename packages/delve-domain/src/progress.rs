use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Preparing,
	GeneratingSubqueries,
	CollectingUrls,
	Scraping,
	Judging,
	CheckingRelevance,
	SearchingReplacements,
	Synthesizing,
	Validating,
	Done,
}
impl Stage {
	pub const ALL: [Stage; 10] = [
		Stage::Preparing,
		Stage::GeneratingSubqueries,
		Stage::CollectingUrls,
		Stage::Scraping,
		Stage::Judging,
		Stage::CheckingRelevance,
		Stage::SearchingReplacements,
		Stage::Synthesizing,
		Stage::Validating,
		Stage::Done,
	];
	pub const COUNT: usize = Self::ALL.len();

	pub fn index(self) -> usize {
		self as usize
	}

	pub fn label(self) -> &'static str {
		match self {
			Self::Preparing => "Preparing research",
			Self::GeneratingSubqueries => "Generating subqueries",
			Self::CollectingUrls => "Collecting URLs for each subquery",
			Self::Scraping => "Scraping page contents",
			Self::Judging => "Summarising and judging documents",
			Self::CheckingRelevance => "Checking document relevance",
			Self::SearchingReplacements => "Searching replacement documents",
			Self::Synthesizing => "Writing the final synthesis",
			Self::Validating => "Checking synthesis coherence",
			Self::Done => "Research complete",
		}
	}

	/// Milestone percentage reported when the stage starts.
	pub fn percent(self) -> u8 {
		match self {
			Self::Preparing => 0,
			Self::GeneratingSubqueries => 5,
			Self::CollectingUrls => 20,
			Self::Scraping => 40,
			Self::Judging | Self::CheckingRelevance | Self::SearchingReplacements => 60,
			Self::Synthesizing => 85,
			Self::Validating => 90,
			Self::Done => 100,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
	pub percent: u8,
	pub message: String,
	pub step_index: usize,
}
impl Progress {
	pub fn at(stage: Stage) -> Self {
		Self { percent: stage.percent(), message: stage.label().to_string(), step_index: stage.index() }
	}

	/// Same stage, but with an explicit percentage and a detail appended to the label.
	pub fn detailed(stage: Stage, percent: u8, detail: &str) -> Self {
		Self {
			percent,
			message: format!("{}: {detail}", stage.label()),
			step_index: stage.index(),
		}
	}
}

/// Percentage while judging the subquery at `index` out of `total`; spans 60 to 80.
pub fn judging_percent(index: usize, total: usize) -> u8 {
	if total == 0 {
		return Stage::Judging.percent();
	}

	let offset = 20 * index.min(total) / total;

	Stage::Judging.percent() + offset as u8
}

use serde::{Deserialize, Serialize};

/// A dispatched scrape: one URL searched on behalf of one subquestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTask {
	/// Position of the subquestion in the run's subquery list. Subquestions may repeat.
	pub slot: usize,
	pub url: String,
	pub subquestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedDocument {
	pub url: String,
	pub subquestion: String,
	pub title: String,
	pub paragraphs: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantDocument {
	pub url: String,
	pub subquestion: String,
	pub title: String,
	pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triage {
	/// Long enough to be worth a relevance judgement.
	Judge,
	/// Short but non-blank; kept as-is with the raw text as its summary.
	AcceptRaw,
	Discard,
}

pub fn triage(text: &str, short_document_chars: usize) -> Triage {
	if text.chars().count() > short_document_chars {
		return Triage::Judge;
	}
	if text.trim().is_empty() {
		return Triage::Discard;
	}

	Triage::AcceptRaw
}

impl ScrapedDocument {
	pub fn into_relevant(self, summary: String) -> RelevantDocument {
		RelevantDocument { url: self.url, subquestion: self.subquestion, title: self.title, summary }
	}

	/// Keeps the raw paragraphs as the summary.
	pub fn into_raw_relevant(self) -> RelevantDocument {
		RelevantDocument {
			url: self.url,
			subquestion: self.subquestion,
			title: self.title,
			summary: self.paragraphs,
		}
	}
}

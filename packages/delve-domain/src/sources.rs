use serde::{Deserialize, Serialize};

use crate::document::RelevantDocument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubquerySources {
	pub subquestion: String,
	pub urls: Vec<String>,
}

/// Groups cited URLs by subquestion, in subquery order, without duplicates.
pub fn group_sources(subqueries: &[String], documents: &[RelevantDocument]) -> Vec<SubquerySources> {
	subqueries
		.iter()
		.map(|subquestion| {
			let mut urls: Vec<String> = Vec::new();

			for doc in documents.iter().filter(|doc| &doc.subquestion == subquestion) {
				if !urls.contains(&doc.url) {
					urls.push(doc.url.clone());
				}
			}

			SubquerySources { subquestion: subquestion.clone(), urls }
		})
		.collect()
}

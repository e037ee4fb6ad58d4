use futures::{StreamExt, stream};

use crate::ResearchService;
use delve_domain::document::{ScrapeTask, ScrapedDocument};

impl ResearchService {
	/// Scrapes every task with at most `max_threads` in flight and waits for all of them.
	///
	/// Returns one list per subquery slot, in task order. Failed pages are dropped.
	pub(crate) async fn scrape_all(
		&self,
		tasks: Vec<ScrapeTask>,
		slots: usize,
	) -> Vec<Vec<ScrapedDocument>> {
		let width = tasks.len().min(self.cfg.research.max_threads as usize).max(1);
		let results = stream::iter(tasks)
			.map(|task| async move {
				let document = self.scrape_one(&task).await;

				(task.slot, document)
			})
			.buffered(width)
			.collect::<Vec<_>>()
			.await;
		let mut grouped = vec![Vec::new(); slots];

		for (slot, document) in results {
			if let Some(document) = document
				&& let Some(group) = grouped.get_mut(slot)
			{
				group.push(document);
			}
		}

		grouped
	}

	pub(crate) async fn scrape_one(&self, task: &ScrapeTask) -> Option<ScrapedDocument> {
		let page = self.scrape_page(&task.url).await;

		if let Some(error) = &page.error {
			tracing::warn!(url = %task.url, error = %error, "Dropping page that failed to scrape.");

			return None;
		}

		tracing::debug!(url = %task.url, chars = page.paragraphs.chars().count(), "Page scraped.");

		Some(ScrapedDocument {
			url: task.url.clone(),
			subquestion: task.subquestion.clone(),
			title: page.title,
			paragraphs: page.paragraphs,
		})
	}
}

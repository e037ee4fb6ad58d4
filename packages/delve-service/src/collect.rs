use crate::ResearchService;
use delve_domain::{document::ScrapeTask, visited::VisitedUrls};

impl ResearchService {
	/// Picks up to `n` unvisited URLs per subquery, marking each one visited as it is kept.
	pub(crate) async fn collect_urls(
		&self,
		subqueries: &[String],
		n: usize,
		visited: &mut VisitedUrls,
	) -> Vec<ScrapeTask> {
		let count = (n as u32).saturating_add(self.cfg.research.search_padding);
		let mut tasks = Vec::with_capacity(subqueries.len() * n);

		for (slot, subquestion) in subqueries.iter().enumerate() {
			let hits = self.search(subquestion, count).await;
			let mut kept = 0;

			for hit in hits {
				if kept >= n {
					break;
				}
				if hit.url.trim().is_empty() || !visited.insert(&hit.url) {
					continue;
				}

				tasks.push(ScrapeTask { slot, url: hit.url, subquestion: subquestion.clone() });

				kept += 1;
			}

			tracing::info!(subquestion = %subquestion, kept, wanted = n, "URLs collected.");
		}

		tasks
	}
}

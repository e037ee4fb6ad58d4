use std::collections::HashSet;

/// URLs already dispatched for scraping during one research run. Only grows.
#[derive(Debug, Default, Clone)]
pub struct VisitedUrls {
	urls: HashSet<String>,
}
impl VisitedUrls {
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks `url` visited. Returns `false` when it already was.
	pub fn insert(&mut self, url: &str) -> bool {
		if self.urls.contains(url) {
			return false;
		}

		self.urls.insert(url.to_string())
	}

	pub fn contains(&self, url: &str) -> bool {
		self.urls.contains(url)
	}

	pub fn len(&self) -> usize {
		self.urls.len()
	}

	pub fn is_empty(&self) -> bool {
		self.urls.is_empty()
	}
}

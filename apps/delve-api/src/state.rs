use std::sync::Arc;

use delve_service::{Providers, ResearchService};
use delve_storage::HistoryStore;

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ResearchService>,
}
impl AppState {
	pub fn new(config: delve_config::Config) -> Self {
		Self { service: Arc::new(ResearchService::new(config)) }
	}

	pub fn with_providers(
		config: delve_config::Config,
		history: HistoryStore,
		providers: Providers,
	) -> Self {
		Self { service: Arc::new(ResearchService::with_providers(config, history, providers)) }
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("No valid URL to scrape.")]
	NoUrlsToScrape,
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
}
impl From<delve_providers::Error> for Error {
	fn from(err: delve_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<delve_storage::Error> for Error {
	fn from(err: delve_storage::Error) -> Self {
		match err {
			delve_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			delve_storage::Error::NotFound(message) => Self::NotFound { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}

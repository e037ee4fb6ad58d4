pub mod history;
pub mod models;

mod error;

pub use error::Error;
pub use history::HistoryStore;

pub type Result<T, E = Error> = std::result::Result<T, E>;

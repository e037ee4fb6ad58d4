pub mod document;
pub mod progress;
pub mod reply;
pub mod retry;
pub mod sources;
pub mod subquery;
pub mod visited;

//! Conversation history kept as one pretty-printed JSON file per conversation.

use std::{
	io::ErrorKind,
	path::{Path, PathBuf},
	sync::Arc,
};

use serde_json::Value;
use time::{OffsetDateTime, macros::format_description};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{HistoryEntry, HistoryFile, HistorySummary},
};

/// Formats `at` the way entries and filenames carry it, e.g. `20240131-154502`.
pub fn format_timestamp(at: OffsetDateTime) -> Result<String> {
	let format = format_description!("[year][month][day]-[hour][minute][second]");

	Ok(at.format(format)?)
}

pub fn now_timestamp() -> Result<String> {
	format_timestamp(OffsetDateTime::now_utc())
}

/// `{timestamp}_{hash6}.json`, where the hash covers the query, `k`, `n` and timestamp.
pub fn history_filename(entry: &HistoryEntry) -> String {
	let key = format!("{}-{}-{}-{}", entry.full_query, entry.k, entry.n, entry.timestamp);
	let hash = blake3::hash(key.as_bytes()).to_hex();

	format!("{}_{}.json", entry.timestamp, &hash.as_str()[..6])
}

pub fn validate_filename(filename: &str) -> Result<()> {
	let stem = filename.strip_suffix(".json").unwrap_or_default();

	if stem.is_empty()
		|| stem.starts_with('.')
		|| filename.contains(['/', '\\'])
		|| filename.contains("..")
	{
		return Err(Error::InvalidArgument(format!(
			"History filename must be a bare .json file name, got {filename:?}."
		)));
	}

	Ok(())
}

/// Clones share one write lock, so writers never interleave a read-modify-write cycle.
#[derive(Debug, Clone)]
pub struct HistoryStore {
	dir: PathBuf,
	writes: Arc<Mutex<()>>,
}
impl HistoryStore {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into(), writes: Arc::new(Mutex::new(())) }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Starts a new conversation file and returns its filename. A name already taken gets a
	/// numeric suffix instead of being overwritten.
	pub async fn create(&self, entry: HistoryEntry) -> Result<String> {
		let _guard = self.writes.lock().await;

		tokio::fs::create_dir_all(&self.dir).await?;

		let filename = self.unused_filename(history_filename(&entry)).await?;
		let file = HistoryFile { initial_query: entry.display_query.clone(), history: vec![entry] };

		self.write_atomic(&filename, &serde_json::to_value(file)?).await?;

		tracing::info!(%filename, "History file created.");

		Ok(filename)
	}

	/// Appends `entry` to an existing conversation. Single-entry files without a `history`
	/// list are wrapped first.
	pub async fn append(&self, filename: &str, entry: HistoryEntry) -> Result<()> {
		let _guard = self.writes.lock().await;
		let mut data = self.read_value(filename).await?;

		if data.get("history").is_none() {
			data = serde_json::json!({ "history": [data] });
		}

		let Some(history) = data.get_mut("history").and_then(Value::as_array_mut) else {
			return Err(Error::InvalidArgument(format!(
				"History file {filename} has a non-list history field."
			)));
		};

		history.push(serde_json::to_value(entry)?);

		self.write_atomic(filename, &data).await?;

		tracing::info!(filename, entries = history_len(&data), "History entry appended.");

		Ok(())
	}

	/// Summaries of every readable conversation, newest filename first.
	pub async fn list(&self) -> Result<Vec<HistorySummary>> {
		let mut dir = match tokio::fs::read_dir(&self.dir).await {
			Ok(dir) => dir,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(err) => return Err(err.into()),
		};
		let mut summaries = Vec::new();

		while let Some(item) = dir.next_entry().await? {
			let Ok(filename) = item.file_name().into_string() else {
				continue;
			};

			if validate_filename(&filename).is_err() {
				continue;
			}

			match self.read_value(&filename).await {
				Ok(data) =>
					if let Some(summary) = summarize(filename.clone(), &data) {
						summaries.push(summary);
					},
				Err(err) => {
					tracing::warn!(error = %err, %filename, "Skipping unreadable history file.");
				},
			}
		}

		summaries.sort_by(|a, b| b.filename.cmp(&a.filename));

		Ok(summaries)
	}

	pub async fn load(&self, filename: &str) -> Result<Vec<HistoryEntry>> {
		let data = self.read_value(filename).await?;

		match data.get("history") {
			Some(history) => Ok(serde_json::from_value(history.clone())?),
			None => Ok(vec![serde_json::from_value(data)?]),
		}
	}

	pub async fn delete(&self, filename: &str) -> Result<()> {
		validate_filename(filename)?;

		let _guard = self.writes.lock().await;

		match tokio::fs::remove_file(self.dir.join(filename)).await {
			Ok(()) => {
				tracing::info!(filename, "History file deleted.");

				Ok(())
			},
			Err(err) if err.kind() == ErrorKind::NotFound =>
				Err(Error::NotFound(format!("History file {filename} does not exist."))),
			Err(err) => Err(err.into()),
		}
	}

	async fn read_value(&self, filename: &str) -> Result<Value> {
		validate_filename(filename)?;

		let raw = match tokio::fs::read_to_string(self.dir.join(filename)).await {
			Ok(raw) => raw,
			Err(err) if err.kind() == ErrorKind::NotFound =>
				return Err(Error::NotFound(format!("History file {filename} does not exist."))),
			Err(err) => return Err(err.into()),
		};

		Ok(serde_json::from_str(&raw)?)
	}

	async fn unused_filename(&self, filename: String) -> Result<String> {
		if !tokio::fs::try_exists(self.dir.join(&filename)).await? {
			return Ok(filename);
		}

		let stem = filename.trim_end_matches(".json");

		for suffix in 2_u32.. {
			let candidate = format!("{stem}-{suffix}.json");

			if !tokio::fs::try_exists(self.dir.join(&candidate)).await? {
				tracing::warn!(%filename, %candidate, "History filename taken; using a suffix.");

				return Ok(candidate);
			}
		}

		Err(Error::InvalidArgument(format!("No free history filename for {filename}.")))
	}

	async fn write_atomic(&self, filename: &str, data: &Value) -> Result<()> {
		let tmp = self.dir.join(format!(".{filename}.{}.tmp", Uuid::new_v4().simple()));
		let body = serde_json::to_string_pretty(data)?;

		tokio::fs::write(&tmp, body).await?;

		if let Err(err) = tokio::fs::rename(&tmp, self.dir.join(filename)).await {
			let _ = tokio::fs::remove_file(&tmp).await;

			return Err(err.into());
		}

		Ok(())
	}
}

fn summarize(filename: String, data: &Value) -> Option<HistorySummary> {
	let entries = data.get("history").and_then(Value::as_array);
	let first = entries.and_then(|entries| entries.first());
	let display_name = [
		data.get("initial_query"),
		first.and_then(|entry| entry.get("display_query")),
		first.and_then(|entry| entry.get("query")),
		data.get("query"),
	]
	.into_iter()
	.flatten()
	.filter_map(Value::as_str)
	.find(|name| !name.trim().is_empty())?
	.to_string();
	let timestamp = entries
		.and_then(|entries| entries.last())
		.and_then(|entry| entry.get("timestamp"))
		.or_else(|| data.get("timestamp"))
		.and_then(Value::as_str)
		.map(str::to_string);

	Some(HistorySummary { filename, display_name, timestamp })
}

fn history_len(data: &Value) -> usize {
	data.get("history").and_then(Value::as_array).map(Vec::len).unwrap_or(0)
}

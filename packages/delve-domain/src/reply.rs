use serde::{Deserialize, de::DeserializeOwned};

pub const FORMAT_ERROR_REASON: &str = "The validation reply could not be parsed.";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelevanceVerdict {
	#[serde(default)]
	pub summary: Option<String>,
	#[serde(default)]
	pub is_relevant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoherenceVerdict {
	#[serde(default)]
	pub is_coherent: bool,
	#[serde(default)]
	pub reason: String,
}
impl CoherenceVerdict {
	pub fn format_error() -> Self {
		Self { is_coherent: false, reason: FORMAT_ERROR_REASON.to_string() }
	}
}

/// Removes a Markdown code fence (with or without a `json` tag) around a model reply.
pub fn strip_code_fence(raw: &str) -> &str {
	let trimmed = raw.trim().trim_matches('`').trim();

	trimmed.strip_prefix("json").unwrap_or(trimmed).trim()
}

/// Parses a JSON object out of a model reply, tolerating fences and surrounding prose.
pub fn parse_json_reply<T>(raw: &str) -> Result<T, serde_json::Error>
where
	T: DeserializeOwned,
{
	let body = strip_code_fence(raw);

	match serde_json::from_str(body) {
		Ok(parsed) => Ok(parsed),
		Err(err) => {
			if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}'))
				&& start < end
			{
				return serde_json::from_str(&body[start..=end]);
			}

			Err(err)
		},
	}
}

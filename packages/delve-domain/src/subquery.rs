#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subqueries {
	pub items: Vec<String>,
	/// How many trailing items repeat the root query because the reply was short.
	pub backfilled: usize,
}

/// Extracts up to `k` items from a numbered list reply.
///
/// Only lines starting with `"1."` through `"{k}."` count; the item is the text after the
/// first period.
pub fn parse_numbered_list(raw: &str, k: usize) -> Vec<String> {
	let prefixes: Vec<String> = (1..=k).map(|i| format!("{i}.")).collect();
	let mut items = Vec::with_capacity(k);

	for line in raw.lines() {
		if items.len() >= k {
			break;
		}

		let line = line.trim();

		if !prefixes.iter().any(|prefix| line.starts_with(prefix.as_str())) {
			continue;
		}

		let Some((_, rest)) = line.split_once('.') else {
			continue;
		};
		let item = rest.trim();

		if !item.is_empty() {
			items.push(item.to_string());
		}
	}

	items
}

/// Parses the reply and pads it with the root query until it holds exactly `k` items.
pub fn from_reply(raw: &str, root_query: &str, k: usize) -> Subqueries {
	let mut items = parse_numbered_list(raw, k);
	let backfilled = k.saturating_sub(items.len());

	items.extend(std::iter::repeat_n(root_query.trim().to_string(), backfilled));

	Subqueries { items, backfilled }
}

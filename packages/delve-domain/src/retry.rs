//! Bounded retry shared by the replacement-document loop and the coherence loop.

use std::future::Future;

/// One repeatable unit of work together with the predicate that ends the retry loop.
pub trait Bounded {
	type Output;
	type Error;

	/// Runs attempt number `attempt` (1-based). `Ok(None)` means there is nothing left to try
	/// and ends the loop early.
	fn run(
		&mut self,
		attempt: u32,
	) -> impl Future<Output = Result<Option<Self::Output>, Self::Error>> + Send;

	fn is_acceptable(&self, output: &Self::Output) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
	Accepted { value: T, attempts: u32 },
	/// The caps were hit, or the operation ran dry, before an acceptable result.
	Exhausted { last: Option<T>, attempts: u32 },
}
impl<T> Outcome<T> {
	pub fn attempts(&self) -> u32 {
		match self {
			Self::Accepted { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
		}
	}

	pub fn is_accepted(&self) -> bool {
		matches!(self, Self::Accepted { .. })
	}

	/// The accepted value, or the last attempt when none was accepted.
	pub fn into_last(self) -> Option<T> {
		match self {
			Self::Accepted { value, .. } => Some(value),
			Self::Exhausted { last, .. } => last,
		}
	}
}

/// Runs `operation` up to `max_tries` times and stops at the first acceptable output.
pub async fn attempt<B>(max_tries: u32, operation: &mut B) -> Result<Outcome<B::Output>, B::Error>
where
	B: Bounded,
{
	let mut last = None;
	let mut attempts = 0;

	for current in 1..=max_tries {
		attempts = current;

		let Some(output) = operation.run(current).await? else {
			break;
		};

		if operation.is_acceptable(&output) {
			return Ok(Outcome::Accepted { value: output, attempts });
		}

		last = Some(output);
	}

	Ok(Outcome::Exhausted { last, attempts })
}

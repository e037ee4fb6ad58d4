//! Prompt builders for the four model calls a run makes.

use delve_domain::document::RelevantDocument;
use delve_providers::llm::ChatMessage;

pub const SUBQUERIES_SYSTEM: &str = "You are an expert research assistant.";
pub const RELEVANCE_SYSTEM: &str = "\
You are an expert summarisation assistant. For the text you are given, do two things:
1. Write a relevant summary of about 150 words.
2. Judge whether the document answers the initial question, or can help answer it together \
with other documents.
Reply only with a strict JSON object.
If the text is relevant, return: {\"summary\": \"your summary here\", \"is_relevant\": true}.
If the text is off-topic or too short, return: {\"summary\": null, \"is_relevant\": false}.";
pub const SYNTHESIS_SYSTEM: &str = "\
You are an expert synthesis assistant. Synthesise the information in the relevant summaries \
provided to answer the initial question. Use the URLs as references, and do not add a \
references section.";
pub const VALIDATION_SYSTEM: &str = "\
You are an expert information validation assistant.
Your task is to assess a synthesis by comparing it with the source documents used to write it.
Reply only with a strict JSON object.
The synthesis may cover related material as long as it stays tied to the initial question and \
answers it.
If the synthesis is relevant and contains nothing absent from the sources, return: \
{\"is_coherent\": true, \"reason\": \"The synthesis is coherent.\"}.
If the synthesis is incoherent, hallucinates or does not answer the question, return: \
{\"is_coherent\": false, \"reason\": \"Explain why the synthesis is not coherent or relevant.\"}.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
	Subqueries,
	Relevance,
	Synthesis,
	Validation,
}
impl PromptKind {
	/// Recognises a prompt built by this module from its system message.
	pub fn of(messages: &[ChatMessage]) -> Option<Self> {
		let system = messages.iter().find(|message| message.role == "system")?;

		match system.content.as_str() {
			SUBQUERIES_SYSTEM => Some(Self::Subqueries),
			RELEVANCE_SYSTEM => Some(Self::Relevance),
			SYNTHESIS_SYSTEM => Some(Self::Synthesis),
			VALIDATION_SYSTEM => Some(Self::Validation),
			_ => None,
		}
	}
}

pub fn subqueries(query: &str, k: usize) -> Vec<ChatMessage> {
	let user = format!(
		"For the following question:\n\n'{query}'\n\n\
		Generate exactly {k} different, precise and relevant sub-questions to explore this \
		topic in depth. Reply only with a numbered list, without any explanation or \
		introduction, in this form:\n1. First sub-question\n2. Second...\n3. Third...\n"
	);

	vec![ChatMessage::system(SUBQUERIES_SYSTEM), ChatMessage::user(user)]
}

pub fn relevance(query: &str, subquestion: &str, text: &str) -> Vec<ChatMessage> {
	let user =
		format!("Initial question: {query}\nSub-question: {subquestion}\n\nText to analyse:\n{text}");

	vec![ChatMessage::system(RELEVANCE_SYSTEM), ChatMessage::user(user)]
}

pub fn synthesis(query: &str, pool: &[RelevantDocument]) -> Vec<ChatMessage> {
	let user = serde_json::json!({ "query": query, "data": pool }).to_string();

	vec![ChatMessage::system(SYNTHESIS_SYSTEM), ChatMessage::user(user)]
}

pub fn validation(query: &str, synthesis: &str, pool: &[RelevantDocument]) -> Vec<ChatMessage> {
	let sources = serde_json::json!(pool).to_string();
	let user = format!(
		"Initial question: {query}\n\nSynthesis to validate: {synthesis}\n\nSource documents: \
		{sources}"
	);

	vec![ChatMessage::system(VALIDATION_SYSTEM), ChatMessage::user(user)]
}

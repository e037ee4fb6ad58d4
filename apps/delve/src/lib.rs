use std::{
	fmt::{self, Display, Formatter},
	path::PathBuf,
};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use delve_domain::progress::{Progress, Stage};
use delve_service::{
	ProgressSink, RefineRequest, ResearchRequest, ResearchResult, ResearchService, ResearchStatus,
	SubqueriesRequest,
};
use delve_storage::models::{HistoryEntry, HistorySummary};

#[derive(Debug, Parser)]
#[command(
	version = delve_cli::VERSION,
	rename_all = "kebab",
	styles = delve_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Research a question and print the synthesis with its sources.
	Research {
		query: String,
		/// Number of subqueries.
		#[arg(short = 'k', long)]
		k: Option<u32>,
		/// Relevant documents wanted per subquery.
		#[arg(short = 'n', long)]
		n: Option<u32>,
		#[arg(long)]
		no_history: bool,
	},
	/// Print the subqueries a question would be split into.
	Subqueries {
		query: String,
		#[arg(short = 'k', long)]
		k: Option<u32>,
	},
	/// Ask a follow-up question on a saved conversation.
	Refine {
		filename: String,
		question: String,
		#[arg(short = 'k', long)]
		k: Option<u32>,
		#[arg(short = 'n', long)]
		n: Option<u32>,
	},
	History {
		#[command(subcommand)]
		action: HistoryCommand,
	},
}

#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
	List,
	Show { filename: String },
	Delete { filename: String },
}

/// Prints each milestone as one line.
pub struct ConsoleProgress;
impl ProgressSink for ConsoleProgress {
	fn notify(&self, progress: &Progress) {
		println!("{}", progress_line(progress));
	}
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = delve_config::load(&args.config)?;

	init_tracing(&config)?;

	let service = ResearchService::new(config);

	match args.command {
		Command::Research { query, k, n, no_history } => {
			let req = ResearchRequest { query, k, n, subqueries: None };

			if no_history {
				let result = service.run(req, &ConsoleProgress).await?;

				print!("{}", render_result(&result, None));
			} else {
				let response = service.research(req, &ConsoleProgress).await?;

				print!("{}", render_result(&response.result, response.filename.as_deref()));
			}
		},
		Command::Subqueries { query, k } => {
			let response =
				service.generate_subqueries(SubqueriesRequest { query, k }, &ConsoleProgress).await?;

			for (index, subquery) in response.subqueries.iter().enumerate() {
				println!("{}. {subquery}", index + 1);
			}
		},
		Command::Refine { filename, question, k, n } => {
			let response =
				service.refine(RefineRequest { filename, question, k, n }, &ConsoleProgress).await?;

			print!("{}", render_result(&response.result, response.filename.as_deref()));
		},
		Command::History { action: HistoryCommand::List } => {
			print!("{}", render_summaries(&service.list_history().await?));
		},
		Command::History { action: HistoryCommand::Show { filename } } => {
			print!("{}", render_entries(&service.get_history(&filename).await?.entries));
		},
		Command::History { action: HistoryCommand::Delete { filename } } => {
			service.delete_history(&filename).await?;

			println!("Deleted {filename}.");
		},
	}

	Ok(())
}

pub fn progress_line(progress: &Progress) -> String {
	format!(
		"[{}%] Step {}/{}: {}",
		progress.percent,
		progress.step_index + 1,
		Stage::COUNT,
		progress.message
	)
}

pub fn render_result(result: &ResearchResult, filename: Option<&str>) -> String {
	ResultReport { result, filename }.to_string()
}

pub fn render_summaries(summaries: &[HistorySummary]) -> String {
	SummaryList(summaries).to_string()
}

pub fn render_entries(entries: &[HistoryEntry]) -> String {
	EntryList(entries).to_string()
}

struct ResultReport<'a> {
	result: &'a ResearchResult,
	filename: Option<&'a str>,
}
impl Display for ResultReport<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let result = self.result;

		writeln!(f, "\n{}\n", result.synthesis)?;
		writeln!(f, "Subqueries:")?;

		for (index, subquery) in result.subqueries.iter().enumerate() {
			writeln!(f, "  {}. {subquery}", index + 1)?;
		}

		writeln!(f, "\nSources:")?;

		for group in &result.sources {
			writeln!(f, "  {}", group.subquestion)?;

			if group.urls.is_empty() {
				writeln!(f, "    (no relevant URL found)")?;
			}

			for url in &group.urls {
				writeln!(f, "    - {url}")?;
			}
		}

		match result.status {
			ResearchStatus::Complete => {},
			ResearchStatus::Partial => {
				writeln!(f, "\nNote: some subqueries found fewer relevant documents than asked.")?;

				for shortfall in &result.shortfalls {
					writeln!(
						f,
						"  {} ({}/{})",
						shortfall.subquestion, shortfall.found, shortfall.wanted
					)?;
				}
			},
			ResearchStatus::NothingFound => {
				writeln!(f, "\nNote: no relevant document was found.")?;
			},
		}

		if result.status != ResearchStatus::NothingFound && !result.coherent {
			writeln!(f, "Note: the synthesis did not pass the coherence check.")?;
		}
		if let Some(filename) = self.filename {
			writeln!(f, "\nSaved to history as {filename}.")?;
		}

		Ok(())
	}
}

struct SummaryList<'a>(&'a [HistorySummary]);
impl Display for SummaryList<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			return writeln!(f, "No saved research.");
		}

		for summary in self.0 {
			writeln!(
				f,
				"{}  {}  {}",
				summary.filename,
				summary.timestamp.as_deref().unwrap_or("-"),
				summary.display_name
			)?;
		}

		Ok(())
	}
}

struct EntryList<'a>(&'a [HistoryEntry]);
impl Display for EntryList<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		for (index, entry) in self.0.iter().enumerate() {
			writeln!(f, "#{} [{}] {}", index + 1, entry.timestamp, entry.display_query)?;
			writeln!(f, "k={} n={}\n", entry.k, entry.n)?;
			writeln!(f, "{}\n", entry.result)?;

			for group in &entry.sources_by_subquery {
				writeln!(f, "  {}", group.subquestion)?;

				for url in &group.urls {
					writeln!(f, "    - {url}")?;
				}
			}

			writeln!(f)?;
		}

		Ok(())
	}
}

fn init_tracing(config: &delve_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}

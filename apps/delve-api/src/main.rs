use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = delve_api::Args::parse();

	delve_api::run(args).await
}

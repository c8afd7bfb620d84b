use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = tether_query::Args::parse();

	tether_query::run(args).await
}

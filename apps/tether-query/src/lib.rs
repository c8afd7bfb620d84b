use std::{io, path::PathBuf, sync::Arc};

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use tether_config::{Config, IndexBackend};
use tether_service::{
	LocalIndex, Providers, QdrantIndex, QueryResponse, SemanticIndex, Startup, TetherService,
};

pub const PROMPT: &str = "> ";

#[derive(Debug, Parser)]
#[command(
	version = tether_cli::VERSION,
	rename_all = "kebab",
	styles = tether_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Run a single query and exit.
	#[arg(long, short = 'q', value_name = "TEXT", conflicts_with = "sync_only")]
	pub query: Option<String>,
	/// Synchronize the index with the source, print the report, and exit.
	#[arg(long)]
	pub sync_only: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = tether_config::load(&args.config)?;

	init_tracing(&config)?;

	let service = open_service(config, Providers::default()).await?;

	match service.warm_up().await? {
		Startup::Loaded { entries } => tracing::info!(entries, "Index ready."),
		Startup::ColdStart(report) => tracing::info!(added = report.added, "Index built."),
	}

	let mut stdout = tokio::io::stdout();

	if args.sync_only {
		let report = service.sync_now().await?;
		let rendered = serde_json::to_string_pretty(&report)?;

		stdout.write_all(format!("{rendered}\n").as_bytes()).await?;
		stdout.flush().await?;

		return Ok(());
	}
	if let Some(query) = args.query {
		let response = service.query_with_retry(&query).await?;

		stdout.write_all(format!("{}\n", render(&response)?).as_bytes()).await?;
		stdout.flush().await?;

		return Ok(());
	}

	repl(&service, BufReader::new(tokio::io::stdin()), &mut stdout).await
}

pub async fn open_service(config: Config, providers: Providers) -> color_eyre::Result<TetherService> {
	let index: Arc<dyn SemanticIndex> = match config.storage.backend {
		IndexBackend::Local => Arc::new(LocalIndex::open(&config, providers.embedding.clone())?),
		IndexBackend::Qdrant =>
			Arc::new(QdrantIndex::connect(&config, providers.embedding.clone()).await?),
	};

	Ok(TetherService::with_providers(config, index, providers))
}

/// Reads queries line by line until end of input, `quit`, or `exit`. A failed query is reported
/// and the loop keeps going.
pub async fn repl<R, W>(service: &TetherService, input: R, output: &mut W) -> color_eyre::Result<()>
where
	R: AsyncBufRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let mut lines = input.lines();

	loop {
		output.write_all(PROMPT.as_bytes()).await?;
		output.flush().await?;

		let Some(line) = lines.next_line().await? else {
			break;
		};
		let line = line.trim();

		if line.is_empty() {
			continue;
		}
		if matches!(line, "quit" | "exit") {
			break;
		}

		match service.query_with_retry(line).await {
			Ok(response) => {
				output.write_all(format!("{}\n", render(&response)?).as_bytes()).await?;
			},
			Err(err) => {
				tracing::warn!(stage = %err.stage, error = %err.error, "Query failed.");

				output.write_all(format!("error: {err}\n").as_bytes()).await?;
			},
		}
	}

	output.flush().await?;

	Ok(())
}

pub fn render(response: &QueryResponse) -> serde_json::Result<String> {
	serde_json::to_string_pretty(response)
}

fn init_tracing(config: &Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

	Ok(())
}

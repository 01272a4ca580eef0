use anyhow::Result;
use clap::Parser;
use silo_data_provider::{load, LoadOptions, Loaded};
use silo_hub::{HubClient, RemoteRepo, Repository};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local directory or `owner/name` repository id
    source: String,

    /// Split filter (e.g. "train")
    #[arg(long)]
    split: Option<String>,

    /// Configuration name filter
    #[arg(long)]
    name: Option<String>,

    /// Stream rows instead of materializing tables
    #[arg(long)]
    streaming: bool,

    /// Streaming batch size
    #[arg(long, default_value = "1000")]
    batch_size: usize,

    /// Parallelism for fetch and decode
    #[arg(long, default_value = "1")]
    num_proc: usize,

    /// Revision for remote repositories
    #[arg(long)]
    revision: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let repository = if PathBuf::from(&cli.source).is_dir() {
        Repository::local(&cli.source)
    } else {
        let mut remote = RemoteRepo::new(&cli.source);
        if let Some(revision) = cli.revision {
            remote.revision = revision;
        }
        Repository::Remote(remote)
    };

    let client = HubClient::new()?;
    let opts = LoadOptions {
        name: cli.name,
        split: cli.split,
        streaming: cli.streaming,
        batch_size: cli.batch_size,
        num_proc: cli.num_proc,
    };

    match load(&client, repository, opts).await? {
        Loaded::Tables(tables) => {
            for (index, table) in tables.iter().enumerate() {
                println!("table {index}: {} row(s)", table.len());
            }
        }
        Loaded::Stream(stream) => {
            let total = tokio::task::spawn_blocking(move || stream.rows().count()).await?;
            println!("streamed {total} row(s)");
        }
    }

    Ok(())
}

use std::path::PathBuf;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::info;

use silo_hub::{HubClient, Repository};

use crate::error::LoadError;
use crate::filter;
use crate::stream::RowStream;
use crate::table::{read_table, FileFormat, Table};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Configuration name filter.
    pub name: Option<String>,
    /// Split filter.
    pub split: Option<String>,
    /// Return a lazy row stream instead of in-memory tables.
    pub streaming: bool,
    /// Streaming batch size.
    pub batch_size: usize,
    /// Bounded parallelism for fetch and decode.
    pub num_proc: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            name: None,
            split: None,
            streaming: false,
            batch_size: DEFAULT_BATCH_SIZE,
            num_proc: 1,
        }
    }
}

#[derive(Debug)]
pub enum Loaded {
    Tables(Vec<Table>),
    Stream(RowStream),
}

impl Loaded {
    pub fn into_tables(self) -> Option<Vec<Table>> {
        match self {
            Loaded::Tables(tables) => Some(tables),
            Loaded::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<RowStream> {
        match self {
            Loaded::Stream(stream) => Some(stream),
            Loaded::Tables(_) => None,
        }
    }
}

/// Loads a dataset: list, filter, then either build a lazy row stream or
/// fetch and decode everything into tables.
///
/// Fetches and decodes run with at most `num_proc` in flight; results keep
/// the listing order. The first failure aborts the rest of the batch
/// (files already fetched stay in the cache).
pub async fn load(
    client: &HubClient,
    repository: Repository,
    opts: LoadOptions,
) -> Result<Loaded, LoadError> {
    if opts.batch_size == 0 {
        return Err(LoadError::Argument("batch_size must be positive".into()));
    }
    if opts.num_proc == 0 {
        return Err(LoadError::Argument("num_proc must be positive".into()));
    }
    let repository = repository.normalize()?;

    let listing = repository.list(client).await?;
    let available = listing.len();
    let listing =
        filter::by_config_and_split(listing, opts.name.as_deref(), opts.split.as_deref());
    info!(
        "selected {} of {available} file(s) from {repository}",
        listing.len()
    );

    if opts.streaming {
        return Ok(Loaded::Stream(RowStream::new(
            &repository,
            listing,
            opts.batch_size,
        )));
    }

    let files: Vec<(String, Option<String>, FileFormat)> = listing
        .into_iter()
        .filter_map(|(name, etag)| {
            FileFormat::from_name(&name).map(|format| (name, etag, format))
        })
        .collect();

    let repository = &repository;
    let fetched: Vec<(PathBuf, FileFormat)> = stream::iter(files)
        .map(|(name, etag, format)| async move {
            let path = repository.download(client, &name, etag.as_deref()).await?;
            Ok::<_, LoadError>((path, format))
        })
        .buffered(opts.num_proc)
        .try_collect()
        .await?;

    let tables: Vec<Table> = stream::iter(fetched)
        .map(|(path, format)| {
            let origin = path.display().to_string();
            async move {
                match tokio::task::spawn_blocking(move || read_table(&path, format)).await {
                    Ok(result) => result,
                    Err(err) => Err(LoadError::Decode {
                        origin,
                        reason: format!("decoder task aborted: {err}"),
                    }),
                }
            }
        })
        .buffered(opts.num_proc)
        .try_collect()
        .await?;

    info!("decoded {} table(s) from {repository}", tables.len());
    Ok(Loaded::Tables(tables))
}

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::PathBuf;

use bytes::Bytes;
use tracing::{debug, warn};

use silo_hub::{HubError, Listing, Repository};

use crate::error::LoadError;
use crate::table::{self, FileFormat, HttpRangeReader, LazyParquet, Row, Table, USER_AGENT};

/// Where one planned file lives.
#[derive(Clone, Debug)]
enum FileSource {
    Local(PathBuf),
    Remote {
        url: String,
        auth_token: Option<String>,
    },
}

#[derive(Clone, Debug)]
struct PlannedFile {
    source: FileSource,
    /// `None` means the extension is unsupported; the file is skipped when
    /// its turn comes.
    format: Option<FileFormat>,
    name: String,
}

/// A lazy, restartable row source over the filtered files of a repository.
///
/// Iteration performs blocking I/O (file reads, and for remote repositories
/// blocking HTTP); drive it from a blocking context, e.g. via
/// `tokio::task::spawn_blocking` when inside an async runtime.
///
/// Parquet files are opened lazily on both local paths and HTTP URLs (range
/// requests). Remote CSV and JSONL fall back to a whole-file fetch into
/// memory; only parquet supports range-based streaming in practice.
#[derive(Debug)]
pub struct RowStream {
    files: Vec<PlannedFile>,
    batch_size: usize,
}

impl RowStream {
    pub(crate) fn new(repository: &Repository, listing: Listing, batch_size: usize) -> Self {
        let mut files = Vec::with_capacity(listing.len());
        for (name, _etag) in listing {
            let format = FileFormat::from_name(&name);
            let source = match repository {
                Repository::Local(dir) => FileSource::Local(dir.join(&name)),
                Repository::Remote(remote) => FileSource::Remote {
                    url: remote.resolve_url(&name),
                    auth_token: remote.auth_token.clone(),
                },
            };
            files.push(PlannedFile {
                source,
                format,
                name,
            });
        }
        debug!("planned row stream over {} file(s)", files.len());
        Self { files, batch_size }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Starts a fresh pass over the planned files, from the first file.
    pub fn batches(&self) -> Batches<'_> {
        Batches {
            stream: self,
            current_index: 0,
            open: None,
        }
    }

    /// Row-at-a-time view over `batches`.
    pub fn rows(&self) -> impl Iterator<Item = Row> + '_ {
        self.batches().flatten()
    }
}

/// The stream's advance state: which file is current and the open handle
/// into it. Rows of file `i` always precede rows of file `j > i`; within a
/// file, the decoder's natural order is kept.
pub struct Batches<'a> {
    stream: &'a RowStream,
    current_index: usize,
    open: Option<OpenFile>,
}

impl Iterator for Batches<'_> {
    type Item = Vec<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_index >= self.stream.files.len() {
                return None;
            }
            let file = &self.stream.files[self.current_index];

            if self.open.is_none() {
                match open_file(file) {
                    Ok(open) => self.open = Some(open),
                    Err(err) => {
                        warn!("skipping {}: {err}", file.name);
                        self.advance();
                        continue;
                    }
                }
            }
            let Some(open) = self.open.as_mut() else {
                continue;
            };

            match open.next_batch(self.stream.batch_size) {
                Ok(rows) if rows.is_empty() => self.advance(),
                Ok(rows) => {
                    if rows.len() < self.stream.batch_size {
                        // The short slice is the last one this file yields.
                        self.advance();
                    }
                    return Some(rows);
                }
                Err(err) => {
                    warn!("skipping remainder of {}: {err}", file.name);
                    self.advance();
                }
            }
        }
    }
}

impl Batches<'_> {
    fn advance(&mut self) {
        self.current_index += 1;
        self.open = None;
    }
}

enum OpenFile {
    /// Fully materialized table, paged out by offset.
    Eager { table: Table, offset: usize },
    Csv {
        headers: csv::StringRecord,
        records: csv::StringRecordsIntoIter<File>,
    },
    Jsonl {
        origin: String,
        lines: Lines<BufReader<File>>,
    },
    LocalParquet {
        reader: LazyParquet<File>,
        offset: usize,
    },
    RemoteParquet {
        reader: LazyParquet<HttpRangeReader>,
        offset: usize,
    },
}

impl OpenFile {
    fn next_batch(&mut self, batch_size: usize) -> Result<Vec<Row>, LoadError> {
        match self {
            OpenFile::Eager { table, offset } => {
                let rows = table.slice(*offset, batch_size);
                *offset += rows.len();
                Ok(rows)
            }
            OpenFile::Csv { headers, records } => {
                let mut rows = Vec::new();
                while rows.len() < batch_size {
                    match records.next() {
                        Some(Ok(record)) => rows.push(table::csv_row(headers, &record)),
                        Some(Err(err)) => return Err(table::decode_error("csv record", err)),
                        None => break,
                    }
                }
                Ok(rows)
            }
            OpenFile::Jsonl { origin, lines } => {
                let mut rows = Vec::new();
                while rows.len() < batch_size {
                    match lines.next() {
                        Some(Ok(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            rows.push(table::jsonl_row(origin, &line)?);
                        }
                        Some(Err(err)) => {
                            return Err(table::decode_error(origin.as_str(), err))
                        }
                        None => break,
                    }
                }
                Ok(rows)
            }
            OpenFile::LocalParquet { reader, offset } => {
                let rows = reader
                    .slice(*offset, batch_size)
                    .map_err(|err| table::decode_error("parquet slice", err))?;
                *offset += rows.len();
                Ok(rows)
            }
            OpenFile::RemoteParquet { reader, offset } => {
                let rows = reader
                    .slice(*offset, batch_size)
                    .map_err(|err| table::decode_error("parquet slice", err))?;
                *offset += rows.len();
                Ok(rows)
            }
        }
    }
}

fn open_file(file: &PlannedFile) -> Result<OpenFile, LoadError> {
    let Some(format) = file.format else {
        return Err(table::decode_error(&file.name, "unsupported file extension"));
    };
    match (&file.source, format) {
        (FileSource::Local(path), FileFormat::Parquet) => {
            let handle = File::open(path).map_err(|err| table::io_error(path, err))?;
            let reader = LazyParquet::open(handle)
                .map_err(|err| table::decode_error(path.display(), err))?;
            Ok(OpenFile::LocalParquet { reader, offset: 0 })
        }
        (FileSource::Local(path), FileFormat::Csv) => {
            let mut reader = csv::Reader::from_path(path)
                .map_err(|err| table::decode_error(path.display(), err))?;
            let headers = reader
                .headers()
                .map_err(|err| table::decode_error(path.display(), err))?
                .clone();
            Ok(OpenFile::Csv {
                headers,
                records: reader.into_records(),
            })
        }
        (FileSource::Local(path), FileFormat::Jsonl) => {
            let handle = File::open(path).map_err(|err| table::io_error(path, err))?;
            Ok(OpenFile::Jsonl {
                origin: path.display().to_string(),
                lines: BufReader::new(handle).lines(),
            })
        }
        (FileSource::Remote { url, auth_token }, FileFormat::Parquet) => {
            let source = HttpRangeReader::open(url, auth_token.as_deref())?;
            let reader =
                LazyParquet::open(source).map_err(|err| table::decode_error(url, err))?;
            Ok(OpenFile::RemoteParquet { reader, offset: 0 })
        }
        (FileSource::Remote { url, auth_token }, FileFormat::Csv) => {
            let body = fetch_remote(url, auth_token.as_deref())?;
            let table = table::csv_table(url, csv::Reader::from_reader(body.as_ref()))?;
            Ok(OpenFile::Eager { table, offset: 0 })
        }
        (FileSource::Remote { url, auth_token }, FileFormat::Jsonl) => {
            let body = fetch_remote(url, auth_token.as_deref())?;
            let table = table::jsonl_table(url, body.as_ref())?;
            Ok(OpenFile::Eager { table, offset: 0 })
        }
    }
}

fn fetch_remote(url: &str, auth_token: Option<&str>) -> Result<Bytes, LoadError> {
    debug!("fetching whole {url} for streaming");
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(HubError::Network)?;
    let mut request = client.get(url);
    if let Some(token) = auth_token {
        request = request.bearer_auth(token);
    }
    let response = request.send().map_err(HubError::Network)?;
    let status = response.status();
    if !status.is_success() {
        return Err(LoadError::Hub(HubError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }));
    }
    response.bytes().map_err(|err| HubError::Network(err).into())
}

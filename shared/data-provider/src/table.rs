use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parquet::errors::ParquetError;
use parquet::file::reader::{ChunkReader, FileReader, Length, SerializedFileReader};
use serde_json::{Map, Value};

use crate::error::LoadError;

pub(crate) const USER_AGENT: &str = concat!("silo/", env!("CARGO_PKG_VERSION"));

/// One decoded record: column name -> JSON value.
pub type Row = Map<String, Value>;

/// A fully materialized table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn slice(&self, offset: usize, length: usize) -> Vec<Row> {
        let start = offset.min(self.rows.len());
        let end = offset.saturating_add(length).min(self.rows.len());
        self.rows[start..end].to_vec()
    }
}

/// Supported tabular formats, dispatched on the lowercased file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Jsonl,
    Parquet,
}

impl FileFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())?
            .to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(FileFormat::Csv),
            "jsonl" => Some(FileFormat::Jsonl),
            "parquet" => Some(FileFormat::Parquet),
            _ => None,
        }
    }
}

pub fn read_table(path: &Path, format: FileFormat) -> Result<Table, LoadError> {
    match format {
        FileFormat::Csv => read_csv(path),
        FileFormat::Jsonl => read_jsonl(path),
        FileFormat::Parquet => read_parquet(path),
    }
}

pub fn read_csv(path: &Path) -> Result<Table, LoadError> {
    let reader = csv::Reader::from_path(path).map_err(|err| decode_error(path.display(), err))?;
    csv_table(&path.display().to_string(), reader)
}

pub fn read_jsonl(path: &Path) -> Result<Table, LoadError> {
    let file = File::open(path).map_err(|err| io_error(path, err))?;
    jsonl_table(&path.display().to_string(), BufReader::new(file))
}

pub fn read_parquet(path: &Path) -> Result<Table, LoadError> {
    let file = File::open(path).map_err(|err| io_error(path, err))?;
    let reader =
        SerializedFileReader::new(file).map_err(|err| decode_error(path.display(), err))?;
    let mut rows = Vec::new();
    let iter = reader
        .get_row_iter(None)
        .map_err(|err| decode_error(path.display(), err))?;
    for row in iter {
        let row = row.map_err(|err| decode_error(path.display(), err))?;
        rows.push(parquet_row(&row));
    }
    Ok(Table::new(rows))
}

/// CSV values stay strings; the format carries no type information.
pub(crate) fn csv_table<R: Read>(origin: &str, mut reader: csv::Reader<R>) -> Result<Table, LoadError> {
    let headers = reader
        .headers()
        .map_err(|err| decode_error(origin, err))?
        .clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|err| decode_error(origin, err))?;
        rows.push(csv_row(&headers, &record));
    }
    Ok(Table::new(rows))
}

pub(crate) fn csv_row(headers: &csv::StringRecord, record: &csv::StringRecord) -> Row {
    headers
        .iter()
        .zip(record.iter())
        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
        .collect()
}

pub(crate) fn jsonl_table<R: BufRead>(origin: &str, reader: R) -> Result<Table, LoadError> {
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|err| decode_error(origin, err))?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push(jsonl_row(origin, &line)?);
    }
    Ok(Table::new(rows))
}

pub(crate) fn jsonl_row(origin: &str, line: &str) -> Result<Row, LoadError> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(_) => Err(decode_error(origin, "JSONL line is not a JSON object")),
        Err(err) => Err(decode_error(origin, err)),
    }
}

pub(crate) fn parquet_row(row: &parquet::record::Row) -> Row {
    match row.to_json_value() {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}

/// Parquet file opened over any chunk source, sliceable by row range without
/// materializing the whole file. Only the row groups a slice overlaps are
/// decoded.
pub struct LazyParquet<R: ChunkReader + 'static> {
    reader: SerializedFileReader<R>,
    /// `(first_row, row_count)` per non-empty row group, in file order.
    row_groups: Vec<(usize, usize)>,
    total_rows: usize,
}

impl<R: ChunkReader + 'static> LazyParquet<R> {
    pub fn open(source: R) -> Result<Self, ParquetError> {
        let reader = SerializedFileReader::new(source)?;
        let mut row_groups = Vec::new();
        let mut running = 0usize;
        for group in reader.metadata().row_groups() {
            let rows = usize::try_from(group.num_rows()).unwrap_or(0);
            if rows == 0 {
                continue;
            }
            row_groups.push((running, rows));
            running += rows;
        }
        Ok(Self {
            reader,
            row_groups,
            total_rows: running,
        })
    }

    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn slice(&self, offset: usize, length: usize) -> Result<Vec<Row>, ParquetError> {
        let mut out = Vec::new();
        if length == 0 || offset >= self.total_rows {
            return Ok(out);
        }
        let end = offset.saturating_add(length).min(self.total_rows);
        for (group_index, (first_row, row_count)) in self.row_groups.iter().enumerate() {
            let group_end = first_row + row_count;
            if group_end <= offset {
                continue;
            }
            if *first_row >= end {
                break;
            }
            let group = self.reader.get_row_group(group_index)?;
            let iter = group.get_row_iter(None)?;
            let start_in_group = offset.max(*first_row) - first_row;
            let take = end.min(group_end) - first_row - start_in_group;
            for row in iter.skip(start_in_group).take(take) {
                out.push(parquet_row(&row?));
            }
        }
        Ok(out)
    }
}

const RANGE_READ_CHUNK: usize = 64 * 1024;

/// `ChunkReader` over HTTP range requests, so remote parquet files can be
/// opened lazily: only the footer and the touched row groups travel over
/// the wire.
#[derive(Clone)]
pub struct HttpRangeReader {
    client: reqwest::blocking::Client,
    url: String,
    auth_token: Option<String>,
    total_len: u64,
}

impl HttpRangeReader {
    /// HEADs the URL to learn its size. Performs blocking I/O.
    pub fn open(url: &str, auth_token: Option<&str>) -> Result<Self, LoadError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(silo_hub::HubError::Network)?;
        let mut request = client.head(url);
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(silo_hub::HubError::Network)?;
        if !response.status().is_success() {
            return Err(LoadError::Hub(silo_hub::HubError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            }));
        }
        let total_len = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| decode_error(url, "missing Content-Length for remote file"))?;
        Ok(Self {
            client,
            url: url.to_string(),
            auth_token: auth_token.map(str::to_string),
            total_len,
        })
    }

    fn fetch(&self, start: u64, length: usize) -> Result<Bytes, ParquetError> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let end = start + length as u64 - 1;
        let mut request = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={start}-{end}"));
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().map_err(|err| {
            ParquetError::General(format!("range request failed for {}: {err}", self.url))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ParquetError::General(format!(
                "range request for {} returned {status}",
                self.url
            )));
        }
        let bytes = response.bytes().map_err(|err| {
            ParquetError::General(format!(
                "failed reading range response body from {}: {err}",
                self.url
            ))
        })?;
        if bytes.len() != length {
            return Err(ParquetError::General(format!(
                "range request for {} returned {} byte(s), expected {length}",
                self.url,
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

impl Length for HttpRangeReader {
    fn len(&self) -> u64 {
        self.total_len
    }
}

impl ChunkReader for HttpRangeReader {
    type T = HttpRangeRead;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        Ok(HttpRangeRead {
            source: self.clone(),
            pos: start,
        })
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        self.fetch(start, length)
    }
}

/// Sequential `Read` over an `HttpRangeReader`, pulling bounded chunks so a
/// sequential consumer never requests the remainder of the file at once.
pub struct HttpRangeRead {
    source: HttpRangeReader,
    pos: u64,
}

impl Read for HttpRangeRead {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.source.total_len {
            return Ok(0);
        }
        let remaining = (self.source.total_len - self.pos) as usize;
        let want = buf.len().min(RANGE_READ_CHUNK).min(remaining);
        let bytes = self
            .source
            .fetch(self.pos, want)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        self.pos += bytes.len() as u64;
        Ok(bytes.len())
    }
}

pub(crate) fn decode_error(origin: impl std::fmt::Display, reason: impl std::fmt::Display) -> LoadError {
    LoadError::Decode {
        origin: origin.to_string(),
        reason: reason.to_string(),
    }
}

pub(crate) fn io_error(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
        path: PathBuf::from(path),
        source,
    }
}

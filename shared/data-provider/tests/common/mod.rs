#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

// ---------------------------------------------------------------------------
// Fixture files
// ---------------------------------------------------------------------------

/// `id,label` CSV with `rows` records.
pub fn write_csv(path: &Path, rows: usize) {
    let mut body = String::from("id,label\n");
    for id in 0..rows {
        body.push_str(&format!("{id},row-{id}\n"));
    }
    std::fs::write(path, body).expect("write csv fixture");
}

pub fn csv_body(rows: usize) -> Vec<u8> {
    let mut body = String::from("id,label\n");
    for id in 0..rows {
        body.push_str(&format!("{id},row-{id}\n"));
    }
    body.into_bytes()
}

/// JSONL records `{"id": n, "src": tag}`.
pub fn write_jsonl(path: &Path, tag: &str, rows: usize) {
    let mut body = String::new();
    for id in 0..rows {
        body.push_str(&format!("{{\"id\": {id}, \"src\": \"{tag}\"}}\n"));
    }
    std::fs::write(path, body).expect("write jsonl fixture");
}

/// Parquet file with schema `(id: i64, label: utf8)` and one row group per
/// entry of `row_groups`; ids run sequentially across groups.
pub fn write_parquet(path: &Path, row_groups: &[usize]) {
    std::fs::write(path, parquet_body(row_groups)).expect("write parquet fixture");
}

pub fn parquet_body(row_groups: &[usize]) -> Vec<u8> {
    let schema = Arc::new(
        parse_message_type(
            "message row { REQUIRED INT64 id; REQUIRED BINARY label (UTF8); }",
        )
        .expect("fixture schema"),
    );
    let props = Arc::new(WriterProperties::builder().build());
    let mut out = Vec::new();
    {
        let mut writer =
            SerializedFileWriter::new(&mut out, schema, props).expect("parquet writer");
        let mut next_id = 0i64;
        for &rows in row_groups {
            let ids: Vec<i64> = (next_id..next_id + rows as i64).collect();
            let labels: Vec<ByteArray> = ids
                .iter()
                .map(|id| ByteArray::from(format!("row-{id}").as_str()))
                .collect();
            next_id += rows as i64;

            let mut group = writer.next_row_group().expect("row group");
            let mut id_column = group.next_column().expect("id column").expect("id column");
            id_column
                .typed::<Int64Type>()
                .write_batch(&ids, None, None)
                .expect("write ids");
            id_column.close().expect("close ids");
            let mut label_column = group
                .next_column()
                .expect("label column")
                .expect("label column");
            label_column
                .typed::<ByteArrayType>()
                .write_batch(&labels, None, None)
                .expect("write labels");
            label_column.close().expect("close labels");
            group.close().expect("close row group");
        }
        writer.close().expect("close parquet writer");
    }
    out
}

// ---------------------------------------------------------------------------
// Scripted HTTP server
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

type Routes = HashMap<(String, String), Response>;

/// Minimal scripted HTTP server; honors `Range` on 200 routes so lazy
/// remote parquet reads can be exercised.
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    routes: Arc<Mutex<Routes>>,
    stop: Arc<AtomicBool>,
}

impl TestServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("test server addr");
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));
        let routes: Arc<Mutex<Routes>> = Arc::new(Mutex::new(HashMap::new()));
        let stop = Arc::new(AtomicBool::new(false));

        {
            let requests = requests.clone();
            let routes = routes.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                for stream in listener.incoming() {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let Ok(stream) = stream else { continue };
                    let requests = requests.clone();
                    let routes = routes.clone();
                    thread::spawn(move || {
                        let _ = handle_connection(stream, &requests, &routes);
                    });
                }
            });
        }

        Self {
            addr,
            requests,
            routes,
            stop,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn route(&self, method: &str, path: &str, response: Response) {
        self.routes
            .lock()
            .unwrap()
            .insert((method.to_string(), path.to_string()), response);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
    }
}

fn handle_connection(
    mut stream: TcpStream,
    requests: &Mutex<Vec<Recorded>>,
    routes: &Mutex<Routes>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            break;
        }
        if let Some((name, value)) = trimmed.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let recorded = Recorded {
        method: method.clone(),
        path: path.clone(),
        headers,
    };
    let range = recorded.header("range").map(str::to_string);
    requests.lock().unwrap().push(recorded);

    let mut response = routes
        .lock()
        .unwrap()
        .get(&(method.clone(), path))
        .cloned()
        .unwrap_or_else(|| Response::new(404));

    if response.status == 200 {
        if let Some((start, end)) = range.as_deref().and_then(parse_range) {
            let end = end.min(response.body.len().saturating_sub(1));
            let total = response.body.len();
            response.body = response.body[start..=end].to_vec();
            response.status = 206;
            response.headers.push((
                "content-range".into(),
                format!("bytes {start}-{end}/{total}"),
            ));
        }
    }

    let mut head = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status,
        reason(response.status)
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("content-length: {}\r\n", response.body.len()));
    head.push_str("connection: close\r\n\r\n");
    stream.write_all(head.as_bytes())?;
    if method != "HEAD" {
        stream.write_all(&response.body)?;
    }
    stream.flush()
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let suffix = value.strip_prefix("bytes=")?;
    let (start, end) = suffix.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        206 => "Partial Content",
        302 => "Found",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "",
    }
}

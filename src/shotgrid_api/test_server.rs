//! A tiny HTTP/1.1 server on localhost for exercising `RestClient` against
//! real sockets. Each connection carries one request and is closed after the
//! reply, so requests are recorded in the order the client sent them.

use std::sync::{Arc, Mutex};

use percent_encoding::percent_decode_str;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,

    /// Path and query, percent-decoded.
    pub target: String,

    pub authorization: Option<String>,
    pub session_token: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub struct Reply {
    status: StatusCode,
    body: Vec<u8>,

    /// Advertised in `Content-Length` instead of the real body length.
    declared_len: Option<usize>,
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Self::bytes(status, body.to_string().into_bytes())
    }

    pub fn bytes(status: u16, body: Vec<u8>) -> Self {
        Reply {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            declared_len: None,
        }
    }

    /// A 200 whose connection closes before the advertised length arrives.
    pub fn truncated(body: Vec<u8>, declared_len: usize) -> Self {
        Reply {
            declared_len: Some(declared_len),
            ..Self::bytes(200, body)
        }
    }
}

pub struct TestServer {
    pub origin: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    task: JoinHandle<()>,
}

impl TestServer {
    pub async fn start<H>(handler: H) -> Self
    where
        H: Fn(&Recorded) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                serve(stream, &handler, &log).await;
            }
        });

        TestServer {
            origin,
            requests,
            task,
        }
    }

    /// The server URL as a user would configure it.
    pub fn server_url(&self) -> String {
        format!("{}/", self.origin)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path ends with `suffix`.
    pub fn requests_to(&self, suffix: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|request| request.path().ends_with(suffix))
            .collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<H>(stream: TcpStream, handler: &H, log: &Mutex<Vec<Recorded>>)
where
    H: Fn(&Recorded) -> Reply,
{
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_owned();
    let raw_target = parts.next().unwrap_or_default();
    let target = percent_decode_str(raw_target).decode_utf8_lossy().into_owned();

    let mut authorization = None;
    let mut session_token = None;
    let mut content_type = None;
    let mut content_length = 0;

    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }

        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_owned();

        match name.to_ascii_lowercase().as_str() {
            "authorization" => authorization = Some(value),
            "shotgun-session-token" => session_token = Some(value),
            "content-type" => content_type = Some(value),
            "content-length" => content_length = value.parse().unwrap(),
            _ => {}
        }
    }

    let mut body = vec![0; content_length];
    reader.read_exact(&mut body).await.unwrap();

    let recorded = Recorded {
        method,
        target,
        authorization,
        session_token,
        content_type,
        body,
    };
    let reply = handler(&recorded);
    log.lock().unwrap().push(recorded);

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        reply.status.as_u16(),
        reply.status.canonical_reason().unwrap_or("Unknown"),
        reply.declared_len.unwrap_or(reply.body.len()),
    );

    let mut stream = reader.into_inner();
    let _ = stream.write_all(head.as_bytes()).await;
    let _ = stream.write_all(&reply.body).await;
    let _ = stream.shutdown().await;
}

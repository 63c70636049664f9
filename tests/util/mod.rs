//! In-process stand-in for searchd.
//!
//! Speaks the real handshake and envelope over TCP or a Unix socket, records
//! every command it receives and answers through a caller-supplied handler.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use searchd_client::ClientConfig;
use searchd_client::protocol::{Command, PacketReader, PacketWriter};
use tempfile::TempDir;

/// Run `f` under a DEBUG-level subscriber and return everything it logged.
#[allow(dead_code)]
pub fn capture_logs(f: impl FnOnce()) -> String {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let sink = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .without_time()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(move || TestWriter(sink.clone()))
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let logs = buffer.lock().unwrap();
    String::from_utf8_lossy(&logs).into_owned()
}

struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A command as it arrived at the mock.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Received {
    pub command: u16,
    pub version: u16,
    pub body: Vec<u8>,
}

/// How the mock answers one command.
#[allow(dead_code)]
pub enum Reply {
    Ok(Vec<u8>),
    Warning(String, Vec<u8>),
    Error(String),
    Retry(String),
    /// Bytes written verbatim, header included.
    Raw(Vec<u8>),
    /// Close the socket without answering.
    Hangup,
}

/// Idle clients are dropped after this so the accept loop can shut down.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

type Handler = Box<dyn Fn(&Received) -> Reply + Send + Sync>;

struct Shared {
    server_version: u32,
    handler: Handler,
    received: Mutex<Vec<Received>>,
    handshakes: AtomicUsize,
    shutdown: AtomicBool,
}

/// Running mock daemon; stops accepting when dropped.
#[allow(dead_code)]
pub struct MockDaemon {
    shared: Arc<Shared>,
    config: ClientConfig,
    thread: Option<JoinHandle<()>>,
    _dir: Option<TempDir>,
}

#[allow(dead_code)]
impl MockDaemon {
    /// TCP mock answering commands from `replies` in order.
    pub fn tcp(replies: Vec<Reply>) -> Self {
        Self::tcp_with(scripted(replies))
    }

    pub fn tcp_with(handler: impl Fn(&Received) -> Reply + Send + Sync + 'static) -> Self {
        Self::spawn_tcp(1, Box::new(handler))
    }

    /// TCP mock that announces `version` in the handshake.
    pub fn tcp_with_version(version: u32, replies: Vec<Reply>) -> Self {
        Self::spawn_tcp(version, Box::new(scripted(replies)))
    }

    fn spawn_tcp(server_version: u32, handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock listener");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let port = listener.local_addr().expect("local addr").port();
        let shared = Arc::new(Shared::new(server_version, handler));

        let state = shared.clone();
        let thread = std::thread::spawn(move || {
            while !state.shutdown.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        stream.set_nonblocking(false).ok();
                        stream.set_read_timeout(Some(IDLE_TIMEOUT)).ok();
                        let _ = serve(stream, &state);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            shared,
            config: ClientConfig::default().with_server("127.0.0.1", port),
            thread: Some(thread),
            _dir: None,
        }
    }

    /// Unix socket mock answering commands from `replies` in order.
    pub fn unix(replies: Vec<Reply>) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("searchd.sock");
        let listener = UnixListener::bind(&path).expect("bind mock socket");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let shared = Arc::new(Shared::new(1, Box::new(scripted(replies))));

        let state = shared.clone();
        let thread = std::thread::spawn(move || {
            while !state.shutdown.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        stream.set_nonblocking(false).ok();
                        stream.set_read_timeout(Some(IDLE_TIMEOUT)).ok();
                        let _ = serve(stream, &state);
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        let server = format!("unix://{}", path.display());
        Self {
            shared,
            config: ClientConfig::default().with_server(&server, 0),
            thread: Some(thread),
            _dir: Some(dir),
        }
    }

    /// Client settings pointing at this mock.
    pub fn config(&self) -> ClientConfig {
        self.config.clone()
    }

    pub fn socket_path(&self) -> Option<PathBuf> {
        self.config.socket.clone()
    }

    pub fn received(&self) -> Vec<Received> {
        self.shared.received.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<u16> {
        self.received().iter().map(|r| r.command).collect()
    }

    pub fn handshakes(&self) -> usize {
        self.shared.handshakes.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` handshakes completed on the server side.
    pub fn wait_for_handshakes(&self, n: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.handshakes() < n && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.handshakes()
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Shared {
    fn new(server_version: u32, handler: Handler) -> Self {
        Self {
            server_version,
            handler,
            received: Mutex::new(Vec::new()),
            handshakes: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        }
    }
}

fn scripted(replies: Vec<Reply>) -> impl Fn(&Received) -> Reply + Send + Sync + 'static {
    let queue = Mutex::new(VecDeque::from(replies));
    move |_| queue.lock().unwrap().pop_front().unwrap_or(Reply::Hangup)
}

fn serve<S: Read + Write>(mut stream: S, state: &Shared) -> io::Result<()> {
    stream.write_all(&state.server_version.to_be_bytes())?;
    let mut client_version = [0u8; 4];
    stream.read_exact(&mut client_version)?;
    state.handshakes.fetch_add(1, Ordering::SeqCst);

    let mut persistent = false;
    loop {
        let mut header = [0u8; 8];
        match stream.read_exact(&mut header) {
            Ok(()) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        let command = u16::from_be_bytes([header[0], header[1]]);
        let version = u16::from_be_bytes([header[2], header[3]]);
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body)?;

        let request = Received {
            command,
            version,
            body,
        };
        state.received.lock().unwrap().push(request.clone());

        if command == Command::Persist.code() {
            persistent = true;
            continue;
        }

        match (state.handler)(&request) {
            Reply::Ok(body) => write_reply(&mut stream, 0, version, &body)?,
            Reply::Warning(warning, body) => {
                let mut w = PacketWriter::new();
                w.put_str(&warning);
                w.put_raw(&body);
                write_reply(&mut stream, 3, version, &w.into_inner())?;
            }
            Reply::Error(msg) => write_reply(&mut stream, 1, version, &string_body(&msg))?,
            Reply::Retry(msg) => write_reply(&mut stream, 2, version, &string_body(&msg))?,
            Reply::Raw(bytes) => stream.write_all(&bytes)?,
            Reply::Hangup => return Ok(()),
        }

        if !persistent {
            return Ok(());
        }
    }
}

fn write_reply<S: Write>(stream: &mut S, status: u16, version: u16, body: &[u8]) -> io::Result<()> {
    let mut w = PacketWriter::with_capacity(8 + body.len());
    w.put_u16(status);
    w.put_u16(version);
    w.put_u32(body.len() as u32);
    w.put_raw(body);
    stream.write_all(&w.into_inner())
}

fn string_body(msg: &str) -> Vec<u8> {
    let mut w = PacketWriter::new();
    w.put_str(msg);
    w.into_inner()
}

/// One document of a canned result set; every attribute is a plain integer.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Doc {
    pub id: u64,
    pub weight: i32,
    pub attrs: Vec<u32>,
}

/// Append one OK result to a search reply body.
#[allow(dead_code)]
pub fn write_result(
    w: &mut PacketWriter,
    attrs: &[&str],
    docs: &[Doc],
    total_found: u32,
    words: &[(&str, u32, u32)],
) {
    w.put_u32(0);
    w.put_u32(1);
    w.put_str("content");
    w.put_u32(attrs.len() as u32);
    for attr in attrs {
        w.put_str(attr);
        w.put_u32(1);
    }
    w.put_u32(docs.len() as u32);
    w.put_u32(1);
    for doc in docs {
        w.put_u64(doc.id);
        w.put_i32(doc.weight);
        for value in &doc.attrs {
            w.put_u32(*value);
        }
    }
    w.put_u32(docs.len() as u32);
    w.put_u32(total_found);
    w.put_u32(3);
    w.put_u32(words.len() as u32);
    for (word, docs, hits) in words {
        w.put_str(word);
        w.put_u32(*docs);
        w.put_u32(*hits);
    }
}

/// Append a failed result to a search reply body.
#[allow(dead_code)]
pub fn write_error_result(w: &mut PacketWriter, status: u32, msg: &str) {
    w.put_u32(status);
    w.put_str(msg);
}

/// Single-result search reply.
#[allow(dead_code)]
pub fn search_reply(attrs: &[&str], docs: &[Doc], words: &[(&str, u32, u32)]) -> Vec<u8> {
    let mut w = PacketWriter::new();
    write_result(&mut w, attrs, docs, docs.len() as u32, words);
    w.into_inner()
}

#[allow(dead_code)]
pub fn u32_reply(value: u32) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Excerpt request as the daemon sees it.
#[allow(dead_code)]
#[derive(Debug)]
pub struct ExcerptRequest {
    pub flags: u32,
    pub index: String,
    pub words: String,
    pub before: String,
    pub after: String,
    pub separator: String,
    pub limit: u32,
    pub around: u32,
    pub html_strip: String,
    pub boundary: String,
    pub docs: Vec<String>,
}

#[allow(dead_code)]
pub fn parse_excerpt_request(body: &[u8]) -> ExcerptRequest {
    let mut r = PacketReader::new(body);
    assert_eq!(r.get_u32().unwrap(), 0, "excerpt mode");
    let flags = r.get_u32().unwrap();
    let index = r.get_string().unwrap();
    let words = r.get_string().unwrap();
    let before = r.get_string().unwrap();
    let after = r.get_string().unwrap();
    let separator = r.get_string().unwrap();
    let limit = r.get_u32().unwrap();
    let around = r.get_u32().unwrap();
    let _limit_passages = r.get_u32().unwrap();
    let _limit_words = r.get_u32().unwrap();
    let _start_passage_id = r.get_u32().unwrap();
    let html_strip = r.get_string().unwrap();
    let boundary = r.get_string().unwrap();
    let n = r.get_u32().unwrap();
    let docs = (0..n).map(|_| r.get_string().unwrap()).collect();
    assert!(r.is_empty(), "trailing bytes in excerpt request");
    ExcerptRequest {
        flags,
        index,
        words,
        before,
        after,
        separator,
        limit,
        around,
        html_strip,
        boundary,
        docs,
    }
}

/// Naive highlighter: wraps the first occurrence of each word and keeps
/// `around` words of context on each side, marking cuts with the separator
/// and stopping at `limit` characters.
#[allow(dead_code)]
pub fn highlight(req: &ExcerptRequest, doc: &str) -> String {
    let words: Vec<&str> = doc.split_whitespace().collect();
    let Some(hit) = words
        .iter()
        .position(|w| w.trim_matches(|c: char| !c.is_alphanumeric()) == req.words)
    else {
        return String::new();
    };
    let around = req.around as usize;
    let start = hit.saturating_sub(around);
    let end = (hit + around + 1).min(words.len());

    let mut out = String::new();
    if start > 0 {
        out.push_str(req.separator.trim_start());
    }
    for (i, word) in words[start..end].iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if start + i == hit {
            out.push_str(&req.before);
            out.push_str(word);
            out.push_str(&req.after);
        } else {
            out.push_str(word);
        }
    }
    if end < words.len() {
        out.push_str(&req.separator);
    }
    out.chars().take(req.limit as usize).collect()
}

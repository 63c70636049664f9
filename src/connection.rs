//! Socket lifecycle for the binary protocol.
//!
//! A [`Connection`] starts idle and dials lazily on the first command. After
//! the version handshake it either stays open for further commands (after
//! [`Connection::open`] sent the persist command) or is dropped once the reply
//! has been read, mirroring what the daemon does on its side. Any transport
//! failure drops the socket and raises the connection-error flag; the next
//! command reconnects from scratch.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{ClientConfig, Endpoint};
use crate::error::{Error, Result};
use crate::protocol::request::encode_persist;
use crate::protocol::{
    Command, PacketReader, RESPONSE_HEADER_LEN, ResponseHeader, SearchdStatus, VER_MAJOR_PROTO,
    frame,
};

/// Upper bound on a reply body; anything larger is treated as a corrupt header.
pub const MAX_RESPONSE_LEN: u32 = 128 * 1024 * 1024;

enum Transport {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Transport {
    fn dial(endpoint: &Endpoint, timeout: Duration) -> io::Result<Self> {
        match endpoint {
            // std has no timed Unix connect; the handshake deadline bounds what follows
            Endpoint::Unix(path) => Ok(Self::Unix(UnixStream::connect(path)?)),
            Endpoint::Tcp { host, port } => {
                if timeout.is_zero() {
                    return Ok(Self::Tcp(TcpStream::connect((host.as_str(), *port))?));
                }
                let mut last_err = None;
                for addr in (host.as_str(), *port).to_socket_addrs()? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => return Ok(Self::Tcp(stream)),
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(last_err.unwrap_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("{host} did not resolve to any address"),
                    )
                }))
            }
        }
    }

    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            Self::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }

    fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Unix(s) => s.flush(),
        }
    }
}

/// One socket to the daemon plus the state the protocol keeps around it.
#[derive(Default)]
pub struct Connection {
    stream: Option<Transport>,
    server_version: u32,
    persistent: bool,
    connect_error: bool,
    last_warning: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.stream.is_some())
            .field("server_version", &self.server_version)
            .field("persistent", &self.persistent)
            .field("connect_error", &self.connect_error)
            .field("last_warning", &self.last_warning)
            .finish()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// True when the last failure was a transport problem rather than a daemon error.
    pub fn is_connect_error(&self) -> bool {
        self.connect_error
    }

    /// Version the daemon announced in the handshake, 0 before the first connect.
    pub fn server_version(&self) -> u32 {
        self.server_version
    }

    /// Warning attached to the most recent reply, if any.
    pub fn last_warning(&self) -> Option<&str> {
        self.last_warning.as_deref()
    }

    pub(crate) fn set_warning(&mut self, warning: Option<String>) {
        self.last_warning = warning;
    }

    fn fail(&mut self, context: impl Into<String>, err: io::Error) -> Error {
        self.connect_error = true;
        self.stream = None;
        self.persistent = false;
        Error::connection(context, err)
    }

    /// Dial and handshake unless a socket is already open.
    pub fn connect(&mut self, cfg: &ClientConfig) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.connect_error = false;

        let endpoint = cfg.endpoint()?;
        let timeout = cfg.connect_timeout;
        let started = Instant::now();

        let mut stream = match Transport::dial(&endpoint, timeout) {
            Ok(s) => s,
            Err(e) => return Err(self.fail(format!("dial {endpoint}"), e)),
        };
        let deadline = (!timeout.is_zero()).then_some(timeout);
        if let Err(e) = stream.set_timeout(deadline) {
            return Err(self.fail("set handshake deadline", e));
        }

        let mut version = [0u8; 4];
        if let Err(e) = stream.read_exact(&mut version) {
            return Err(self.fail("read server version", e));
        }
        let version = u32::from_be_bytes(version);
        if version < 1 {
            return Err(Error::Handshake(format!(
                "expected searchd protocol version 1+, got version {version}"
            )));
        }

        if let Err(e) = stream.write_all(&VER_MAJOR_PROTO.to_be_bytes()) {
            return Err(self.fail("send client version", e));
        }
        if let Err(e) = stream.set_timeout(None) {
            return Err(self.fail("clear handshake deadline", e));
        }

        info!(
            endpoint = %endpoint,
            server_version = version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Connected to searchd"
        );
        self.server_version = version;
        self.stream = Some(stream);
        Ok(())
    }

    /// Connect and ask the daemon to keep the socket open across commands.
    ///
    /// The daemon does not reply to the persist command.
    pub fn open(&mut self, cfg: &ClientConfig) -> Result<()> {
        let packet = frame(Command::Persist, &encode_persist())?;
        self.connect(cfg)?;
        let written = match self.stream.as_mut() {
            Some(stream) => stream.write_all(&packet),
            None => return Err(Error::NotConnected),
        };
        if let Err(e) = written {
            return Err(self.fail("send persist", e));
        }
        self.persistent = true;
        debug!("Connection marked persistent");
        Ok(())
    }

    /// Close the socket; fails when nothing is open.
    pub fn close(&mut self) -> Result<()> {
        let Some(stream) = self.stream.take() else {
            return Err(Error::NotConnected);
        };
        self.persistent = false;
        if let Err(e) = stream.shutdown()
            && e.kind() != io::ErrorKind::NotConnected
        {
            return Err(Error::connection("close", e));
        }
        info!("Closed searchd connection");
        Ok(())
    }

    /// Send one framed command and return the reply body with any warning prefix removed.
    ///
    /// A WARNING reply stores its message as the last warning; ERROR and RETRY
    /// replies become [`Error::Protocol`].
    pub fn request(&mut self, cfg: &ClientConfig, command: Command, body: &[u8]) -> Result<Vec<u8>> {
        let packet = frame(command, body)?;
        self.connect(cfg)?;
        self.last_warning = None;
        let started = Instant::now();

        let result = self.round_trip(&packet);
        if !self.persistent {
            self.stream = None;
        }
        let (header, reply) = result?;

        debug!(
            command = ?command,
            request_len = body.len(),
            response_len = reply.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "searchd round trip"
        );
        self.check_status(header, reply)
    }

    fn round_trip(&mut self, packet: &[u8]) -> Result<(ResponseHeader, Vec<u8>)> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(Error::NotConnected);
        };
        if let Err(e) = stream.write_all(packet) {
            return Err(self.fail("send request", e));
        }

        let mut raw = [0u8; RESPONSE_HEADER_LEN];
        if let Err(e) = stream.read_exact(&mut raw) {
            return Err(self.fail("read response header", e));
        }
        let header = ResponseHeader::parse(&raw);
        if header.len == 0 || header.len > MAX_RESPONSE_LEN {
            self.stream = None;
            self.persistent = false;
            return Err(Error::Protocol(format!(
                "invalid response packet size (len={})",
                header.len
            )));
        }

        let mut reply = vec![0u8; header.len as usize];
        if let Err(e) = stream.read_exact(&mut reply) {
            return Err(self.fail(format!("read {} byte response body", header.len), e));
        }
        Ok((header, reply))
    }

    fn check_status(&mut self, header: ResponseHeader, reply: Vec<u8>) -> Result<Vec<u8>> {
        match SearchdStatus::from_code(u32::from(header.status)) {
            Some(SearchdStatus::Ok) => Ok(reply),
            Some(SearchdStatus::Warning) => {
                let mut r = PacketReader::new(&reply);
                let warning = r.get_string()?;
                warn!(warning = %warning, "searchd warning");
                let rest = reply[r.offset()..].to_vec();
                self.last_warning = Some(warning);
                Ok(rest)
            }
            Some(SearchdStatus::Error | SearchdStatus::Retry) => {
                let message = PacketReader::new(&reply).get_string()?;
                Err(Error::Protocol(message))
            }
            None => Err(Error::Protocol(format!(
                "unknown status code (status={}), ver: {}",
                header.status, header.version
            ))),
        }
    }
}


//! Line-framed TCP transport to the collection server.
//!
//! The client sends ASCII command lines, each answered with `OK` or
//! `ERR <reason>`:
//!
//! ```text
//! STOR <name>        start receiving a file under <name>
//! DATA <len>\n<raw>  one chunk of <len> raw bytes for the open file
//! END                close the open file
//! REN <from> <to>    atomically rename a completed file
//! ```
//!
//! Names never contain whitespace (the config layer enforces that for
//! device names, and sequence numbers are digits).

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::info;

use fieldrec_foundation::UploadError;

use crate::remote::RemoteStore;

/// Socket timeout for connects, sends and reply reads. A dead server shows
/// up as an error within this bound instead of hanging the upload thread.
const IO_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TcpStore {
    addr: String,
    conn: Option<Conn>,
}

struct Conn {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            conn: None,
        }
    }

    /// Runs one command exchange; any failure poisons the connection so the
    /// next attempt reconnects from scratch.
    fn command(&mut self, line: &str) -> Result<(), UploadError> {
        let conn = self.conn.as_mut().ok_or(UploadError::NotConnected)?;
        let result = conn.send_command(line);
        if result.is_err() {
            self.conn = None;
        }
        result
    }
}

impl RemoteStore for TcpStore {
    fn ensure_connected(&mut self) -> Result<(), UploadError> {
        if self.conn.is_some() {
            return Ok(());
        }
        let target = self
            .addr
            .to_socket_addrs()
            .map_err(|e| UploadError::ConnectFailed(format!("{}: {}", self.addr, e)))?
            .next()
            .ok_or_else(|| UploadError::ConnectFailed(format!("{}: no address", self.addr)))?;
        let stream = TcpStream::connect_timeout(&target, IO_TIMEOUT)
            .map_err(|e| UploadError::ConnectFailed(format!("{}: {}", self.addr, e)))?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        self.conn = Some(Conn { stream, reader });
        info!("Connected to collection server at {}", self.addr);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn begin_file(&mut self, name: &str) -> Result<(), UploadError> {
        self.command(&format!("STOR {}", name))
    }

    fn write_chunk(&mut self, data: &[u8]) -> Result<(), UploadError> {
        let conn = self.conn.as_mut().ok_or(UploadError::NotConnected)?;
        let result = conn.send_chunk(data);
        if result.is_err() {
            self.conn = None;
        }
        result
    }

    fn finish_file(&mut self) -> Result<(), UploadError> {
        self.command("END")
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), UploadError> {
        self.command(&format!("REN {} {}", from, to))
    }

    fn disconnect(&mut self) {
        self.conn = None;
    }

    fn describe(&self) -> String {
        format!("tcp:{}", self.addr)
    }
}

impl Conn {
    fn send_command(&mut self, line: &str) -> Result<(), UploadError> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.read_reply(line)
    }

    fn send_chunk(&mut self, data: &[u8]) -> Result<(), UploadError> {
        self.stream
            .write_all(format!("DATA {}\n", data.len()).as_bytes())?;
        self.stream.write_all(data)?;
        self.read_reply("DATA")
    }

    fn read_reply(&mut self, command: &str) -> Result<(), UploadError> {
        let mut reply = String::new();
        let n = self.reader.read_line(&mut reply)?;
        if n == 0 {
            return Err(UploadError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by remote",
            )));
        }
        let reply = reply.trim_end();
        if reply == "OK" {
            Ok(())
        } else {
            Err(UploadError::Refused {
                command: command.split_whitespace().next().unwrap_or("").to_string(),
                reply: reply.to_string(),
            })
        }
    }
}

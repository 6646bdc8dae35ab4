//! Shared fixtures for the integration tests.
//!
//! [`SpyConnector`] hands the client one end of an in-memory duplex pipe and
//! runs a scripted SMTP server on the other. The "TLS upgrade" only flips a
//! flag on the stream, which is enough to tell plaintext bytes from bytes
//! written after STARTTLS.

// Each test file is its own crate, so not every helper is used everywhere.
#![allow(dead_code)]

use async_trait::async_trait;
use referral_notifier::{
    config::SmtpConfig,
    models::{EmailMessage, OutgoingEmail},
    smtp::Connector,
};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
    duplex,
};

use std::{
    collections::HashMap,
    io,
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
    time::Duration,
};

pub const USERNAME: &str = "bot@example.com";
pub const PASSWORD: &str = "hunter2-secret";
pub const TLS_UPGRADE: &str = "<tls-upgrade>";

pub fn smtp_config() -> SmtpConfig {
    SmtpConfig {
        host: Some("mail.example.com".into()),
        port: Some("587".into()),
        username: Some(USERNAME.into()),
        password: Some(PASSWORD.into()),
        ehlo_domain: Some("notifier.test".into()),
        timeout: Duration::from_secs(5),
    }
}

pub fn email(body: &str) -> OutgoingEmail {
    OutgoingEmail::new(
        "admin@example.com",
        EmailMessage {
            subject: "New Referral: Jane Doe".into(),
            body: body.into(),
        },
    )
}

/// Everything observed on one connection.
#[derive(Default)]
pub struct Wire {
    plain: Mutex<Vec<u8>>,
    secure: Mutex<Vec<u8>>,
    commands: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
    shutdowns: AtomicUsize,
    drops: AtomicUsize,
}

impl Wire {
    pub fn plaintext(&self) -> String {
        String::from_utf8_lossy(&self.plain.lock().unwrap()).into_owned()
    }

    pub fn ciphertext(&self) -> String {
        String::from_utf8_lossy(&self.secure.lock().unwrap()).into_owned()
    }

    /// Command lines in the order the server read them, with
    /// [`TLS_UPGRADE`] where the stream was upgraded.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Message data received between `DATA` and the terminating dot.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }

    fn record(&self, line: impl Into<String>) {
        self.commands.lock().unwrap().push(line.into());
    }
}

/// Client side of the pipe. Records what it writes and when it goes away.
pub struct SpyStream {
    inner: DuplexStream,
    wire: Arc<Wire>,
    secure: bool,
}

impl AsyncRead for SpyStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SpyStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let written = match Pin::new(&mut self.inner).poll_write(cx, data) {
            Poll::Ready(Ok(n)) => n,
            other => return other,
        };
        let log = if self.secure {
            &self.wire.secure
        } else {
            &self.wire.plain
        };
        log.lock().unwrap().extend_from_slice(&data[..written]);
        Poll::Ready(Ok(written))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let result = Pin::new(&mut self.inner).poll_shutdown(cx);
        if result.is_ready() {
            self.wire.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        result
    }
}

impl Drop for SpyStream {
    fn drop(&mut self) {
        self.wire.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// How the fake server behaves.
#[derive(Clone, Default)]
pub struct Script {
    rejections: HashMap<&'static str, &'static str>,
    hang_up_on: Option<&'static str>,
    silent: bool,
    flood: Option<usize>,
    fail_upgrade: bool,
}

impl Script {
    /// Answers `verb` with `reply` instead of success.
    pub fn reject(mut self, verb: &'static str, reply: &'static str) -> Self {
        self.rejections.insert(verb, reply);
        self
    }

    /// Drops the connection instead of answering `verb`.
    pub fn hang_up_on(mut self, verb: &'static str) -> Self {
        self.hang_up_on = Some(verb);
        self
    }

    /// Accepts the connection and never says anything.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Greets with `220 ` followed by `bytes` of text and no line ending.
    pub fn flood(mut self, bytes: usize) -> Self {
        self.flood = Some(bytes);
        self
    }

    pub fn fail_upgrade(mut self) -> Self {
        self.fail_upgrade = true;
        self
    }
}

/// Connector that serves every connection from a [`Script`].
#[derive(Default)]
pub struct SpyConnector {
    script: Script,
    connects: AtomicUsize,
    wires: Mutex<Vec<Arc<Wire>>>,
}

impl SpyConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn wires(&self) -> Vec<Arc<Wire>> {
        self.wires.lock().unwrap().clone()
    }

    /// The only connection made so far.
    pub fn wire(&self) -> Arc<Wire> {
        let wires = self.wires();
        assert_eq!(wires.len(), 1, "expected exactly one connection");
        wires[0].clone()
    }
}

#[async_trait]
impl Connector for SpyConnector {
    type Plain = SpyStream;
    type Secure = SpyStream;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<SpyStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let wire = Arc::new(Wire::default());
        self.wires.lock().unwrap().push(wire.clone());

        let (client, server) = duplex(64 * 1024);
        tokio::spawn(serve(server, self.script.clone(), wire.clone()));

        Ok(SpyStream {
            inner: client,
            wire,
            secure: false,
        })
    }

    async fn upgrade(&self, mut stream: SpyStream, _host: &str) -> io::Result<SpyStream> {
        if self.script.fail_upgrade {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid peer certificate: UnknownIssuer",
            ));
        }
        stream.wire.record(TLS_UPGRADE);
        stream.secure = true;
        Ok(stream)
    }
}

fn verb(line: &str, auth_step: usize) -> &'static str {
    let upper = line.to_ascii_uppercase();
    match auth_step {
        1 => return "AUTH USER",
        2 => return "AUTH PASS",
        _ => {}
    }
    if upper.starts_with("EHLO") {
        "EHLO"
    } else if upper == "STARTTLS" {
        "STARTTLS"
    } else if upper == "AUTH LOGIN" {
        "AUTH LOGIN"
    } else if upper.starts_with("MAIL FROM:") {
        "MAIL FROM"
    } else if upper.starts_with("RCPT TO:") {
        "RCPT TO"
    } else if upper == "DATA" {
        "DATA"
    } else if upper == "QUIT" {
        "QUIT"
    } else {
        "UNKNOWN"
    }
}

fn success(verb: &str) -> &'static str {
    match verb {
        "EHLO" => "250-mock.example.com\r\n250-STARTTLS\r\n250 AUTH LOGIN\r\n",
        "STARTTLS" => "220 2.0.0 Ready to start TLS\r\n",
        "AUTH LOGIN" => "334 VXNlcm5hbWU6\r\n",
        "AUTH USER" => "334 UGFzc3dvcmQ6\r\n",
        "AUTH PASS" => "235 2.7.0 Authentication successful\r\n",
        "MAIL FROM" | "RCPT TO" => "250 2.1.0 OK\r\n",
        "DATA" => "354 End data with <CR><LF>.<CR><LF>\r\n",
        "QUIT" => "221 2.0.0 Bye\r\n",
        _ => "500 5.5.1 Unrecognized command\r\n",
    }
}

async fn serve(stream: DuplexStream, script: Script, wire: Arc<Wire>) -> io::Result<()> {
    let mut stream = BufReader::new(stream);

    if script.silent {
        // Keep the pipe open until the client gives up.
        let mut line = String::new();
        while stream.read_line(&mut line).await? > 0 {}
        return Ok(());
    }

    match script.flood {
        Some(bytes) => {
            stream.write_all(b"220 ").await?;
            stream.write_all(&vec![b'x'; bytes]).await?;
        }
        None => stream.write_all(b"220 mock.example.com ESMTP\r\n").await?,
    }

    let mut auth_step = 0;
    loop {
        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        let verb = verb(&line, auth_step);
        wire.record(line);

        if script.hang_up_on == Some(verb) {
            return Ok(());
        }
        if let Some(reply) = script.rejections.get(verb) {
            stream.write_all(format!("{reply}\r\n").as_bytes()).await?;
            auth_step = 0;
            continue;
        }

        auth_step = match verb {
            "AUTH LOGIN" => 1,
            "AUTH USER" => 2,
            _ => 0,
        };
        stream.write_all(success(verb).as_bytes()).await?;

        match verb {
            "DATA" => {
                let mut data = String::new();
                loop {
                    let mut line = String::new();
                    if stream.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line == ".\r\n" {
                        break;
                    }
                    data.push_str(&line);
                }
                wire.messages.lock().unwrap().push(data);
                stream.write_all(b"250 2.0.0 Ok: queued\r\n").await?;
            }
            "QUIT" => return Ok(()),
            _ => {}
        }
    }
}

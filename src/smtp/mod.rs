//! Minimal SMTP submission client.
//!
//! One [`SmtpNotifier::deliver`] call opens its own connection, runs the fixed
//! dialogue `EHLO`, `STARTTLS`, `EHLO`, `AUTH LOGIN`, `MAIL FROM`, `RCPT TO`,
//! `DATA`, `QUIT`, and closes the socket again. Nothing is pooled or retried.

mod connection;
mod error;
mod reply;

pub use connection::{Connection, Connector, StartTlsConnector};
pub use error::SmtpError;
pub use reply::{MAX_REPLY_LEN, Reply};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;

use std::{fmt, future::Future, io, time::Duration};

use crate::config::{SmtpConfig, SmtpSettings};
use crate::models::OutgoingEmail;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), SmtpError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    GreetedPlain,
    TlsNegotiating,
    Secured,
    GreetedSecure,
    Authenticated,
    SendingBody,
    Sent,
    Closed,
}

impl SessionState {
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Disconnected => Some(Self::Connected),
            Self::Connected => Some(Self::GreetedPlain),
            Self::GreetedPlain => Some(Self::TlsNegotiating),
            Self::TlsNegotiating => Some(Self::Secured),
            Self::Secured => Some(Self::GreetedSecure),
            Self::GreetedSecure => Some(Self::Authenticated),
            Self::Authenticated => Some(Self::SendingBody),
            Self::SendingBody => Some(Self::Sent),
            Self::Sent => Some(Self::Closed),
            Self::Closed => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::GreetedPlain => "greeted (plaintext)",
            Self::TlsNegotiating => "negotiating TLS",
            Self::Secured => "secured",
            Self::GreetedSecure => "greeted (TLS)",
            Self::Authenticated => "authenticated",
            Self::SendingBody => "sending body",
            Self::Sent => "sent",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

async fn timed<T, F>(state: SessionState, limit: Duration, op: F) -> Result<T, SmtpError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result.map_err(|e| SmtpError::transport(state, e)),
        Err(_) => Err(SmtpError::transport(
            state,
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no progress within {limit:?}"),
            ),
        )),
    }
}

struct Session<'a, C: Connector> {
    connector: &'a C,
    settings: SmtpSettings<'a>,
    conn: Option<Connection<C::Plain, C::Secure>>,
    state: SessionState,
}

impl<'a, C: Connector> Session<'a, C> {
    fn new(connector: &'a C, settings: SmtpSettings<'a>, stream: C::Plain) -> Self {
        Self {
            connector,
            settings,
            conn: Some(Connection::plain(stream)),
            state: SessionState::Connected,
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert_eq!(self.state.next(), Some(next), "skipped an SMTP session state");
        tracing::trace!(from = %self.state, to = %next, "smtp session state change");
        self.state = next;
    }

    fn conn(&mut self) -> Result<&mut Connection<C::Plain, C::Secure>, SmtpError> {
        let state = self.state;
        self.conn.as_mut().ok_or_else(|| {
            SmtpError::transport(
                state,
                io::Error::new(io::ErrorKind::NotConnected, "connection already closed"),
            )
        })
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SmtpError> {
        let (state, limit) = (self.state, self.settings.timeout);
        let conn = self.conn()?;
        timed(state, limit, conn.write_all(data)).await
    }

    /// Reads one complete reply. `command` names what it answers, for errors.
    async fn read_reply(&mut self, command: &str) -> Result<Reply, SmtpError> {
        let (state, limit) = (self.state, self.settings.timeout);
        let conn = self.conn()?;
        let mut raw = Vec::new();

        loop {
            // One byte past the cap is enough to know the reply is too long.
            let remaining = MAX_REPLY_LEN + 1 - raw.len();
            let mut line = Vec::new();
            let n = timed(state, limit, conn.read_line(&mut line, remaining)).await?;
            if n == 0 {
                return Err(SmtpError::transport(
                    state,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server"),
                ));
            }

            raw.extend_from_slice(&line);
            if raw.len() > MAX_REPLY_LEN {
                return Err(SmtpError::protocol(
                    command,
                    None,
                    format!("reply exceeds {MAX_REPLY_LEN} bytes"),
                ));
            }

            let line = String::from_utf8_lossy(&line);
            tracing::trace!("S: {}", line.trim_end());
            if Reply::is_last_line(&line) {
                break;
            }
        }

        Reply::parse(&String::from_utf8_lossy(&raw))
            .map_err(|reason| SmtpError::protocol(command, None, reason))
    }

    fn check(command: &str, reply: Reply) -> Result<Reply, SmtpError> {
        if reply.is_error() {
            return Err(SmtpError::protocol(command, Some(reply.code), reply.to_string()));
        }
        Ok(reply)
    }

    /// Sends one command line and checks the reply code.
    ///
    /// `label` is what shows up in logs and errors; credential lines pass a
    /// label instead of their content.
    async fn command(&mut self, label: &str, line: &str) -> Result<Reply, SmtpError> {
        tracing::debug!(state = %self.state, "C: {label}");
        self.write(format!("{line}\r\n").as_bytes()).await?;
        let reply = self.read_reply(label).await?;
        Self::check(label, reply)
    }

    async fn starttls(&mut self) -> Result<(), SmtpError> {
        let (state, limit) = (self.state, self.settings.timeout);
        let conn = self.conn.take().ok_or_else(|| {
            SmtpError::transport(
                state,
                io::Error::new(io::ErrorKind::NotConnected, "connection already closed"),
            )
        })?;

        let plain = match conn.into_plain() {
            Ok(plain) => plain,
            Err(conn) => {
                self.conn = Some(conn);
                return Err(SmtpError::protocol(
                    "STARTTLS",
                    None,
                    "server sent data before the TLS handshake",
                ));
            }
        };

        let secure = timed(
            state,
            limit,
            self.connector.upgrade(plain, self.settings.host),
        )
        .await?;
        self.conn = Some(Connection::tls(secure));
        tracing::debug!(host = self.settings.host, "STARTTLS upgrade complete");
        Ok(())
    }

    async fn deliver(&mut self, email: &OutgoingEmail) -> Result<(), SmtpError> {
        let greeting = self.read_reply("connection greeting").await?;
        Self::check("connection greeting", greeting)?;

        let ehlo = format!("EHLO {}", self.settings.ehlo_domain);
        self.command("EHLO", &ehlo).await?;
        self.advance(SessionState::GreetedPlain);

        self.command("STARTTLS", "STARTTLS").await?;
        self.advance(SessionState::TlsNegotiating);

        self.starttls().await?;
        self.advance(SessionState::Secured);

        self.command("EHLO", &ehlo).await?;
        self.advance(SessionState::GreetedSecure);

        self.command("AUTH LOGIN", "AUTH LOGIN").await?;
        let username = STANDARD.encode(self.settings.username);
        self.command("AUTH LOGIN (username)", &username).await?;
        let password = STANDARD.encode(self.settings.password);
        self.command("AUTH LOGIN (password)", &password).await?;
        self.advance(SessionState::Authenticated);

        let sender = self.settings.username;
        self.command("MAIL FROM", &format!("MAIL FROM:<{sender}>"))
            .await?;
        self.command("RCPT TO", &format!("RCPT TO:<{}>", email.to))
            .await?;
        let reply = self.command("DATA", "DATA").await?;
        if !reply.is_intermediate() {
            return Err(SmtpError::protocol("DATA", Some(reply.code), reply.to_string()));
        }
        self.advance(SessionState::SendingBody);

        let data = email.to_wire(sender, Utc::now());
        tracing::debug!(state = %self.state, bytes = data.len(), "C: <message data>");
        self.write(data.as_bytes()).await?;
        let reply = self.read_reply("message data").await?;
        Self::check("message data", reply)?;
        self.advance(SessionState::Sent);

        Ok(())
    }

    async fn quit(&mut self) {
        if self.write(b"QUIT\r\n").await.is_ok() {
            tracing::debug!(state = %self.state, "C: QUIT");
            let _ = self.read_reply("QUIT").await;
        }
    }

    /// Shuts the socket down and drops it. Runs once per session.
    async fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            let _ = tokio::time::timeout(self.settings.timeout, conn.shutdown()).await;
        }
        self.state = SessionState::Closed;
    }
}

pub struct SmtpNotifier<C = StartTlsConnector> {
    config: SmtpConfig,
    connector: C,
}

impl<C: Connector> SmtpNotifier<C> {
    pub const fn new(config: SmtpConfig, connector: C) -> Self {
        Self { config, connector }
    }

    pub const fn config(&self) -> &SmtpConfig {
        &self.config
    }

    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// The connection is closed before this returns, whatever the outcome.
    pub async fn deliver(&self, email: &OutgoingEmail) -> Result<(), SmtpError> {
        let settings = self.config.validate()?;

        tracing::debug!(
            host = settings.host,
            port = settings.port,
            "opening SMTP connection"
        );
        let stream = timed(
            SessionState::Disconnected,
            settings.timeout,
            self.connector.connect(settings.host, settings.port),
        )
        .await?;

        let mut session = Session::new(&self.connector, settings, stream);
        let outcome = session.deliver(email).await;

        // A transport failure leaves nothing worth talking to.
        if !matches!(outcome, Err(SmtpError::Transport { .. })) {
            session.quit().await;
        }
        session.close().await;

        match &outcome {
            Ok(()) => tracing::info!(to = %email.to, "notification email delivered"),
            Err(e) => tracing::warn!(to = %email.to, error = %e, "notification email failed"),
        }
        outcome
    }
}

#[async_trait]
impl<C: Connector> Mailer for SmtpNotifier<C> {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), SmtpError> {
        self.deliver(email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_advance_linearly_to_closed() {
        let mut state = SessionState::Disconnected;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            seen.push(next);
            state = next;
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(seen.last(), Some(&SessionState::Closed));
    }

    #[test]
    fn failure_replies_become_protocol_errors() {
        let reply = Reply::parse("550 mailbox unavailable\r\n").unwrap();
        let err = Session::<StartTlsConnector>::check("RCPT TO", reply).unwrap_err();
        match err {
            SmtpError::Protocol {
                command,
                code,
                response,
            } => {
                assert_eq!(command, "RCPT TO");
                assert_eq!(code, Some(550));
                assert_eq!(response, "550 mailbox unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn timed_maps_expiry_to_transport_error() {
        let err = timed(
            SessionState::Connected,
            Duration::from_millis(10),
            std::future::pending::<io::Result<()>>(),
        )
        .await
        .unwrap_err();

        match err {
            SmtpError::Transport { state, source } => {
                assert_eq!(state, SessionState::Connected);
                assert_eq!(source.kind(), io::ErrorKind::TimedOut);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

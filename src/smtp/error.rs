use std::io;

use super::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum SmtpError {
    /// A required SMTP setting is absent. Raised before any connection is made.
    #[error("SMTP configuration error: {0}")]
    Configuration(String),

    /// The network failed underneath the dialogue: DNS, refused connection,
    /// TLS handshake, reset, or an operation that exceeded its timeout.
    #[error("SMTP transport error while {state}: {source}")]
    Transport {
        state: SessionState,
        #[source]
        source: io::Error,
    },

    /// The server answered a command with a failure reply, or with something
    /// that is not an SMTP reply at all.
    #[error("SMTP server rejected {command}: {response}")]
    Protocol {
        command: String,
        code: Option<u16>,
        response: String,
    },
}

impl SmtpError {
    pub(crate) fn transport(state: SessionState, source: io::Error) -> Self {
        Self::Transport { state, source }
    }

    pub(crate) fn protocol(command: &str, code: Option<u16>, response: impl Into<String>) -> Self {
        Self::Protocol {
            command: command.to_string(),
            code,
            response: response.into(),
        }
    }

    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

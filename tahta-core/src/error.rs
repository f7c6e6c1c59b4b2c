use thiserror::Error;

/// Unified error type for the tahta workspace.
///
/// Covers the failure taxonomy of the streaming session: lifecycle misuse
/// (`NotInitialized`/`NotConnected`), transport failures surfaced from
/// user-facing operations (`Connection`/`Close`), the terminal reconnect
/// outcome (`MaxReconnectExceeded`), and frame decode problems (`Parse`,
/// logged by the session rather than propagated).
#[derive(Debug, Error)]
pub enum TahtaError {
    /// An operation required a connection that was never opened.
    #[error("connection not initialized; call connect first")]
    NotInitialized,

    /// An operation required an open connection, but the connection is
    /// closed, lost, or still being re-established.
    #[error("connection is not open")]
    NotConnected,

    /// The transport handshake or an in-flight send failed.
    #[error("connection failed: {message}")]
    Connection {
        /// Human-readable transport failure description.
        message: String,
    },

    /// The close handshake reported a failure. Session state is still
    /// fully reset when this is returned.
    #[error("close failed: {message}")]
    Close {
        /// Human-readable close failure description.
        message: String,
    },

    /// Every reconnect attempt failed; the session is terminally closed.
    #[error("reconnect abandoned after {attempts} failed attempts")]
    MaxReconnectExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// An inbound frame could not be decoded.
    #[error("malformed feed frame: {message}")]
    Parse {
        /// What was wrong with the frame.
        message: String,
    },

    /// Unknown/opaque error.
    #[error("unknown error: {0}")]
    Other(String),
}

impl TahtaError {
    /// Helper: build a `Connection` error from any displayable cause.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Helper: build a `Close` error from any displayable cause.
    pub fn close(message: impl Into<String>) -> Self {
        Self::Close {
            message: message.into(),
        }
    }

    /// Helper: build a `Parse` error for an undecodable frame.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// `true` for errors produced by background activity that the session
    /// logs and swallows rather than surfacing to a caller.
    #[must_use]
    pub const fn is_background(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::TahtaError;

    #[test]
    fn display_formats() {
        assert_eq!(
            TahtaError::connection("refused").to_string(),
            "connection failed: refused"
        );
        assert_eq!(
            TahtaError::MaxReconnectExceeded { attempts: 5 }.to_string(),
            "reconnect abandoned after 5 failed attempts"
        );
        assert!(TahtaError::parse("bad json").is_background());
        assert!(!TahtaError::NotConnected.is_background());
    }
}

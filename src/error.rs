//! Device-facing error taxonomy.
//!
//! ERROR HANDLING
//! ==============
//! Every variant is recovered locally: the poll cycle or command that hit it
//! is abandoned and logged, the session keeps running. `error_code` gives a
//! grepable tag for log lines.

/// Failures talking to, or making sense of, the show device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Transport-level failure: connect refused, reset, timeout.
    #[error("network request failed: {0}")]
    Network(String),

    /// The device answered with a non-success HTTP status.
    #[error("device returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// The response body was not well-formed XML.
    #[error("malformed device response: {0}")]
    Parse(String),

    /// Well-formed XML that lacks what the protocol promises.
    #[error("protocol anomaly: {0}")]
    ProtocolAnomaly(String),
}

impl DeviceError {
    /// Stable code for structured log fields.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::HttpStatus { .. } => "E_HTTP_STATUS",
            Self::Parse(_) => "E_PARSE",
            Self::ProtocolAnomaly(_) => "E_PROTOCOL_ANOMALY",
        }
    }

    /// Whether the next cycle can expect a different outcome.
    #[must_use]
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::HttpStatus { status: 429 | 500..=599 })
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;

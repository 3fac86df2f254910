//! Device transport: the three HTTP exchanges the controller makes.
//!
//! DESIGN
//! ======
//! `DeviceTransport` is the seam between session logic and the network.
//! `HttpTransport` is a thin `reqwest` wrapper: two XML GETs and the command
//! GET whose query string is the wire command. Bodies are returned raw;
//! parsing lives in `status` and `catalog`.
//!
//! ERROR HANDLING
//! ==============
//! Connect failures, resets and timeouts are `DeviceError::Network`; any
//! non-2xx reply is `DeviceError::HttpStatus`. The command response body is
//! never read.

use tracing::debug;

use crate::config::{ConfigError, ControllerConfig};
use crate::error::DeviceError;

#[async_trait::async_trait]
pub trait DeviceTransport: Send + Sync {
    /// GET the live status document.
    async fn fetch_status(&self) -> Result<String, DeviceError>;

    /// GET the table of contents.
    async fn fetch_catalog(&self) -> Result<String, DeviceError>;

    /// Issue one wire command.
    async fn send_command(&self, wire: &str) -> Result<(), DeviceError>;
}

// =============================================================================
// HTTP
// =============================================================================

pub struct HttpTransport {
    http: reqwest::Client,
    device_url: String,
    status_url: String,
    toc_url: String,
}

impl HttpTransport {
    /// Build a transport for the configured device.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ControllerConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(config.timings.request_timeout)
            .connect_timeout(config.timings.connect_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            device_url: config.device_url.clone(),
            status_url: format!("{}/{}", config.device_url, config.status_path),
            toc_url: format!("{}/{}", config.device_url, config.toc_path),
        })
    }

    /// Full URL a wire command is sent to.
    #[must_use]
    pub fn command_url(&self, wire: &str) -> String {
        format!("{}/?{wire}", self.device_url)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, DeviceError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DeviceError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::HttpStatus { status: status.as_u16() });
        }
        Ok(response)
    }

    async fn get_text(&self, url: &str) -> Result<String, DeviceError> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| DeviceError::Network(e.to_string()))
    }
}

#[async_trait::async_trait]
impl DeviceTransport for HttpTransport {
    async fn fetch_status(&self) -> Result<String, DeviceError> {
        self.get_text(&self.status_url).await
    }

    async fn fetch_catalog(&self) -> Result<String, DeviceError> {
        self.get_text(&self.toc_url).await
    }

    async fn send_command(&self, wire: &str) -> Result<(), DeviceError> {
        let url = self.command_url(wire);
        debug!(%url, "sending device command");
        self.get(&url).await.map(drop)
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    /// Scriptable in-memory device.
    pub(crate) struct MockTransport {
        status: Mutex<Result<String, DeviceError>>,
        catalog: Mutex<Result<String, DeviceError>>,
        command_failure: Mutex<Option<DeviceError>>,
        command_latency: Mutex<Duration>,
        status_latency: Mutex<Duration>,
        sent: Mutex<Vec<String>>,
        status_fetches: AtomicUsize,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self {
                status: Mutex::new(Err(DeviceError::ProtocolAnomaly("no status scripted".into()))),
                catalog: Mutex::new(Ok("<toc/>".into())),
                command_failure: Mutex::new(None),
                command_latency: Mutex::new(Duration::ZERO),
                status_latency: Mutex::new(Duration::ZERO),
                sent: Mutex::new(Vec::new()),
                status_fetches: AtomicUsize::new(0),
            }
        }

        pub(crate) fn set_status(&self, xml: &str) {
            *self.status.lock().unwrap() = Ok(xml.to_owned());
        }

        pub(crate) fn fail_status(&self, err: DeviceError) {
            *self.status.lock().unwrap() = Err(err);
        }

        pub(crate) fn set_catalog(&self, reply: Result<String, DeviceError>) {
            *self.catalog.lock().unwrap() = reply;
        }

        pub(crate) fn fail_commands(&self, err: Option<DeviceError>) {
            *self.command_failure.lock().unwrap() = err;
        }

        pub(crate) fn set_command_latency(&self, latency: Duration) {
            *self.command_latency.lock().unwrap() = latency;
        }

        pub(crate) fn set_status_latency(&self, latency: Duration) {
            *self.status_latency.lock().unwrap() = latency;
        }

        pub(crate) fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub(crate) fn status_fetches(&self) -> usize {
            self.status_fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl DeviceTransport for MockTransport {
        async fn fetch_status(&self) -> Result<String, DeviceError> {
            self.status_fetches.fetch_add(1, Ordering::SeqCst);
            let latency = *self.status_latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.status.lock().unwrap().clone()
        }

        async fn fetch_catalog(&self) -> Result<String, DeviceError> {
            self.catalog.lock().unwrap().clone()
        }

        async fn send_command(&self, wire: &str) -> Result<(), DeviceError> {
            let latency = *self.command_latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            self.sent.lock().unwrap().push(wire.to_owned());
            match self.command_failure.lock().unwrap().clone() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;

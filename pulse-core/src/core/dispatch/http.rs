use crate::core::dispatch::{BatchSender, DeliveryError, Result, Sender};
use crate::core::metrics::Metric;
use async_trait::async_trait;
use derive_more::Display;
use log::{debug, trace};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

const UPDATE_PATH: &str = "update/";
const UPDATES_PATH: &str = "updates/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// The HTTP sender which posts metrics as JSON to the remote collector.
///
/// Single metrics are posted to `{address}/update/`, batches to `{address}/updates/`.
#[derive(Debug, Display)]
#[display("{}", address)]
pub struct HttpSender {
    address: Url,
    update_url: Url,
    updates_url: Url,
    client: Client,
    closed: AtomicBool,
}

impl HttpSender {
    /// Returns a builder for the http sender.
    pub fn builder() -> HttpSenderBuilder {
        HttpSenderBuilder::default()
    }

    /// Returns the base address of the remote collector.
    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Returns true when the sender has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &Url, payload: &T) -> Result<()> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }

        let body = serde_json::to_vec(payload)
            .map_err(|e| DeliveryError::InvalidPayload(e.to_string()))?;
        trace!("Posting {} bytes to {}", body.len(), url);
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(Self::map_error)?;

        Self::handle_response(url, response).await
    }

    async fn handle_response(url: &Url, response: Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            trace!("Collector {} responded with {}", url, status);
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        debug!("Collector {} responded with {}, {}", url, status, body);
        Err(DeliveryError::Status(status.as_u16(), body))
    }

    fn map_error(err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else if err.is_connect() || err.is_request() {
            DeliveryError::Connection(err.to_string())
        } else if err.is_builder() || err.is_body() {
            DeliveryError::InvalidPayload(err.to_string())
        } else if let Some(status) = err.status() {
            DeliveryError::Status(status.as_u16(), err.to_string())
        } else {
            DeliveryError::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl Sender for HttpSender {
    async fn send(&self, metric: &Metric) -> Result<()> {
        self.post(&self.update_url, metric).await
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::Relaxed) {
            debug!("Http sender {} has been closed", self);
        }
    }
}

#[async_trait]
impl BatchSender for HttpSender {
    async fn send_batch(&self, metrics: &[Metric]) -> Result<()> {
        if metrics.is_empty() {
            trace!("Skipping empty batch for {}", self);
            return Ok(());
        }

        self.post(&self.updates_url, metrics).await
    }
}

/// Builder for the [HttpSender].
#[derive(Debug, Default)]
pub struct HttpSenderBuilder {
    address: Option<String>,
    timeout: Option<Duration>,
}

impl HttpSenderBuilder {
    /// Set the base address of the remote collector.
    /// An address without scheme, such as `localhost:8080`, is treated as a `http` address.
    pub fn address<S: Into<String>>(mut self, address: S) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Set the timeout of a single request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the http sender.
    ///
    /// It returns [DeliveryError::InvalidAddress] when the address is missing or invalid.
    pub fn build(self) -> Result<HttpSender> {
        let address = self
            .address
            .ok_or_else(|| DeliveryError::InvalidAddress("address is missing".to_string()))?;
        let address = parse_address(address.as_str())?;
        let update_url = join(&address, UPDATE_PATH)?;
        let updates_url = join(&address, UPDATES_PATH)?;
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| DeliveryError::Connection(e.to_string()))?;

        Ok(HttpSender {
            address,
            update_url,
            updates_url,
            client,
            closed: Default::default(),
        })
    }
}

fn parse_address(address: &str) -> Result<Url> {
    let address = address.trim();
    let value = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let mut url = Url::parse(value.as_str())
        .map_err(|e| DeliveryError::InvalidAddress(format!("{}, {}", address, e)))?;

    if url.cannot_be_a_base() {
        return Err(DeliveryError::InvalidAddress(address.to_string()));
    }
    // the base path needs a trailing slash, otherwise joining replaces the last segment
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(path.as_str());
    }

    Ok(url)
}

fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| DeliveryError::InvalidAddress(format!("{}, {}", base, e)))
}

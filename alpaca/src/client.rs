//! Alpaca HTTP Client

use crate::{AlpacaDevice, ALPACA_API_VERSION, TELESCOPE_DEVICE_TYPE};
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const CLIENT_ID: u32 = 1;
static TRANSACTION_ID: AtomicU32 = AtomicU32::new(0);

/// ASCOM error number for "not implemented"
pub const ERROR_NOT_IMPLEMENTED: i32 = 0x400;
/// ASCOM error number for "not connected"
pub const ERROR_NOT_CONNECTED: i32 = 0x407;

#[derive(Debug, Error)]
pub enum AlpacaError {
    #[error("Connection timeout after {duration_ms}ms during {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Connection refused: {url} - {cause}")]
    ConnectionRefused { url: String, cause: String },

    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },

    #[error("Device error {code}: {message}")]
    DeviceError { code: i32, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

impl AlpacaError {
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        AlpacaError::Timeout { operation: operation.into(), duration_ms }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            AlpacaError::Timeout { .. } => true,
            AlpacaError::ConnectionRefused { .. } => true,
            // 5xx and rate limiting
            AlpacaError::HttpError { status, .. } => *status >= 500 || *status == 429,
            AlpacaError::RequestFailed(_) => true,
            AlpacaError::DeviceError { .. }
            | AlpacaError::ParseError(_)
            | AlpacaError::OperationFailed(_)
            | AlpacaError::RetryExhausted { .. } => false,
        }
    }

    /// True when the device reported it is not connected
    pub fn is_not_connected(&self) -> bool {
        matches!(self, AlpacaError::DeviceError { code: ERROR_NOT_CONNECTED, .. })
    }
}

impl From<reqwest::Error> for AlpacaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AlpacaError::timeout("HTTP request", TimeoutConfig::default().standard_operation_ms)
        } else if err.is_connect() {
            let url = err.url().map(|u| u.to_string()).unwrap_or_else(|| "unknown".to_string());
            AlpacaError::ConnectionRefused { url, cause: err.to_string() }
        } else if let Some(status) = err.status() {
            AlpacaError::HttpError { status: status.as_u16(), message: err.to_string() }
        } else if err.is_decode() {
            AlpacaError::ParseError(err.to_string())
        } else {
            AlpacaError::RequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AlpacaError {
    fn from(err: serde_json::Error) -> Self {
        AlpacaError::ParseError(err.to_string())
    }
}

pub fn get_client_transaction() -> (u32, u32) {
    let transaction_id = TRANSACTION_ID.fetch_add(1, Ordering::SeqCst);
    (CLIENT_ID, transaction_id)
}

/// Timeouts for the telescope operations the flip uses
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Status reads (connected, coordinates, slewing)
    pub quick_query_ms: u64,
    /// Commands and slew starts
    pub standard_operation_ms: u64,
    /// Upper bound on waiting for a slew to finish
    pub slew_complete_ms: u64,
    pub connect_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            quick_query_ms: 5000,
            standard_operation_ms: 60000,
            slew_complete_ms: 300000,
            connect_ms: 15000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 2.0 doubles the delay each attempt
    pub backoff_multiplier: f64,
    /// +/- 25% jitter on each delay
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retrying after attempt `attempt` (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay_ms as f64);
        let delay = if self.use_jitter {
            capped * rand::thread_rng().gen_range(0.75..=1.25)
        } else {
            capped
        };
        Duration::from_millis(delay as u64)
    }
}

/// Alpaca API response wrapper. `Value` is absent on void methods.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlpacaResponse<T> {
    pub value: Option<T>,
    #[serde(default)]
    pub client_transaction_id: u32,
    #[serde(default)]
    pub server_transaction_id: u32,
    #[serde(default)]
    pub error_number: i32,
    #[serde(default)]
    pub error_message: String,
}

impl<T> AlpacaResponse<T> {
    /// Device error, if the server reported one
    pub fn into_result(self) -> Result<Option<T>, AlpacaError> {
        if self.error_number != 0 {
            return Err(AlpacaError::DeviceError { code: self.error_number, message: self.error_message });
        }
        Ok(self.value)
    }
}

/// Client for one Alpaca telescope
pub struct AlpacaClient {
    http_client: Client,
    base_url: String,
    device_number: u32,
    timeout_config: TimeoutConfig,
    retry_config: RetryConfig,
}

impl AlpacaClient {
    pub fn new(device: &AlpacaDevice) -> Result<Self, AlpacaError> {
        Self::with_config(device, TimeoutConfig::default(), RetryConfig::default())
    }

    pub fn with_config(
        device: &AlpacaDevice,
        timeout_config: TimeoutConfig,
        retry_config: RetryConfig,
    ) -> Result<Self, AlpacaError> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(timeout_config.standard_operation_ms))
            .connect_timeout(Duration::from_millis(timeout_config.connect_ms))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AlpacaError::RequestFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: device.base_url.clone(),
            device_number: device.device_number,
            timeout_config,
            retry_config,
        })
    }

    pub fn timeout_config(&self) -> &TimeoutConfig {
        &self.timeout_config
    }

    fn build_url(&self, endpoint: &str) -> String {
        build_url(&self.base_url, self.device_number, endpoint)
    }

    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> Result<T, AlpacaError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, AlpacaError>>,
    {
        let mut last_error = AlpacaError::OperationFailed("No attempts made".to_string());

        for attempt in 0..self.retry_config.max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = e;
                    if !last_error.is_retryable() {
                        return Err(last_error);
                    }
                    if attempt + 1 < self.retry_config.max_attempts {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        debug!(
                            "Request failed (attempt {}/{}), retrying in {:?}: {}",
                            attempt + 1,
                            self.retry_config.max_attempts,
                            delay,
                            last_error
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(AlpacaError::RetryExhausted {
            attempts: self.retry_config.max_attempts,
            last_error: last_error.to_string(),
        })
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<Option<T>, AlpacaError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlpacaError::HttpError { status: status.as_u16(), message: body });
        }
        let body = response.text().await?;
        let parsed: AlpacaResponse<T> = serde_json::from_str(&body)?;
        parsed.into_result()
    }

    async fn get_raw<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Option<T>, AlpacaError> {
        self.execute_with_retry(|| async move {
            let (client_id, transaction_id) = get_client_transaction();
            let url = format!(
                "{}?ClientID={}&ClientTransactionID={}",
                self.build_url(endpoint),
                client_id,
                transaction_id
            );
            let response = self
                .http_client
                .get(&url)
                .timeout(Duration::from_millis(self.timeout_config.quick_query_ms))
                .send()
                .await?;
            Self::read_response(response).await
        })
        .await
    }

    async fn put_raw<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>, AlpacaError> {
        self.execute_with_retry(|| async move {
            let (client_id, transaction_id) = get_client_transaction();
            let mut form: Vec<(&str, String)> = vec![
                ("ClientID", client_id.to_string()),
                ("ClientTransactionID", transaction_id.to_string()),
            ];
            form.extend(params.iter().map(|(k, v)| (*k, v.to_string())));

            let response = self.http_client.put(self.build_url(endpoint)).form(&form).send().await?;
            Self::read_response(response).await
        })
        .await
    }

    /// GET a property value
    pub async fn get_typed<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, AlpacaError> {
        self.get_raw(endpoint)
            .await?
            .ok_or_else(|| AlpacaError::ParseError(format!("{}: response has no Value", endpoint)))
    }

    /// PUT a method that returns a value
    pub async fn put_typed<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, AlpacaError> {
        self.put_raw(endpoint, params)
            .await?
            .ok_or_else(|| AlpacaError::ParseError(format!("{}: response has no Value", endpoint)))
    }

    /// PUT a void method
    pub async fn put_void(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<(), AlpacaError> {
        self.put_raw::<serde::de::IgnoredAny>(endpoint, params).await.map(|_| ())
    }
}

fn build_url(base_url: &str, device_number: u32, endpoint: &str) -> String {
    format!(
        "{}/api/v{}/{}/{}/{}",
        base_url, ALPACA_API_VERSION, TELESCOPE_DEVICE_TYPE, device_number, endpoint
    )
}

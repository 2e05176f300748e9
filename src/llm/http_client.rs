use super::scrub::api_error;
use crate::error::{ProviderError, ProviderErrorKind};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub fn build_provider_client() -> Client {
    build_provider_client_with_timeout(DEFAULT_TIMEOUT_SECS)
}

pub fn build_provider_client_with_timeout(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Send a request and decode a JSON success body, mapping every failure onto
/// [`ProviderError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    backend: &str,
    display_name: &str,
    request: RequestBuilder,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(backend, &e))?;

    if !response.status().is_success() {
        return Err(api_error(backend, display_name, response).await);
    }

    response.json::<T>().await.map_err(|e| {
        ProviderError::new(
            backend,
            ProviderErrorKind::Decode,
            format!("{display_name} response could not be decoded: {e}"),
        )
    })
}

use crate::domain::ports::{HttpMethod, TransportResponse, UploadRequest, UploadTransport};
use crate::utils::error::UploadError;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;

/// 以 reqwest 實作的上傳傳輸層
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, UploadError> {
        let client = Client::builder()
            .user_agent(concat!("wx-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl UploadTransport for ReqwestTransport {
    async fn send(&self, request: &UploadRequest) -> Result<TransportResponse, UploadError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url).query(&request.params),
            HttpMethod::Post => self.client.post(&request.url).form(&request.params),
        };

        let response = builder.timeout(request.timeout).send().await?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await?;

        tracing::debug!("Endpoint answered HTTP {}: {}", status, body.trim());

        Ok(TransportResponse {
            status,
            body,
            retry_after,
        })
    }
}

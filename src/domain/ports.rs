use crate::domain::model::NormalizedRecord;
use crate::utils::error::UploadError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// 已組好參數的上傳請求
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub method: HttpMethod,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    /// `Retry-After` 標頭（秒）
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Sent { attempts: u32 },
    Throttled,
}

/// HTTP 傳輸層；正式環境使用 reqwest，測試可替換
pub trait UploadTransport: Send + Sync {
    fn send(
        &self,
        request: &UploadRequest,
    ) -> impl std::future::Future<Output = Result<TransportResponse, UploadError>> + Send;
}

#[async_trait]
pub trait RecordSink: Send {
    async fn deliver(&mut self, record: NormalizedRecord) -> Result<UploadOutcome, UploadError>;
}

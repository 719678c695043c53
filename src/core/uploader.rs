use crate::config::toml_config::EndpointConfig;
use crate::domain::model::NormalizedRecord;
use crate::domain::ports::{RecordSink, UploadOutcome, UploadRequest, UploadTransport};
use crate::utils::error::UploadError;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// 將紀錄上傳到 PWS 端點。
///
/// 暫時性錯誤（網路、逾時、5xx、429）以指數退避重試，次數上限由設定決定；
/// 用盡後回傳錯誤，由呼叫端記錄並丟棄該筆紀錄。
pub struct Uploader<T: UploadTransport> {
    transport: T,
    endpoint: EndpointConfig,
    last_success: Option<Instant>,
}

impl<T: UploadTransport> Uploader<T> {
    pub fn new(transport: T, endpoint: EndpointConfig) -> Self {
        Self {
            transport,
            endpoint,
            last_success: None,
        }
    }

    /// 組合請求參數：固定參數、站台憑證，最後是紀錄欄位（可覆蓋固定參數，例如 `dateutc`）
    pub fn build_request(&self, record: &NormalizedRecord) -> UploadRequest {
        let mut params = self.endpoint.static_params();
        params.push(("ID".to_string(), self.endpoint.station_id.clone()));
        params.push(("PASSWORD".to_string(), self.endpoint.station_key.clone()));

        for (key, value) in record.to_params() {
            match params.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => params.push((key, value)),
            }
        }

        UploadRequest {
            method: self.endpoint.method(),
            url: self.endpoint.base_url().to_string(),
            params,
            timeout: self.endpoint.timeout(),
        }
    }

    pub async fn upload(&mut self, record: &NormalizedRecord) -> Result<UploadOutcome, UploadError> {
        if let (Some(min_interval), Some(last)) = (self.endpoint.min_interval(), self.last_success) {
            if last.elapsed() < min_interval {
                tracing::debug!(
                    "Skipping upload, last one was {:?} ago (min interval {:?})",
                    last.elapsed(),
                    min_interval
                );
                return Ok(UploadOutcome::Throttled);
            }
        }

        let request = self.build_request(record);
        tracing::debug!("Uploading: {}", redacted(&request.params));

        let max_attempts = self.endpoint.retry_attempts().max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.send_once(&request).await {
                Ok(()) => {
                    self.last_success = Some(Instant::now());
                    tracing::info!("✅ Uploaded {} fields (attempt {})", record.len(), attempt);
                    return Ok(UploadOutcome::Sent { attempts: attempt });
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff_delay(attempt, &e);
                    if e.is_timeout() {
                        tracing::warn!(
                            "⚠️ Upload attempt {}/{} timed out after {:?}; retrying in {:?}",
                            attempt,
                            max_attempts,
                            request.timeout,
                            delay
                        );
                    } else {
                        tracing::warn!(
                            "⚠️ Upload attempt {}/{} failed: {}; retrying in {:?}",
                            attempt,
                            max_attempts,
                            e,
                            delay
                        );
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_transient() => {
                    return Err(UploadError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &UploadRequest) -> Result<(), UploadError> {
        let response = self.transport.send(request).await?;

        if !(200..300).contains(&response.status) {
            return Err(UploadError::Status {
                status: response.status,
                body: response.body,
                retry_after: response.retry_after,
            });
        }

        if response.body.contains(self.endpoint.success_marker()) {
            Ok(())
        } else {
            Err(UploadError::Rejected {
                body: response.body.trim().to_string(),
            })
        }
    }

    /// `retry_delay * 2^(attempt-1)`；若端點給了 `Retry-After` 則以其為準，皆不超過上限
    pub fn backoff_delay(&self, attempt: u32, error: &UploadError) -> Duration {
        let delay = match error.retry_after() {
            Some(secs) => Duration::from_secs(secs),
            None => {
                let exponent = attempt.saturating_sub(1).min(16);
                self.endpoint.retry_delay().saturating_mul(1u32 << exponent)
            }
        };
        delay.min(self.endpoint.max_retry_delay())
    }
}

#[async_trait]
impl<T: UploadTransport> RecordSink for Uploader<T> {
    async fn deliver(&mut self, record: NormalizedRecord) -> Result<UploadOutcome, UploadError> {
        self.upload(&record).await
    }
}

fn redacted(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| {
            if key == "PASSWORD" {
                format!("{}=***", key)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

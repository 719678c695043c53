use crate::adapters::http::ReqwestTransport;
use crate::config::toml_config::RelayConfig;
use crate::core::parser;
use crate::core::supervisor::ProcessSupervisor;
use crate::core::translation::TranslationEngine;
use crate::core::uploader::Uploader;
use crate::domain::model::NormalizedRecord;
use crate::domain::ports::{RecordSink, UploadOutcome};
use crate::utils::error::{RelayError, Result};
use crate::utils::monitor::RelayMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

const STATS_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// 單行處理：解析、轉換、套用空紀錄政策
pub struct LineProcessor {
    engine: TranslationEngine,
    monitor: Arc<RelayMonitor>,
    upload_empty_records: bool,
}

impl LineProcessor {
    pub fn new(
        engine: TranslationEngine,
        monitor: Arc<RelayMonitor>,
        upload_empty_records: bool,
    ) -> Self {
        Self {
            engine,
            monitor,
            upload_empty_records,
        }
    }

    /// 回傳要上傳的紀錄；`None` 表示這一行不需要上傳
    pub fn process_line(&mut self, line: &str) -> Option<NormalizedRecord> {
        self.monitor.record_line();

        let raw = match parser::parse(line) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("⚠️ {}", e);
                self.monitor.record_parse_failure();
                return None;
            }
        };

        let translation = self.engine.translate(&raw);
        if !translation.errors.is_empty() {
            self.monitor
                .record_conversion_failures(translation.errors.len() as u64);
        }

        let record = translation.record;
        if record.is_empty() {
            self.monitor.record_empty();
            if !self.upload_empty_records {
                tracing::debug!("No mapped fields in reading, nothing to upload");
                return None;
            }
            tracing::debug!("No mapped fields in reading, sending heartbeat");
        }

        Some(record)
    }
}

/// 讀取 decoder 輸出直到通道關閉，轉換後放入上傳佇列。
///
/// 佇列滿時丟棄紀錄，避免上傳卡住時回壓到 decoder 的 stdout。
pub async fn run_processing(
    mut lines: mpsc::Receiver<String>,
    mut processor: LineProcessor,
    queue: mpsc::Sender<NormalizedRecord>,
) {
    let mut stats_tick = tokio::time::interval_at(
        tokio::time::Instant::now() + STATS_INTERVAL,
        STATS_INTERVAL,
    );

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                let Some(record) = processor.process_line(&line) else { continue };

                match queue.try_send(record) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!("⚠️ Upload queue full, dropping reading");
                        processor.monitor.record_dropped();
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::warn!("Upload worker is gone, stopping line processing");
                        break;
                    }
                }
            }
            _ = stats_tick.tick() => processor.monitor.log_stats("running"),
        }
    }

    tracing::debug!("Line processing finished");
}

/// 依序上傳佇列中的紀錄。
///
/// 取消後不再開始新的上傳；進行中的上傳會完成（或逾時）。
pub async fn run_upload_worker<S: RecordSink>(
    mut sink: S,
    mut queue: mpsc::Receiver<NormalizedRecord>,
    monitor: Arc<RelayMonitor>,
    shutdown: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            record = queue.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };

        match sink.deliver(record).await {
            Ok(UploadOutcome::Sent { .. }) => monitor.record_upload_success(),
            Ok(UploadOutcome::Throttled) => monitor.record_throttled(),
            Err(e) => {
                tracing::error!("❌ Dropping reading: {}", e);
                monitor.record_upload_failure();
            }
        }
    }

    tracing::debug!("Upload worker finished");
}

pub struct Relay {
    config: RelayConfig,
    monitor: Arc<RelayMonitor>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            monitor: Arc::new(RelayMonitor::new()),
        }
    }

    pub fn monitor(&self) -> Arc<RelayMonitor> {
        Arc::clone(&self.monitor)
    }

    /// 以 reqwest 上傳到設定的端點，直到 `shutdown` 被取消
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let transport = ReqwestTransport::new()?;
        let uploader = Uploader::new(transport, self.config.endpoint.clone());
        self.run_with_sink(uploader, shutdown).await
    }

    pub async fn run_with_sink<S>(self, sink: S, shutdown: CancellationToken) -> Result<()>
    where
        S: RecordSink + 'static,
    {
        let engine = TranslationEngine::new(self.config.translation_table()?);
        let decoder = &self.config.decoder;

        tracing::info!(
            "🚀 Relaying decoder '{}' readings to {} ({} translation rules)",
            decoder.id,
            self.config.endpoint.base_url(),
            engine.table().len()
        );

        let supervisor = ProcessSupervisor::new(decoder.command(), decoder.restart_policy())
            .with_monitor(Arc::clone(&self.monitor));
        let handle = supervisor
            .start(decoder.line_buffer(), shutdown.clone())
            .await?;

        let (queue_tx, queue_rx) = mpsc::channel(self.config.endpoint.queue_capacity());
        let worker = tokio::spawn(run_upload_worker(
            sink,
            queue_rx,
            Arc::clone(&self.monitor),
            shutdown.clone(),
        ));

        let processor = LineProcessor::new(
            engine,
            Arc::clone(&self.monitor),
            self.config.endpoint.upload_empty_records(),
        );
        run_processing(handle.lines, processor, queue_tx).await;

        let supervised = handle.task.await.map_err(|e| RelayError::TaskError {
            message: format!("decoder supervisor panicked: {}", e),
        })?;
        worker.await.map_err(|e| RelayError::TaskError {
            message: format!("upload worker panicked: {}", e),
        })?;

        self.monitor.log_final_stats();
        supervised?;

        tracing::info!("✅ Relay stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::translation::TranslationTable;
    use crate::domain::model::{ConversionKind, FieldValue, TranslationRule};
    use crate::utils::error::UploadError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockSink {
        delivered: Arc<Mutex<Vec<NormalizedRecord>>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordSink for MockSink {
        async fn deliver(
            &mut self,
            record: NormalizedRecord,
        ) -> std::result::Result<UploadOutcome, UploadError> {
            self.delivered.lock().unwrap().push(record);
            if self.fail {
                Err(UploadError::RetriesExhausted {
                    attempts: 3,
                    last_error: "HTTP 503".to_string(),
                })
            } else {
                Ok(UploadOutcome::Sent { attempts: 1 })
            }
        }
    }

    fn processor(monitor: Arc<RelayMonitor>, upload_empty_records: bool) -> LineProcessor {
        let table = TranslationTable::new(vec![
            TranslationRule::new("temperature_C", "tempf", Some(ConversionKind::CToF)),
            TranslationRule::new("humidity", "humidity", None),
            TranslationRule::new("wind_avg_m_s", "windspeedmph", Some(ConversionKind::MsToMph)),
        ])
        .unwrap();
        LineProcessor::new(TranslationEngine::new(table), monitor, upload_empty_records)
    }

    async fn relay_lines(
        lines: &[&str],
        upload_empty_records: bool,
        sink: MockSink,
    ) -> Arc<RelayMonitor> {
        let monitor = Arc::new(RelayMonitor::new());
        let (line_tx, line_rx) = mpsc::channel(16);
        let (queue_tx, queue_rx) = mpsc::channel(16);

        let worker = tokio::spawn(run_upload_worker(
            sink,
            queue_rx,
            Arc::clone(&monitor),
            CancellationToken::new(),
        ));

        for line in lines {
            line_tx.send(line.to_string()).await.unwrap();
        }
        drop(line_tx);

        run_processing(
            line_rx,
            processor(Arc::clone(&monitor), upload_empty_records),
            queue_tx,
        )
        .await;
        worker.await.unwrap();
        monitor
    }

    #[tokio::test]
    async fn test_reading_is_translated_and_uploaded() {
        let sink = MockSink::default();
        let monitor = relay_lines(
            &[r#"{"temperature_C": 20.0, "humidity": 55, "wind_avg_m_s": 3.0, "model": "WH24"}"#],
            false,
            sink.clone(),
        )
        .await;

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        let record = &delivered[0];
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("tempf"), Some(&FieldValue::Number(68.0)));
        assert_eq!(record.get("humidity"), Some(&FieldValue::Number(55.0)));
        let wind = record.get("windspeedmph").and_then(FieldValue::as_f64).unwrap();
        assert!((wind - 6.71082).abs() < 1e-9);

        assert_eq!(monitor.get_stats().uploads_succeeded, 1);
    }

    #[tokio::test]
    async fn test_unmapped_reading_is_not_uploaded() {
        let sink = MockSink::default();
        let monitor = relay_lines(&[r#"{"unknown_sensor": 1}"#], false, sink.clone()).await;

        assert!(sink.delivered.lock().unwrap().is_empty());
        let stats = monitor.get_stats();
        assert_eq!(stats.empty_records, 1);
        assert_eq!(stats.uploads_succeeded, 0);
    }

    #[tokio::test]
    async fn test_empty_reading_sends_heartbeat_when_enabled() {
        let sink = MockSink::default();
        relay_lines(&[r#"{"unknown_sensor": 1}"#], true, sink.clone()).await;

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_do_not_stop_the_pipeline() {
        let sink = MockSink::default();
        let monitor = relay_lines(
            &[
                "rtl_433 version 23.11",
                r#"{"temperature_C": "#,
                "",
                r#"{"humidity": 40}"#,
            ],
            false,
            sink.clone(),
        )
        .await;

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].get("humidity"), Some(&FieldValue::Number(40.0)));

        let stats = monitor.get_stats();
        assert_eq!(stats.lines_received, 4);
        assert_eq!(stats.parse_failures, 2);
    }

    #[tokio::test]
    async fn test_failed_uploads_are_counted_and_dropped() {
        let sink = MockSink {
            fail: true,
            ..MockSink::default()
        };
        let monitor = relay_lines(
            &[r#"{"humidity": 40}"#, r#"{"humidity": 41}"#],
            false,
            sink.clone(),
        )
        .await;

        assert_eq!(sink.delivered.lock().unwrap().len(), 2);
        assert_eq!(monitor.get_stats().uploads_failed, 2);
    }

    #[tokio::test]
    async fn test_conversion_failures_are_counted() {
        let monitor = Arc::new(RelayMonitor::new());
        let mut processor = processor(Arc::clone(&monitor), false);

        let record = processor
            .process_line(r#"{"temperature_C": "ERR", "humidity": 60}"#)
            .unwrap();

        assert_eq!(record.len(), 1);
        assert_eq!(monitor.get_stats().conversion_failures, 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_readings() {
        let monitor = Arc::new(RelayMonitor::new());
        let (line_tx, line_rx) = mpsc::channel(16);
        let (queue_tx, mut queue_rx) = mpsc::channel(1);

        for humidity in [40, 41, 42] {
            line_tx
                .send(format!(r#"{{"humidity": {}}}"#, humidity))
                .await
                .unwrap();
        }
        drop(line_tx);

        run_processing(line_rx, processor(Arc::clone(&monitor), false), queue_tx).await;

        let first = queue_rx.recv().await.unwrap();
        assert_eq!(first.get("humidity"), Some(&FieldValue::Number(40.0)));
        assert!(queue_rx.recv().await.is_none());
        assert_eq!(monitor.get_stats().records_dropped, 2);
    }

    #[tokio::test]
    async fn test_worker_stops_after_cancellation() {
        let sink = MockSink::default();
        let monitor = Arc::new(RelayMonitor::new());
        let (queue_tx, queue_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        let mut record = NormalizedRecord::default();
        record.data.insert("humidity".to_string(), FieldValue::Number(40.0));
        queue_tx.send(record).await.unwrap();
        shutdown.cancel();

        tokio::time::timeout(
            Duration::from_secs(5),
            run_upload_worker(sink.clone(), queue_rx, monitor, shutdown),
        )
        .await
        .expect("worker must return once cancelled");

        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_decoder_binary_is_fatal() {
        let config = RelayConfig::from_toml_str(
            r#"
[decoder]
binary = "/nonexistent/path/to/rtl_433"
id = "78"
frequency = "915M"

[endpoint]
station_id = "KCASANFR123"
station_key = "abc123"
"#,
        )
        .unwrap();

        let result = Relay::new(config)
            .run_with_sink(MockSink::default(), CancellationToken::new())
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RelayError::Process(_)));
        assert_eq!(err.exit_code(), 3);
    }
}

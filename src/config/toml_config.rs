use crate::core::supervisor::{DecoderCommand, RestartPolicy};
use crate::core::translation::TranslationTable;
use crate::domain::model::TranslationRule;
use crate::domain::ports::HttpMethod;
use crate::utils::error::{RelayError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DECODER_BINARY: &str = "rtl_433";
pub const WUNDERGROUND_URL: &str =
    "https://weatherstation.wunderground.com/weatherstation/updateweatherstation.php";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub decoder: DecoderConfig,
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub translations: Vec<TranslationRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub binary: Option<String>,
    pub id: String,
    pub frequency: String,
    #[serde(default)]
    pub extra_args: Vec<String>,
    pub restart_delay_ms: Option<u64>,
    pub max_restart_delay_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    pub line_buffer: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub station_id: String,
    pub station_key: String,
    pub base_url: Option<String>,
    pub method: Option<HttpMethod>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub min_interval_seconds: Option<u64>,
    pub success_marker: Option<String>,
    pub upload_empty_records: Option<bool>,
    pub queue_capacity: Option<usize>,
    pub static_params: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

impl LoggingConfig {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    pub fn format(&self) -> LogFormat {
        self.format.unwrap_or_default()
    }
}

impl DecoderConfig {
    pub fn binary(&self) -> &str {
        self.binary.as_deref().unwrap_or(DEFAULT_DECODER_BINARY)
    }

    /// `rtl_433 -v -R <id> -f <frequency> -F json [extra_args...]`
    pub fn command(&self) -> DecoderCommand {
        let mut args = vec![
            "-v".to_string(),
            "-R".to_string(),
            self.id.clone(),
            "-f".to_string(),
            self.frequency.clone(),
            "-F".to_string(),
            "json".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());
        DecoderCommand::new(self.binary(), args)
    }

    pub fn restart_policy(&self) -> RestartPolicy {
        let defaults = RestartPolicy::default();
        RestartPolicy {
            restart_delay: self
                .restart_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.restart_delay),
            max_restart_delay: self
                .max_restart_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_restart_delay),
            shutdown_grace: self
                .shutdown_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.shutdown_grace),
        }
    }

    pub fn line_buffer(&self) -> usize {
        self.line_buffer.unwrap_or(64)
    }
}

impl EndpointConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(WUNDERGROUND_URL)
    }

    pub fn method(&self) -> HttpMethod {
        self.method.unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(10))
    }

    /// 總嘗試次數（含第一次）
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts.unwrap_or(3)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(500))
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms.unwrap_or(8_000))
    }

    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn success_marker(&self) -> &str {
        self.success_marker.as_deref().unwrap_or("success")
    }

    pub fn upload_empty_records(&self) -> bool {
        self.upload_empty_records.unwrap_or(false)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(16)
    }

    /// 每次請求都會附帶的固定參數，預設為 PWS 協定的 `action` 與 `dateutc`
    pub fn static_params(&self) -> Vec<(String, String)> {
        match &self.static_params {
            Some(params) => params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            None => vec![
                ("action".to_string(), "updateraw".to_string()),
                ("dateutc".to_string(), "now".to_string()),
            ],
        }
    }
}

impl RelayConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(RelayError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RelayError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${WU_STATION_KEY})；找不到的變數保留原樣，交由驗證處理
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RelayError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn translation_table(&self) -> Result<TranslationTable> {
        TranslationTable::new(self.translations.clone())
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("decoder.id", &self.decoder.id)?;
        validate_non_empty_string("decoder.frequency", &self.decoder.frequency)?;
        validate_non_empty_string("decoder.binary", self.decoder.binary())?;
        validate_positive_number("decoder.line_buffer", self.decoder.line_buffer(), 1)?;

        validate_non_empty_string("endpoint.station_id", &self.endpoint.station_id)?;
        validate_non_empty_string("endpoint.station_key", &self.endpoint.station_key)?;
        validate_url("endpoint.base_url", self.endpoint.base_url())?;
        validate_range("endpoint.retry_attempts", self.endpoint.retry_attempts(), 1, 10)?;
        validate_positive_number("endpoint.queue_capacity", self.endpoint.queue_capacity(), 1)?;
        validate_non_empty_string("endpoint.success_marker", self.endpoint.success_marker())?;

        if self.endpoint.retry_delay() > self.endpoint.max_retry_delay() {
            return Err(RelayError::InvalidConfigValueError {
                field: "endpoint.retry_delay_ms".to_string(),
                value: self.endpoint.retry_delay().as_millis().to_string(),
                reason: "must not exceed endpoint.max_retry_delay_ms".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level()) {
            return Err(RelayError::InvalidConfigValueError {
                field: "logging.level".to_string(),
                value: self.logging.level().to_string(),
                reason: format!("Valid levels: {}", valid_levels.join(", ")),
            });
        }

        if self.translations.is_empty() {
            tracing::warn!("⚠️ No translations configured; every reading will be empty");
        }
        for target in self.translation_table()?.duplicate_targets() {
            tracing::warn!(
                "⚠️ Target field '{}' is produced by more than one rule; the later rule in config wins",
                target
            );
        }

        Ok(())
    }
}

impl Validate for RelayConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

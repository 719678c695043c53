use thiserror::Error;

/// 單一欄位轉換失敗；只丟棄該欄位，其餘紀錄照常處理
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Conversion of field '{field}' failed for value '{value}': {reason}")]
pub struct ConversionError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

/// 單行解析失敗；保留原始內容以便記錄
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed decoder line ({reason}): {line}")]
pub struct ParseError {
    pub line: String,
    pub reason: String,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload transport error: {message}")]
    Transport { message: String, timeout: bool },

    #[error("Upload endpoint returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<u64>,
    },

    #[error("Upload rejected by endpoint: {body}")]
    Rejected { body: String },

    #[error("Upload failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl UploadError {
    /// 網路錯誤、逾時、5xx 與 429 視為暫時性錯誤
    pub fn is_transient(&self) -> bool {
        match self {
            UploadError::Transport { .. } => true,
            UploadError::Status { status, .. } => *status >= 500 || *status == 429,
            UploadError::Rejected { .. } | UploadError::RetriesExhausted { .. } => false,
        }
    }

    /// 請求超過設定的逾時時間
    pub fn is_timeout(&self) -> bool {
        matches!(self, UploadError::Transport { timeout: true, .. })
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            UploadError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        UploadError::Transport {
            timeout: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to spawn decoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decoder I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decoder exited unexpectedly with status 0")]
    Exited,

    #[error("Decoder crashed ({status})")]
    Crashed { status: String },
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Decoder process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Task failed: {message}")]
    TaskError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Process,
    Network,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl RelayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::ConfigError { .. }
            | RelayError::InvalidConfigValueError { .. }
            | RelayError::MissingConfigError { .. }
            | RelayError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            RelayError::Process(_) => ErrorCategory::Process,
            RelayError::Upload(_) => ErrorCategory::Network,
            RelayError::IoError(_) | RelayError::TaskError { .. } => ErrorCategory::System,
        }
    }

    /// 決定程式結束碼：設定錯誤為 High，無法啟動 decoder 為 Critical
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RelayError::Upload(_) => ErrorSeverity::Low,
            RelayError::Process(ProcessError::Spawn { .. }) => ErrorSeverity::Critical,
            RelayError::Process(_) => ErrorSeverity::Medium,
            RelayError::ConfigError { .. }
            | RelayError::InvalidConfigValueError { .. }
            | RelayError::MissingConfigError { .. }
            | RelayError::ConfigValidationError { .. } => ErrorSeverity::High,
            RelayError::IoError(_) | RelayError::TaskError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RelayError::MissingConfigError { .. } => {
                "Add the missing key to the configuration file"
            }
            RelayError::InvalidConfigValueError { .. }
            | RelayError::ConfigValidationError { .. }
            | RelayError::ConfigError { .. } => {
                "Check the configuration file and any ${VAR} environment substitutions"
            }
            RelayError::Process(ProcessError::Spawn { .. }) => {
                "Make sure the decoder binary (rtl_433) is installed and on PATH"
            }
            RelayError::Process(_) => "Check the SDR dongle connection and decoder arguments",
            RelayError::Upload(_) => "Check network connectivity and station credentials",
            RelayError::IoError(_) | RelayError::TaskError { .. } => {
                "Re-run with --verbose for more detail"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Process => format!("Decoder problem: {}", self),
            ErrorCategory::Network => format!("Upload problem: {}", self),
            ErrorCategory::System => format!("Unexpected error: {}", self),
        }
    }

    /// 依嚴重程度對應到程式結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transport = UploadError::Transport {
            message: "connection refused".to_string(),
            timeout: false,
        };
        assert!(transport.is_transient());

        let server_error = UploadError::Status {
            status: 503,
            body: String::new(),
            retry_after: None,
        };
        assert!(server_error.is_transient());

        let rate_limited = UploadError::Status {
            status: 429,
            body: String::new(),
            retry_after: Some(7),
        };
        assert!(rate_limited.is_transient());
        assert_eq!(rate_limited.retry_after(), Some(7));

        let unauthorized = UploadError::Status {
            status: 401,
            body: "unauthorized".to_string(),
            retry_after: None,
        };
        assert!(!unauthorized.is_transient());

        let rejected = UploadError::Rejected {
            body: "INVALIDPASSWORDID".to_string(),
        };
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_timeout_flag() {
        let timed_out = UploadError::Transport {
            message: "operation timed out".to_string(),
            timeout: true,
        };
        assert!(timed_out.is_timeout());
        assert!(timed_out.is_transient());

        let refused = UploadError::Transport {
            message: "connection refused".to_string(),
            timeout: false,
        };
        assert!(!refused.is_timeout());
        assert!(!UploadError::Rejected { body: String::new() }.is_timeout());
    }

    #[test]
    fn test_exit_codes_follow_severity() {
        let spawn = RelayError::Process(ProcessError::Spawn {
            program: "rtl_433".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        });
        assert_eq!(spawn.severity(), ErrorSeverity::Critical);
        assert_eq!(spawn.exit_code(), 3);

        let config = RelayError::MissingConfigError {
            field: "endpoint.station_id".to_string(),
        };
        assert_eq!(config.category(), ErrorCategory::Configuration);
        assert_eq!(config.exit_code(), 1);
    }
}

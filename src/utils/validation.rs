use crate::utils::error::{RelayError, Result};
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(RelayError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

/// 必填字串：不可為空白，也不可殘留未替換的 `${VAR}`
pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RelayError::MissingConfigError {
            field: field_name.to_string(),
        });
    }

    if value.contains("${") {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Unresolved environment variable placeholder".to_string(),
        });
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(RelayError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("endpoint.base_url", "https://example.com").is_ok());
        assert!(validate_url("endpoint.base_url", "http://example.com").is_ok());
        assert!(validate_url("endpoint.base_url", "").is_err());
        assert!(validate_url("endpoint.base_url", "invalid-url").is_err());
        assert!(validate_url("endpoint.base_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("endpoint.queue_capacity", 5, 1).is_ok());
        assert!(validate_positive_number("endpoint.queue_capacity", 0, 1).is_err());
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("endpoint.station_id", "KCASANFR123").is_ok());
        assert!(matches!(
            validate_non_empty_string("endpoint.station_id", "   "),
            Err(RelayError::MissingConfigError { .. })
        ));
        assert!(matches!(
            validate_non_empty_string("endpoint.station_key", "${WU_KEY}"),
            Err(RelayError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("endpoint.retry_attempts", 3u32, 1, 10).is_ok());
        assert!(validate_range("endpoint.retry_attempts", 0u32, 1, 10).is_err());
        assert!(validate_range("endpoint.retry_attempts", 11u32, 1, 10).is_err());
    }
}

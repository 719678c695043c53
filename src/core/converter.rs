//! 單位轉換
//!
//! 所有轉換都是純函式；以 [`ConversionKind`] 選擇。時間轉換依照行程的本地時區
//! （`chrono::Local`，即 `TZ` 環境變數或系統設定）解讀輸入。

use crate::domain::model::{ConversionKind, FieldValue};
use crate::utils::error::ConversionError;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

const MPH_PER_MS: f64 = 2.23694;
const MM_PER_INCH: f64 = 25.4;
const INHG_PER_HPA: f64 = 0.02953;

/// rtl_433 預設輸出的本地時間格式
const LOCAL_TIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn c_to_f(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

pub fn f_to_c(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}

pub fn ms_to_mph(ms: f64) -> f64 {
    ms * MPH_PER_MS
}

pub fn mph_to_ms(mph: f64) -> f64 {
    mph / MPH_PER_MS
}

pub fn mm_to_in(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

pub fn in_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa * INHG_PER_HPA
}

pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg / INHG_PER_HPA
}

impl ConversionKind {
    /// 數值轉換的反函數；時間與累積差值沒有反函數
    pub fn inverse(&self, value: f64) -> Option<f64> {
        match self {
            ConversionKind::CToF => Some(f_to_c(value)),
            ConversionKind::MsToMph => Some(mph_to_ms(value)),
            ConversionKind::MmToIn => Some(in_to_mm(value)),
            ConversionKind::HpaToInhg => Some(inhg_to_hpa(value)),
            ConversionKind::LocalToUtc
            | ConversionKind::DeltaHourMmToIn
            | ConversionKind::DeltaDayMmToIn => None,
        }
    }
}

fn conversion_error(field: &str, value: &FieldValue, reason: impl Into<String>) -> ConversionError {
    ConversionError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// 取出數值；可解析的數字字串也接受
pub fn numeric_value(field: &str, value: &FieldValue) -> Result<f64, ConversionError> {
    let number = match value {
        FieldValue::Number(n) => Some(*n),
        FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
        FieldValue::Bool(_) | FieldValue::Timestamp(_) => None,
    };

    match number {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(conversion_error(field, value, "expected a numeric value")),
    }
}

/// 執行單一轉換。累積差值需要歷史資料，由 `TranslationEngine` 處理。
pub fn convert(
    kind: ConversionKind,
    field: &str,
    value: &FieldValue,
) -> Result<FieldValue, ConversionError> {
    match kind {
        ConversionKind::CToF => Ok(FieldValue::Number(c_to_f(numeric_value(field, value)?))),
        ConversionKind::MsToMph => Ok(FieldValue::Number(ms_to_mph(numeric_value(field, value)?))),
        ConversionKind::MmToIn => Ok(FieldValue::Number(mm_to_in(numeric_value(field, value)?))),
        ConversionKind::HpaToInhg => {
            Ok(FieldValue::Number(hpa_to_inhg(numeric_value(field, value)?)))
        }
        ConversionKind::LocalToUtc => local_to_utc(field, value),
        ConversionKind::DeltaHourMmToIn | ConversionKind::DeltaDayMmToIn => Err(conversion_error(
            field,
            value,
            format!("{} requires windowed state", kind),
        )),
    }
}

pub fn local_to_utc(field: &str, value: &FieldValue) -> Result<FieldValue, ConversionError> {
    local_to_utc_in(&Local, field, value)
}

/// 將 `tz` 時區的時間轉為 UTC。
///
/// 夏令時間回撥造成的重複時刻取較早者；跳過的時刻（不存在）視為錯誤。
/// 數值視為 Unix epoch 秒數，本身已是絕對時間。
pub fn local_to_utc_in<Tz: TimeZone>(
    tz: &Tz,
    field: &str,
    value: &FieldValue,
) -> Result<FieldValue, ConversionError> {
    match value {
        FieldValue::Timestamp(ts) => Ok(FieldValue::Timestamp(*ts)),
        FieldValue::Number(secs) => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            Utc.timestamp_opt(whole as i64, nanos.min(999_999_999))
                .single()
                .map(FieldValue::Timestamp)
                .ok_or_else(|| conversion_error(field, value, "epoch seconds out of range"))
        }
        FieldValue::Text(text) => {
            let text = text.trim();
            if let Ok(with_offset) = DateTime::parse_from_rfc3339(text) {
                return Ok(FieldValue::Timestamp(with_offset.with_timezone(&Utc)));
            }

            let naive = LOCAL_TIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .ok_or_else(|| conversion_error(field, value, "unrecognized timestamp format"))?;

            tz.from_local_datetime(&naive)
                .earliest()
                .map(|local| FieldValue::Timestamp(local.with_timezone(&Utc)))
                .ok_or_else(|| {
                    conversion_error(field, value, "local time does not exist (DST gap)")
                })
        }
        FieldValue::Bool(_) => Err(conversion_error(field, value, "expected a timestamp")),
    }
}

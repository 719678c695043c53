use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// PWS 協定使用的 `dateutc` 格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// 由 JSON 純量轉換；null、陣列與物件回傳 `None`
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_f64().map(FieldValue::Number),
            serde_json::Value::String(s) => Some(FieldValue::Text(s)),
            serde_json::Value::Bool(b) => Some(FieldValue::Bool(b)),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
        }
    }
}

/// decoder 每行輸出解析後的原始紀錄
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    pub data: HashMap<String, FieldValue>,
}

impl RawRecord {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.data.get(field)
    }
}

/// 已轉換為目標欄位名稱與單位、可直接上傳的紀錄
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    pub data: BTreeMap<String, FieldValue>,
}

impl NormalizedRecord {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.data.get(field)
    }

    /// 以字串形式輸出，供組成請求參數
    pub fn to_params(&self) -> Vec<(String, String)> {
        self.data
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionKind {
    CToF,
    MsToMph,
    MmToIn,
    HpaToInhg,
    LocalToUtc,
    DeltaHourMmToIn,
    DeltaDayMmToIn,
}

impl ConversionKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConversionKind::CToF => "c_to_f",
            ConversionKind::MsToMph => "ms_to_mph",
            ConversionKind::MmToIn => "mm_to_in",
            ConversionKind::HpaToInhg => "hpa_to_inhg",
            ConversionKind::LocalToUtc => "local_to_utc",
            ConversionKind::DeltaHourMmToIn => "delta_hour_mm_to_in",
            ConversionKind::DeltaDayMmToIn => "delta_day_mm_to_in",
        }
    }

    /// 需要保留歷史值的轉換（雨量累積差值）
    pub fn is_windowed(&self) -> bool {
        matches!(
            self,
            ConversionKind::DeltaHourMmToIn | ConversionKind::DeltaDayMmToIn
        )
    }
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationRule {
    #[serde(alias = "rtl_field")]
    pub source_field: String,
    #[serde(alias = "field")]
    pub target_field: String,
    #[serde(default)]
    pub conversion: Option<ConversionKind>,
}

impl TranslationRule {
    pub fn new(source: &str, target: &str, conversion: Option<ConversionKind>) -> Self {
        Self {
            source_field: source.to_string(),
            target_field: target.to_string(),
            conversion,
        }
    }
}

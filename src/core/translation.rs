use crate::core::converter::{self, mm_to_in, numeric_value};
use crate::core::delta::{DeltaTrackers, DAY_WINDOW, HOUR_WINDOW};
use crate::domain::model::{
    ConversionKind, FieldValue, NormalizedRecord, RawRecord, TranslationRule,
};
use crate::utils::error::{ConversionError, RelayError, Result};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// 依設定順序排列的轉換規則；來源欄位不可重複
#[derive(Debug, Clone, Default)]
pub struct TranslationTable {
    rules: Vec<TranslationRule>,
    by_source: HashMap<String, usize>,
}

impl TranslationTable {
    pub fn new(rules: Vec<TranslationRule>) -> Result<Self> {
        let mut by_source = HashMap::new();

        for (index, rule) in rules.iter().enumerate() {
            if rule.source_field.trim().is_empty() || rule.target_field.trim().is_empty() {
                return Err(RelayError::ConfigValidationError {
                    field: format!("translations[{}]", index),
                    message: "source_field and target_field must not be empty".to_string(),
                });
            }

            if by_source.insert(rule.source_field.clone(), index).is_some() {
                return Err(RelayError::ConfigValidationError {
                    field: format!("translations[{}].source_field", index),
                    message: format!("duplicate source field '{}'", rule.source_field),
                });
            }
        }

        Ok(Self { rules, by_source })
    }

    pub fn rules(&self) -> &[TranslationRule] {
        &self.rules
    }

    pub fn rule_for(&self, source_field: &str) -> Option<&TranslationRule> {
        self.by_source.get(source_field).map(|&index| &self.rules[index])
    }

    /// 被多個規則寫入的目標欄位；轉換時設定中較後面的規則勝出
    pub fn duplicate_targets(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for rule in &self.rules {
            if !seen.insert(rule.target_field.as_str())
                && !duplicates.contains(&rule.target_field)
            {
                duplicates.push(rule.target_field.clone());
            }
        }
        duplicates
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub record: NormalizedRecord,
    /// 被丟棄的欄位
    pub errors: Vec<ConversionError>,
}

pub struct TranslationEngine {
    table: TranslationTable,
    trackers: DeltaTrackers,
}

impl TranslationEngine {
    pub fn new(table: TranslationTable) -> Self {
        Self {
            table,
            trackers: DeltaTrackers::new(),
        }
    }

    pub fn table(&self) -> &TranslationTable {
        &self.table
    }

    pub fn translate(&mut self, raw: &RawRecord) -> Translation {
        self.translate_at(raw, Instant::now())
    }

    /// 依設定順序套用規則；沒有規則的欄位直接略過，轉換失敗只丟棄該欄位
    pub fn translate_at(&mut self, raw: &RawRecord, now: Instant) -> Translation {
        let mut translation = Translation::default();

        for rule in self.table.rules.iter() {
            let Some(value) = raw.get(&rule.source_field) else {
                continue;
            };

            let converted = match rule.conversion {
                None => Ok(value.clone()),
                Some(kind) if kind.is_windowed() => {
                    windowed_delta(&mut self.trackers, kind, &rule.source_field, value, now)
                }
                Some(kind) => converter::convert(kind, &rule.source_field, value),
            };

            match converted {
                Ok(result) => {
                    translation
                        .record
                        .data
                        .insert(rule.target_field.clone(), result);
                }
                Err(e) => {
                    tracing::warn!("⚠️ Dropping field '{}': {}", rule.target_field, e);
                    translation.errors.push(e);
                }
            }
        }

        translation
    }
}

fn windowed_delta(
    trackers: &mut DeltaTrackers,
    kind: ConversionKind,
    field: &str,
    value: &FieldValue,
    now: Instant,
) -> std::result::Result<FieldValue, ConversionError> {
    let period = match kind {
        ConversionKind::DeltaDayMmToIn => DAY_WINDOW,
        _ => HOUR_WINDOW,
    };
    let total_mm = numeric_value(field, value)?;
    let delta_mm = trackers.add_value(field, period, total_mm, now);
    Ok(FieldValue::Number(mm_to_in(delta_mm)))
}

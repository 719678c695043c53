use crate::domain::model::{FieldValue, RawRecord};
use crate::utils::error::ParseError;

/// 解析 decoder 的一行 JSON 輸出。
///
/// 空白行回傳 `Ok(None)`；非 JSON 物件回傳帶有原始內容的 `ParseError`。
/// 每行獨立解析，不保留跨行狀態。
pub fn parse(line: &str) -> Result<Option<RawRecord>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| ParseError {
        line: line.to_string(),
        reason: e.to_string(),
    })?;

    let serde_json::Value::Object(object) = value else {
        return Err(ParseError {
            line: line.to_string(),
            reason: "expected a JSON object".to_string(),
        });
    };

    let mut record = RawRecord::default();
    for (key, value) in object {
        match FieldValue::from_json(value) {
            Some(field_value) => {
                record.data.insert(key, field_value);
            }
            None => tracing::debug!("Skipping non-scalar field '{}'", key),
        }
    }

    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rtl_433_line() {
        let line = r#"{"time" : "2024-01-15 10:30:00", "model" : "Fineoffset-WH24", "id" : 140, "battery_ok" : 1, "temperature_C" : 20.3, "humidity" : 55, "wind_dir_deg" : 270, "wind_avg_m_s" : 1.120, "rain_mm" : 120.600, "mic" : "CRC"}"#;

        let record = parse(line).unwrap().unwrap();

        assert_eq!(record.data.len(), 10);
        assert_eq!(record.get("temperature_C"), Some(&FieldValue::Number(20.3)));
        assert_eq!(record.get("humidity"), Some(&FieldValue::Number(55.0)));
        assert_eq!(
            record.get("model"),
            Some(&FieldValue::Text("Fineoffset-WH24".to_string()))
        );
    }

    #[test]
    fn test_empty_and_whitespace_lines_are_ignored() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("   \t  "), Ok(None));
        assert_eq!(parse("\n"), Ok(None));
    }

    #[test]
    fn test_malformed_line_keeps_raw_text() {
        let line = r#"{"temperature_C": 20.0,"#;
        let err = parse(line).unwrap_err();
        assert_eq!(err.line, line);

        let err = parse("rtl_433 version 23.11 branch master").unwrap_err();
        assert_eq!(err.line, "rtl_433 version 23.11 branch master");
    }

    #[test]
    fn test_non_object_json_is_rejected() {
        assert!(parse("[1, 2, 3]").is_err());
        assert!(parse("42").is_err());
        assert!(parse(r#""text""#).is_err());
    }

    #[test]
    fn test_nested_and_null_members_are_skipped() {
        let record = parse(r#"{"a": 1, "b": null, "c": [1], "d": {"x": 2}, "e": true}"#)
            .unwrap()
            .unwrap();

        assert_eq!(record.data.len(), 2);
        assert_eq!(record.get("e"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_lines_are_independent() {
        assert!(parse(r#"{"a": "#).is_err());
        let record = parse(r#"{"a": 1}"#).unwrap().unwrap();
        assert_eq!(record.get("a"), Some(&FieldValue::Number(1.0)));
    }
}

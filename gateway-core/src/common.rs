//! Small helpers shared across modules that don't belong to any one domain.

use crate::error::ProviderError;
use crate::models::ChatRequest;
use serde::{Deserializer, Serializer};
use std::time::Duration;

/// Request validation every adapter runs before touching the network:
/// `model` and at least one message are required.
pub fn validate_chat_request(request: &ChatRequest) -> Result<(), ProviderError> {
    if request.model.is_empty() {
        return Err(ProviderError::ValidationError {
            field: "model".to_string(),
            message: "model is required".to_string(),
        });
    }
    if request.messages.is_empty() {
        return Err(ProviderError::ValidationError {
            field: "messages".to_string(),
            message: "at least one message is required".to_string(),
        });
    }
    Ok(())
}

/// `serde(with = "duration_serde")` for human-readable durations (`"30s"`, `"5m"`, `"250ms"`).
pub mod duration_serde {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        use serde_json::Value;

        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) => parse_duration_string(&s).map_err(Error::custom),
            Value::Object(obj) => {
                let secs = obj
                    .get("secs")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| Error::custom("missing 'secs' field"))?;
                let nanos = obj.get("nanos").and_then(|v| v.as_u64()).unwrap_or(0);
                Ok(Duration::new(secs, nanos as u32))
            }
            _ => Err(Error::custom("invalid duration format")),
        }
    }

    pub fn parse_duration_string(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration string".to_string());
        }
        if let Some(stripped) = s.strip_suffix("ms") {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_millis(num));
        }
        if let Some(stripped) = s.strip_suffix('s') {
            if !stripped.ends_with('m') && !stripped.ends_with('h') {
                let num: f64 = stripped
                    .parse()
                    .map_err(|_| format!("invalid number: {stripped}"))?;
                let secs = num.trunc() as u64;
                let nanos = (num.fract() * 1_000_000_000.0).round() as u32;
                return Ok(Duration::new(secs, nanos));
            }
        }
        if let Some(stripped) = s.strip_suffix('m') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num * 60));
        }
        if let Some(stripped) = s.strip_suffix('h') {
            let num: u64 = stripped
                .parse()
                .map_err(|_| format!("invalid number: {stripped}"))?;
            return Ok(Duration::from_secs(num * 3600));
        }
        Err(format!("unknown duration unit: {s}"))
    }

    #[cfg(test)]
    mod tests {
        use super::parse_duration_string;
        use std::time::Duration;

        #[test]
        fn parses_common_suffixes() {
            assert_eq!(parse_duration_string("30s").unwrap(), Duration::from_secs(30));
            assert_eq!(parse_duration_string("250ms").unwrap(), Duration::from_millis(250));
            assert_eq!(parse_duration_string("5m").unwrap(), Duration::from_secs(300));
            assert_eq!(parse_duration_string("2h").unwrap(), Duration::from_secs(7200));
        }

        #[test]
        fn rejects_empty_and_unknown() {
            assert!(parse_duration_string("").is_err());
            assert!(parse_duration_string("30x").is_err());
        }
    }
}

//! Alert webhook payload parsing and Basic credential verification.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::error::ReportError;

/// Condition name used when the payload does not carry one.
const DEFAULT_CONDITION: &str = "alert";

/// One alert delivery, parsed once and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    /// When the incident started
    pub incident_time: DateTime<Utc>,
    /// Affected services, deduplicated, in payload order
    pub affected_services: Vec<String>,
    /// Trigger condition (or policy) name
    pub condition: String,
    /// Link back to the incident in the monitoring console
    pub incident_url: Option<String>,
    /// Request body exactly as received
    pub raw_payload: String,
    /// Parsed request body
    pub payload: Value,
}

impl AlertEvent {
    /// Parse a webhook body.
    ///
    /// Accepts the Cloud Monitoring `incident` envelope. The incident time
    /// comes from `incident.started_at` (or a top-level `started_at`) as epoch
    /// seconds, a numeric string, or RFC 3339. Services are gathered from
    /// `affected_services` arrays and `service_name` resource/metric labels.
    pub fn parse(body: &[u8]) -> Result<Self, ReportError> {
        let raw_payload = std::str::from_utf8(body)
            .map_err(|e| ReportError::MalformedAlert(format!("body is not UTF-8: {e}")))?
            .to_string();
        let payload: Value = serde_json::from_str(&raw_payload)
            .map_err(|e| ReportError::MalformedAlert(format!("body is not JSON: {e}")))?;
        if !payload.is_object() {
            return Err(ReportError::MalformedAlert(
                "body is not a JSON object".to_string(),
            ));
        }

        let incident = payload.get("incident").unwrap_or(&Value::Null);

        let started_at = incident
            .get("started_at")
            .or_else(|| payload.get("started_at"))
            .ok_or_else(|| ReportError::MalformedAlert("missing incident.started_at".into()))?;
        let incident_time = parse_instant(started_at).ok_or_else(|| {
            ReportError::MalformedAlert(format!("unparsable incident time: {started_at}"))
        })?;

        let affected_services = collect_services(&payload, incident);
        if affected_services.is_empty() {
            return Err(ReportError::MalformedAlert(
                "no affected services in payload".to_string(),
            ));
        }

        let condition = ["condition_name", "policy_name"]
            .iter()
            .find_map(|key| non_empty_str(incident.get(key)))
            .unwrap_or(DEFAULT_CONDITION)
            .to_string();

        let incident_url = non_empty_str(incident.get("url")).map(ToString::to_string);

        Ok(Self {
            incident_time,
            affected_services,
            condition,
            incident_url,
            raw_payload,
            payload,
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.trim().is_empty())
}

/// Epoch seconds (integer, float or numeric string) or an RFC 3339 string.
fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| n.as_f64().and_then(from_fractional_secs)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(secs) = s.parse::<i64>() {
                DateTime::from_timestamp(secs, 0)
            } else if let Ok(secs) = s.parse::<f64>() {
                from_fractional_secs(secs)
            } else {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        }
        _ => None,
    }
}

fn from_fractional_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

fn collect_services(payload: &Value, incident: &Value) -> Vec<String> {
    let listed = [
        incident.get("affected_services"),
        payload.get("affected_services"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_array)
    .flatten()
    .filter_map(Value::as_str);

    let labelled = [
        incident.pointer("/resource/labels/service_name"),
        incident.pointer("/metric/labels/service_name"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str);

    let mut services: Vec<String> = Vec::new();
    for service in listed.chain(labelled).map(str::trim) {
        if !service.is_empty() && !services.iter().any(|s| s == service) {
            services.push(service.to_string());
        }
    }
    services
}

/// Credentials the webhook expects.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Verify an `Authorization: Basic …` header against the expected credentials.
///
/// Both halves are compared in constant time.
#[must_use]
pub fn verify_basic_auth(header: Option<&str>, expected: &BasicCredentials) -> bool {
    let Some(encoded) = header.and_then(|h| h.strip_prefix("Basic ")) else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    let Some((user, pass)) = decoded.split_once(':') else {
        return false;
    };

    let user_ok = user.as_bytes().ct_eq(expected.username.as_bytes());
    let pass_ok = pass.as_bytes().ct_eq(expected.password.as_bytes());
    (user_ok & pass_ok).into()
}

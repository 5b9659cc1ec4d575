//! Usage data types: the stable response schema and the raw upstream records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Plan label reported for organizations with the premium capability
pub const PLAN_MAX: &str = "Claude Max";
/// Plan label reported for every other organization
pub const PLAN_PRO: &str = "Claude Pro";

/// A single utilization window (e.g., five-hour, seven-day)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Percentage used, rounded to the nearest integer
    pub utilization: u32,
    /// Reset timestamp as reported upstream (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<String>,
    /// Compact countdown until reset (e.g., "3h5m")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_in: Option<String>,
}

/// Normalized usage snapshot served by `/api/usage`
///
/// Windows missing upstream are omitted from the JSON entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Organization display name
    pub organization: String,
    /// Plan label ("Claude Max" or "Claude Pro")
    pub plan: String,
    /// Billing type reported by the organization record
    pub billing_type: String,
    /// Rate-limit tier (empty when unknown)
    pub rate_limit_tier: String,
    /// When this snapshot was captured
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub five_hour: Option<UsageWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_day: Option<UsageWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_day_opus: Option<UsageWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_day_sonnet: Option<UsageWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seven_day_cowork: Option<UsageWindow>,
}

impl UsageSnapshot {
    /// Iterate over the windows present, keyed by their upstream name
    pub fn windows(&self) -> impl Iterator<Item = (&'static str, &UsageWindow)> {
        [
            ("five_hour", &self.five_hour),
            ("seven_day", &self.seven_day),
            ("seven_day_opus", &self.seven_day_opus),
            ("seven_day_sonnet", &self.seven_day_sonnet),
            ("seven_day_cowork", &self.seven_day_cowork),
        ]
        .into_iter()
        .filter_map(|(key, window)| window.as_ref().map(|w| (key, w)))
    }

    /// Whether at least one utilization window is present
    pub fn has_windows(&self) -> bool {
        self.windows().next().is_some()
    }
}

// ============================================================================
// Upstream records
// ============================================================================

/// Organization record from `/api/organizations`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub rate_limit_tier: Option<String>,
    #[serde(default)]
    pub billing_type: Option<String>,
}

/// `null` decodes to the type's default
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `{"type": "error", "error": {"message": ...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl ErrorEnvelope {
    pub fn message(self) -> String {
        self.error
            .and_then(|detail| detail.message)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

/// A single window as reported upstream
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawWindow {
    #[serde(default)]
    pub utilization: Option<f64>,
    #[serde(default)]
    pub resets_at: Option<String>,
}

/// Body of `/api/organizations/{uuid}/usage`
///
/// A window reported as JSON `null` deserializes to `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawUsage {
    #[serde(default)]
    pub five_hour: Option<RawWindow>,
    #[serde(default)]
    pub seven_day: Option<RawWindow>,
    #[serde(default)]
    pub seven_day_opus: Option<RawWindow>,
    #[serde(default)]
    pub seven_day_sonnet: Option<RawWindow>,
    #[serde(default)]
    pub seven_day_cowork: Option<RawWindow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_window_is_absent() {
        let raw: RawUsage = serde_json::from_str(
            r#"{"five_hour": null, "seven_day": {"utilization": 12.4, "resets_at": null}}"#,
        )
        .unwrap();
        assert!(raw.five_hour.is_none());
        assert_eq!(raw.seven_day.unwrap().utilization, Some(12.4));
    }

    #[test]
    fn test_null_capabilities_decode_as_empty() {
        let orgs: Vec<Organization> =
            serde_json::from_str(r#"[{"uuid": "a", "capabilities": null}, {"uuid": "b"}]"#)
                .unwrap();
        assert!(orgs.iter().all(|org| org.capabilities.is_empty()));
    }

    #[test]
    fn test_error_envelope_message() {
        let envelope: ErrorEnvelope = serde_json::from_str(
            r#"{"type": "error", "error": {"type": "permission_error", "message": "denied"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.message(), "denied");

        let bare: ErrorEnvelope = serde_json::from_str(r#"{"type": "error"}"#).unwrap();
        assert_eq!(bare.message(), "unknown");
    }

    #[test]
    fn test_snapshot_omits_missing_windows() {
        let snapshot = UsageSnapshot {
            organization: "Org".to_string(),
            plan: PLAN_PRO.to_string(),
            billing_type: "unknown".to_string(),
            rate_limit_tier: String::new(),
            timestamp: Utc::now(),
            five_hour: None,
            seven_day: Some(UsageWindow {
                utilization: 40,
                resets_at: None,
                resets_in: None,
            }),
            seven_day_opus: None,
            seven_day_sonnet: None,
            seven_day_cowork: None,
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("five_hour"));
        assert_eq!(json["seven_day"]["utilization"], 40);
        assert!(json["seven_day"].get("resets_at").is_none());
        assert!(snapshot.has_windows());
    }
}

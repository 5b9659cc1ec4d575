//! Shape raw upstream records into a [`UsageSnapshot`].

use chrono::{DateTime, Utc};

use super::error::FetchError;
use super::reset::format_resets_in;
use super::types::{
    Organization, RawUsage, RawWindow, UsageSnapshot, UsageWindow, PLAN_MAX, PLAN_PRO,
};

/// Capability marking an organization on the premium plan
pub const PREMIUM_CAPABILITY: &str = "claude_max";

impl Organization {
    /// Whether this organization carries the premium capability
    pub fn is_premium(&self) -> bool {
        self.capabilities.iter().any(|c| c == PREMIUM_CAPABILITY)
    }
}

/// Pick the organization to report on.
///
/// The first premium organization wins regardless of position; otherwise the
/// first entry is used.
pub fn select_organization(orgs: &[Organization]) -> Result<&Organization, FetchError> {
    orgs.iter()
        .find(|org| org.is_premium())
        .or_else(|| orgs.first())
        .ok_or(FetchError::NoOrganizationFound)
}

/// Build the response snapshot for `org` from its raw usage record.
pub fn normalize(org: &Organization, usage: &RawUsage, now: DateTime<Utc>) -> UsageSnapshot {
    let window = |raw: &Option<RawWindow>| raw.as_ref().map(|w| normalize_window(w, now));

    UsageSnapshot {
        organization: org.name.clone().unwrap_or_else(|| "Unknown".to_string()),
        plan: if org.is_premium() { PLAN_MAX } else { PLAN_PRO }.to_string(),
        billing_type: org
            .billing_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        rate_limit_tier: org.rate_limit_tier.clone().unwrap_or_default(),
        timestamp: now,
        five_hour: window(&usage.five_hour),
        seven_day: window(&usage.seven_day),
        seven_day_opus: window(&usage.seven_day_opus),
        seven_day_sonnet: window(&usage.seven_day_sonnet),
        seven_day_cowork: window(&usage.seven_day_cowork),
    }
}

fn normalize_window(raw: &RawWindow, now: DateTime<Utc>) -> UsageWindow {
    let utilization = raw.utilization.unwrap_or(0.0).round().max(0.0) as u32;
    UsageWindow {
        utilization,
        resets_in: raw
            .resets_at
            .as_deref()
            .map(|ts| format_resets_in(ts, now)),
        resets_at: raw.resets_at.clone(),
    }
}

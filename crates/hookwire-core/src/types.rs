// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared domain types used across the hookwire workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// Events for this subscription flow through the pipeline.
    Active,
    /// Inbound events are rejected with a `paused` reason.
    Paused,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// Outcome of HMAC signature verification for a stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationResult {
    Accepted,
    Rejected,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for VerificationResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown verification result: {other}")),
        }
    }
}

/// Current ISO 8601 timestamp with millisecond precision.
///
/// All persisted timestamps use this format so that lexicographic
/// comparison in SQL matches chronological order.
pub fn now_iso8601() -> String {
    chrono::Utc::now()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [SubscriptionStatus::Active, SubscriptionStatus::Paused] {
            let parsed: SubscriptionStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn status_rejects_unknown_value() {
        assert!("archived".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn verification_result_serializes_lowercase() {
        let json = serde_json::to_string(&VerificationResult::Accepted).unwrap();
        assert_eq!(json, "\"accepted\"");
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let a = now_iso8601();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_iso8601();
        assert!(a < b, "{a} should sort before {b}");
    }
}

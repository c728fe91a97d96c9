use std::{collections::HashMap, fmt, ops::Deref, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::GateError;

/// Key of the singleton record holding the tier definition.
pub const TIER_DEFINITION_KEY: &str = "limits";

/// Default name of the identity field in inbound documents.
pub const DEFAULT_IDENTITY_FIELD: &str = "user_id";

/// Mapping from tier name to the number of requests a user of that tier may make
/// per reset window.
///
/// Serialized as a flat JSON object, e.g. `{"Gold": 300, "Silver": 200}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierDefinition(HashMap<String, u64>);

impl TierDefinition {
    /// Create an empty tier definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit configured for `tier`, if any.
    pub fn limit_for(&self, tier: &str) -> Option<u64> {
        self.0.get(tier).copied()
    }

    /// Set the limit for `tier`, returning the previous one.
    pub fn insert(&mut self, tier: impl Into<String>, limit: u64) -> Option<u64> {
        self.0.insert(tier.into(), limit)
    }

    /// Iterate over `(tier, limit)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(tier, limit)| (tier.as_str(), *limit))
    }

    /// Number of tiers defined.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no tier is defined.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for TierDefinition {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(tier, limit)| (tier.into(), limit))
                .collect(),
        )
    }
}

impl From<HashMap<String, u64>> for TierDefinition {
    fn from(value: HashMap<String, u64>) -> Self {
        Self(value)
    }
}

/// A user and the tier assigned to them.
///
/// Accounts are owned by whatever provisions users; this crate only reads them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Identity of the user.
    pub user_id: String,
    /// Name of the tier the user belongs to.
    pub tier: String,
    /// Display name, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserAccount {
    /// Create a new account without a display name.
    pub fn new(user_id: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tier: tier.into(),
            name: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Opaque version token of a counter record.
///
/// Tokens are never reused by a store, including across resets, so a token captured
/// before a reset can never match a record created after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CasToken(u64);

impl CasToken {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub(crate) fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-user usage counter for the current reset window, paired with the version it
/// was read at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterRecord {
    /// Requests admitted since the last reset.
    pub count: u64,
    /// Version the record was read at.
    pub version: CasToken,
}

/// Result of a conditional counter update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record still had the expected version and now holds the new count.
    Updated,
    /// The record changed (or vanished) since it was read.
    Conflict,
}

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The counter was incremented and the request may proceed.
    Admitted {
        /// Counter value after the increment.
        count: u64,
        /// Limit the decision was made against.
        limit: u64,
    },
    /// The user reached their tier limit; the counter was left untouched.
    Rejected {
        /// Counter value at the time of the decision.
        count: u64,
        /// Limit the decision was made against.
        limit: u64,
    },
}

impl AdmissionDecision {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Counter value the decision observed (post-increment when admitted).
    pub fn count(&self) -> u64 {
        match self {
            Self::Admitted { count, .. } | Self::Rejected { count, .. } => *count,
        }
    }

    /// Limit the decision was made against.
    pub fn limit(&self) -> u64 {
        match self {
            Self::Admitted { limit, .. } | Self::Rejected { limit, .. } => *limit,
        }
    }
}

/// An inbound request: a JSON object carrying a user identity plus an arbitrary
/// payload destined for the downstream endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct AdmissionRequest {
    user_id: String,
    identity_field: String,
    document: Map<String, Value>,
}

impl AdmissionRequest {
    /// Build a request from a JSON document, reading the identity from
    /// `identity_field`.
    pub fn from_document(document: Value, identity_field: &str) -> Result<Self, GateError> {
        let Value::Object(document) = document else {
            return Err(GateError::InvalidRequest(
                "request document must be a JSON object".to_string(),
            ));
        };

        let user_id = match document.get(identity_field) {
            Some(Value::String(user_id)) if !user_id.is_empty() => user_id.clone(),
            Some(_) => {
                return Err(GateError::InvalidRequest(format!(
                    "field '{identity_field}' must be a non-empty string"
                )));
            }
            None => {
                return Err(GateError::InvalidRequest(format!(
                    "missing identity field '{identity_field}'"
                )));
            }
        };

        Ok(Self {
            user_id,
            identity_field: identity_field.to_string(),
            document,
        })
    }

    /// Build a request for `user_id` with the given payload fields.
    pub fn new(user_id: impl Into<String>, payload: Map<String, Value>) -> Self {
        let user_id = user_id.into();
        let mut document = payload;
        document.insert(
            DEFAULT_IDENTITY_FIELD.to_string(),
            Value::String(user_id.clone()),
        );

        Self {
            user_id,
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
            document,
        }
    }

    /// Identity the request is accounted against.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The full inbound document, identity field included.
    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    /// Consume the request, returning the payload with the identity field removed.
    pub fn into_payload(mut self) -> Map<String, Value> {
        self.document.remove(&self.identity_field);
        self.document
    }
}

/// Why the engine is being activated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationReason {
    /// Fresh deployment: all existing counters are cleared before scheduling.
    Deploy,
    /// Resumption after a pause or upgrade: existing counters are kept.
    Resume,
}

/// A validated, non-zero interval between two runs of a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleInterval(Duration);

impl ScheduleInterval {
    /// Interval of `hours` hours.
    pub fn hours(hours: u64) -> Result<Self, GateError> {
        Self::try_from(Duration::from_secs(hours.saturating_mul(3600)))
    }

    /// Default tier refresh interval: 24 hours.
    pub fn tier_refresh_default() -> Self {
        Self(Duration::from_secs(24 * 3600))
    }

    /// Default counter reset interval: 1 hour.
    pub fn counter_reset_default() -> Self {
        Self(Duration::from_secs(3600))
    }
}

impl Deref for ScheduleInterval {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<Duration> for ScheduleInterval {
    type Error = GateError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        if value.is_zero() {
            Err(GateError::InvalidInterval(
                "schedule interval must be > 0".to_string(),
            ))
        } else if chrono::Duration::from_std(value).is_err() {
            Err(GateError::InvalidInterval(
                "schedule interval is out of range".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

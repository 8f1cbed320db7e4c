use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectKind {
    Item,
    List,
    Standard,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Item => "item",
            SubjectKind::List => "list",
            SubjectKind::Standard => "standard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "item" | "items" => Some(SubjectKind::Item),
            "list" | "lists" => Some(SubjectKind::List),
            "standard" | "standards" => Some(SubjectKind::Standard),
            _ => None,
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one stat record: one per learner and subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatKey {
    pub user_id: String,
    pub subject_id: String,
    pub kind: SubjectKind,
}

impl StatKey {
    pub fn new(user_id: impl Into<String>, subject_id: impl Into<String>, kind: SubjectKind) -> Self {
        Self {
            user_id: user_id.into(),
            subject_id: subject_id.into(),
            kind,
        }
    }

    pub fn item(user_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self::new(user_id, item_id, SubjectKind::Item)
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.kind, self.subject_id)
    }
}

/// Rolling performance statistics of one learner on one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatRecord {
    pub user_id: String,
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    pub total_outcomes: i64,
    pub average: f64,
    pub volatility: f64,
    pub duration: f64,
    pub last_updated: i64,
}

impl StatRecord {
    pub fn key(&self) -> StatKey {
        StatKey::new(self.user_id.clone(), self.subject_id.clone(), self.subject_kind)
    }
}

/// One practice attempt as delivered by the caller.
///
/// Fields the engine requires are optional here so that a malformed event
/// can be rejected individually while earlier events of the batch stay
/// applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, alias = "subjectId")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default, deserialize_with = "strict_bool")]
    pub outcome: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl OutcomeEvent {
    pub fn new(item_id: impl Into<String>, timestamp: i64, outcome: bool) -> Self {
        Self {
            item_id: Some(item_id.into()),
            timestamp: Some(timestamp as f64),
            outcome: Some(outcome),
            ..Self::default()
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = Some(seconds);
        self
    }

    pub fn with_list(mut self, list_id: impl Into<String>) -> Self {
        self.list_id = Some(list_id.into());
        self
    }

    pub fn with_standard(mut self, standard: impl Into<String>) -> Self {
        self.standard = Some(standard.into());
        self
    }

    /// Checks the fields every fold needs and returns them in typed form.
    pub fn validate(&self) -> Result<ValidOutcome, EngineError> {
        let item_id = self
            .item_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::Validation("itemId is required".to_string()))?;

        let timestamp = match self.timestamp {
            Some(ts) if ts.is_finite() && ts >= 0.0 => ts.floor() as i64,
            Some(_) => {
                return Err(EngineError::Validation(
                    "timestamp must be a non-negative epoch second".to_string(),
                ))
            }
            None => return Err(EngineError::Validation("timestamp is required".to_string())),
        };

        let outcome = self
            .outcome
            .ok_or_else(|| EngineError::Validation("outcome must be a boolean".to_string()))?;

        let duration = match self.duration {
            Some(d) if d.is_finite() && d >= 0.0 => Some(d),
            Some(_) => {
                return Err(EngineError::Validation(
                    "duration must be a non-negative number of seconds".to_string(),
                ))
            }
            None => None,
        };

        Ok(ValidOutcome {
            item_id: item_id.to_string(),
            timestamp,
            outcome,
            duration,
        })
    }
}

/// The parts of an [`OutcomeEvent`] the stat fold consumes, already checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidOutcome {
    pub item_id: String,
    pub timestamp: i64,
    pub outcome: bool,
    pub duration: Option<f64>,
}

impl ValidOutcome {
    pub fn value(&self) -> f64 {
        if self.outcome {
            1.0
        } else {
            0.0
        }
    }
}

/// A batch of outcome events recorded in one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeBatch {
    #[serde(default)]
    pub list_id: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub events: Vec<OutcomeEvent>,
}

impl OutcomeBatch {
    pub fn new(events: Vec<OutcomeEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn for_list(mut self, list_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        self.list_id = Some(list_id.into());
        self.app_id = Some(app_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MasteryState {
    NotStarted,
    Learning,
    Mastered,
    Unmastered,
    Struggling,
}

impl MasteryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryState::NotStarted => "notStarted",
            MasteryState::Learning => "learning",
            MasteryState::Mastered => "mastered",
            MasteryState::Unmastered => "unmastered",
            MasteryState::Struggling => "struggling",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampledOutcome {
    pub item_id: String,
    pub outcome: bool,
}

/// Immutable snapshot of one recorded batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingSummary {
    pub id: String,
    pub user_id: String,
    pub list_id: Option<String>,
    pub app_id: Option<String>,
    pub timestamp: i64,
    pub outcomes: Vec<SampledOutcome>,
}

impl SamplingSummary {
    pub fn correct_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.outcome).count()
    }
}

/// Result of a fully applied batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReceipt {
    pub applied: usize,
    pub points_earned: i64,
    pub sampling_id: Option<String>,
}

fn strict_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        _ => None,
    })
}

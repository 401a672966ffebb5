use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Questionnaire,
    Referral,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl std::fmt::Display for ActivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityStatus::NotStarted => write!(f, "Not started"),
            ActivityStatus::InProgress => write!(f, "In progress"),
            ActivityStatus::Completed => write!(f, "Completed"),
        }
    }
}

/// A to-do item derived from a care request's question sets and referrals
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub kind: ActivityKind,
    pub title: String,
    pub status: ActivityStatus,
    pub care_request_id: String,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub created_at: DateTime<Utc>,
    pub question_set_id: Option<String>,
    pub referral_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSet {
    pub id: String,
    pub status: ActivityStatus,
    #[serde(rename = "careRequestId")]
    pub care_request_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub id: String,
    pub status: String,
    #[serde(rename = "careRequestId")]
    pub care_request_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "unreadMessages", default)]
    pub unread_messages: bool,
}

impl From<&QuestionSet> for Activity {
    fn from(qs: &QuestionSet) -> Self {
        Activity {
            id: format!("questionnaire-{}", qs.id),
            kind: ActivityKind::Questionnaire,
            title: "Health Questionnaire".to_string(),
            status: qs.status,
            care_request_id: qs.care_request_id.clone(),
            created_at: qs.created_at,
            question_set_id: Some(qs.id.clone()),
            referral_id: None,
        }
    }
}

impl From<&Referral> for Activity {
    fn from(referral: &Referral) -> Self {
        Activity {
            id: format!("referral-{}", referral.id),
            kind: ActivityKind::Referral,
            title: "Medical Referral".to_string(),
            // An unread referral still needs the patient's attention
            status: if referral.unread_messages {
                ActivityStatus::NotStarted
            } else {
                ActivityStatus::Completed
            },
            care_request_id: referral.care_request_id.clone(),
            created_at: referral.created_at,
            question_set_id: None,
            referral_id: Some(referral.id.clone()),
        }
    }
}

/// Most recent first
pub fn sort_newest_first(activities: &mut [Activity]) {
    activities.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

// ===== Wire envelopes =====

#[derive(Debug, Deserialize)]
pub struct QuestionSetsResponse {
    #[serde(default)]
    pub question_sets: Vec<QuestionSet>,
}

#[derive(Debug, Deserialize)]
pub struct ReferralsResponse {
    #[serde(default)]
    pub referrals: Vec<Referral>,
}

#[derive(Debug, Serialize)]
pub struct QuestionSetStatusBody {
    pub status: ActivityStatus,
}

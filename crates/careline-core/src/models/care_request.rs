use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of reasons a patient can open a care request for.
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareRequestType {
    Sick,
    Checkup,
    Injury,
    Chronic,
    MentalHealth,
    SpecialistReferral,
    PrescriptionRefill,
    Imaging,
    Surgery,
    Other,
}

impl CareRequestType {
    pub const ALL: [CareRequestType; 10] = [
        CareRequestType::Sick,
        CareRequestType::Checkup,
        CareRequestType::Injury,
        CareRequestType::Chronic,
        CareRequestType::MentalHealth,
        CareRequestType::SpecialistReferral,
        CareRequestType::PrescriptionRefill,
        CareRequestType::Imaging,
        CareRequestType::Surgery,
        CareRequestType::Other,
    ];

    /// Wire tag, as sent in the `type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            CareRequestType::Sick => "sick",
            CareRequestType::Checkup => "checkup",
            CareRequestType::Injury => "injury",
            CareRequestType::Chronic => "chronic",
            CareRequestType::MentalHealth => "mental_health",
            CareRequestType::SpecialistReferral => "specialist_referral",
            CareRequestType::PrescriptionRefill => "prescription_refill",
            CareRequestType::Imaging => "imaging",
            CareRequestType::Surgery => "surgery",
            CareRequestType::Other => "other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CareRequestType::Sick => "I'm feeling sick",
            CareRequestType::Checkup => "Routine checkup",
            CareRequestType::Injury => "Injury",
            CareRequestType::Chronic => "Chronic condition",
            CareRequestType::MentalHealth => "Mental health",
            CareRequestType::SpecialistReferral => "Specialist referral",
            CareRequestType::PrescriptionRefill => "Prescription refill",
            CareRequestType::Imaging => "Imaging",
            CareRequestType::Surgery => "Surgery",
            CareRequestType::Other => "Something else",
        }
    }
}

impl std::fmt::Display for CareRequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CareRequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CareRequestType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown care request type: {}", s))
    }
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub request_type: CareRequestType,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "lastMessage", default)]
    pub last_message: Option<LastMessage>,
    #[serde(rename = "isLocked", default)]
    pub is_locked: bool,
    #[serde(rename = "patientUnreadMessages", default)]
    pub patient_unread_messages: bool,
    #[serde(rename = "patientUnreadReferralMessages", default)]
    pub patient_unread_referral_messages: bool,
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(rename = "inboxPreviewTitle", default)]
    pub inbox_preview_title: String,
}

impl CareRequest {
    pub fn has_unread(&self) -> bool {
        self.patient_unread_messages || self.patient_unread_referral_messages
    }

    /// Title for inbox rows, falling back to the type label
    pub fn display_title(&self) -> &str {
        if !self.inbox_preview_title.is_empty() {
            &self.inbox_preview_title
        } else if !self.title.is_empty() {
            &self.title
        } else {
            self.request_type.label()
        }
    }
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: i64,
    #[serde(rename = "sentAt")]
    pub sent_at: String,
    pub text: String,
    pub author: LastMessageAuthor,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessageAuthor {
    pub kind: String,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// Body for `POST /care_requests`
#[derive(Debug, Clone, Serialize)]
pub struct NewCareRequest {
    #[serde(rename = "type")]
    pub request_type: CareRequestType,
    pub title: String,
    pub content: String,
}

impl NewCareRequest {
    pub fn new(request_type: CareRequestType) -> Self {
        Self {
            request_type,
            title: request_type.as_str().to_string(),
            content: "This is a care request".to_string(),
        }
    }
}

// ===== Response envelopes =====

#[derive(Debug, Deserialize)]
pub struct CareRequestsResponse {
    pub care_requests: CareRequestList,
}

#[derive(Debug, Deserialize)]
pub struct CareRequestList {
    #[serde(rename = "careRequests", default)]
    pub care_requests: Vec<CareRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CareRequestResponse {
    pub care_request: CareRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_match_wire_format() {
        for t in CareRequestType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<CareRequestType>().unwrap(), t);
        }
        assert!("flu".parse::<CareRequestType>().is_err());
    }

    #[test]
    fn test_parse_care_requests_envelope() {
        let json = r#"{"care_requests": {"careRequests": [{"id": "cr_1","type": "mental_health","title": "mental_health","lastMessage": {"id": 9,"sentAt": "2025-03-01T10:00:00Z","text": "How are you feeling?","author": {"kind": "provider"}},"isLocked": false,"patientUnreadMessages": true,"patientUnreadReferralMessages": false,"providers": [],"inboxPreviewTitle": "Mental health check-in"}]}}"#;

        let resp: CareRequestsResponse = serde_json::from_str(json).unwrap();
        let requests = resp.care_requests.care_requests;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].request_type, CareRequestType::MentalHealth);
        assert!(requests[0].has_unread());
        assert_eq!(requests[0].display_title(), "Mental health check-in");
        assert_eq!(
            requests[0].last_message.as_ref().map(|m| m.author.kind.as_str()),
            Some("provider")
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{"care_request": {"id": "cr_2", "type": "teleport"}}"#;
        assert!(serde_json::from_str::<CareRequestResponse>(json).is_err());
    }

    #[test]
    fn test_new_care_request_body() {
        let body = serde_json::to_value(NewCareRequest::new(CareRequestType::Sick)).unwrap();
        assert_eq!(body["type"], "sick");
        assert_eq!(body["title"], "sick");
    }
}

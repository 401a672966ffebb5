use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CareError;

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorKind {
    Patient,
    Provider,
    System,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Questionnaire,
    Referral,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AuthorKind,
    pub name: String,
}

/// One entry in a care request's stack (message thread)
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub author: Author,
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(rename = "replyTo", alias = "reply_to", default)]
    pub reply_to: Option<String>,
    #[serde(rename = "messageType", alias = "message_type", default)]
    pub message_type: Option<MessageType>,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Attachment {
    Image { id: String, url: String },
    Questionnaire { id: String, data: Questionnaire },
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Questionnaire {
    pub questions: Vec<Question>,
    /// Answers keyed by question id
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice { options: Vec<String> },
    Text,
}

impl Questionnaire {
    pub fn answer(&mut self, question_id: impl Into<String>, answer: impl Into<String>) {
        self.answers.insert(question_id.into(), answer.into());
    }

    /// Every question answered, and multiple-choice answers drawn from the options.
    pub fn validate(&self) -> Result<(), CareError> {
        for question in &self.questions {
            let answer = self
                .answers
                .get(&question.id)
                .map(|a| a.trim())
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    CareError::Validation("Please answer all questions before submitting.".to_string())
                })?;

            if let QuestionKind::MultipleChoice { options } = &question.kind {
                if !options.iter().any(|o| o == answer) {
                    return Err(CareError::Validation(format!(
                        "\"{}\" is not an option for \"{}\"",
                        answer, question.text
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A message to post to a care request's stack
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewMessage {
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl NewMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), CareError> {
        if self.text.trim().is_empty() && self.attachments.is_empty() {
            return Err(CareError::Validation("Message cannot be empty".to_string()));
        }
        for attachment in &self.attachments {
            match attachment {
                Attachment::Questionnaire { data, .. } => data.validate()?,
                Attachment::Image { url, .. } if url.trim().is_empty() => {
                    return Err(CareError::Validation("Image attachment has no URL".to_string()));
                }
                Attachment::Image { .. } => {}
            }
        }
        Ok(())
    }
}

/// Sort a stack oldest-first for display. Server order is not guaranteed.
pub fn sort_chronologically(messages: &mut [Message]) {
    messages.sort_by_key(|m| m.timestamp);
}

// ===== Wire envelopes =====

#[derive(Debug, Serialize)]
pub struct SendMessageBody<'a> {
    pub message: &'a NewMessage,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct MessageResponse {
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn symptom_questionnaire() -> Questionnaire {
        Questionnaire {
            questions: vec![
                Question {
                    id: "q1".into(),
                    text: "How long have you had symptoms?".into(),
                    kind: QuestionKind::MultipleChoice {
                        options: vec!["Less than a day".into(), "A few days".into()],
                    },
                },
                Question {
                    id: "q2".into(),
                    text: "Describe your symptoms".into(),
                    kind: QuestionKind::Text,
                },
            ],
            answers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_questionnaire_requires_every_answer() {
        let mut q = symptom_questionnaire();
        q.answer("q1", "A few days");
        assert!(matches!(q.validate(), Err(CareError::Validation(_))));

        q.answer("q2", "   ");
        assert!(q.validate().is_err());

        q.answer("q2", "Sore throat");
        assert!(q.validate().is_ok());
    }

    #[test]
    fn test_multiple_choice_answer_must_be_an_option() {
        let mut q = symptom_questionnaire();
        q.answer("q1", "Forever");
        q.answer("q2", "Cough");
        assert!(matches!(q.validate(), Err(CareError::Validation(_))));
    }

    #[test]
    fn test_parse_message_with_questionnaire_attachment() {
        let json = r#"{"id": "m1","text": "Please fill this in","author": {"id": "p1", "type": "provider", "name": "Dr. Rivera"},"timestamp": "2025-03-01T10:00:00Z","attachments": [{"type": "questionnaire","id": "a1","data": {"questions": [{"id": "q1", "type": "multiple_choice", "text": "Fever?", "options": ["Yes", "No"]},{"id": "q2", "type": "text", "text": "Anything else?"}]}}],"replyTo": "m0","messageType": "questionnaire"}"#;

        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.author.kind, AuthorKind::Provider);
        assert_eq!(msg.reply_to.as_deref(), Some("m0"));
        assert_eq!(msg.message_type, Some(MessageType::Questionnaire));
        match &msg.attachments[0] {
            Attachment::Questionnaire { data, .. } => {
                assert_eq!(data.questions.len(), 2);
                assert!(matches!(
                    data.questions[0].kind,
                    QuestionKind::MultipleChoice { ref options } if options.len() == 2
                ));
                assert_eq!(data.questions[1].kind, QuestionKind::Text);
            }
            other => panic!("unexpected attachment: {:?}", other),
        }
    }

    #[test]
    fn test_send_body_shape() {
        let msg = NewMessage::text("hello").replying_to("m9");
        let body = serde_json::to_value(SendMessageBody { message: &msg }).unwrap();
        assert_eq!(body["message"]["text"], "hello");
        assert_eq!(body["message"]["reply_to"], "m9");
        assert!(body["message"].get("attachments").is_none());
    }

    #[test]
    fn test_empty_message_is_rejected() {
        assert!(NewMessage::text("  ").validate().is_err());
        let with_image = NewMessage::text("").with_attachment(Attachment::Image {
            id: "img1".into(),
            url: "https://cdn.example.com/rash.jpg".into(),
        });
        assert!(with_image.validate().is_ok());
    }

    #[test]
    fn test_sort_chronologically() {
        let base: DateTime<Utc> = "2025-03-01T10:00:00Z".parse().unwrap();
        let make = |id: &str, offset: i64| Message {
            id: id.into(),
            text: id.into(),
            author: Author {
                id: "u".into(),
                kind: AuthorKind::Patient,
                name: "Pat".into(),
            },
            timestamp: base + Duration::minutes(offset),
            attachments: vec![],
            reply_to: None,
            message_type: None,
        };
        let mut messages = vec![make("c", 10), make("a", 0), make("b", 5)];
        sort_chronologically(&mut messages);
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}

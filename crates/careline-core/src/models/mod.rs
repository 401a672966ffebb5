//! Data models for care-platform entities.
//!
//! This module contains the wire and domain types including:
//!
//! - `CareRequest`, `CareRequestType`: patient-initiated requests for care
//! - `Message`, `Attachment`, `Questionnaire`: the message stack of a request
//! - `Activity`, `QuestionSet`, `Referral`: per-request to-do items
//! - `User`, session and token-exchange payloads

pub mod account;
pub mod activity;
pub mod care_request;
pub mod message;

pub use account::{
    LoginRequest, PlatformTokenResponse, SessionResponse, SignupRequest, User,
};
pub use activity::{
    sort_newest_first, Activity, ActivityKind, ActivityStatus, QuestionSet, QuestionSetStatusBody,
    QuestionSetsResponse, Referral, ReferralsResponse,
};
pub use care_request::{
    CareRequest, CareRequestResponse, CareRequestType, CareRequestsResponse, LastMessage,
    LastMessageAuthor, NewCareRequest, Provider,
};
pub use message::{
    sort_chronologically, Attachment, Author, AuthorKind, Message, MessageResponse, MessageType,
    MessagesResponse, NewMessage, Question, QuestionKind, Questionnaire, SendMessageBody,
};

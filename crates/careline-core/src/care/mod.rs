//! Care requests, their message stacks, and the activity feed.

pub mod client;

pub use client::CareClient;

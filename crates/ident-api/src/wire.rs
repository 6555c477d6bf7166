//! Request and response bodies as they appear on the wire.

use ident_core::view::ConsolidatedView;
use serde::{Deserialize, Serialize};

/// `POST /identify` body. Both fields are optional on the wire; the resolver
/// rejects a body carrying neither.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
  #[serde(default)]
  pub email:        Option<String>,
  #[serde(default)]
  pub phone_number: Option<PhoneNumber>,
}

/// Clients send phone numbers both as strings and as bare JSON integers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PhoneNumber {
  Text(String),
  Digits(u64),
}

impl PhoneNumber {
  pub fn into_string(self) -> String {
    match self {
      Self::Text(s) => s,
      Self::Digits(n) => n.to_string(),
    }
  }
}

/// `GET /lookup` query string.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupParams {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
}

/// Every response, success or failure, carries a `contact`. On failure it is
/// the zeroed view and `error` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
  pub contact: ConsolidatedView,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error:   Option<String>,
}

impl IdentifyResponse {
  pub fn ok(contact: ConsolidatedView) -> Self { Self { contact, error: None } }

  pub fn failed(message: impl Into<String>) -> Self {
    Self { contact: ConsolidatedView::default(), error: Some(message.into()) }
  }
}

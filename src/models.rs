//! Request and response bodies of the OfferKit API.
use serde::{Deserialize, Serialize};

/// Body of `POST /api/sdk/offers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    pub query: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl OfferRequest {
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> OfferRequest {
        OfferRequest {
            query: query.into(),
            session_id: session_id.into(),
            context: None,
        }
    }

    /// Attach free-text context describing the conversation the query came from.
    pub fn with_context(mut self, context: impl Into<String>) -> OfferRequest {
        self.context = Some(context.into());
        self
    }
}

/// A unit of sponsored content. Passed through from the server as is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub call_to_action: String,
    pub action_endpoint: String,
    pub product_name: String,
    pub product_website: String,
}

/// Response of `POST /api/sdk/offers`.
///
/// `offers` keeps the order chosen by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferResponse {
    pub success: bool,
    pub query: String,
    pub session_id: String,
    pub offers: Vec<Offer>,
}

/// Identity of the calling application as registered with OfferKit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    pub status: String,
}

/// Response of `POST /api/sdk/test`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<Agent>,
}

/// Body of `POST /api/sdk/test`. Used by connection tests and health probes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TestRequest<'a> {
    pub query: &'a str,
    pub context: &'a str,
    pub session_id: String,
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Payment method object. Only `id` is read; the rest passes through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Connected account details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of cloning a platform payment method onto a connected account and
/// attaching it to a fresh customer there.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClonedPaymentMethod {
    pub payment_method_id: String,
    pub customer_id: String,
    pub customer: Customer,
    pub payment_method: PaymentMethod,
}

/// A charge request before it is form-encoded.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub payment_method_id: String,
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub message: Option<String>,
    pub code: Option<String>,
}

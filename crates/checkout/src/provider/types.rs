//! Provider-side request and response shapes (Mercado Pago REST).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One line of a payment preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub currency_id: String,
}

/// Where the provider sends the buyer after the hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

/// Body of a preference creation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub back_urls: BackUrls,
    pub auto_return: String,
    pub notification_url: String,
    pub external_reference: String,
}

/// A created preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preference {
    pub id: String,
    pub init_point: String,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

/// Payment status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Authorized,
    InProcess,
    InMediation,
    Rejected,
    Cancelled,
    Refunded,
    ChargedBack,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::InProcess => "in_process",
            PaymentStatus::InMediation => "in_mediation",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::ChargedBack => "charged_back",
            PaymentStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item echoed back on a payment.
///
/// The provider reports quantities and prices as strings on some payment
/// methods and as numbers on others, so both are accepted. Anything that
/// cannot be read is left empty and dealt with by fulfillment.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PaymentItem {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub quantity: Option<i64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub unit_price: Option<f64>,
}

impl PaymentItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, quantity: i64) -> Self {
        Self {
            id: Some(id.into()),
            title: Some(title.into()),
            quantity: Some(quantity),
            unit_price: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AdditionalInfo {
    #[serde(default)]
    pub items: Option<Vec<PaymentItem>>,
}

/// Authoritative payment state fetched from the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Payment {
    #[serde(deserialize_with = "required_id")]
    pub id: String,
    pub status: PaymentStatus,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub additional_info: Option<AdditionalInfo>,
}

impl Payment {
    pub fn new(id: impl Into<String>, status: PaymentStatus, items: Vec<PaymentItem>) -> Self {
        Self {
            id: id.into(),
            status,
            status_detail: None,
            external_reference: None,
            additional_info: Some(AdditionalInfo { items: Some(items) }),
        }
    }

    pub fn with_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }

    /// Items of the payment, empty if the provider sent none.
    pub fn items(&self) -> &[PaymentItem] {
        self.additional_info
            .as_ref()
            .and_then(|info| info.items.as_deref())
            .unwrap_or_default()
    }

    pub fn is_approved(&self) -> bool {
        self.status == PaymentStatus::Approved
    }
}

/// Accepts ids sent as JSON strings or numbers. Blank strings count as absent.
pub(crate) fn lenient_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Whether `id` is safe to use as a payment id in a provider lookup.
///
/// Provider ids are numeric. Letters, `-` and `_` are also accepted; path
/// separators, dots and percent signs never are.
pub fn is_valid_payment_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn required_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    lenient_id(d)?.ok_or_else(|| serde::de::Error::custom("payment id is missing or blank"))
}

fn whole_number(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

fn lenient_quantity<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(whole_number)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_number))
        }
        _ => None,
    })
}

fn lenient_amount<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let amount = match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(amount.filter(|a| a.is_finite()))
}

/// Like [`lenient_quantity`], but the value must be present and whole.
pub(crate) fn required_quantity<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    lenient_quantity(d)?
        .ok_or_else(|| serde::de::Error::custom("quantity must be a whole number"))
}

/// Like [`lenient_amount`], but the value must be present and finite.
pub(crate) fn required_amount<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    lenient_amount(d)?.ok_or_else(|| serde::de::Error::custom("price must be a number"))
}

//! Transaction records submitted for risk scoring

use serde::de::{IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One transaction to be scored.
///
/// Field names follow the upload format (`Amount`, `Payment_Method`, ...);
/// snake_case aliases are accepted as well. Only `Amount` is required, and
/// its presence is checked by the feature preparer so the error can name
/// the field instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionInput {
    /// Transaction amount in currency units
    #[serde(rename = "Amount", alias = "amount", default)]
    pub amount: Option<f64>,

    /// Payment rail, e.g. UPI, NEFT, RTGS, IMPS, Card
    #[serde(rename = "Payment_Method", alias = "payment_method", default)]
    pub payment_method: Option<String>,

    /// Merchant category, e.g. Retail, Food, Others
    #[serde(rename = "Merchant_Category", alias = "merchant_category", default)]
    pub merchant_category: Option<String>,

    /// City or region label
    #[serde(rename = "Location", alias = "location", default)]
    pub location: Option<String>,

    /// ISO-8601 timestamp of the transaction
    #[serde(rename = "Time", alias = "time", alias = "timestamp", default)]
    pub time: Option<String>,

    /// Anonymised `V<n>` values supplied by older clients
    #[serde(flatten)]
    pub components: AnonymisedComponents,
}

impl TransactionInput {
    /// Create an input with an amount and no other fields set
    pub fn new(amount: f64) -> Self {
        Self {
            amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_merchant_category(mut self, category: impl Into<String>) -> Self {
        self.merchant_category = Some(category.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_time(mut self, time: impl Into<String>) -> Self {
        self.time = Some(time.into());
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, value: f64) -> Self {
        self.components.insert(name, value);
        self
    }
}

/// `true` for `V` followed by one or more ASCII digits
pub fn is_component_name(name: &str) -> bool {
    name.strip_prefix('V')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// `V<n>` values keyed by column name.
///
/// Collects the leftover keys of a transaction object: keys that are not
/// `V<n>` names are skipped, as are `null` values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnonymisedComponents(BTreeMap<String, f64>);

impl AnonymisedComponents {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Store a value, ignoring names that are not `V<n>`
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if is_component_name(&name) {
            self.0.insert(name, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de> Deserialize<'de> for AnonymisedComponents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ComponentsVisitor;

        impl<'de> Visitor<'de> for ComponentsVisitor {
            type Value = AnonymisedComponents;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of V<n> values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut components = AnonymisedComponents::default();
                while let Some(key) = map.next_key::<String>()? {
                    if !is_component_name(&key) {
                        map.next_value::<IgnoredAny>()?;
                        continue;
                    }
                    if let Some(value) = map.next_value::<Option<f64>>()? {
                        components.insert(key, value);
                    }
                }
                Ok(components)
            }
        }

        deserializer.deserialize_map(ComponentsVisitor)
    }
}

/// Transaction as published on the stream subject: an input plus an
/// optional caller-assigned identifier used to correlate alerts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamTransaction {
    #[serde(alias = "Transaction_ID", default)]
    pub transaction_id: Option<String>,

    #[serde(flatten)]
    pub input: TransactionInput,
}

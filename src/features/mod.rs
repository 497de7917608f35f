//! Feature preparation for fraud model inference.
//!
//! Turns a [`TransactionInput`] into the fixed-width vector the classifier
//! was trained on. Column order, categorical vocabularies and scaling
//! parameters all come from the preprocessing artifact saved next to the
//! model, so the same code serves any model trained on these columns.

pub mod artifacts;
pub mod encoder;

use crate::error::{ModelLoadError, ScoringError};
use crate::types::transaction::is_component_name;
use crate::types::TransactionInput;
use artifacts::{PreprocessingArtifacts, StandardScaler};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use encoder::CategoryEncoder;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Hour used when a transaction carries no timestamp
pub const NEUTRAL_HOUR: u32 = 12;
/// Weekday (Mon = 0) used when a transaction carries no timestamp
pub const NEUTRAL_WEEKDAY: u32 = 2;
/// Month used when a transaction carries no timestamp
pub const NEUTRAL_MONTH: u32 = 6;

/// Values substituted for absent categorical fields
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputDefaults {
    pub payment_method: String,
    pub merchant_category: String,
    pub location: String,
}

impl Default for InputDefaults {
    fn default() -> Self {
        Self {
            payment_method: "UPI".to_string(),
            merchant_category: "Others".to_string(),
            location: "Mumbai".to_string(),
        }
    }
}

/// A model input column the preparer knows how to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureColumn {
    Amount,
    AmountLog,
    PaymentMethodEncoded,
    MerchantCategoryEncoded,
    LocationEncoded,
    Hour,
    DayOfWeek,
    Month,
    IsWeekend,
    IsBankingHours,
    IsNightTransaction,
    IsHighRiskPayment,
    IsInternational,
    IsFestivalSeason,
    /// Anonymised `V<n>` component: the caller's value when supplied,
    /// otherwise its standardized mean
    Anonymised,
}

impl FeatureColumn {
    pub fn parse(name: &str) -> Option<Self> {
        let column = match name {
            "Amount" => FeatureColumn::Amount,
            "Amount_Log" => FeatureColumn::AmountLog,
            "Payment_Method_Encoded" => FeatureColumn::PaymentMethodEncoded,
            "Merchant_Category_Encoded" => FeatureColumn::MerchantCategoryEncoded,
            "Location_Encoded" => FeatureColumn::LocationEncoded,
            "Hour" => FeatureColumn::Hour,
            "Day_of_Week" => FeatureColumn::DayOfWeek,
            "Month" => FeatureColumn::Month,
            "Is_Weekend" => FeatureColumn::IsWeekend,
            "Is_Banking_Hours" => FeatureColumn::IsBankingHours,
            "Is_Night_Transaction" => FeatureColumn::IsNightTransaction,
            "Is_High_Risk_Payment" => FeatureColumn::IsHighRiskPayment,
            "Is_International" => FeatureColumn::IsInternational,
            "Is_Festival_Season" => FeatureColumn::IsFestivalSeason,
            other if is_component_name(other) => FeatureColumn::Anonymised,
            _ => return None,
        };
        Some(column)
    }
}

/// Calendar parts of a transaction timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    pub hour: u32,
    /// Days from Monday (Mon = 0)
    pub weekday: u32,
    pub month: u32,
}

impl TimeParts {
    pub const NEUTRAL: TimeParts = TimeParts {
        hour: NEUTRAL_HOUR,
        weekday: NEUTRAL_WEEKDAY,
        month: NEUTRAL_MONTH,
    };

    /// Parse an ISO-8601 timestamp. An explicit offset is honoured as the
    /// local wall clock of the transaction; no timezone conversion happens.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let naive = if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            dt.naive_local()
        } else {
            parse_naive(raw)?
        };

        Some(Self {
            hour: naive.hour(),
            weekday: naive.weekday().num_days_from_monday(),
            month: naive.month(),
        })
    }
}

fn parse_naive(raw: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Model-ready features for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<f32>,
    unseen: Vec<&'static str>,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Categorical fields whose value fell back to the unseen bucket
    pub fn unseen_fields(&self) -> &[&'static str] {
        &self.unseen
    }
}

/// Deterministic transformation from transaction to feature vector.
///
/// Holds only immutable lookup tables, so one instance is shared by every
/// request.
#[derive(Debug, Clone)]
pub struct FeaturePreparer {
    columns: Vec<FeatureColumn>,
    names: Vec<String>,
    payment_method: CategoryEncoder,
    merchant_category: CategoryEncoder,
    location: CategoryEncoder,
    scaler: Option<StandardScaler>,
    high_risk_payment_methods: HashSet<String>,
    defaults: InputDefaults,
}

impl FeaturePreparer {
    /// Load the preprocessing artifact from disk
    pub fn load<P: AsRef<Path>>(path: P, defaults: InputDefaults) -> Result<Self, ModelLoadError> {
        let artifacts = PreprocessingArtifacts::load(path)?;
        Self::from_artifacts(&artifacts, defaults)
    }

    pub fn from_artifacts(
        artifacts: &PreprocessingArtifacts,
        defaults: InputDefaults,
    ) -> Result<Self, ModelLoadError> {
        if artifacts.feature_columns.is_empty() {
            return Err(ModelLoadError::Invalid(
                "feature_columns is empty".to_string(),
            ));
        }

        let columns = artifacts
            .feature_columns
            .iter()
            .map(|name| {
                FeatureColumn::parse(name).ok_or_else(|| {
                    ModelLoadError::Invalid(format!("unsupported feature column '{}'", name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let scaler = artifacts
            .scaler
            .as_ref()
            .map(|spec| StandardScaler::from_spec(spec, columns.len()))
            .transpose()?;

        Ok(Self {
            columns,
            names: artifacts.feature_columns.clone(),
            payment_method: CategoryEncoder::from_spec(
                "Payment_Method",
                &artifacts.encoders.payment_method,
            )?,
            merchant_category: CategoryEncoder::from_spec(
                "Merchant_Category",
                &artifacts.encoders.merchant_category,
            )?,
            location: CategoryEncoder::from_spec("Location", &artifacts.encoders.location)?,
            scaler,
            high_risk_payment_methods: artifacts
                .high_risk_payment_methods
                .iter()
                .cloned()
                .collect(),
            defaults,
        })
    }

    /// Build the feature vector for one transaction.
    ///
    /// Fails only on a missing, negative or non-finite `Amount`, a
    /// non-finite `V<n>` value, or an unparseable `Time`. Unknown
    /// categorical values never fail.
    pub fn prepare(&self, tx: &TransactionInput) -> Result<FeatureVector, ScoringError> {
        let amount = validate_amount(tx.amount)?;

        let time = match non_blank(&tx.time) {
            Some(raw) => TimeParts::parse(raw).ok_or_else(|| {
                ScoringError::validation(format!(
                    "Time: could not parse '{}' as an ISO-8601 timestamp",
                    raw
                ))
            })?,
            None => TimeParts::NEUTRAL,
        };

        let payment_method =
            non_blank(&tx.payment_method).unwrap_or(&self.defaults.payment_method);
        let merchant_category =
            non_blank(&tx.merchant_category).unwrap_or(&self.defaults.merchant_category);
        let location = non_blank(&tx.location).unwrap_or(&self.defaults.location);

        let mut unseen = Vec::new();
        let mut encode = |encoder: &CategoryEncoder, value: &str| -> f64 {
            let encoded = encoder.encode(value);
            if encoded.is_unseen() {
                debug!(
                    field = encoder.field(),
                    value = %value,
                    fallback = encoded.code(),
                    "Unseen category, using fallback code"
                );
                unseen.push(encoder.field());
            }
            encoded.code() as f64
        };

        let payment_code = encode(&self.payment_method, payment_method);
        let merchant_code = encode(&self.merchant_category, merchant_category);
        let location_code = encode(&self.location, location);

        let components: Vec<Option<f64>> = self
            .columns
            .iter()
            .zip(&self.names)
            .map(|(column, name)| match column {
                FeatureColumn::Anonymised => tx.components.get(name),
                _ => None,
            })
            .collect();
        if let Some(name) = self
            .names
            .iter()
            .zip(&components)
            .find(|(_, value)| value.is_some_and(|v| !v.is_finite()))
            .map(|(name, _)| name)
        {
            return Err(ScoringError::validation(format!(
                "{} must be a finite number",
                name
            )));
        }

        let flag = |b: bool| if b { 1.0 } else { 0.0 };

        let raw: Vec<f64> = self
            .columns
            .iter()
            .zip(&components)
            .map(|(column, supplied)| match column {
                FeatureColumn::Amount => amount,
                FeatureColumn::AmountLog => amount.ln_1p(),
                FeatureColumn::PaymentMethodEncoded => payment_code,
                FeatureColumn::MerchantCategoryEncoded => merchant_code,
                FeatureColumn::LocationEncoded => location_code,
                FeatureColumn::Hour => time.hour as f64,
                FeatureColumn::DayOfWeek => time.weekday as f64,
                FeatureColumn::Month => time.month as f64,
                FeatureColumn::IsWeekend => flag(time.weekday >= 5),
                FeatureColumn::IsBankingHours => flag((10..16).contains(&time.hour)),
                FeatureColumn::IsNightTransaction => flag(time.hour >= 22 || time.hour <= 6),
                FeatureColumn::IsHighRiskPayment => {
                    flag(self.high_risk_payment_methods.contains(payment_method.trim()))
                }
                FeatureColumn::IsInternational => {
                    flag(location.trim().starts_with("International"))
                }
                FeatureColumn::IsFestivalSeason => 0.0,
                FeatureColumn::Anonymised => supplied.unwrap_or(0.0),
            })
            .collect();

        let mut values = match &self.scaler {
            Some(scaler) => scaler.transform(&raw),
            None => raw.iter().map(|&v| v as f32).collect(),
        };
        for ((value, column), supplied) in values.iter_mut().zip(&self.columns).zip(&components) {
            if *column == FeatureColumn::Anonymised && supplied.is_none() {
                *value = 0.0;
            }
        }

        Ok(FeatureVector { values, unseen })
    }

    /// Get the number of features produced
    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    /// Get feature names in model order
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    /// Values substituted for absent categorical fields
    pub fn defaults(&self) -> &InputDefaults {
        &self.defaults
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn validate_amount(amount: Option<f64>) -> Result<f64, ScoringError> {
    match amount {
        None => Err(ScoringError::validation("Amount is required")),
        Some(a) if !a.is_finite() => Err(ScoringError::validation(
            "Amount must be a finite number",
        )),
        Some(a) if a < 0.0 => Err(ScoringError::validation(format!(
            "Amount must be non-negative, got {}",
            a
        ))),
        Some(a) => Ok(a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::artifacts::{EncoderSet, ScalerSpec};
    use crate::features::encoder::EncoderSpec;

    fn encoder(classes: &[&str]) -> EncoderSpec {
        EncoderSpec {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            fallback: None,
        }
    }

    fn artifacts(columns: &[&str]) -> PreprocessingArtifacts {
        PreprocessingArtifacts {
            feature_columns: columns.iter().map(|c| c.to_string()).collect(),
            encoders: EncoderSet {
                payment_method: encoder(&["Card", "IMPS", "NEFT", "UPI"]),
                merchant_category: encoder(&["Food", "Others", "Retail"]),
                location: encoder(&["Delhi_NCR", "International_Dubai", "Mumbai"]),
            },
            scaler: None,
            high_risk_payment_methods: vec!["Card".to_string()],
        }
    }

    fn preparer(columns: &[&str]) -> FeaturePreparer {
        FeaturePreparer::from_artifacts(&artifacts(columns), InputDefaults::default()).unwrap()
    }

    #[test]
    fn test_feature_extraction_follows_column_order() {
        let prep = preparer(&[
            "Amount",
            "Amount_Log",
            "Payment_Method_Encoded",
            "Merchant_Category_Encoded",
            "Location_Encoded",
            "Hour",
            "Is_Night_Transaction",
        ]);
        let tx = TransactionInput::new(500000.0)
            .with_payment_method("NEFT")
            .with_merchant_category("Others")
            .with_location("Mumbai")
            .with_time("2024-01-15T02:30:00");

        let features = prep.prepare(&tx).unwrap();

        assert_eq!(features.len(), prep.feature_count());
        let v = features.as_slice();
        assert_eq!(v[0], 500000.0);
        assert!((v[1] - 13.122_365).abs() < 1e-4);
        assert_eq!(&v[2..], &[2.0, 1.0, 2.0, 2.0, 1.0]);
        assert!(features.unseen_fields().is_empty());
    }

    #[test]
    fn test_time_derived_columns() {
        let prep = preparer(&[
            "Hour",
            "Day_of_Week",
            "Month",
            "Is_Weekend",
            "Is_Banking_Hours",
            "Is_Night_Transaction",
        ]);

        // 2024-03-09 is a Saturday
        let tx = TransactionInput::new(10.0).with_time("2024-03-09 11:15:00");
        let v = prep.prepare(&tx).unwrap();
        assert_eq!(v.as_slice(), &[11.0, 5.0, 3.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_time_uses_neutral_defaults() {
        let prep = preparer(&["Hour", "Day_of_Week", "Month", "Is_Night_Transaction"]);
        let v = prep.prepare(&TransactionInput::new(10.0)).unwrap();
        assert_eq!(v.as_slice(), &[12.0, 2.0, 6.0, 0.0]);

        let blank = TransactionInput::new(10.0).with_time("  ");
        assert_eq!(prep.prepare(&blank).unwrap(), v);
    }

    #[test]
    fn test_time_formats() {
        assert_eq!(TimeParts::parse("2024-01-15T23:05:00+05:30").unwrap().hour, 23);
        assert_eq!(TimeParts::parse("2024-01-15T23:05:00Z").unwrap().hour, 23);
        assert_eq!(TimeParts::parse("2024-01-15T07:45:10.250").unwrap().hour, 7);
        assert_eq!(TimeParts::parse("2024-01-15T07:45").unwrap().hour, 7);
        assert_eq!(TimeParts::parse("2024-01-15").unwrap().hour, 0);
        assert!(TimeParts::parse("yesterday").is_none());
    }

    #[test]
    fn test_unparseable_time_is_validation_error() {
        let prep = preparer(&["Hour"]);
        let err = prep
            .prepare(&TransactionInput::new(1.0).with_time("15/01/2024"))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("Time:"));
    }

    #[test]
    fn test_unseen_categories_use_fallback() {
        let prep = preparer(&[
            "Payment_Method_Encoded",
            "Merchant_Category_Encoded",
            "Location_Encoded",
        ]);
        let tx = TransactionInput::new(100.0)
            .with_payment_method("Crypto_Wallet")
            .with_merchant_category("Casino")
            .with_location("Mumbai");

        let v = prep.prepare(&tx).unwrap();
        assert_eq!(v.as_slice(), &[4.0, 3.0, 2.0]);
        assert_eq!(v.unseen_fields(), &["Payment_Method", "Merchant_Category"]);
    }

    #[test]
    fn test_absent_categoricals_use_defaults() {
        let prep = preparer(&[
            "Payment_Method_Encoded",
            "Merchant_Category_Encoded",
            "Location_Encoded",
        ]);
        let v = prep.prepare(&TransactionInput::new(100.0)).unwrap();
        // UPI, Others, Mumbai
        assert_eq!(v.as_slice(), &[3.0, 1.0, 2.0]);
    }

    #[test]
    fn test_derived_flags() {
        let prep = preparer(&["Is_High_Risk_Payment", "Is_International", "Is_Festival_Season", "V7"]);
        let tx = TransactionInput::new(100.0)
            .with_payment_method("Card")
            .with_location("International_Dubai");
        assert_eq!(prep.prepare(&tx).unwrap().as_slice(), &[1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_supplied_components_are_used() {
        let prep = preparer(&["Amount", "V1", "V2"]);
        let tx = TransactionInput::new(100.0)
            .with_component("V1", 3.5)
            .with_component("V2", -1.25);
        assert_eq!(prep.prepare(&tx).unwrap().as_slice(), &[100.0, 3.5, -1.25]);

        // Absent or unknown components fall back to the mean
        let partial = TransactionInput::new(100.0)
            .with_component("V2", 2.0)
            .with_component("V9", 7.0);
        assert_eq!(prep.prepare(&partial).unwrap().as_slice(), &[100.0, 0.0, 2.0]);
    }

    #[test]
    fn test_supplied_components_are_scaled() {
        let mut art = artifacts(&["Amount", "V1", "V2"]);
        art.scaler = Some(ScalerSpec {
            mean: vec![100.0, 1.0, 0.5],
            scale: vec![50.0, 2.0, 0.25],
        });
        let prep = FeaturePreparer::from_artifacts(&art, InputDefaults::default()).unwrap();

        let tx = TransactionInput::new(100.0).with_component("V1", 4.0);
        assert_eq!(prep.prepare(&tx).unwrap().as_slice(), &[0.0, 1.5, 0.0]);
    }

    #[test]
    fn test_non_finite_component_rejected() {
        let prep = preparer(&["Amount", "V3"]);
        let err = prep
            .prepare(&TransactionInput::new(1.0).with_component("V3", f64::INFINITY))
            .unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().starts_with("V3"));
    }

    #[test]
    fn test_amount_validation() {
        let prep = preparer(&["Amount"]);

        let missing = prep.prepare(&TransactionInput::default()).unwrap_err();
        assert_eq!(missing, ScoringError::Validation("Amount is required".to_string()));

        let negative = prep.prepare(&TransactionInput::new(-5.0)).unwrap_err();
        assert!(negative.to_string().contains("non-negative"));

        let nan = prep.prepare(&TransactionInput::new(f64::NAN)).unwrap_err();
        assert!(nan.is_validation());

        assert!(prep.prepare(&TransactionInput::new(0.0)).is_ok());
    }

    #[test]
    fn test_scaling_applied() {
        let mut art = artifacts(&["Amount", "Hour"]);
        art.scaler = Some(ScalerSpec {
            mean: vec![100.0, 12.0],
            scale: vec![50.0, 6.0],
        });
        let prep = FeaturePreparer::from_artifacts(&art, InputDefaults::default()).unwrap();

        let v = prep
            .prepare(&TransactionInput::new(200.0).with_time("2024-01-01T18:00:00"))
            .unwrap();
        assert_eq!(v.as_slice(), &[2.0, 1.0]);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let result = FeaturePreparer::from_artifacts(
            &artifacts(&["Amount", "Customer_Age"]),
            InputDefaults::default(),
        );
        assert!(matches!(result, Err(ModelLoadError::Invalid(_))));
        assert!(FeatureColumn::parse("V").is_none());
        assert!(FeatureColumn::parse("V12").is_some());
    }

    #[test]
    fn test_prepare_is_deterministic() {
        let prep = preparer(&["Amount_Log", "Location_Encoded", "Hour"]);
        let tx = TransactionInput::new(4321.0).with_location("Pune");
        assert_eq!(prep.prepare(&tx).unwrap(), prep.prepare(&tx).unwrap());
    }
}

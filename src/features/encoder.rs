//! Categorical encoding tables built at training time

use crate::error::ModelLoadError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serialized form of one encoder: the training vocabulary in code order
/// and, optionally, the class that unseen values fall back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderSpec {
    pub classes: Vec<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Outcome of encoding one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    Known(u32),
    /// Value outside the training vocabulary, mapped to the fallback code
    Unseen(u32),
}

impl Encoded {
    pub fn code(self) -> u32 {
        match self {
            Encoded::Known(code) | Encoded::Unseen(code) => code,
        }
    }

    pub fn is_unseen(self) -> bool {
        matches!(self, Encoded::Unseen(_))
    }
}

/// Label encoder with an explicit fallback entry.
///
/// A value's code is its index in the training vocabulary. Values absent
/// from the vocabulary get the fallback code: the index of the configured
/// fallback class, or `classes.len()` when none is configured.
#[derive(Debug, Clone)]
pub struct CategoryEncoder {
    field: &'static str,
    codes: HashMap<String, u32>,
    fallback: u32,
}

impl CategoryEncoder {
    pub fn from_spec(field: &'static str, spec: &EncoderSpec) -> Result<Self, ModelLoadError> {
        if spec.classes.is_empty() {
            return Err(ModelLoadError::Invalid(format!(
                "encoder '{}' has no classes",
                field
            )));
        }

        let mut codes = HashMap::with_capacity(spec.classes.len());
        for (idx, class) in spec.classes.iter().enumerate() {
            if codes.insert(class.clone(), idx as u32).is_some() {
                return Err(ModelLoadError::Invalid(format!(
                    "encoder '{}' lists class '{}' twice",
                    field, class
                )));
            }
        }

        let fallback = match &spec.fallback {
            Some(class) => *codes.get(class).ok_or_else(|| {
                ModelLoadError::Invalid(format!(
                    "encoder '{}' fallback '{}' is not one of its classes",
                    field, class
                ))
            })?,
            None => spec.classes.len() as u32,
        };

        Ok(Self {
            field,
            codes,
            fallback,
        })
    }

    /// Encode a value; surrounding whitespace is ignored
    pub fn encode(&self, value: &str) -> Encoded {
        match self.codes.get(value.trim()) {
            Some(&code) => Encoded::Known(code),
            None => Encoded::Unseen(self.fallback),
        }
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn fallback_code(&self) -> u32 {
        self.fallback
    }

    /// Size of the training vocabulary
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(classes: &[&str], fallback: Option<&str>) -> EncoderSpec {
        EncoderSpec {
            classes: classes.iter().map(|c| c.to_string()).collect(),
            fallback: fallback.map(str::to_string),
        }
    }

    #[test]
    fn test_known_values_use_vocabulary_index() {
        let encoder =
            CategoryEncoder::from_spec("payment_method", &spec(&["IMPS", "NEFT", "UPI"], None))
                .unwrap();
        assert_eq!(encoder.encode("IMPS"), Encoded::Known(0));
        assert_eq!(encoder.encode(" UPI "), Encoded::Known(2));
        assert_eq!(encoder.len(), 3);
    }

    #[test]
    fn test_unseen_value_gets_dedicated_code() {
        let encoder =
            CategoryEncoder::from_spec("payment_method", &spec(&["IMPS", "NEFT", "UPI"], None))
                .unwrap();
        let encoded = encoder.encode("Crypto_Wallet");
        assert!(encoded.is_unseen());
        assert_eq!(encoded.code(), 3);
    }

    #[test]
    fn test_unseen_value_uses_named_fallback() {
        let encoder = CategoryEncoder::from_spec(
            "merchant_category",
            &spec(&["Food", "Others", "Retail"], Some("Others")),
        )
        .unwrap();
        assert_eq!(encoder.encode("Casino"), Encoded::Unseen(1));
        assert_eq!(encoder.fallback_code(), 1);
    }

    #[test]
    fn test_invalid_specs_rejected() {
        assert!(CategoryEncoder::from_spec("location", &spec(&[], None)).is_err());
        assert!(CategoryEncoder::from_spec("location", &spec(&["A", "A"], None)).is_err());
        assert!(CategoryEncoder::from_spec("location", &spec(&["A", "B"], Some("C"))).is_err());
    }
}

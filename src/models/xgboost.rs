//! Native evaluator for XGBoost's JSON model format.
//!
//! Reads the file written by `Booster.save_model("model.json")` and walks
//! each regression tree directly, so a model can be served without ONNX
//! Runtime. Only numerical splits of a binary `gbtree` model are supported.

use crate::error::ModelLoadError;
use crate::models::FraudClassifier;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct ModelFile {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    gradient_booster: GradientBooster,
    learner_model_param: LearnerModelParam,
    objective: ObjectiveSpec,
}

#[derive(Debug, Deserialize)]
struct GradientBooster {
    name: String,
    #[serde(default)]
    model: Option<TreeModel>,
}

#[derive(Debug, Deserialize)]
struct TreeModel {
    trees: Vec<RawTree>,
}

#[derive(Debug, Deserialize)]
struct RawTree {
    left_children: Vec<i64>,
    right_children: Vec<i64>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f64>,
    default_left: Vec<Flag>,
    #[serde(default)]
    split_type: Vec<i64>,
}

/// Older releases write `default_left` as booleans, newer ones as 0/1
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Int(i) => *i != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    base_score: String,
    #[serde(default)]
    num_feature: Option<String>,
    #[serde(default)]
    num_class: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectiveSpec {
    name: String,
}

/// How the stored base score is read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Objective {
    /// `binary:logistic` / `reg:logistic`: base score is a probability
    Logistic,
    /// `binary:logitraw`: base score is already a margin
    LogitRaw,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f64),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_raw(idx: usize, raw: &RawTree, num_feature: Option<usize>) -> Result<Self, ModelLoadError> {
        let n = raw.left_children.len();
        let invalid = |msg: String| ModelLoadError::Invalid(format!("tree {}: {}", idx, msg));

        if n == 0 {
            return Err(invalid("has no nodes".to_string()));
        }
        if raw.right_children.len() != n
            || raw.split_indices.len() != n
            || raw.split_conditions.len() != n
            || raw.default_left.len() != n
        {
            return Err(invalid("node arrays differ in length".to_string()));
        }
        if raw.split_type.iter().any(|&t| t != 0) {
            return Err(invalid("categorical splits are not supported".to_string()));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (raw.left_children[i], raw.right_children[i]);
            if left == -1 {
                nodes.push(Node::Leaf(raw.split_conditions[i]));
                continue;
            }

            // Children always follow their parent, which also rules out cycles
            let child = |c: i64| -> Result<usize, ModelLoadError> {
                if c <= i as i64 || c >= n as i64 {
                    Err(invalid(format!("node {} has out-of-range child {}", i, c)))
                } else {
                    Ok(c as usize)
                }
            };

            let feature = raw.split_indices[i];
            if feature < 0 || num_feature.is_some_and(|nf| feature as usize >= nf) {
                return Err(invalid(format!(
                    "node {} splits on out-of-range feature {}",
                    i, feature
                )));
            }

            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: raw.split_conditions[i] as f32,
                left: child(left)?,
                right: child(right)?,
                default_left: raw.default_left[i].is_set(),
            });
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, features: &[f32]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = features.get(feature).copied().unwrap_or(f32::NAN);
                    idx = if x.is_nan() {
                        if default_left {
                            left
                        } else {
                            right
                        }
                    } else if x < threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

/// Gradient-boosted tree ensemble evaluated in process
#[derive(Debug, Clone)]
pub struct XgbTreeEnsemble {
    name: String,
    trees: Vec<Tree>,
    base_margin: f64,
    num_feature: Option<usize>,
}

impl XgbTreeEnsemble {
    /// Load a model saved with `save_model("*.json")`
    pub fn load<P: AsRef<Path>>(path: P, name: &str) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ModelLoadError::NotFound(path.to_path_buf()));
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ModelFile =
            serde_json::from_str(&raw).map_err(|source| ModelLoadError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let model = Self::from_model_file(file, name)?;
        info!(
            model = %name,
            path = %path.display(),
            trees = model.trees.len(),
            num_feature = ?model.num_feature,
            "XGBoost model loaded"
        );
        Ok(model)
    }

    /// Parse a model from its JSON text
    pub fn from_json_str(json: &str, name: &str) -> Result<Self, ModelLoadError> {
        let file: ModelFile = serde_json::from_str(json).map_err(|source| ModelLoadError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        Self::from_model_file(file, name)
    }

    fn from_model_file(file: ModelFile, name: &str) -> Result<Self, ModelLoadError> {
        let learner = file.learner;

        if learner.gradient_booster.name != "gbtree" {
            return Err(ModelLoadError::Invalid(format!(
                "unsupported booster '{}'",
                learner.gradient_booster.name
            )));
        }

        let objective = match learner.objective.name.as_str() {
            "binary:logistic" | "reg:logistic" => Objective::Logistic,
            "binary:logitraw" => Objective::LogitRaw,
            other => {
                return Err(ModelLoadError::Invalid(format!(
                    "unsupported objective '{}'",
                    other
                )))
            }
        };

        let params = &learner.learner_model_param;
        let num_class = parse_param(params.num_class.as_deref(), "num_class")?.unwrap_or(0.0);
        if num_class > 1.0 {
            return Err(ModelLoadError::Invalid(
                "multi-class models are not supported".to_string(),
            ));
        }
        let num_feature = parse_param(params.num_feature.as_deref(), "num_feature")?
            .map(|n| n as usize)
            .filter(|&n| n > 0);

        let base_score = parse_param(Some(&params.base_score), "base_score")?
            .ok_or_else(|| ModelLoadError::Invalid("base_score is empty".to_string()))?;
        let base_margin = match objective {
            Objective::Logistic => {
                if !(base_score > 0.0 && base_score < 1.0) {
                    return Err(ModelLoadError::Invalid(format!(
                        "base_score {} is not a probability",
                        base_score
                    )));
                }
                (base_score / (1.0 - base_score)).ln()
            }
            Objective::LogitRaw => base_score,
        };

        let raw_trees = learner
            .gradient_booster
            .model
            .map(|m| m.trees)
            .unwrap_or_default();
        if raw_trees.is_empty() {
            return Err(ModelLoadError::Invalid("model has no trees".to_string()));
        }

        let trees = raw_trees
            .iter()
            .enumerate()
            .map(|(idx, raw)| Tree::from_raw(idx, raw, num_feature))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            trees,
            base_margin,
            num_feature,
        })
    }

    /// Sum of leaf values plus the base margin
    pub fn margin(&self, features: &[f32]) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.leaf_value(features)).sum::<f64>()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl FraudClassifier for XgbTreeEnsemble {
    fn name(&self) -> &str {
        &self.name
    }

    fn expected_features(&self) -> Option<usize> {
        self.num_feature
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        if let Some(expected) = self.num_feature {
            if features.len() != expected {
                bail!(
                    "model {} expects {} features, got {}",
                    self.name,
                    expected,
                    features.len()
                );
            }
        }

        // logitraw models are served as probabilities too
        Ok(sigmoid(self.margin(features)))
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Numeric learner parameter; recent releases wrap vectors as "[5E-1]"
fn parse_param(raw: Option<&str>, field: &str) -> Result<Option<f64>, ModelLoadError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']').trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| ModelLoadError::Invalid(format!("{} '{}' is not a number", field, raw)))
}

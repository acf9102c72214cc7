//! Scoring with a pre-trained regression model.
//!
//! The model is an opaque capability behind [`RegressionModel`]. The bundled loader reads a
//! JSON export of either a regression-tree ensemble or a linear model, and refuses models whose
//! declared feature columns differ from [`FEATURE_COLUMNS`].

use std::path::Path;

use common::error::ConfigurationError;
use serde::Deserialize;

use crate::wallet_features::{FeatureRecord, FEATURE_COLUMNS};
use crate::wallet_scoring::{MAX_SCORE, MIN_SCORE};

/// Feature table without the wallet column, one row per wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn from_records(records: &[FeatureRecord]) -> Self {
        Self {
            columns: FEATURE_COLUMNS.iter().map(ToString::to_string).collect(),
            rows: records.iter().map(|r| r.feature_vector().to_vec()).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }
}

pub trait RegressionModel {
    /// Feature columns the model was trained on, in order.
    fn feature_names(&self) -> &[String];

    /// Raw prediction for one row laid out in `feature_names` order.
    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ConfigurationError> {
        check_columns(matrix.columns(), self.feature_names())?;
        Ok(matrix.rows().iter().map(|row| self.predict_row(row)).collect())
    }
}

fn check_columns<A, B>(expected: &[A], found: &[B]) -> Result<(), ConfigurationError>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let same = expected.len() == found.len()
        && expected
            .iter()
            .zip(found)
            .all(|(e, f)| e.as_ref() == f.as_ref());
    if same {
        Ok(())
    } else {
        Err(ConfigurationError::ModelColumnMismatch {
            expected: expected.iter().map(|c| c.as_ref().to_string()).collect(),
            found: found.iter().map(|c| c.as_ref().to_string()).collect(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ModelArtifact {
    RandomForest(ForestModel),
    Linear(LinearModel),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Children always sit after their parent, so walks terminate.
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {idx} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {idx} has a non-finite value"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Rows go left when `x <= threshold`.
    fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Averaging ensemble of regression trees.
#[derive(Debug, Clone, Deserialize)]
pub struct ForestModel {
    feature_names: Vec<String>,
    trees: Vec<RegressionTree>,
}

impl ForestModel {
    fn validate(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_names.len())
                .map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

impl RegressionModel for ForestModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[allow(clippy::cast_precision_loss)]
    fn predict_row(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        sum / self.trees.len() as f64
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    feature_names: Vec<String>,
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LinearModel {
    fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != self.feature_names.len() {
            return Err(format!(
                "{} coefficients for {} features",
                self.coefficients.len(),
                self.feature_names.len()
            ));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err("non-finite weights".to_string());
        }
        Ok(())
    }
}

impl RegressionModel for LinearModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }
}

pub fn parse_model(json: &str, source: &str) -> Result<Box<dyn RegressionModel>, ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidModel {
        path: source.to_string(),
        reason,
    };

    let artifact: ModelArtifact =
        serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
    let model: Box<dyn RegressionModel> = match artifact {
        ModelArtifact::RandomForest(m) => {
            m.validate().map_err(invalid)?;
            Box::new(m)
        }
        ModelArtifact::Linear(m) => {
            m.validate().map_err(invalid)?;
            Box::new(m)
        }
    };

    check_columns(&FEATURE_COLUMNS, model.feature_names())?;
    Ok(model)
}

pub fn load_model(path: &Path) -> Result<Box<dyn RegressionModel>, ConfigurationError> {
    let source = path.display().to_string();
    let json = std::fs::read_to_string(path).map_err(|e| ConfigurationError::InvalidModel {
        path: source.clone(),
        reason: e.to_string(),
    })?;
    let model = parse_model(&json, &source)?;
    tracing::info!(path = %source, "loaded scoring model");
    Ok(model)
}

/// Clamp to the score range and round to cents. Non-finite predictions score 0.
pub fn finalize_prediction(raw: f64) -> f64 {
    if !raw.is_finite() {
        return MIN_SCORE;
    }
    (raw.clamp(MIN_SCORE, MAX_SCORE) * 100.0).round() / 100.0
}

/// `(wallet, score)` pairs in feature-table order.
pub fn predict_scores(
    model: &dyn RegressionModel,
    records: &[FeatureRecord],
) -> Result<Vec<(String, f64)>, ConfigurationError> {
    let predictions = model.predict(&FeatureMatrix::from_records(records))?;
    Ok(records
        .iter()
        .zip(predictions)
        .map(|(r, p)| (r.wallet.clone(), finalize_prediction(p)))
        .collect())
}

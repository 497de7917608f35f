//! Single-transaction scoring

use crate::http::{ApiResult, AppState};
use crate::types::{RiskTier, TransactionInput};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub is_fraud: bool,
    pub probability: f64,
    pub details: PredictDetails,
}

#[derive(Debug, Serialize)]
pub struct PredictDetails {
    pub investigation_priority: RiskTier,
    pub recommendation: String,
    pub model: String,
    /// As submitted, or the default it was scored with
    pub payment_method: String,
    pub amount: f64,
    /// When the score was produced
    pub timestamp: DateTime<Utc>,
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<TransactionInput>, JsonRejection>,
) -> ApiResult<Json<PredictResponse>> {
    let Json(input) = payload?;
    let score = state.service.score_one(&input)?;

    tracing::info!(
        amount = ?input.amount,
        payment_method = ?input.payment_method,
        probability = score.probability,
        tier = %score.risk_tier,
        "Prediction served"
    );

    Ok(Json(PredictResponse {
        is_fraud: score.is_fraud,
        probability: score.probability,
        details: PredictDetails {
            investigation_priority: score.risk_tier,
            recommendation: score.recommendation,
            model: state.service.model_name().to_string(),
            payment_method: input
                .payment_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| state.service.preparer().defaults().payment_method.clone()),
            amount: input.amount.unwrap_or_default(),
            timestamp: Utc::now(),
        },
    }))
}

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    AppState,
    services::quote::{Pair, PriceQuote},
};

#[derive(Deserialize)]
pub struct LtpQuery {
    /// Comma-separated pairs; absent or empty means every configured pair
    #[serde(default, deserialize_with = "crate::utils::serde::comma_separated_pairs")]
    pub pairs: Option<Vec<Pair>>,
}

#[derive(Serialize, Debug)]
pub struct LtpMeta {
    pub count: usize,
}

#[derive(Serialize, Debug)]
pub struct LtpResponse {
    pub data: Vec<PriceQuote>,
    pub meta: LtpMeta,
}

pub async fn get_ltp(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LtpQuery>,
) -> Result<Json<LtpResponse>, (StatusCode, Json<Value>)> {
    let quotes = match params.pairs.filter(|pairs| !pairs.is_empty()) {
        Some(pairs) => state.ltp_service.get_ltps(&pairs).await,
        None => state.ltp_service.get_all_ltps().await,
    };

    if quotes.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Requested pairs not found",
                "code": "NOT_FOUND"
            })),
        ));
    }

    Ok(Json(LtpResponse {
        meta: LtpMeta {
            count: quotes.len(),
        },
        data: quotes,
    }))
}

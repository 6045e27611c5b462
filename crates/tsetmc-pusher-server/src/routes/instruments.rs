//! Instrument snapshot routes

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use tsetmc_pusher::{ISIN_LENGTH, Instrument};

use crate::{
    AppState,
    error::{ApiError, Result as ApiResult},
};

pub fn router() -> Router<AppState> {
    Router::new().route("/{isin}", get(get_instrument))
}

/// Current realtime state of a single instrument
pub async fn get_instrument(
    State(state): State<AppState>,
    Path(isin): Path<String>,
) -> ApiResult<Json<Instrument>> {
    if isin.chars().count() != ISIN_LENGTH {
        return Err(ApiError::bad_request(&format!("Isin [{}] is not acceptable", isin)));
    }

    state
        .repository
        .get_instrument(&isin)?
        .map(Json)
        .ok_or_else(|| ApiError::instrument_not_found(&isin))
}

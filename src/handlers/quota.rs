use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::db::visitors;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum QuotaResponse {
    User { remaining: i64, unlimited: bool },
    Guest { remaining: i64, limit: i64 },
}

pub(crate) async fn quota(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<QuotaResponse>, AppError> {
    // A stale or forged token just means the caller is treated as a guest.
    match state.identify(&headers) {
        Ok(Some(_)) => {
            return Ok(Json(QuotaResponse::User {
                remaining: -1,
                unlimited: true,
            }))
        }
        Ok(None) => {}
        Err(_) => debug!("quota lookup with invalid token, treating as guest"),
    }

    let ip = state.client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let limit = state.settings.guest_daily_limit;
    let window = visitors::window(&state.db, &ip, now).await?;

    Ok(Json(QuotaResponse::Guest {
        remaining: window.remaining(limit),
        limit,
    }))
}

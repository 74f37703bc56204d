use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::http::HeaderMap;
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};

use crate::archive::OutputStore;
use crate::config::AppConfig;
use crate::converter::Converters;
use crate::error::AppError;
use crate::token::{bearer_token, Claims, TokenSigner};
use crate::util::client_ip;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) db: SqlitePool,
    pub(crate) signer: Arc<TokenSigner>,
    pub(crate) converters: Arc<Converters>,
    pub(crate) outputs: OutputStore,
    pub(crate) settings: Arc<Settings>,
}

/// Request-time knobs taken from the configuration.
pub(crate) struct Settings {
    pub(crate) temp_dir: std::path::PathBuf,
    pub(crate) guest_daily_limit: i64,
    pub(crate) trust_proxy_headers: bool,
    pub(crate) allowed_origins: Vec<String>,
    pub(crate) client_build_dir: Option<std::path::PathBuf>,
}

impl AppState {
    pub(crate) fn new(config: &AppConfig, db: SqlitePool) -> Self {
        Self {
            db,
            signer: Arc::new(TokenSigner::new(
                config.jwt_secret.clone().into_bytes(),
                Duration::hours(config.token_ttl_hours),
            )),
            converters: Arc::new(Converters {
                python: config.python_bin.clone(),
                batch_script: config.converter_script.clone(),
                youtube_script: config.youtube_script.clone(),
                process_timeout: config.process_timeout,
            }),
            outputs: OutputStore::new(config.outputs_dir()),
            settings: Arc::new(Settings {
                temp_dir: config.temp_dir(),
                guest_daily_limit: config.guest_daily_limit,
                trust_proxy_headers: config.trust_proxy_headers,
                allowed_origins: config.allowed_origins.clone(),
                client_build_dir: config.client_build_dir.clone(),
            }),
        }
    }

    /// `Ok(None)` for anonymous requests; an `Authorization` header that
    /// does not verify is rejected.
    pub(crate) fn identify(&self, headers: &HeaderMap) -> Result<Option<Claims>, AppError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };
        self.signer
            .verify(token, OffsetDateTime::now_utc())
            .map(Some)
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
    }

    pub(crate) fn require_user(&self, headers: &HeaderMap) -> Result<Claims, AppError> {
        self.identify(headers)?
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }

    pub(crate) fn require_admin(&self, headers: &HeaderMap) -> Result<Claims, AppError> {
        let claims = self.require_user(headers)?;
        if !claims.is_admin {
            return Err(AppError::Forbidden("Admin access required".to_string()));
        }
        Ok(claims)
    }

    pub(crate) fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        client_ip(headers, peer, self.settings.trust_proxy_headers)
            .as_ref()
            .map(IpAddr::to_string)
            .unwrap_or_else(|| "unknown".to_string())
    }
}

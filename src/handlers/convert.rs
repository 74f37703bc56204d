use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::archive::Published;
use crate::constants::{MAX_FILES_PER_BATCH, MAX_FILE_BYTES};
use crate::converter::{
    is_youtube_url, list_files, output_extension, write_multipart_field_to_file, Batch,
};
use crate::db::{users, visitors};
use crate::error::AppError;
use crate::state::AppState;
use crate::token::Claims;
use crate::util::{dotted_extension, sanitize_file_stem};

use super::json_body;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConvertResponse {
    pub(crate) download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) direct_download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) file_type: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct YoutubeRequest {
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) quality: Option<String>,
}

/// Who a conversion is billed to.
enum Requester {
    User(Claims),
    Guest(String),
}

impl Requester {
    fn resolve(
        state: &AppState,
        headers: &HeaderMap,
        peer: Option<ConnectInfo<SocketAddr>>,
    ) -> Result<Self, AppError> {
        match state.identify(headers)? {
            Some(claims) => Ok(Requester::User(claims)),
            None => Ok(Requester::Guest(
                state.client_ip(headers, peer.map(|ConnectInfo(addr)| addr)),
            )),
        }
    }

    /// Like `resolve`, but a token that fails to verify is billed as a guest.
    fn resolve_or_guest(
        state: &AppState,
        headers: &HeaderMap,
        peer: Option<ConnectInfo<SocketAddr>>,
    ) -> Self {
        match Self::resolve(state, headers, peer) {
            Ok(requester) => requester,
            Err(_) => {
                warn!("invalid token on youtube download, continuing as guest");
                Requester::Guest(state.client_ip(headers, peer.map(|ConnectInfo(addr)| addr)))
            }
        }
    }

    /// Rejects guests whose daily window is used up, before any work starts.
    async fn check_quota(&self, state: &AppState) -> Result<(), AppError> {
        let Requester::Guest(ip) = self else {
            return Ok(());
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let window = visitors::window(&state.db, ip, now).await?;
        if window.is_exhausted(state.settings.guest_daily_limit) {
            info!(ip = %ip, "guest quota exhausted");
            return Err(AppError::QuotaExceeded);
        }
        Ok(())
    }

    /// Records a finished conversion. Fails only if a concurrent request
    /// used up the guest's last conversion first.
    async fn charge(&self, state: &AppState) -> Result<(), AppError> {
        match self {
            Requester::User(claims) => {
                users::increment_converted(&state.db, &claims.id).await?;
            }
            Requester::Guest(ip) => {
                let now = OffsetDateTime::now_utc().unix_timestamp();
                let window = visitors::charge(&state.db, ip, now).await?;
                if window.count > state.settings.guest_daily_limit {
                    return Err(AppError::QuotaExceeded);
                }
            }
        }
        Ok(())
    }

    fn label(&self) -> String {
        match self {
            Requester::User(claims) => format!("user:{}", claims.id),
            Requester::Guest(ip) => format!("guest:{ip}"),
        }
    }
}

pub(crate) async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ConvertResponse>, AppError> {
    let requester = Requester::resolve(&state, &headers, peer)?;
    requester.check_quota(&state).await?;

    let mut multipart = multipart.map_err(|e| {
        error!(error = %e, "multipart parse failed");
        AppError::BadRequest("Error parsing multipart/form-data request".to_string())
    })?;

    let batch = Batch::create(&state.settings.temp_dir).await?;
    let input_dir = batch.input_dir();
    // Stored input stem -> sanitized original stem.
    let mut display_stems: HashMap<String, String> = HashMap::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name != "images" && name != "files" {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let ext = dotted_extension(&file_name);
        if output_extension(&ext).is_none() {
            return Err(AppError::BadRequest(format!(
                "Unsupported file type: {file_name}"
            )));
        }
        if display_stems.len() >= MAX_FILES_PER_BATCH {
            return Err(AppError::BadRequest(format!(
                "Too many files (max {MAX_FILES_PER_BATCH})"
            )));
        }

        let stored_stem = uuid::Uuid::new_v4().to_string();
        let path = input_dir.join(format!("{stored_stem}{ext}"));
        let written = write_multipart_field_to_file(&mut field, &path).await?;
        if written > MAX_FILE_BYTES {
            return Err(AppError::BadRequest(format!(
                "{file_name} is too large (max {} MB)",
                MAX_FILE_BYTES / 1024 / 1024
            )));
        }
        if written == 0 {
            return Err(AppError::BadRequest(format!("{file_name} is empty")));
        }

        display_stems.insert(stored_stem, sanitize_file_stem(&file_name));
    }

    if display_stems.is_empty() {
        return Err(AppError::BadRequest("No files uploaded.".to_string()));
    }

    info!(
        batch = %batch.id(),
        files = display_stems.len(),
        requester = %requester.label(),
        "starting conversion"
    );

    let output_dir = batch.output_dir();
    if let Err(e) = state.converters.run_batch(&input_dir, &output_dir).await {
        error!(batch = %batch.id(), error = ?e, "conversion failed");
        return Err(AppError::ProcessingFailed("Conversion failed.".to_string()));
    }

    restore_display_names(&output_dir, &display_stems).await?;
    let outputs = list_files(&output_dir).await?;
    if outputs.is_empty() {
        return Err(AppError::ProcessingFailed("No files converted.".to_string()));
    }

    let direct = if outputs.len() == 1 {
        Some(outputs[0].as_path())
    } else {
        None
    };
    let response = publish_and_charge(&state, &requester, &output_dir, direct).await?;
    info!(batch = %batch.id(), outputs = outputs.len(), "conversion finished");
    Ok(Json(response))
}

pub(crate) async fn youtube(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<YoutubeRequest>, JsonRejection>,
) -> Result<Json<ConvertResponse>, AppError> {
    let req = json_body(body)?;
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| AppError::BadRequest("No YouTube URL provided.".to_string()))?;
    if !is_youtube_url(url) {
        return Err(AppError::BadRequest("Invalid YouTube URL.".to_string()));
    }

    let requester = Requester::resolve_or_guest(&state, &headers, peer);
    requester.check_quota(&state).await?;

    let batch = Batch::create(&state.settings.temp_dir).await?;
    let output_dir = batch.output_dir();
    info!(
        batch = %batch.id(),
        quality = req.quality.as_deref().unwrap_or("best"),
        requester = %requester.label(),
        "starting youtube download"
    );

    if let Err(e) = state.converters.run_youtube(url, &output_dir).await {
        error!(batch = %batch.id(), error = ?e, "youtube download failed");
        return Err(AppError::ProcessingFailed(
            "Failed to download video.".to_string(),
        ));
    }

    let outputs = list_files(&output_dir).await?;
    let Some(first) = outputs.first() else {
        return Err(AppError::ProcessingFailed("No files downloaded.".to_string()));
    };

    let response = publish_and_charge(&state, &requester, &output_dir, Some(first.as_path())).await?;
    info!(batch = %batch.id(), "youtube download finished");
    Ok(Json(response))
}

/// Publishes the zip (and optionally one direct file), then bills the
/// requester. Published files are withdrawn if billing fails.
async fn publish_and_charge(
    state: &AppState,
    requester: &Requester,
    output_dir: &Path,
    direct: Option<&Path>,
) -> Result<ConvertResponse, AppError> {
    state.outputs.ensure_dir().await?;
    let zip = state.outputs.publish_zip(output_dir).await?;

    let mut published: Vec<Published> = vec![zip.clone()];
    let mut response = ConvertResponse {
        download_url: zip.url,
        direct_download_url: None,
        file_name: None,
        file_type: None,
    };

    if let Some(path) = direct {
        match state.outputs.publish_file(path).await {
            Ok(file) => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                response.file_type = Some(dotted_extension(&file_name));
                response.file_name = Some(file_name);
                response.direct_download_url = Some(file.url.clone());
                published.push(file);
            }
            Err(e) => {
                withdraw(state, &published).await;
                return Err(e);
            }
        }
    }

    if let Err(e) = requester.charge(state).await {
        withdraw(state, &published).await;
        return Err(e);
    }
    Ok(response)
}

async fn withdraw(state: &AppState, published: &[Published]) {
    for p in published {
        state.outputs.remove(p).await;
    }
}

/// Renames converter outputs from stored stems back to the uploader's file
/// names. A clash with an earlier result or any file already in the
/// directory gets a numeric suffix, so no output is ever replaced.
async fn restore_display_names(
    output_dir: &Path,
    display_stems: &HashMap<String, String>,
) -> Result<(), AppError> {
    let mut taken: HashSet<String> = HashSet::new();
    for path in list_files(output_dir).await? {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(display) = display_stems.get(stem) else {
            continue;
        };
        let ext = dotted_extension(&path.to_string_lossy());

        let mut n = 1;
        let target: PathBuf = loop {
            let candidate = if n == 1 {
                format!("{display}{ext}")
            } else {
                format!("{display} ({n}){ext}")
            };
            let candidate_path = output_dir.join(&candidate);
            if !taken.contains(&candidate.to_ascii_lowercase())
                && !tokio::fs::try_exists(&candidate_path).await?
            {
                taken.insert(candidate.to_ascii_lowercase());
                break candidate_path;
            }
            n += 1;
        };

        if let Err(e) = tokio::fs::rename(&path, &target).await {
            warn!(error = %e, from = %path.display(), "could not restore output name");
        }
    }
    Ok(())
}

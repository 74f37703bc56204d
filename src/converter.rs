use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use axum::extract::multipart::Field;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::MAX_FILE_BYTES;
use crate::error::AppError;

const RAW_EXTS: [&str; 9] = [
    ".cr2", ".nef", ".arw", ".dng", ".orf", ".raw", ".rw2", ".raf", ".sr2",
];

/// Extension the batch script produces for a given input extension, or
/// `None` if the script would skip the file.
pub(crate) fn output_extension(input_ext: &str) -> Option<&'static str> {
    match input_ext {
        ".jpg" | ".jpeg" => Some(".png"),
        ".png" | ".heic" | ".heif" => Some(".jpg"),
        ".mp4" => Some(".mp3"),
        ext if RAW_EXTS.contains(&ext) => Some(".jpg"),
        _ => None,
    }
}

/// Scratch space for one upload: `in/` receives the uploads, `out/` the
/// converter results. Everything is removed when the batch is dropped.
pub(crate) struct Batch {
    root: TempDir,
}

impl Batch {
    pub(crate) async fn create(temp_base: &Path) -> Result<Self, AppError> {
        tokio::fs::create_dir_all(temp_base).await?;
        let root = tempfile::Builder::new()
            .prefix("batch_")
            .tempdir_in(temp_base)?;
        tokio::fs::create_dir(root.path().join("in")).await?;
        tokio::fs::create_dir(root.path().join("out")).await?;
        Ok(Self { root })
    }

    pub(crate) fn input_dir(&self) -> PathBuf {
        self.root.path().join("in")
    }

    pub(crate) fn output_dir(&self) -> PathBuf {
        self.root.path().join("out")
    }

    pub(crate) fn id(&self) -> String {
        self.root
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub(crate) async fn write_multipart_field_to_file(
    field: &mut Field<'_>,
    path: &Path,
) -> Result<usize, AppError> {
    let mut out = tokio::fs::File::create(path).await?;

    let mut written: usize = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        written = written.saturating_add(chunk.len());
        if written > MAX_FILE_BYTES {
            return Ok(written);
        }
        out.write_all(&chunk).await?;
    }
    out.flush().await?;
    Ok(written)
}

/// Regular files directly inside `dir`, sorted by name.
pub(crate) async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn is_youtube_url(raw: &str) -> bool {
    let raw = raw.trim();
    let rest = match raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
    {
        Some(rest) => rest,
        None => return false,
    };
    let host = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .split(':')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    let has_path = rest.len() > host.len() + 1;

    match host.as_str() {
        "youtu.be" => has_path,
        "youtube.com" | "www.youtube.com" | "m.youtube.com" | "music.youtube.com" => has_path,
        _ => false,
    }
}

/// The external programs that do the real work.
#[derive(Debug, Clone)]
pub(crate) struct Converters {
    pub(crate) python: String,
    pub(crate) batch_script: PathBuf,
    pub(crate) youtube_script: PathBuf,
    pub(crate) process_timeout: Duration,
}

impl Converters {
    pub(crate) async fn run_batch(&self, input_dir: &Path, output_dir: &Path) -> Result<(), AppError> {
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.batch_script).arg(input_dir).arg(output_dir);

        info!(script = %self.batch_script.display(), "starting batch converter");
        let output = output_with_timeout(cmd, self.process_timeout, "batch converter").await?;
        log_process_output("batch converter", &output);

        if !output.status.success() {
            return Err(AppError::Internal(format!(
                "batch converter exited with {}",
                output.status
            )));
        }
        Ok(())
    }

    pub(crate) async fn run_youtube(&self, url: &str, output_dir: &Path) -> Result<(), AppError> {
        let mut cmd = Command::new(&self.python);
        cmd.arg(&self.youtube_script).arg(url).arg(output_dir);

        info!(url, "starting youtube downloader");
        let output = output_with_timeout(cmd, self.process_timeout, "youtube downloader").await?;
        log_process_output("youtube downloader", &output);

        if !output.status.success() {
            return Err(AppError::Internal(format!(
                "youtube downloader exited with {}",
                output.status
            )));
        }
        Ok(())
    }
}

fn log_process_output(what: &str, output: &Output) {
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!(process = what, "{line}");
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        warn!(process = what, "{line}");
    }
}

async fn output_with_timeout(
    mut cmd: Command,
    process_timeout: Duration,
    what: &str,
) -> Result<Output, AppError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let child = cmd
        .spawn()
        .map_err(|e| AppError::Internal(format!("Failed to start {what}: {e}")))?;

    match timeout(process_timeout, child.wait_with_output()).await {
        Ok(output) => output.map_err(|e| AppError::Internal(format!("{what} failed: {e}"))),
        Err(_) => Err(AppError::Internal(format!(
            "{what} timed out after {}s",
            process_timeout.as_secs()
        ))),
    }
}

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::AppError;
use crate::shutdown::Shutdown;

/// Writes every regular file at the top of `src` into a flat zip at `dest`.
pub(crate) fn zip_directory(src: &Path, dest: &Path) -> Result<usize, AppError> {
    let mut names: Vec<PathBuf> = std::fs::read_dir(src)?
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    names.sort();

    let out = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &names {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        zip.start_file(name, options)
            .map_err(|e| AppError::Internal(format!("zip entry {name}: {e}")))?;
        let mut f = File::open(path)?;
        std::io::copy(&mut f, &mut zip)?;
    }

    let mut out = zip
        .finish()
        .map_err(|e| AppError::Internal(format!("zip finalize: {e}")))?;
    out.flush()?;
    Ok(names.len())
}

/// A file made available under `/outputs/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Published {
    pub(crate) file_name: String,
    pub(crate) url: String,
}

/// Directory of converted results served for download.
#[derive(Debug, Clone)]
pub(crate) struct OutputStore {
    dir: PathBuf,
}

impl OutputStore {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) async fn ensure_dir(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn entry(&self, ext: &str) -> (PathBuf, Published) {
        let file_name = format!("{}{ext}", uuid::Uuid::new_v4());
        let path = self.dir.join(&file_name);
        let url = format!("/outputs/{file_name}");
        (path, Published { file_name, url })
    }

    /// Zips the results in `src` into a new `<uuid>.zip`.
    pub(crate) async fn publish_zip(&self, src: &Path) -> Result<Published, AppError> {
        let (path, published) = self.entry(".zip");
        let src = src.to_path_buf();
        let dest = path.clone();
        let zipped = tokio::task::spawn_blocking(move || zip_directory(&src, &dest))
            .await
            .map_err(|e| AppError::Internal(format!("zip task failed: {e}")))?;
        if let Err(e) = zipped {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        Ok(published)
    }

    /// Copies one result file out as `<uuid><ext>` for direct download.
    pub(crate) async fn publish_file(&self, src: &Path) -> Result<Published, AppError> {
        let ext = crate::util::dotted_extension(&src.to_string_lossy());
        let (path, published) = self.entry(&ext);
        tokio::fs::copy(src, &path).await?;
        Ok(published)
    }

    pub(crate) async fn remove(&self, published: &Published) {
        if let Err(e) = tokio::fs::remove_file(self.dir.join(&published.file_name)).await {
            warn!(error = %e, file = %published.file_name, "failed to remove published output");
        }
    }

    /// Deletes published files last modified more than `max_age` ago.
    pub(crate) async fn sweep_expired(&self, max_age: Duration) -> Result<usize, AppError> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age > max_age {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "swept expired outputs");
        }
        Ok(removed)
    }

    /// Sweeps every `every` until shutdown is requested.
    pub(crate) async fn run_sweeper(
        self,
        max_age: Duration,
        every: Duration,
        mut shutdown: Shutdown,
    ) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_expired(max_age).await {
                        error!(error = ?e, "output sweep failed");
                    }
                }
                _ = shutdown.requested() => break,
            }
        }
        info!("output sweeper stopped");
    }
}

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::info;

pub async fn ensure_directories(dirs: &[&Path]) -> Result<()> {
    for dir in dirs {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
            info!("created directory: {}", dir.display());
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

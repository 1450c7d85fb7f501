use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Joins video files, in the given order, into one output file.
#[async_trait]
pub trait Concatenator: Send + Sync {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

pub fn episode_stem(title: &str, index: usize) -> String {
    format!("{title}_episode_{index}")
}

pub fn episode_file(dir: &Path, title: &str, index: usize) -> PathBuf {
    dir.join(format!("{}.mp4", episode_stem(title, index)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineReport {
    pub output: PathBuf,
    pub included: Vec<usize>,
    pub missing: Vec<usize>,
}

/// Concatenates `{title}_episode_{i}.mp4` for `i` in `0..count`.
///
/// Missing episodes are logged and left out; the remaining clips are still
/// joined in index order. Fails only when no episode file exists at all.
pub async fn combine_episodes(
    concat: &dyn Concatenator,
    dir: &Path,
    title: &str,
    count: usize,
    output: &Path,
) -> Result<CombineReport> {
    let mut inputs = Vec::new();
    let mut included = Vec::new();
    let mut missing = Vec::new();

    for index in 0..count {
        let path = episode_file(dir, title, index);
        let exists = fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false);
        if exists {
            inputs.push(path);
            included.push(index);
        } else {
            warn!("episode {} missing at {}, skipping", index, path.display());
            missing.push(index);
        }
    }

    if inputs.is_empty() {
        anyhow::bail!("no episode files for {} in {}", title, dir.display());
    }

    info!(
        "combining {} of {} episodes into {}",
        inputs.len(),
        count,
        output.display()
    );
    concat
        .concat(&inputs, output)
        .await
        .with_context(|| format!("Failed to combine episodes into {}", output.display()))?;

    Ok(CombineReport {
        output: output.to_path_buf(),
        included,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Writes the input file names, one per line, as the "video".
    #[derive(Default)]
    struct RecordingConcat {
        calls: Mutex<Vec<Vec<PathBuf>>>,
    }

    #[async_trait]
    impl Concatenator for RecordingConcat {
        async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(inputs.to_vec());
            let mut joined = Vec::new();
            for input in inputs {
                joined.extend(fs::read(input).await?);
            }
            fs::write(output, joined).await?;
            Ok(())
        }
    }

    async fn write_episodes(dir: &Path, title: &str, indices: &[usize]) {
        for i in indices {
            fs::write(episode_file(dir, title, *i), format!("[{i}]")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn missing_episode_leaves_a_gap() {
        let dir = tempfile::tempdir().unwrap();
        write_episodes(dir.path(), "Ethereum", &[0, 1, 3, 4]).await;
        let out = dir.path().join("Ethereum_full.mp4");
        let concat = RecordingConcat::default();

        let report = combine_episodes(&concat, dir.path(), "Ethereum", 5, &out)
            .await
            .unwrap();

        assert_eq!(report.included, vec![0, 1, 3, 4]);
        assert_eq!(report.missing, vec![2]);
        assert_eq!(fs::read_to_string(&out).await.unwrap(), "[0][1][3][4]");
        assert_eq!(concat.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn order_follows_index_not_directory_listing() {
        let dir = tempfile::tempdir().unwrap();
        write_episodes(dir.path(), "T", &[2, 0, 1]).await;
        let concat = RecordingConcat::default();

        combine_episodes(&concat, dir.path(), "T", 3, &dir.path().join("out.mp4"))
            .await
            .unwrap();

        let calls = concat.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                episode_file(dir.path(), "T", 0),
                episode_file(dir.path(), "T", 1),
                episode_file(dir.path(), "T", 2),
            ]
        );
    }

    #[tokio::test]
    async fn nothing_to_combine_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let concat = RecordingConcat::default();
        let err = combine_episodes(&concat, dir.path(), "T", 3, &dir.path().join("out.mp4")).await;
        assert!(err.is_err());
        assert!(concat.calls.lock().unwrap().is_empty());
    }
}

use crate::combine::Concatenator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

/// Body of an ffmpeg concat-demuxer list file.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    let mut out = String::new();
    for path in inputs {
        // Single quotes inside a quoted entry are written as '\''.
        let escaped = path.display().to_string().replace('\'', r"'\''");
        out.push_str(&format!("file '{}'\n", escaped));
    }
    out
}

/// List body with every entry made absolute. The demuxer resolves relative
/// entries against the list file's directory, not the working directory.
pub fn absolute_concat_list(inputs: &[PathBuf]) -> Result<String> {
    let absolute = inputs
        .iter()
        .map(|p| std::path::absolute(p).with_context(|| format!("Failed to resolve {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    Ok(concat_list(&absolute))
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Joins clips with the ffmpeg concat demuxer, re-encoding to H.264/AAC.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegConcat;

#[async_trait]
impl Concatenator for FfmpegConcat {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut list = tempfile::Builder::new()
            .prefix("concat_")
            .suffix(".txt")
            .tempfile()
            .context("Failed to create concat list")?;
        list.write_all(absolute_concat_list(inputs)?.as_bytes())
            .context("Failed to write concat list")?;
        list.flush()?;

        if !ffmpeg_concat_videos(list.path(), output).await? {
            anyhow::bail!("ffmpeg reported success but {} is missing", output.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_quotes_every_entry() {
        let list = concat_list(&[
            PathBuf::from("/out/Ethereum_episode_0.mp4"),
            PathBuf::from("/out/Vitalik's_episode_1.mp4"),
        ]);
        assert_eq!(
            list,
            "file '/out/Ethereum_episode_0.mp4'\nfile '/out/Vitalik'\\''s_episode_1.mp4'\n"
        );
    }

    #[test]
    fn relative_inputs_are_listed_from_the_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        let list = absolute_concat_list(&[
            PathBuf::from("output/Ethereum/videos/Ethereum_episode_0.mp4"),
            PathBuf::from("/abs/Ethereum_episode_1.mp4"),
        ])
        .unwrap();

        let expected = cwd.join("output/Ethereum/videos/Ethereum_episode_0.mp4");
        assert_eq!(
            list,
            format!(
                "file '{}'\nfile '/abs/Ethereum_episode_1.mp4'\n",
                expected.display()
            )
        );
        for line in list.lines() {
            let entry = line.trim_start_matches("file '").trim_end_matches('\'');
            assert!(Path::new(entry).is_absolute(), "{entry}");
        }
    }
}

//! Splitting one generated script into per-episode prompts.
//!
//! Episodes are introduced by a header of the form `Episode <n>:`. Anything
//! before the first header is preamble and ignored.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::{CaptureMatches, Regex};
use std::iter::Peekable;

static EPISODE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Episode\s+(\d+)\s*:").expect("episode header pattern"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    /// Position in the script, starting at 0. Decides concatenation order.
    pub index: usize,
    /// Number as written in the header; `None` if it does not fit a `u32`.
    pub number: Option<u32>,
    pub prompt: String,
}

impl Episode {
    /// Whether the header number agrees with the episode's position.
    pub fn header_matches_position(&self) -> bool {
        self.number.and_then(|n| usize::try_from(n).ok()) == Some(self.index)
    }
}

/// A script that can be walked episode by episode any number of times.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeScript<'a> {
    text: &'a str,
}

impl<'a> EpisodeScript<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text }
    }

    pub fn iter(&self) -> EpisodeIter<'a> {
        EpisodeIter {
            text: self.text,
            headers: EPISODE_HEADER.captures_iter(self.text).peekable(),
            index: 0,
        }
    }
}

impl<'a> IntoIterator for EpisodeScript<'a> {
    type Item = (usize, &'a str);
    type IntoIter = EpisodeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Yields `(index, text)` pairs lazily, one header at a time.
pub struct EpisodeIter<'a> {
    text: &'a str,
    headers: Peekable<CaptureMatches<'static, 'a>>,
    index: usize,
}

impl<'a> EpisodeIter<'a> {
    /// Like `next`, but also returns the number written in the header.
    fn next_numbered(&mut self) -> Option<(usize, Option<u32>, &'a str)> {
        let caps = self.headers.next()?;
        let header = caps.get(0)?;
        let number = caps[1].parse().ok();
        let end = self
            .headers
            .peek()
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(self.text.len());

        let text: &'a str = self.text;
        let index = self.index;
        self.index += 1;
        Some((index, number, text[header.end()..end].trim()))
    }
}

impl<'a> Iterator for EpisodeIter<'a> {
    type Item = (usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_numbered().map(|(index, _, text)| (index, text))
    }
}

fn header_label(number: Option<u32>) -> String {
    number.map_or_else(|| "out of range".to_string(), |n| n.to_string())
}

/// Splits `text` into exactly `expected` episodes or fails as a whole.
pub fn split(text: &str, expected: usize) -> Result<Vec<Episode>> {
    let mut iter = EpisodeScript::new(text).iter();
    let mut episodes = Vec::new();
    while let Some((index, number, prompt)) = iter.next_numbered() {
        let episode = Episode {
            index,
            number,
            prompt: prompt.to_string(),
        };
        if !episode.header_matches_position() {
            tracing::warn!(
                index,
                header = %header_label(number),
                "episode header number differs from its position, ordering by position"
            );
        }
        episodes.push(episode);
    }

    if episodes.len() != expected {
        tracing::error!(
            expected,
            found = episodes.len(),
            "episode count does not match the requested number"
        );
        return Err(Error::SplitMismatch {
            expected,
            found: episodes.len(),
        });
    }
    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "Here is your mini-series.\n\n\
        Episode 0: The genesis block is mined in a quiet room.\n\n\
        Episode 1: Developers gather in Zug.\n\
        A whiteboard fills with diagrams.\n\n\
        Episode 2:\nThe network goes live at dawn.\n";

    #[test]
    fn splits_in_header_order() {
        let episodes = split(SCRIPT, 3).unwrap();
        assert_eq!(episodes.len(), 3);
        assert_eq!(episodes[0].prompt, "The genesis block is mined in a quiet room.");
        assert_eq!(
            episodes[1].prompt,
            "Developers gather in Zug.\nA whiteboard fills with diagrams."
        );
        assert_eq!(episodes[2].prompt, "The network goes live at dawn.");
        assert_eq!(
            episodes.iter().map(|e| (e.index, e.number)).collect::<Vec<_>>(),
            vec![(0, Some(0)), (1, Some(1)), (2, Some(2))]
        );
    }

    #[test]
    fn count_mismatch_rejects_everything() {
        assert!(matches!(
            split(SCRIPT, 4),
            Err(Error::SplitMismatch { expected: 4, found: 3 })
        ));
        assert!(matches!(
            split(SCRIPT, 2),
            Err(Error::SplitMismatch { expected: 2, found: 3 })
        ));
        assert!(matches!(
            split("no headers at all", 1),
            Err(Error::SplitMismatch { expected: 1, found: 0 })
        ));
    }

    #[test]
    fn iteration_is_restartable() {
        let script = EpisodeScript::new(SCRIPT);
        let first: Vec<_> = script.iter().collect();
        let second: Vec<_> = script.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first[2], (2, "The network goes live at dawn."));
    }

    #[test]
    fn iteration_is_lazy() {
        let mut iter = EpisodeScript::new(SCRIPT).iter();
        assert_eq!(iter.next().map(|(i, _)| i), Some(0));
        assert_eq!(iter.next().map(|(i, _)| i), Some(1));
    }

    #[test]
    fn header_needs_number_and_colon() {
        let text = "Episode one: nope\nEpisode 0 - nope\nEpisode 0: yes";
        let episodes = split(text, 1).unwrap();
        assert_eq!(episodes[0].prompt, "yes");
    }

    #[test]
    fn misnumbered_headers_keep_position_order() {
        let text = "Episode 0: dawn
Episode 0: noon
Episode 7: dusk
Episode 99999999999: night";
        let episodes = split(text, 4).unwrap();

        assert_eq!(
            episodes.iter().map(|e| (e.index, e.number)).collect::<Vec<_>>(),
            vec![(0, Some(0)), (1, Some(0)), (2, Some(7)), (3, None)]
        );
        assert_eq!(
            episodes.iter().map(Episode::header_matches_position).collect::<Vec<_>>(),
            vec![true, false, false, false]
        );
        assert_eq!(episodes[3].prompt, "night");
    }
}

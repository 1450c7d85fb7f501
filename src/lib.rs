pub mod api;
pub mod batch;
pub mod combine;
pub mod config;
pub mod episodes;
pub mod error;
pub mod ffmpeg;
pub mod generator;
pub mod init;
pub mod page;
pub mod prompt;
pub mod video;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};

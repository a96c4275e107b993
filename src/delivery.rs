//! # Response Delivery Module
//!
//! Turns a finished answer into messages that each fit the platform limit.
//! Lengths are measured in characters, which is how chat platforms count them.
//!
//! - Text within the limit is sent as-is (`Direct`)
//! - `Split` breaks on line boundaries, keeps fenced code blocks whole where they
//!   fit, and only cuts inside a line when the line alone is too long
//! - `Compress` asks a [`Compressor`] for a shorter version; anything still too
//!   long is split, and a failed compression splits the original
//!
//! No plan ever contains a chunk longer than the limit.

mod split;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

pub use split::split;

/// How an oversized answer should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStrategy {
    Direct,
    Compress,
    #[default]
    Split,
}

impl fmt::Display for DeliveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeliveryStrategy::Direct => "direct",
            DeliveryStrategy::Compress => "compress",
            DeliveryStrategy::Split => "split",
        })
    }
}

impl FromStr for DeliveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(DeliveryStrategy::Direct),
            "compress" => Ok(DeliveryStrategy::Compress),
            "split" => Ok(DeliveryStrategy::Split),
            other => Err(format!("unknown delivery strategy: {}", other)),
        }
    }
}

/// The messages to send for one answer, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryPlan {
    /// Strategy actually applied
    pub strategy: DeliveryStrategy,
    pub chunks: Vec<String>,
    /// Whether the chunks come from a compressed rewrite
    pub compressed: bool,
}

impl DeliveryPlan {
    fn direct(text: &str) -> Self {
        Self {
            strategy: DeliveryStrategy::Direct,
            chunks: vec![text.to_string()],
            compressed: false,
        }
    }

    fn split(text: &str, max_chunk_length: usize, compressed: bool) -> Self {
        Self {
            strategy: DeliveryStrategy::Split,
            chunks: split(text, max_chunk_length),
            compressed,
        }
    }
}

/// Produces a shorter rewrite of a text
pub trait Compressor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Rewrite `text` to at most `max_chars` characters
    fn compress(
        &self,
        text: &str,
        max_chars: usize,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Decide how to deliver `text` under `max_chunk_length` characters per message.
///
/// A `Direct` request for an oversized text is split.
#[instrument(skip(text, compressor), fields(chars = text.chars().count()))]
pub async fn plan<P: Compressor>(
    text: &str,
    max_chunk_length: usize,
    strategy: DeliveryStrategy,
    compressor: &P,
) -> DeliveryPlan {
    let max_chunk_length = max_chunk_length.max(1);
    if text.chars().count() <= max_chunk_length {
        return DeliveryPlan::direct(text);
    }

    match strategy {
        DeliveryStrategy::Direct | DeliveryStrategy::Split => {
            DeliveryPlan::split(text, max_chunk_length, false)
        }
        DeliveryStrategy::Compress => match compressor.compress(text, max_chunk_length).await {
            Ok(compressed) if compressed.trim().is_empty() => {
                warn!("compression returned nothing, splitting the original");
                DeliveryPlan::split(text, max_chunk_length, false)
            }
            Ok(compressed) if compressed.chars().count() <= max_chunk_length => {
                debug!(chars = compressed.chars().count(), "compressed into one chunk");
                DeliveryPlan {
                    strategy: DeliveryStrategy::Compress,
                    chunks: vec![compressed],
                    compressed: true,
                }
            }
            Ok(compressed) => {
                debug!("compressed text still too long, splitting it");
                DeliveryPlan::split(&compressed, max_chunk_length, true)
            }
            Err(e) => {
                warn!(error = %e, "compression failed, splitting the original");
                DeliveryPlan::split(text, max_chunk_length, false)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("no model available")]
    struct Unavailable;

    /// Returns a fixed rewrite, or fails when there is none
    struct FixedCompressor(Option<String>);

    impl Compressor for FixedCompressor {
        type Error = Unavailable;

        async fn compress(&self, _text: &str, _max_chars: usize) -> Result<String, Unavailable> {
            self.0.clone().ok_or(Unavailable)
        }
    }

    fn long_text() -> String {
        (0..100)
            .map(|i| format!("line {i} of a long answer\n"))
            .collect()
    }

    #[tokio::test]
    async fn short_text_is_direct() {
        let plan = plan("hi", 2000, DeliveryStrategy::Compress, &FixedCompressor(None)).await;
        assert_eq!(plan, DeliveryPlan::direct("hi"));
    }

    #[tokio::test]
    async fn compress_fits_one_chunk() {
        let compressor = FixedCompressor(Some("short".to_string()));
        let plan = plan(&long_text(), 100, DeliveryStrategy::Compress, &compressor).await;
        assert_eq!(plan.strategy, DeliveryStrategy::Compress);
        assert_eq!(plan.chunks, vec!["short"]);
        assert!(plan.compressed);
    }

    #[tokio::test]
    async fn overlong_compression_is_split() {
        let rewrite = "x".repeat(250);
        let compressor = FixedCompressor(Some(rewrite.clone()));
        let plan = plan(&long_text(), 100, DeliveryStrategy::Compress, &compressor).await;
        assert_eq!(plan.strategy, DeliveryStrategy::Split);
        assert!(plan.compressed);
        assert_eq!(plan.chunks.concat(), rewrite);
        assert!(plan.chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[tokio::test]
    async fn failed_compression_splits_original() {
        let text = long_text();
        let plan = plan(&text, 100, DeliveryStrategy::Compress, &FixedCompressor(None)).await;
        assert_eq!(plan.strategy, DeliveryStrategy::Split);
        assert!(!plan.compressed);
        assert_eq!(plan.chunks.concat(), text);
    }

    #[tokio::test]
    async fn oversized_direct_request_is_split() {
        let plan = plan(&long_text(), 100, DeliveryStrategy::Direct, &FixedCompressor(None)).await;
        assert_eq!(plan.strategy, DeliveryStrategy::Split);
        assert!(plan.chunks.len() > 1);
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("Split".parse::<DeliveryStrategy>(), Ok(DeliveryStrategy::Split));
        assert_eq!(
            "compress".parse::<DeliveryStrategy>(),
            Ok(DeliveryStrategy::Compress)
        );
        assert!("zip".parse::<DeliveryStrategy>().is_err());
    }
}

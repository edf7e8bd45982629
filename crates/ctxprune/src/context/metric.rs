//! Size metrics: how much context an entry costs.
//!
//! A metric only has to be deterministic and monotonic under truncation
//! (a prefix of some content never costs more than the content). The
//! [`TokenEstimate`] default uses the same chars-per-token heuristic as the
//! rest of the crate; [`ByteLength`] is exact and convenient in tests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; 3.5 sits in the middle.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Pluggable cost function for history content.
pub trait SizeMetric: fmt::Debug + Send + Sync {
    /// Cost of `content`. Must be deterministic.
    fn cost(&self, content: &str) -> u64;

    /// Unit label for logs (`"bytes"`, `"tokens"`).
    fn unit(&self) -> &'static str;
}

/// UTF-8 byte length.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteLength;

impl SizeMetric for ByteLength {
    fn cost(&self, content: &str) -> u64 {
        content.len() as u64
    }

    fn unit(&self) -> &'static str {
        "bytes"
    }
}

/// Approximate token count: `ceil(chars / chars_per_token)`.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimate {
    chars_per_token: f64,
}

impl TokenEstimate {
    /// Create an estimator. Non-positive or non-finite ratios fall back to
    /// [`DEFAULT_CHARS_PER_TOKEN`].
    pub fn new(chars_per_token: f64) -> Self {
        let chars_per_token = if chars_per_token.is_finite() && chars_per_token > 0.0 {
            chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        Self { chars_per_token }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }
}

impl Default for TokenEstimate {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl SizeMetric for TokenEstimate {
    fn cost(&self, content: &str) -> u64 {
        let chars = content.chars().count();
        (chars as f64 / self.chars_per_token).ceil() as u64
    }

    fn unit(&self) -> &'static str {
        "tokens"
    }
}

/// Serializable metric selection used by [`ContextConfig`](crate::config::ContextConfig).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MetricKind {
    Bytes,
    Tokens {
        #[serde(default = "default_chars_per_token")]
        chars_per_token: f64,
    },
}

fn default_chars_per_token() -> f64 {
    DEFAULT_CHARS_PER_TOKEN
}

impl Default for MetricKind {
    fn default() -> Self {
        MetricKind::Tokens {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl MetricKind {
    /// Instantiate the selected metric.
    pub fn build(&self) -> Arc<dyn SizeMetric> {
        match self {
            MetricKind::Bytes => Arc::new(ByteLength),
            MetricKind::Tokens { chars_per_token } => {
                Arc::new(TokenEstimate::new(*chars_per_token))
            }
        }
    }
}

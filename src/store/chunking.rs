//! Sliding-window chunking for long source texts.
//!
//! Tokens are whitespace-delimited words. Windows keep the original text
//! between their first and last token, so chunk boundaries never rewrite
//! the source.

use crate::error::OrchestrationError;
use crate::Result;

pub const DEFAULT_WINDOW: usize = 800;
pub const DEFAULT_OVERLAP: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSplitter {
    window: usize,
    overlap: usize,
}

impl TextSplitter {
    pub fn new(window: usize, overlap: usize) -> Result<Self> {
        if window == 0 || overlap >= window {
            return Err(OrchestrationError::ConfigError(format!(
                "invalid chunking window {} with overlap {}",
                window, overlap
            )));
        }
        Ok(Self { window, overlap })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered, overlapping windows. Blank text yields
    /// no chunks; text within one window yields itself, trimmed.
    pub fn split(&self, text: &str) -> Vec<String> {
        let spans = word_spans(text);
        if spans.is_empty() {
            return Vec::new();
        }

        let step = self.window - self.overlap;
        let mut chunks = Vec::with_capacity(spans.len() / step + 1);
        let mut start = 0;

        loop {
            let end = (start + self.window).min(spans.len());
            chunks.push(text[spans[start].0..spans[end - 1].1].to_string());
            if end == spans.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Byte ranges of whitespace-delimited tokens.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}

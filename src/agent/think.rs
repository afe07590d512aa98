//! Handling of `<think>...</think>` reasoning segments emitted by some models.

use once_cell::sync::Lazy;
use regex::Regex;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

static THINK_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

/// Strip reasoning segments from a complete reply.
///
/// - Closed segments are removed and the rest is trimmed.
/// - An opening tag still unclosed at the end yields an empty string,
///   which makes the reply count as empty.
/// - Text without tags is returned trimmed.
pub fn remove_think_tags(text: &str) -> String {
    if !text.contains(THINK_OPEN) {
        return text.trim().to_string();
    }

    let stripped = THINK_BLOCK_RE.replace_all(text, "");
    if stripped.contains(THINK_OPEN) {
        return String::new();
    }
    stripped.trim().to_string()
}

/// A piece of streamed text classified for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Visible(String),
    /// Inside a think segment, tags included
    Think(String),
}

impl Span {
    pub fn text(&self) -> &str {
        match self {
            Span::Visible(s) | Span::Think(s) => s,
        }
    }

    pub fn is_think(&self) -> bool {
        matches!(self, Span::Think(_))
    }
}

/// Incremental classifier for streamed fragments.
///
/// Text that could be the start of a tag split across fragments is held back
/// until the next fragment (or [`ThinkTracker::finish`]) decides it.
#[derive(Debug, Default)]
pub struct ThinkTracker {
    in_think: bool,
    pending: String,
}

impl ThinkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_think(&self) -> bool {
        self.in_think
    }

    pub fn push(&mut self, fragment: &str) -> Vec<Span> {
        self.pending.push_str(fragment);
        let mut spans = Vec::new();

        loop {
            let marker = if self.in_think { THINK_CLOSE } else { THINK_OPEN };

            if let Some(pos) = self.pending.find(marker) {
                let end = pos + marker.len();
                let (before, tag) = self.pending[..end].split_at(pos);
                push_span(&mut spans, before, self.in_think);
                push_span(&mut spans, tag, true);
                self.pending.drain(..end);
                self.in_think = !self.in_think;
                continue;
            }

            let split = self.pending.len() - partial_marker_len(&self.pending, marker);
            push_span(&mut spans, &self.pending[..split], self.in_think);
            self.pending.drain(..split);
            break;
        }

        spans
    }

    /// Flush any held-back text at end of stream.
    pub fn finish(&mut self) -> Option<Span> {
        if self.pending.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.pending);
        Some(if self.in_think {
            Span::Think(text)
        } else {
            Span::Visible(text)
        })
    }
}

fn push_span(spans: &mut Vec<Span>, text: &str, think: bool) {
    if text.is_empty() {
        return;
    }
    match spans.last_mut() {
        Some(Span::Think(s)) if think => s.push_str(text),
        Some(Span::Visible(s)) if !think => s.push_str(text),
        _ => spans.push(if think {
            Span::Think(text.to_string())
        } else {
            Span::Visible(text.to_string())
        }),
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&k| text.ends_with(&marker[..k]))
        .unwrap_or(0)
}

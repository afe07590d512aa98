//! Terminal rendering of replies and transcripts.

use colored::Colorize;
use futures::{Stream, StreamExt};
use std::io::{self, Write};

use crate::agent::{Span, ThinkTracker, Transcript};
use crate::error::AgentError;

/// Writes streamed fragments as they arrive, dimming think segments.
pub struct StreamPrinter<W: Write> {
    out: W,
    tracker: ThinkTracker,
}

impl<W: Write> StreamPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            tracker: ThinkTracker::new(),
        }
    }

    pub fn write(&mut self, fragment: &str) -> io::Result<()> {
        for span in self.tracker.push(fragment) {
            write_span(&mut self.out, &span)?;
        }
        self.out.flush()
    }

    pub fn finish(mut self) -> io::Result<W> {
        if let Some(span) = self.tracker.finish() {
            write_span(&mut self.out, &span)?;
        }
        writeln!(self.out)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

fn write_span<W: Write>(out: &mut W, span: &Span) -> io::Result<()> {
    match span {
        Span::Think(text) => write!(out, "{}", text.dimmed()),
        Span::Visible(text) => write!(out, "{}", text),
    }
}

/// Print a reply stream to stdout. Returns the first error after the
/// partial output has been terminated with a newline.
pub async fn print_reply<S>(stream: S) -> anyhow::Result<Option<AgentError>>
where
    S: Stream<Item = Result<String, AgentError>>,
{
    let mut stream = Box::pin(stream);
    let mut printer = StreamPrinter::new(io::stdout());
    let mut failure = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => printer.write(&fragment)?,
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    printer.finish()?;
    Ok(failure)
}

pub fn format_history(transcript: &Transcript, agent_name: &str) -> String {
    if transcript.is_empty() {
        return format!("{}", "(no history yet)".dimmed());
    }

    let mut lines = Vec::new();
    for (i, turn) in transcript.turns().iter().enumerate() {
        lines.push(format!(
            "{} {}",
            format!("[{}] You:", i + 1).bold(),
            turn.user_message
        ));
        lines.push(format!(
            "{} {}",
            format!("{}:", agent_name).cyan().bold(),
            turn.assistant_message
        ));
        lines.push(format!("{}", format!("(emotion {})", turn.emotion).dimmed()));
        lines.push(String::new());
    }
    lines.join("\n")
}

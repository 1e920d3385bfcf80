//! Interactive text menu
//!
//! Loops until the operator picks exit, interrupts at the prompt, or input
//! ends. A failed pipeline is reported and the menu is shown again.

use crate::error::PipelineError;
use crate::pipeline::RunSummary;
use std::io::{self, BufRead, Write};
use tokio::sync::mpsc;
use tracing::debug;

/// Menu entries, in display order
pub const MENU_ENTRIES: &[(&str, &str)] = &[
    ("1", "Create Scalable AWS Architecture."),
    ("2", "Delete Scalable AWS Architecture."),
    ("3", "Exit"),
];

pub const PROMPT: &str = "Please Select an Option:";

pub const UNKNOWN_OPTION: &str = "Unknown Option Selected!";

/// A parsed menu selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuChoice {
    Create,
    Delete,
    Exit,
    Unknown(String),
}

impl MenuChoice {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "1" => MenuChoice::Create,
            "2" => MenuChoice::Delete,
            "3" => MenuChoice::Exit,
            other => MenuChoice::Unknown(other.to_string()),
        }
    }
}

/// What the menu can ask for
#[allow(async_fn_in_trait)]
pub trait MenuActions {
    async fn create(&mut self) -> Result<RunSummary, PipelineError>;
    async fn delete(&mut self) -> Result<RunSummary, PipelineError>;

    /// Resolves when the operator interrupts while the prompt is waiting.
    async fn interrupted(&mut self) {
        std::future::pending::<()>().await
    }
}

/// Lines typed at the menu, read off the async runtime
pub struct MenuInput {
    lines: mpsc::Receiver<io::Result<String>>,
}

impl MenuInput {
    /// Read `reader` line by line on its own thread.
    ///
    /// A plain thread rather than a blocking task: a read still pending
    /// at exit must not hold up runtime shutdown.
    pub fn spawn<R: BufRead + Send + 'static>(mut reader: R) -> Self {
        let (tx, lines) = mpsc::channel(1);
        std::thread::spawn(move || {
            loop {
                let mut line = String::new();
                let read = match reader.read_line(&mut line) {
                    Ok(0) => return,
                    Ok(_) => Ok(line),
                    Err(e) => Err(e),
                };
                let failed = read.is_err();
                if tx.blocking_send(read).is_err() || failed {
                    return;
                }
            }
        });
        Self { lines }
    }

    /// Input fed from an existing channel; a closed channel reads as end of input.
    pub fn from_channel(lines: mpsc::Receiver<io::Result<String>>) -> Self {
        Self { lines }
    }

    async fn next_line(&mut self) -> Option<io::Result<String>> {
        self.lines.recv().await
    }
}

/// Run the menu loop until exit, interruption or end of input.
pub async fn run_menu<W, A>(input: &mut MenuInput, mut output: W, actions: &mut A) -> io::Result<()>
where
    W: Write,
    A: MenuActions,
{
    loop {
        for (key, label) in MENU_ENTRIES {
            writeln!(output, "{key} {label}")?;
        }
        write!(output, "{PROMPT}")?;
        output.flush()?;

        let line = tokio::select! {
            line = input.next_line() => line,
            () = actions.interrupted() => {
                writeln!(output)?;
                debug!("Interrupted at the prompt, leaving menu");
                return Ok(());
            }
        };
        let line = match line {
            Some(line) => line?,
            None => {
                writeln!(output)?;
                debug!("Input closed, leaving menu");
                return Ok(());
            }
        };

        let result = match MenuChoice::parse(&line) {
            MenuChoice::Create => actions.create().await,
            MenuChoice::Delete => actions.delete().await,
            MenuChoice::Exit => return Ok(()),
            MenuChoice::Unknown(selection) => {
                debug!(%selection, "Unknown menu selection");
                writeln!(output, "{UNKNOWN_OPTION}")?;
                continue;
            }
        };

        match result {
            Ok(summary) => writeln!(
                output,
                "{} finished: {} stages in {}s (run {})",
                summary.direction,
                summary.stages.len(),
                summary.elapsed.as_secs(),
                summary.run_id
            )?,
            Err(e) => {
                writeln!(output, "Error: {e}")?;
                let mut source = std::error::Error::source(&e);
                while let Some(cause) = source {
                    writeln!(output, "  Caused by: {cause}")?;
                    source = cause.source();
                }
                if let Some(hint) = e.source.provider_error().and_then(|p| p.suggestion()) {
                    writeln!(output, "  Hint: {hint}")?;
                }
            }
        }
    }
}

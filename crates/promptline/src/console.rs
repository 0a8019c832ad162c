//! Terminal chat loop.
//!
//! Reads one user line at a time, streams the assistant's reply to the writer
//! fragment by fragment and keeps the conversation in a [`ChatSession`].

use anyhow::Result;
use promptline_chain::{ChatSession, PromptInput, Runnable, TurnOutcome};
use std::io::Write;
use std::ops::ControlFlow;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const DEFAULT_SYSTEM_PROMPT: &str = "你叫杨紫，是著名女演员。";
pub const DEFAULT_ASSISTANT_NAME: &str = "杨紫";

/// Overrides the persona's system prompt
pub const SYSTEM_PROMPT_ENV: &str = "PROMPTLINE_SYSTEM_PROMPT";
/// Overrides the label printed before assistant replies
pub const ASSISTANT_NAME_ENV: &str = "PROMPTLINE_ASSISTANT_NAME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleOptions {
    pub banner: String,
    pub user_prompt: String,
    pub assistant_name: String,
}

impl Default for ConsoleOptions {
    fn default() -> Self {
        Self {
            banner: "🔹 输入 exit 结束对话".to_string(),
            user_prompt: "你：".to_string(),
            assistant_name: DEFAULT_ASSISTANT_NAME.to_string(),
        }
    }
}

impl ConsoleOptions {
    pub fn assistant_name(mut self, name: impl Into<String>) -> Self {
        self.assistant_name = name.into();
        self
    }
}

/// "exit" or "quit", ignoring case and surrounding whitespace
pub fn is_exit_command(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Run the chat loop until an exit command or end of input
///
/// Returns the number of completed turns. A failed turn is reported inline and
/// the loop goes on; only I/O errors end it early.
pub async fn run_console<R, I, W>(
    session: &mut ChatSession<R>,
    input: I,
    output: &mut W,
    options: &ConsoleOptions,
) -> Result<usize>
where
    R: Runnable<Input = PromptInput, Output = String>,
    I: AsyncBufRead + Unpin,
    W: Write + Send,
{
    writeln!(output, "{}", options.banner)?;
    let mut lines = input.lines();
    let mut completed = 0;

    loop {
        write!(output, "{}", options.user_prompt)?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            break;
        };
        if is_exit_command(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        write!(output, "{}: ", options.assistant_name)?;
        output.flush()?;

        let mut write_error = None;
        let outcome = session
            .respond(&line, |delta| {
                match output
                    .write_all(delta.fragment.as_bytes())
                    .and_then(|()| output.flush())
                {
                    Ok(()) => ControlFlow::Continue(()),
                    Err(e) => {
                        write_error = Some(e);
                        ControlFlow::Break(())
                    }
                }
            })
            .await?;
        if let Some(e) = write_error {
            return Err(e.into());
        }

        writeln!(output)?;
        match outcome {
            TurnOutcome::Completed { .. } => completed += 1,
            TurnOutcome::Failed { error } => writeln!(output, "[error] {}", error)?,
            TurnOutcome::Cancelled | TurnOutcome::Skipped => {}
        }
    }

    tracing::debug!(turns = completed, "Console session ended");
    Ok(completed)
}

use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use serde_json::Value;
use std::io::{self, Write};
use tracing::debug;

use steploop_runtime::{FragmentKind, Message, Role, RunEvent};

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const USER_PROMPT: Color = Color::Green;
    const ASSISTANT_TEXT: Color = Color::Cyan;
    const TOOL_CALL: Color = Color::Yellow;
    const TOOL_RESULT: Color = Color::DarkGreen;
    const ERROR: Color = Color::Red;
    const DIM: Color = Color::DarkGrey;
    const HEADER: Color = Color::Magenta;
}

/// Longest tool result shown before truncating.
const MAX_RESULT_CHARS: usize = 500;

/// Renders run events to stdout.
pub struct Terminal {
    json: bool,
}

impl Terminal {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    /// Print the startup banner.
    pub fn print_banner(&self, provider: &str, profile: &str) -> Result<()> {
        if self.json {
            return Ok(());
        }
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::HEADER),
            Print("steploop"),
            ResetColor,
            Print(" - agent graph demo\n"),
            SetForegroundColor(Colors::DIM),
            Print(format!("Model: {} | Profile: {}\n", provider, profile)),
            Print("Ctrl+C cancels the run.\n"),
            Print("---\n"),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    pub fn print_question(&self, question: &str) -> Result<()> {
        if self.json {
            return Ok(());
        }
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::USER_PROMPT),
            Print("you> "),
            ResetColor,
            Print(format!("{}\n", question)),
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Display one run event with appropriate formatting.
    pub fn display_event(&self, event: &RunEvent) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(event)?);
            return Ok(());
        }

        let mut stdout = io::stdout();
        match event {
            RunEvent::Fragment { fragment, .. } => match fragment.kind() {
                FragmentKind::Text => {
                    if let Some(text) = fragment.text_delta() {
                        execute!(
                            stdout,
                            SetForegroundColor(Colors::ASSISTANT_TEXT),
                            Print(text),
                            ResetColor,
                        )?;
                    }
                }
                FragmentKind::ToolCall => {
                    if let Some(name) = fragment.tool_call.as_ref().and_then(|d| d.name.as_deref()) {
                        execute!(
                            stdout,
                            SetForegroundColor(Colors::TOOL_CALL),
                            Print(format!("[tool: {}] ", name)),
                            ResetColor,
                        )?;
                    }
                }
                FragmentKind::Role | FragmentKind::Empty => {}
            },
            RunEvent::Update { node, messages } => {
                debug!(node = %node, count = messages.len(), "node update");
                for message in messages {
                    self.display_message(message)?;
                }
            }
            RunEvent::Finished { state } => {
                execute!(
                    stdout,
                    SetForegroundColor(Colors::DIM),
                    Print(format!("--- done ({} messages)\n", state.len())),
                    ResetColor,
                )?;
            }
        }
        stdout.flush()?;
        Ok(())
    }

    /// Completed messages: tool calls with their full arguments, tool results,
    /// and a line break after streamed assistant text.
    fn display_message(&self, message: &Message) -> Result<()> {
        let mut stdout = io::stdout();
        match message.role {
            Role::Assistant if message.has_tool_calls() => {
                for call in &message.tool_calls {
                    execute!(
                        stdout,
                        SetForegroundColor(Colors::DIM),
                        Print(format!("{}\n", call.arguments)),
                        ResetColor,
                    )?;
                }
            }
            Role::Assistant => execute!(stdout, Print("\n"))?,
            Role::Tool => {
                let name = message.name.as_deref().unwrap_or("tool");
                let (label, color) = if is_error_payload(&message.content) {
                    ("error", Colors::ERROR)
                } else {
                    ("result", Colors::TOOL_RESULT)
                };
                execute!(
                    stdout,
                    SetForegroundColor(color),
                    Print(format!("  [{} {}]: {}\n", name, label, truncate(&message.content))),
                    ResetColor,
                )?;
            }
            Role::System | Role::User => {}
        }
        Ok(())
    }

    /// Print an error message.
    pub fn print_error(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            Print("\n"),
            SetForegroundColor(Colors::ERROR),
            Print(format!("Error: {}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }

    /// Print an info message.
    pub fn print_info(&self, msg: &str) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(
            stdout,
            SetForegroundColor(Colors::DIM),
            Print(format!("{}\n", msg)),
            ResetColor,
        )?;
        stdout.flush()?;
        Ok(())
    }
}

/// Tool-role content shaped like `{"error": kind, "message": ...}`.
fn is_error_payload(content: &str) -> bool {
    serde_json::from_str::<Value>(content)
        .map(|v| v.get("error").is_some_and(Value::is_string))
        .unwrap_or(false)
}

fn truncate(content: &str) -> String {
    let total = content.chars().count();
    if total > MAX_RESULT_CHARS {
        let head: String = content.chars().take(MAX_RESULT_CHARS).collect();
        format!("{}... ({} chars total)", head, total)
    } else {
        content.to_string()
    }
}

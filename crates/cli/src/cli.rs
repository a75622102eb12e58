use clap::Parser;

use steploop_core::{EngineConfig, ToolCallMode};

/// Run the agent graph once against the built-in demo model.
///
/// Engine settings come from the environment (`STEPLOOP_*`, optionally
/// profiled); flags given here take precedence.
#[derive(Parser, Debug)]
#[command(name = "steploop-demo", about = "Stream one agent run over a scripted household model")]
pub struct CliArgs {
    /// The user question that starts the run
    #[arg(default_value = "what's in the bedroom")]
    pub question: String,

    /// Config profile (overrides STEPLOOP_PROFILE)
    #[arg(long, env = "STEPLOOP_PROFILE")]
    pub profile: Option<String>,

    /// System prompt prepended to every model request
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Maximum node executions before the run is aborted
    #[arg(long)]
    pub recursion_limit: Option<usize>,

    /// Tool calls executed per assistant turn: all or first
    #[arg(long)]
    pub tool_calls: Option<ToolCallMode>,

    /// Print events as JSON lines instead of formatted text
    #[arg(long)]
    pub json: bool,
}

impl CliArgs {
    /// Layer explicit flags over the environment config.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(prompt) = &self.system_prompt {
            config.system_prompt = Some(prompt.clone());
        }
        if let Some(limit) = self.recursion_limit {
            config.recursion_limit = limit;
        }
        if let Some(mode) = self.tool_calls {
            config.tool_calls = mode;
        }
    }
}

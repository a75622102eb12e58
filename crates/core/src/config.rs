use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled key: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_opt<F>(lookup: &F, profile: &str, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = lookup(&prefixed) {
            return Some(v);
        }
    }
    lookup(key)
}

fn profiled_usize<F>(lookup: &F, profile: &str, key: &str, default: usize) -> Result<usize, CoreError>
where
    F: Fn(&str) -> Option<String>,
{
    match profiled_opt(lookup, profile, key) {
        Some(raw) => raw.trim().parse().map_err(|_| CoreError::InvalidConfig {
            key: key.to_string(),
            reason: format!("expected a non-negative integer, got '{raw}'"),
        }),
        None => Ok(default),
    }
}

// ── Tool-call mode ────────────────────────────────────────────

/// How many of the tool calls in one assistant turn the tool node executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallMode {
    /// Every requested call, sequentially, in slot order.
    #[default]
    All,
    /// Only the first requested call.
    FirstOnly,
}

impl FromStr for ToolCallMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "first" | "first_only" => Ok(Self::FirstOnly),
            other => Err(CoreError::InvalidConfig {
                key: "STEPLOOP_TOOL_CALLS".to_string(),
                reason: format!("unknown tool-call mode '{other}', expected 'all' or 'first'"),
            }),
        }
    }
}

impl fmt::Display for ToolCallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::FirstOnly => f.write_str("first"),
        }
    }
}

// ── Engine config ─────────────────────────────────────────────

pub const DEFAULT_RECURSION_LIMIT: usize = 25;
pub const DEFAULT_EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    /// Maximum node executions per run.
    pub recursion_limit: usize,
    /// Capacity of the channel behind a streamed run.
    pub event_buffer: usize,
    pub tool_calls: ToolCallMode,
    /// Prepended to every model request, never written to history.
    pub system_prompt: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            event_buffer: DEFAULT_EVENT_BUFFER,
            tool_calls: ToolCallMode::default(),
            system_prompt: None,
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `STEPLOOP_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, CoreError> {
        let profile = env_opt("STEPLOOP_PROFILE").unwrap_or_default();
        Self::from_env_profile(&profile)
    }

    /// Like [`EngineConfig::from_env`], but with an explicit profile in place
    /// of `STEPLOOP_PROFILE`.
    pub fn from_env_profile(profile: &str) -> Result<Self, CoreError> {
        Self::from_lookup(profile, env_opt)
    }

    /// Build config for a profile from an arbitrary key lookup.
    pub fn from_lookup<F>(profile: &str, lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let p = profile.to_uppercase();
        let p = p.as_str();

        let tool_calls = match profiled_opt(&lookup, p, "STEPLOOP_TOOL_CALLS") {
            Some(raw) => raw.parse()?,
            None => ToolCallMode::default(),
        };

        let config = Self {
            profile: p.to_string(),
            recursion_limit: profiled_usize(&lookup, p, "STEPLOOP_RECURSION_LIMIT", DEFAULT_RECURSION_LIMIT)?,
            event_buffer: profiled_usize(&lookup, p, "STEPLOOP_EVENT_BUFFER", DEFAULT_EVENT_BUFFER)?,
            tool_calls,
            system_prompt: profiled_opt(&lookup, p, "STEPLOOP_SYSTEM_PROMPT"),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.recursion_limit == 0 {
            return Err(CoreError::InvalidConfig {
                key: "STEPLOOP_RECURSION_LIMIT".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.event_buffer == 0 {
            return Err(CoreError::InvalidConfig {
                key: "STEPLOOP_EVENT_BUFFER".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config loaded (profile: {}):", self.profile_label());
        tracing::info!("  recursion_limit: {}", self.recursion_limit);
        tracing::info!("  event_buffer:    {}", self.event_buffer);
        tracing::info!("  tool_calls:      {}", self.tool_calls);
        tracing::info!(
            "  system_prompt:   {}",
            if self.system_prompt.is_some() { "(set)" } else { "(none)" }
        );
    }
}

use anyhow::{bail, Context};
use std::path::PathBuf;

/// Default maximum number of nested calls before the evaluator reports a stack overflow.
pub const DEFAULT_STACK_LIMIT: usize = 2048;

/// Environment variable overriding the stack limit.
pub const STACK_LIMIT_VAR: &str = "REN_STACK_LIMIT";

const MIN_STACK_LIMIT: usize = 16;
const MAX_STACK_LIMIT: usize = 1 << 20;

/// Everything a universe needs to know before it boots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseConfig {
    /// Maximum number of nested calls.
    pub stack_limit: usize,
    /// Log every evaluation step.
    pub trace: bool,
    /// Log boot phases and timing information.
    pub verbose: bool,
    /// The script being run, if any. Exposed as `system/options/script`.
    pub script: Option<PathBuf>,
    /// Arguments for the script. Exposed as `system/options/args`.
    pub args: Vec<String>,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self { stack_limit: DEFAULT_STACK_LIMIT, trace: false, verbose: false, script: None, args: Vec::new() }
    }
}

impl UniverseConfig {
    /// Applies overrides from the process environment.
    pub fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        if let Ok(raw) = std::env::var(STACK_LIMIT_VAR) {
            self.stack_limit = raw.trim().parse().with_context(|| format!("{} is not a number: {:?}", STACK_LIMIT_VAR, raw))?;
        }
        Ok(self)
    }

    /// Rejects configurations the evaluator can't honor.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(MIN_STACK_LIMIT..=MAX_STACK_LIMIT).contains(&self.stack_limit) {
            bail!("stack limit must be between {} and {}, got {}", MIN_STACK_LIMIT, MAX_STACK_LIMIT, self.stack_limit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_is_valid() {
        assert!(UniverseConfig::default().validate().is_ok());
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    #[case(usize::MAX)]
    fn out_of_range_stack_limits_are_rejected(#[case] stack_limit: usize) {
        let config = UniverseConfig { stack_limit, ..Default::default() };
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("stack limit"));
    }
}

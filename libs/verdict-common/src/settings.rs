use std::time::Duration;

/// Default wall-clock budget for one evaluation run, in seconds.
pub const SERVER_TIMEOUT_SECS: u64 = 4;

/// Process-wide grading settings.
///
/// Loaded once at startup and passed explicitly into the grader; the
/// evaluation core never reads ambient global state.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Wall-clock budget shared by all test cases of one run.
    pub server_timeout_secs: u64,
    /// Interpreter binary used by the Python execution context.
    pub python_bin: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_timeout_secs: SERVER_TIMEOUT_SECS,
            python_bin: "python3".to_string(),
        }
    }
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    ///
    /// Recognized variables: `GRADER_TIMEOUT_SECS`, `GRADER_PYTHON_BIN`.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();
        if let Ok(raw) = std::env::var("GRADER_TIMEOUT_SECS") {
            if let Ok(secs) = raw.parse::<u64>() {
                settings.server_timeout_secs = secs;
            }
        }
        if let Ok(bin) = std::env::var("GRADER_PYTHON_BIN") {
            if !bin.is_empty() {
                settings.python_bin = bin;
            }
        }
        settings
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server_timeout_secs)
    }
}

/// The fixed learner-facing diagnostic for a run that exhausted its
/// wall-clock budget. Byte-identical across runs for a given budget.
pub fn timeout_message(timeout_secs: u64) -> String {
    format!(
        "Code took more than {} seconds to run. \
         You probably have an infinite loop in your code.",
        timeout_secs
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget_is_four_seconds() {
        let settings = Settings::default();
        assert_eq!(settings.server_timeout_secs, SERVER_TIMEOUT_SECS);
        assert_eq!(settings.server_timeout(), Duration::from_secs(4));
        assert_eq!(settings.python_bin, "python3");
    }

    #[test]
    fn timeout_message_names_the_budget() {
        assert_eq!(
            timeout_message(4),
            "Code took more than 4 seconds to run. \
             You probably have an infinite loop in your code."
        );
    }
}

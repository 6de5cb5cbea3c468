//! Diagnostics for the tutor binaries.
//!
//! The conversation itself is written to stdout; everything logged here goes
//! to stderr, so redirecting one never garbles the other. `LEARNSTACK_LOG`
//! takes precedence over `RUST_LOG`. With neither set, each binary falls back
//! to its own default (the CLI shows only warnings: malformed blocks,
//! rejected stacks, stale gates).

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crate-specific filter variable, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "LEARNSTACK_LOG";

/// Default filter for the terminal tutor.
pub const CLI_DEFAULT: &str = "warn";

/// Initialize the tracing subscriber.
///
/// # Example
/// ```bash
/// LEARNSTACK_LOG=learnstack=debug learnstack chat --goal "Recursion"
/// ```
pub fn init(default_directive: &str) {
    let directive = select_directive(
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        default_directive,
    );
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!("ignoring invalid log filter '{directive}': {err}");
        EnvFilter::new(default_directive)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// First non-blank filter among the crate variable, `RUST_LOG` and the
/// binary's default.
fn select_directive(
    learnstack_log: Option<String>,
    rust_log: Option<String>,
    default_directive: &str,
) -> String {
    [learnstack_log, rust_log]
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| default_directive.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_variable_wins_over_rust_log() {
        let directive = select_directive(
            Some("learnstack=debug".to_string()),
            Some("info".to_string()),
            CLI_DEFAULT,
        );
        assert_eq!(directive, "learnstack=debug");
    }

    #[test]
    fn blank_values_fall_through_to_default() {
        assert_eq!(
            select_directive(Some("  ".to_string()), None, CLI_DEFAULT),
            "warn"
        );
        assert_eq!(
            select_directive(None, Some("trace".to_string()), CLI_DEFAULT),
            "trace"
        );
    }
}

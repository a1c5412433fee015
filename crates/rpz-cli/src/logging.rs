//! tracing-subscriber setup.

use tracing_subscriber::EnvFilter;

/// Build the filter directive for `level`, silencing hickory unless the
/// caller named it.
pub fn filter_directive(level: &str) -> String {
    let mut filter = level.to_string();
    if !filter.contains("hickory_server") {
        filter.push_str(",hickory_server=off");
    }
    if !filter.contains("hickory_proto") {
        filter.push_str(",hickory_proto=off");
    }
    filter
}

/// Install the global subscriber. `RUST_LOG` wins over `level`.
pub fn setup_logging(level: &str) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directive(level))
            .map_err(|e| anyhow::anyhow!("invalid log level {level:?}: {e}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging already initialized: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hickory_quietened_by_default() {
        assert_eq!(
            filter_directive("info"),
            "info,hickory_server=off,hickory_proto=off"
        );
    }

    #[test]
    fn test_explicit_hickory_level_kept() {
        let filter = filter_directive("debug,hickory_server=info");
        assert_eq!(filter, "debug,hickory_server=info,hickory_proto=off");
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}

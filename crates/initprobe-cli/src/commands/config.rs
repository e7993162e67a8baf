//! `initprobe init-config`.

use anyhow::{Context, Result};
use initprobe_core::config::TargetConfig;

/// Host written into the sample configuration.
const SAMPLE_HOST: &str = "192.0.2.10";

/// Builds the sample configuration: defaults plus a placeholder host, so the
/// printed file loads as-is once the host is edited.
fn sample_config() -> TargetConfig {
    let mut config = TargetConfig::default();
    config.target.host = SAMPLE_HOST.to_string();
    config
}

/// Prints a default configuration file.
pub fn init_config() -> Result<()> {
    let text = sample_config()
        .to_toml()
        .context("failed to render default configuration")?;
    print!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config_loads() {
        let text = sample_config().to_toml().unwrap();
        let loaded = TargetConfig::from_toml(&text).unwrap();
        assert_eq!(loaded, sample_config());
        assert_eq!(loaded.target.host, SAMPLE_HOST);
    }
}

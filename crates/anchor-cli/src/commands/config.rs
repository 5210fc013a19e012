//! Configuration inspection

use anchor_core::AnchorConfig;
use anyhow::Result;
use clap::Args;

/// Configuration operations
#[derive(Args)]
pub struct ConfigCommand {
    /// Action to perform
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration operations
#[derive(clap::Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show {
        /// Extra `section.field=value` overrides
        #[arg(short, long = "set")]
        overrides: Vec<String>,
    },
}

pub fn run(cmd: ConfigCommand, config: &AnchorConfig) -> Result<()> {
    match cmd.action {
        ConfigAction::Show { overrides } => print!("{}", show(config, &overrides)?),
    }
    Ok(())
}

fn show(config: &AnchorConfig, overrides: &[String]) -> Result<String> {
    let mut config = config.clone();
    for entry in overrides {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("override must be key=value: {entry}"))?;
        config.set_from_string(key.trim(), value)?;
    }
    config.validate()?;
    Ok(config.to_toml_string()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_round_trips_through_toml() {
        let rendered = show(&AnchorConfig::default(), &[]).unwrap();
        assert_eq!(
            AnchorConfig::from_toml_str(&rendered).unwrap(),
            AnchorConfig::default()
        );
    }

    #[test]
    fn test_overrides_applied_and_checked() {
        let rendered = show(
            &AnchorConfig::default(),
            &["device_link.poll_interval_ms=5000".to_string()],
        )
        .unwrap();
        let parsed = AnchorConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.device_link.poll_interval_ms, 5000);

        assert!(show(&AnchorConfig::default(), &["nonsense".to_string()]).is_err());
        assert!(show(&AnchorConfig::default(), &["registry.nope=1".to_string()]).is_err());
    }
}

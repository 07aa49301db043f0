//! `vcdriver config` — show the resolved configuration.

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::domain::VcdriverConfig;

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    /// Print passwords instead of masking them
    #[arg(long)]
    pub show_secrets: bool,
}

/// Run the config command.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub fn run(app: &AppContext, args: &ConfigArgs) -> Result<()> {
    let loaded = app.config_store.load()?;
    let config = if args.show_secrets {
        loaded
    } else {
        loaded.redacted()
    };
    let path = app.config_store.path()?;

    if app.json {
        let out = serde_json::to_string_pretty(&config).context("cannot serialize config")?;
        println!("{out}");
        return Ok(());
    }
    render(app, &config, &path.display().to_string());
    Ok(())
}

fn render(app: &AppContext, config: &VcdriverConfig, path: &str) {
    let out = &app.output;
    let or_unset = |value: &str| {
        if value.is_empty() {
            "(unset)".to_string()
        } else {
            value.to_string()
        }
    };

    out.header(&format!("Configuration ({path})"));
    out.kv("vsphere.host", &or_unset(&config.vsphere.host));
    out.kv("vsphere.port", &config.vsphere.port.to_string());
    out.kv("vsphere.username", &or_unset(&config.vsphere.username));
    out.kv("vsphere.password", &or_unset(&config.vsphere.password));
    out.kv("vsphere.insecure", &config.vsphere.insecure.to_string());
    out.kv(
        "placement.data_center",
        &or_unset(&config.placement.data_center),
    );
    out.kv("placement.data_store", &or_unset(&config.placement.data_store));
    out.kv(
        "placement.resource_pool",
        &or_unset(&config.placement.resource_pool),
    );
    out.kv(
        "placement.folder",
        config.placement.folder.as_deref().unwrap_or("(data center default)"),
    );
    out.kv("timeouts.dhcp_secs", &config.timeouts.dhcp_secs.to_string());
    out.kv(
        "timeouts.vcenter_secs",
        &config.timeouts.vcenter_secs.to_string(),
    );
    out.kv(
        "ssh.username",
        &or_unset(config.ssh.username.as_deref().unwrap_or_default()),
    );
    out.kv(
        "ssh.password",
        &or_unset(config.ssh.password.as_deref().unwrap_or_default()),
    );
}

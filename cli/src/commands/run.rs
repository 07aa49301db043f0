//! `vcdriver run` — run a command on freshly cloned, disposable VMs.

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::ConfigStore;
use crate::application::services::run_batch::{CommandResult, expand_specs};
use crate::domain::{MachineSpec, VcdriverConfig};
use crate::infra::ssh::shell_quote;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Template to clone each VM from
    #[arg(long)]
    pub template: String,

    /// Number of VMs to create
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub count: u16,

    /// VM name (suffixed with -1, -2, … when --count > 1)
    #[arg(long)]
    pub name: Option<String>,

    /// Run the command with sudo
    #[arg(long)]
    pub sudo: bool,

    /// Seconds to wait for a DHCP address
    #[arg(long, value_name = "SECS")]
    pub dhcp_timeout: Option<u64>,

    /// Seconds to wait for each vCenter task
    #[arg(long, value_name = "SECS")]
    pub vcenter_timeout: Option<u64>,

    /// Command to run on every VM. A single argument is passed to the remote
    /// shell as-is; several arguments are quoted individually.
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Build the per-VM spec from the config and command-line overrides.
#[must_use]
pub fn machine_spec(args: &RunArgs, config: &VcdriverConfig) -> MachineSpec {
    let mut spec = MachineSpec::new(&args.template, config).with_timeouts(
        args.dhcp_timeout.unwrap_or(config.timeouts.dhcp_secs),
        args.vcenter_timeout.unwrap_or(config.timeouts.vcenter_secs),
    );
    if let Some(name) = &args.name {
        spec = spec.with_name(name);
    }
    spec
}

/// The remote command line for `argv`.
///
/// One argument is taken as a complete shell command (`-- 'make && make
/// test'`). Otherwise every argument that the shell would split or expand
/// is single-quoted, so `-- sh -c "echo a b"` arrives as three words.
#[must_use]
pub fn command_line(argv: &[String]) -> String {
    if let [single] = argv {
        return single.clone();
    }
    argv.iter()
        .map(|arg| {
            let plain = !arg.is_empty()
                && arg
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
            if plain { arg.clone() } else { shell_quote(arg) }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Entry point for `vcdriver run`.
///
/// # Errors
///
/// Returns an error if the configuration is incomplete, a VM cannot be
/// created, the command fails on any VM, or teardown fails.
pub async fn run(app: &AppContext, args: RunArgs) -> Result<()> {
    let config = app.config_store.load()?;
    config.validate_connection()?;
    config.validate_placement()?;
    config.validate_ssh()?;

    let specs = expand_specs(&machine_spec(&args, &config), usize::from(args.count));
    let command = command_line(&args.command);
    let results = execute(app, &config, specs, &command, args.sudo).await?;

    if app.json {
        let out = serde_json::to_string_pretty(&results).context("cannot serialize results")?;
        println!("{out}");
        return Ok(());
    }
    for result in &results {
        app.output.success(&format!(
            "'{command}' exited {} on '{}' ({})",
            result.exit_code, result.name, result.ip
        ));
    }
    Ok(())
}

#[cfg(feature = "vsphere")]
async fn execute(
    app: &AppContext,
    config: &VcdriverConfig,
    specs: Vec<MachineSpec>,
    command: &str,
    use_sudo: bool,
) -> Result<Vec<CommandResult>> {
    use crate::application::services::run_batch::run_on_fresh_vms;
    use crate::infra::clock::TokioSleeper;
    use crate::infra::command_runner::TokioCommandRunner;
    use crate::infra::ssh::SshRemoteShell;
    use crate::infra::vsphere::VsphereSessions;
    use crate::output::TerminalReporter;

    let sessions = VsphereSessions::new(config.vsphere.clone());
    let shell = SshRemoteShell::new(TokioCommandRunner::default());
    let reporter = TerminalReporter::new(&app.output);
    run_on_fresh_vms(
        specs,
        command,
        use_sudo,
        &sessions,
        &shell,
        &TokioSleeper,
        &reporter,
    )
    .await
}

#[cfg(not(feature = "vsphere"))]
#[allow(clippy::unused_async)]
async fn execute(
    _app: &AppContext,
    _config: &VcdriverConfig,
    _specs: Vec<MachineSpec>,
    _command: &str,
    _use_sudo: bool,
) -> Result<Vec<CommandResult>> {
    anyhow::bail!("vcdriver was built without the `vsphere` feature")
}

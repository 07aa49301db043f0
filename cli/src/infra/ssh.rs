//! Infrastructure implementation of the `RemoteShell` port over the system
//! `ssh` client.
//!
//! Password authentication goes through `sshpass -e`, which reads the
//! password from `SSHPASS` so it never appears in the process list.

use anyhow::Result;

use crate::application::ports::{CommandRunner, RemoteOutcome, RemoteShell, RemoteTarget};

/// Options shared by every connection. Freshly cloned VMs have unknown,
/// frequently recycled host keys.
const SSH_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "LogLevel=ERROR",
];

/// `RemoteShell` that shells out to `ssh`, optionally wrapped in `sshpass`.
pub struct SshRemoteShell<R> {
    runner: R,
}

impl<R: CommandRunner> SshRemoteShell<R> {
    #[must_use]
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner> RemoteShell for SshRemoteShell<R> {
    async fn exec_remote(
        &self,
        target: &RemoteTarget<'_>,
        command: &str,
        elevate: bool,
    ) -> Result<RemoteOutcome> {
        let destination = format!("{}@{}", target.username, target.host);
        let remote = remote_command(command, elevate, target.password.is_some());

        let mut args: Vec<&str> = SSH_OPTIONS.to_vec();
        if target.password.is_none() {
            args.extend(["-o", "BatchMode=yes"]);
        }
        args.extend([destination.as_str(), "--", remote.as_str()]);

        let output = match target.password {
            Some(password) => {
                let mut sshpass_args = vec!["-e", "ssh"];
                sshpass_args.extend(&args);
                let stdin = elevate.then(|| format!("{password}\n"));
                self.runner
                    .run_with_env(
                        "sshpass",
                        &sshpass_args,
                        &[("SSHPASS", password)],
                        stdin.as_deref().map(str::as_bytes),
                    )
                    .await?
            }
            None => self.runner.run("ssh", &args).await?,
        };

        Ok(RemoteOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            failed: !output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// The command line executed on the remote host.
///
/// Elevated commands run through `sudo sh -c` so that shell syntax in
/// `command` is elevated as a whole. With a password, sudo reads it from
/// stdin with an empty prompt; without one, sudo must not prompt at all.
fn remote_command(command: &str, elevate: bool, has_password: bool) -> String {
    if !elevate {
        return command.to_string();
    }
    let sudo = if has_password { "sudo -S -p ''" } else { "sudo -n" };
    format!("{sudo} sh -c {}", shell_quote(command))
}

/// Single-quote `value` for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

//! Engine driver: the process boundary to the live packet filter
//!
//! This module owns the only code paths that spawn external processes.
//! Every invocation uses a fixed binary path and a fixed argument vector:
//! never a shell, never a value that did not pass through the sanitizers
//! and the ruleset builder. Rule text reaches the engine exclusively via
//! stdin of `iptables-restore`.
//!
//! All invocations run with a bounded deadline and fully captured
//! stdout/stderr. A timeout kills the child (the command handles are
//! created with `kill_on_drop`) and surfaces as a hard error.
//!
//! The [`Engine`] trait is the capability handle the orchestrator holds;
//! tests substitute a mock instead of touching the kernel.

use crate::core::counters::parse_counters;
use crate::core::error::{Error, Result};
use crate::core::rules::{Counter, FirewallConfig, NatRule, Rule};
use crate::core::ruleset::{build_filter_ruleset, build_nat_ruleset};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Deadline for state dumps and scalar toggles
const DUMP_TIMEOUT: Duration = Duration::from_secs(10);
/// Deadline for atomic table replacement
const RESTORE_TIMEOUT: Duration = Duration::from_secs(30);

/// Abstraction over the live packet-filtering engine.
///
/// Implementations must be atomic: a failed apply leaves the previous
/// table contents untouched, never a partially updated table.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Dumps the current live ruleset as engine-native text.
    async fn load(&self) -> Result<String>;

    /// Atomically replaces the filter table with the given rules,
    /// preserving counters where rules match by position.
    async fn apply(&self, rules: &[Rule]) -> Result<()>;

    /// Atomically replaces the nat table, or flushes it when `nat_rules`
    /// is empty so stale NAT state is fully removed.
    async fn apply_nat(&self, nat_rules: &[NatRule]) -> Result<()>;

    /// Applies scalar kernel toggles (IP forwarding). Best-effort and
    /// idempotent; failures are soft for the caller.
    async fn apply_config(&self, config: &FirewallConfig) -> Result<()>;

    /// Restores a previously captured snapshot verbatim. The text is a
    /// trusted prior dump, not operator input; no re-validation.
    async fn restore_raw(&self, snapshot: &str) -> Result<()>;

    /// Dumps the live state and parses traffic counters out of it.
    async fn counters(&self) -> Result<Vec<Counter>>;
}

/// Production [`Engine`] backed by the iptables userspace tools
pub struct IptablesEngine {
    save_bin: String,
    restore_bin: String,
    iptables_bin: String,
    sysctl_bin: String,
}

impl Default for IptablesEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IptablesEngine {
    pub fn new() -> Self {
        Self {
            save_bin: "/sbin/iptables-save".to_string(),
            restore_bin: "/sbin/iptables-restore".to_string(),
            iptables_bin: "/sbin/iptables".to_string(),
            sysctl_bin: "/sbin/sysctl".to_string(),
        }
    }

    /// Overrides the tool locations, for hosts that install iptables
    /// outside /sbin.
    pub fn with_binaries(
        save_bin: impl Into<String>,
        restore_bin: impl Into<String>,
        iptables_bin: impl Into<String>,
        sysctl_bin: impl Into<String>,
    ) -> Self {
        Self {
            save_bin: save_bin.into(),
            restore_bin: restore_bin.into(),
            iptables_bin: iptables_bin.into(),
            sysctl_bin: sysctl_bin.into(),
        }
    }

    /// Runs one fixed command with optional stdin, captured output, and a
    /// deadline. The child is killed if the deadline elapses.
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        stdin: Option<&str>,
        timeout: Duration,
    ) -> Result<std::process::Output> {
        let command_name = program.rsplit('/').next().unwrap_or(program).to_string();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Internal(format!("failed to spawn {command_name}: {e}"))
        })?;

        if let Some(input) = stdin {
            if let Some(mut handle) = child.stdin.take() {
                handle.write_all(input.as_bytes()).await?;
                handle.shutdown().await?;
            }
        }

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::EngineTimeout {
                command: command_name.clone(),
                timeout_secs: timeout.as_secs(),
            })??;

        if output.status.success() {
            Ok(output)
        } else {
            Err(Error::Engine {
                command: command_name,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                exit_code: output.status.code(),
            })
        }
    }

    /// Flushes the nat table when there are no rules to restore
    async fn flush_nat_table(&self) -> Result<()> {
        debug!("no NAT rules to apply, flushing nat table");
        self.run(
            &self.iptables_bin,
            &["-t", "nat", "-F"],
            None,
            DUMP_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Engine for IptablesEngine {
    async fn load(&self) -> Result<String> {
        let output = self.run(&self.save_bin, &[], None, DUMP_TIMEOUT).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn apply(&self, rules: &[Rule]) -> Result<()> {
        let ruleset = build_filter_ruleset(rules);
        debug!(lines = ruleset.lines().count(), "applying filter ruleset");

        self.run(
            &self.restore_bin,
            &["--counters"],
            Some(&ruleset),
            RESTORE_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn apply_nat(&self, nat_rules: &[NatRule]) -> Result<()> {
        if nat_rules.is_empty() {
            return self.flush_nat_table().await;
        }

        let ruleset = build_nat_ruleset(nat_rules);
        debug!(lines = ruleset.lines().count(), "applying NAT ruleset");

        self.run(
            &self.restore_bin,
            &["--counters"],
            Some(&ruleset),
            RESTORE_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    async fn apply_config(&self, config: &FirewallConfig) -> Result<()> {
        let value = if config.ip_forwarding { "1" } else { "0" };
        let arg = format!("net.ipv4.ip_forward={value}");

        // A rejected sysctl write is not worth failing policy updates over
        if let Err(e) = self
            .run(&self.sysctl_bin, &["-w", &arg], None, DUMP_TIMEOUT)
            .await
        {
            warn!(value, error = %e, "failed to set ip_forward via sysctl");
            return Err(e);
        }

        info!(ip_forwarding = config.ip_forwarding, "IP forwarding configuration applied");
        Ok(())
    }

    async fn restore_raw(&self, snapshot: &str) -> Result<()> {
        self.run(&self.restore_bin, &[], Some(snapshot), RESTORE_TIMEOUT)
            .await?;
        Ok(())
    }

    async fn counters(&self) -> Result<Vec<Counter>> {
        let raw = self.load().await?;
        Ok(parse_counters(&raw))
    }
}

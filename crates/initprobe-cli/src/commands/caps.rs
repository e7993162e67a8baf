//! Capability commands.
//!
//! - `initprobe caps resolve <NAME>...` - map names to bit positions
//! - `initprobe caps inspect <PID>` - show a process's capability sets
//! - `initprobe caps verify (--pid <PID> | --task <NAME>) [NAME]...` -
//!   require a process's effective set to equal the named set exactly
//!
//! Names resolve against the target's capability header unless `--header`
//! or `--static-table` says otherwise. A target without the header falls
//! back to the bundled table with a warning; an unreachable target is an
//! error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use initprobe_core::capability::{
    CapabilityResolver, CapabilitySet, CapabilityVerifier, DEFAULT_HEADER_PATH,
    HeaderCapabilityTable, ProcessCapabilityInspector, RemoteProcStatus, StaticCapabilityTable,
};
use initprobe_core::gateway::CommandGateway;
use initprobe_core::instance::InitInstance;
use serde::Serialize;
use tracing::warn;

use super::print_json;

/// Capability subcommands.
#[derive(Debug, Subcommand)]
pub enum CapsCommand {
    /// Resolve capability names to bit positions
    Resolve {
        #[command(flatten)]
        table: TableArgs,

        /// Capability names, e.g. CAP_NET_ADMIN or net_admin
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show the capability sets of a process
    Inspect {
        /// Process id
        pid: i64,
    },

    /// Require a process's effective capabilities to equal the named set
    Verify(VerifyArgs),
}

/// Where capability names are resolved.
#[derive(Debug, Args)]
pub struct TableArgs {
    /// Resolve against a local capability header
    #[arg(long, value_name = "PATH", conflicts_with = "static_table")]
    pub header: Option<PathBuf>,

    /// Resolve against the bundled table
    #[arg(long)]
    pub static_table: bool,
}

/// Arguments for `initprobe caps verify`.
#[derive(Debug, Args)]
pub struct VerifyArgs {
    #[command(flatten)]
    pub table: TableArgs,

    /// Process id to check
    #[arg(long, conflicts_with = "task", required_unless_present = "task")]
    pub pid: Option<i64>,

    /// Task whose current process to check
    #[arg(long)]
    pub task: Option<String>,

    /// Expected capability names; none means the empty set
    pub names: Vec<String>,
}

// ============================================================================
// Response Types for JSON output
// ============================================================================

/// One resolved name.
#[derive(Debug, Serialize)]
struct ResolvedName {
    name: String,
    bit: u32,
}

/// Response for `caps resolve`.
#[derive(Debug, Serialize)]
struct ResolveResponse {
    capabilities: Vec<ResolvedName>,
    mask: CapabilitySet,
}

/// Response for `caps verify`.
#[derive(Debug, Serialize)]
struct VerifyResponse {
    pid: Option<i64>,
    task: Option<String>,
    effective: CapabilitySet,
}

// ============================================================================
// Command execution
// ============================================================================

/// Runs a capability subcommand.
pub fn run_caps(cmd: &CapsCommand, instance: &InitInstance<'_>, json: bool) -> Result<()> {
    match cmd {
        CapsCommand::Resolve { table, names } => resolve(table, instance.gateway(), names, json),
        CapsCommand::Inspect { pid } => inspect(instance.gateway(), *pid, json),
        CapsCommand::Verify(args) => verify(args, instance, json),
    }
}

fn resolve(
    table: &TableArgs,
    gateway: &CommandGateway<'_>,
    names: &[String],
    json: bool,
) -> Result<()> {
    let resolver = table.resolver(gateway)?;
    let mut capabilities = Vec::with_capacity(names.len());
    for name in names {
        let bit = resolver.resolve(name)?;
        capabilities.push(ResolvedName {
            name: name.clone(),
            bit,
        });
    }
    let mask = resolver.assemble(names)?;

    if json {
        return print_json(&ResolveResponse { capabilities, mask });
    }
    for resolved in &capabilities {
        println!("{:<24} {}", resolved.name, resolved.bit);
    }
    println!("mask {mask}");
    Ok(())
}

fn inspect(gateway: &CommandGateway<'_>, pid: i64, json: bool) -> Result<()> {
    let inspector = ProcessCapabilityInspector::new(RemoteProcStatus::new(gateway.clone()));
    let caps = inspector
        .capabilities(pid)
        .with_context(|| format!("failed to inspect process {pid}"))?;
    if json {
        return print_json(&caps);
    }

    println!("CapEff: {}", describe_set(caps.effective));
    let optional = [
        ("CapPrm", caps.permitted),
        ("CapInh", caps.inheritable),
        ("CapBnd", caps.bounding),
        ("CapAmb", caps.ambient),
    ];
    for (label, set) in optional {
        if let Some(set) = set {
            println!("{label}: {}", describe_set(set));
        }
    }
    Ok(())
}

fn verify(args: &VerifyArgs, instance: &InitInstance<'_>, json: bool) -> Result<()> {
    let gateway = instance.gateway();
    let verifier = CapabilityVerifier::new(
        args.table.resolver(gateway)?,
        ProcessCapabilityInspector::new(RemoteProcStatus::new(gateway.clone())),
    );

    let effective = match (&args.task, args.pid) {
        (Some(task), _) => verifier
            .verify_task(&args.names, &instance.tasks(), task)
            .with_context(|| format!("capability check of task '{task}' failed"))?,
        (None, Some(pid)) => verifier
            .verify(&args.names, pid)
            .with_context(|| format!("capability check of process {pid} failed"))?,
        (None, None) => anyhow::bail!("either --pid or --task is required"),
    };

    if json {
        return print_json(&VerifyResponse {
            pid: args.pid,
            task: args.task.clone(),
            effective,
        });
    }
    println!("Capabilities match: {}", describe_set(effective));
    Ok(())
}

impl TableArgs {
    fn resolver(&self, gateway: &CommandGateway<'_>) -> Result<CapabilityResolver> {
        if self.static_table {
            return Ok(CapabilityResolver::new(StaticCapabilityTable));
        }
        if let Some(path) = &self.header {
            let table = HeaderCapabilityTable::from_file(path)
                .with_context(|| format!("failed to load capability header {}", path.display()))?;
            return Ok(CapabilityResolver::new(table));
        }

        match HeaderCapabilityTable::fetch(gateway, Path::new(DEFAULT_HEADER_PATH)) {
            Ok(table) if !table.is_empty() => Ok(CapabilityResolver::new(table)),
            Ok(_) => {
                warn!(
                    header = DEFAULT_HEADER_PATH,
                    "target header defines no capabilities, using bundled table"
                );
                Ok(CapabilityResolver::new(StaticCapabilityTable))
            },
            Err(err) if err.is_transport() => {
                Err(anyhow::Error::new(err).context("failed to fetch target capability header"))
            },
            Err(err) => {
                warn!(
                    header = DEFAULT_HEADER_PATH,
                    error = %err,
                    "cannot read target capability header, using bundled table"
                );
                Ok(CapabilityResolver::new(StaticCapabilityTable))
            },
        }
    }
}

fn describe_set(set: CapabilitySet) -> String {
    if set.is_empty() {
        return format!("{set} (none)");
    }
    let bits: Vec<String> = set.iter().map(|bit| bit.to_string()).collect();
    format!("{set} (bits {})", bits.join(", "))
}

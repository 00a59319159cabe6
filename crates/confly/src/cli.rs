//! Clap derive structures for the `confly` CLI.
//!
//! Defines the command tree, global flags, and shared argument groups.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// confly -- browse and edit RESTCONF devices
#[derive(Debug, Parser)]
#[command(
    name = "confly",
    version,
    about = "Read, edit and watch RESTCONF devices from the command line",
    long_about = "Talks RESTCONF to a device, addressing data by schema path.\n\n\
        Paths are relative to a module, e.g. `car engine/speed` or\n\
        `car tire=fl`. Access grants from the selected profile are enforced\n\
        locally before anything is sent.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "CONFLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// RESTCONF base URL (overrides profile)
    #[arg(long, short = 'u', env = "CONFLY_URL", global = true)]
    pub url: Option<String>,

    /// Wire format: strict or simplified (overrides profile)
    #[arg(long, env = "CONFLY_COMPLIANCE", global = true)]
    pub compliance: Option<String>,

    /// Directory searched for schema modules before the device
    #[arg(long, env = "CONFLY_SCHEMA_DIR", global = true)]
    pub schema_dir: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CONFLY_OUTPUT",
        default_value = "json",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "CONFLY_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "CONFLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read a container, list, list entry or leaf
    Get(TargetArgs),

    /// Merge data into an existing target (PUT)
    #[command(alias = "set")]
    Put(WriteArgs),

    /// Create a new target (POST)
    #[command(alias = "create")]
    Post(WriteArgs),

    /// Delete a container, list or list entry
    #[command(alias = "rm")]
    Delete(TargetArgs),

    /// Invoke an action or RPC
    #[command(alias = "call")]
    Invoke(InvokeArgs),

    /// Stream notifications until interrupted
    #[command(alias = "watch")]
    Subscribe(SubscribeArgs),
}

/// Module plus a path below it.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Schema module name
    pub module: String,

    /// Path below the module, e.g. `tire=fl/wear`
    #[arg(default_value = "")]
    pub path: String,
}

/// Inline JSON or a file holding it.
#[derive(Debug, Args)]
#[group(multiple = false)]
pub struct PayloadArgs {
    /// JSON payload
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Read the JSON payload from a file (`-` for stdin)
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Debug, Args)]
pub struct InvokeArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Debug, Args)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Stop after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

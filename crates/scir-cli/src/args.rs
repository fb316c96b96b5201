//! CLI argument parsing for scir.

use camino::Utf8PathBuf;
use clap::{Args as ClapArgs, Parser, Subcommand};
use scir_client::BackendKind;
use scir_core::JobTemplate;
use scir_parsers::{MemoryFormat, parse_duration_secs, parse_memory_mb};
use scir_ssh::{JumpHost, MasterKey, SshError, TunnelSpec, parse_destination};

#[derive(Parser, Debug)]
#[command(name = "scir", version)]
#[command(about = "Submit and control jobs on batch schedulers, local processes and cloud VMs")]
pub struct Args {
    /// JSON configuration file with `scheduler` and `ssh` sections
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Backend to drive (overrides the configuration file)
    #[arg(long, short, global = true)]
    pub backend: Option<BackendKind>,

    /// Log debug messages
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit a bash script and print the job ID
    Submit(SubmitArgs),
    /// Print the state of a job
    Status { job_id: String },
    Hold { job_id: String },
    Release { job_id: String },
    Suspend { job_id: String },
    Resume { job_id: String },
    Terminate { job_id: String },
    /// Print the used and total capacity of the backend
    Load,
    /// Manage a persistent SSH master connection
    Ssh(SshArgs),
}

fn parse_walltime(s: &str) -> Result<u64, String> {
    parse_duration_secs(s).ok_or_else(|| format!("'{}' is not a duration (SECONDS or [D-]HH:MM:SS)", s))
}

fn parse_memory(s: &str) -> Result<u64, String> {
    parse_memory_mb(s, MemoryFormat::Slurm).ok_or_else(|| format!("'{}' is not a memory size (e.g. 2000, 4G)", s))
}

#[derive(ClapArgs, Debug)]
pub struct SubmitArgs {
    /// Bash script to run
    pub script: String,

    #[arg(long)]
    pub name: Option<String>,

    /// Directory the job starts in
    #[arg(long)]
    pub workdir: Option<String>,

    #[arg(long)]
    pub stdout: Option<String>,

    #[arg(long)]
    pub stderr: Option<String>,

    /// Send stderr to the stdout file
    #[arg(long)]
    pub join: bool,

    #[arg(long)]
    pub queue: Option<String>,

    /// Wall time limit, as seconds or [D-]HH:MM:SS
    #[arg(long, value_parser = parse_walltime)]
    pub walltime: Option<u64>,

    /// Memory limit, in MB unless suffixed (K, M, G, T)
    #[arg(long, value_parser = parse_memory)]
    pub memory: Option<u64>,

    #[arg(long)]
    pub cores: Option<u32>,

    /// Extra arguments passed verbatim to the submission command
    #[arg(long, allow_hyphen_values = true)]
    pub extra: Option<String>,
}

impl SubmitArgs {
    /// Apply the options to `template`, keeping its values where none was given.
    pub fn apply(self, mut template: JobTemplate) -> JobTemplate {
        template.args = vec![self.script];
        template.name = self.name.or(template.name);
        template.working_dir = self.workdir.or(template.working_dir);
        template.stdout = self.stdout.or(template.stdout);
        template.stderr = self.stderr.or(template.stderr);
        template.join_stderr |= self.join;
        template.queue = self.queue.or(template.queue);
        template.walltime_seconds = self.walltime.or(template.walltime_seconds);
        template.memory_mb = self.memory.or(template.memory_mb);
        template.ncores = self.cores.or(template.ncores);
        template.extra_args = self.extra.or(template.extra_args);
        template
    }
}

#[derive(ClapArgs, Debug)]
pub struct SshArgs {
    /// Remote account, as [user@]host[:port]
    pub destination: String,

    /// Group the master's files under this sub-directory
    #[arg(long)]
    pub category: Option<String>,

    /// Tell apart several masters to the same account
    #[arg(long)]
    pub uniq: Option<String>,

    /// Intermediate host, as [user@]host[:port]
    #[arg(long)]
    pub jump: Option<String>,

    /// Forward tunnel: [bind:]port:host:port, with socket paths allowed on either side
    #[arg(long, value_name = "SPEC")]
    pub forward: Vec<TunnelSpec>,

    /// Reverse tunnel, same syntax as --forward
    #[arg(long, value_name = "SPEC")]
    pub reverse: Vec<TunnelSpec>,

    /// Connect without a control master
    #[arg(long)]
    pub nomaster: bool,

    /// Do not keep a diagnostics log for the master
    #[arg(long)]
    pub no_diag: bool,

    #[command(subcommand)]
    pub action: SshAction,
}

#[derive(Subcommand, Debug)]
pub enum SshAction {
    /// Start the master unless it already runs
    Start {
        /// Exported to the remote side with SendEnv
        #[arg(long)]
        label: Option<String>,
    },
    Stop,
    /// Check that the master answers
    Alive {
        /// Only check the socket and the process, without a round trip
        #[arg(long)]
        quick: bool,
    },
    /// Run a command on the remote host through the master
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

impl SshArgs {
    pub fn master_key(&self, default_user: &str) -> Result<MasterKey, SshError> {
        parse_destination(&self.destination, default_user)?
            .with_category(self.category.as_deref())?
            .with_uniq(self.uniq.as_deref())
    }

    pub fn jump_host(&self, default_user: &str) -> Result<Option<JumpHost>, SshError> {
        let Some(jump) = &self.jump else {
            return Ok(None);
        };
        let key = parse_destination(jump, default_user)?;
        JumpHost::new(key.user(), key.host(), u32::from(key.port())).map(Some)
    }
}

//! scir - submit and control jobs on batch schedulers, local processes and
//! cloud VMs, and manage SSH masters to the hosts running them.

use clap::Parser;
use miette::{IntoDiagnostic, Result, miette};
use scir_cli::{Args, Command, FileConfig, SshAction, SshArgs};
use scir_client::{BackendKind, SchedulerClient};
use scir_core::JobAction;
use scir_ssh::{RemoteCommandOptions, TunnelDirection};
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let file = FileConfig::load(args.config.as_deref()).into_diagnostic()?;
    let kind = args.backend.or(file.backend).unwrap_or(BackendKind::Unix);
    tracing::debug!(backend = %kind, config = ?args.config, "loaded configuration");
    let client = SchedulerClient::new(file.scheduler, file.ssh);

    let action = match args.command {
        Command::Submit(submit) => {
            let template = client.job_template(submit.script.clone());
            let template = submit.apply(template);
            let session = client.session(kind);
            let job_id = session.lock().await.run(&template).await.into_diagnostic()?;
            println!("{}", job_id);
            return Ok(());
        }
        Command::Status { job_id } => {
            let session = client.session(kind);
            let state = session.lock().await.job_ps(&job_id, None).await.into_diagnostic()?;
            println!("{}", state);
            return Ok(());
        }
        Command::Load => {
            let session = client.session(kind);
            let load = session.lock().await.queue_tasks_tot_max().await;
            println!("{}", load);
            return Ok(());
        }
        Command::Ssh(ssh) => return run_ssh(&client, ssh).await,
        Command::Hold { job_id } => (JobAction::Hold, job_id),
        Command::Release { job_id } => (JobAction::Release, job_id),
        Command::Suspend { job_id } => (JobAction::Suspend, job_id),
        Command::Resume { job_id } => (JobAction::Resume, job_id),
        Command::Terminate { job_id } => (JobAction::Terminate, job_id),
    };

    let (action, job_id) = action;
    let session = client.session(kind);
    session
        .lock()
        .await
        .control(action, &job_id)
        .await
        .into_diagnostic()?;
    println!("{} {}: ok", action, job_id);
    Ok(())
}

async fn run_ssh(client: &SchedulerClient, args: SshArgs) -> Result<()> {
    let user = client.config().user.clone();
    let key = args.master_key(&user).into_diagnostic()?;
    let jump = args.jump_host(&user).into_diagnostic()?;

    let mut masters = client.masters().lock().await;
    let master = masters.find_or_create(key, args.nomaster).into_diagnostic()?;
    master.set_no_diag(args.no_diag);
    master.set_jump_host(jump);
    for spec in args.forward {
        master.add_tunnel(TunnelDirection::Forward, spec).into_diagnostic()?;
    }
    for spec in args.reverse {
        master.add_tunnel(TunnelDirection::Reverse, spec).into_diagnostic()?;
    }

    match args.action {
        SshAction::Start { label } => {
            if !master.start(label.as_deref()).await.into_diagnostic()? {
                return Err(miette!("SSH master for {} did not start", master.key()));
            }
            match master.pid() {
                Some(pid) => println!("{} running as PID {}", master.key(), pid),
                None => println!("{} ready", master.key()),
            }
        }
        SshAction::Stop => {
            if master.stop().await {
                println!("{} stopped", master.key());
            } else {
                println!("{} was not running", master.key());
            }
        }
        SshAction::Alive { quick } => {
            let alive = if quick {
                master.quick_is_alive()
            } else {
                master.is_alive().await
            };
            if !alive {
                return Err(miette!("SSH master for {} is not alive", master.key()));
            }
            println!("{} alive", master.key());
        }
        SshAction::Exec { command } => {
            if !master.start(None).await.into_diagnostic()? {
                return Err(miette!("SSH master for {} did not start", master.key()));
            }
            let status = master
                .run_remote_shell_command(&command.join(" "), &RemoteCommandOptions::default())
                .await
                .into_diagnostic()?;
            if !status.success() {
                return Err(miette!("remote command failed: {}", status));
            }
        }
    }
    Ok(())
}

//! One persistent `ssh -M` connection, shared by every later ssh invocation
//! to the same key through its control socket.
//!
//! The master runs detached from this process. The control socket and the
//! pidfile are the durable record of it: a new [`SshMaster`] for the same
//! key finds a running master through them, even after a restart. While a
//! master is being launched its pidfile holds `0`.

use crate::paths::{control_path, diagnostics_path, pidfile_path};
use crate::{JumpHost, MasterKey, SshConfig, SshError, TunnelDirection, TunnelSpec};
use camino::{Utf8Path, Utf8PathBuf};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use scir_parsers::shell_escape;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEV_NULL: &str = "/dev/null";

/// Local files for a remote command's standard streams.
#[derive(Debug, Clone, Default)]
pub struct RemoteCommandOptions {
    pub stdin: Option<String>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    /// Append to `stdout` instead of truncating it
    pub stdout_append: bool,
    pub stderr_append: bool,
    /// Pass `-t` to ssh
    pub force_pseudo_tty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pipe {
    /// The caller reads the remote command's stdout
    Reader,
    /// The caller writes the remote command's stdin
    Writer,
}

fn redirection(fd: u8, op: &str, file: Option<&str>, append: bool) -> Option<String> {
    let file = file?;
    let op = if append && op == ">" { ">>" } else { op };
    Some(format!("{}{}{}", fd, op, shell_escape(file)))
}

fn process_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// HUP, then TERM after a grace period. Either may find the process gone.
async fn terminate(pid: i32, grace: Duration) {
    let pid = Pid::from_raw(pid);
    if kill(pid, Signal::SIGHUP).is_err() {
        return;
    }
    sleep(grace).await;
    kill(pid, Signal::SIGTERM).ok();
}

/// Labels end up in an `-o SendEnv=` option.
fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '+'))
}

#[derive(Debug, PartialEq, Eq)]
enum PidfileState {
    Missing,
    /// Another process is launching the master
    Starting,
    Running(i32),
    Stale,
}

fn inspect_pidfile(path: &Utf8Path) -> PidfileState {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return PidfileState::Missing;
    };
    match contents.trim().parse::<i32>() {
        Ok(0) => PidfileState::Starting,
        Ok(pid) if pid > 0 && process_alive(pid) => PidfileState::Running(pid),
        _ => PidfileState::Stale,
    }
}

#[derive(Debug)]
pub struct SshMaster {
    key: MasterKey,
    config: Arc<SshConfig>,
    control_path: Utf8PathBuf,
    pidfile: Utf8PathBuf,
    /// Plain ssh connections, no control socket
    nomaster: bool,
    no_diag: bool,
    pid: Option<i32>,
    forward: Vec<TunnelSpec>,
    reverse: Vec<TunnelSpec>,
    jump_host: Option<JumpHost>,
}

impl SshMaster {
    /// Only the registry builds masters, so that a key has at most one.
    pub(crate) fn new(key: MasterKey, config: Arc<SshConfig>, nomaster: bool) -> Result<Self, SshError> {
        let control_path = control_path(&config, &key)?;
        let pidfile = pidfile_path(&config, &key, &control_path)?;
        let mut master = Self {
            key,
            config,
            control_path,
            pidfile,
            nomaster,
            no_diag: false,
            pid: None,
            forward: Vec::new(),
            reverse: Vec::new(),
            jump_host: None,
        };
        if master.read_pidfile().is_some() {
            tracing::debug!(key = %master.key, pid = master.pid, "found running SSH master");
        }
        Ok(master)
    }

    pub fn key(&self) -> &MasterKey {
        &self.key
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    pub fn is_nomaster(&self) -> bool {
        self.nomaster
    }

    pub fn control_path(&self) -> &Utf8Path {
        &self.control_path
    }

    pub fn pidfile_path(&self) -> &Utf8Path {
        &self.pidfile
    }

    /// The master's log, or `/dev/null` when diagnostics are off.
    pub fn diagnostics_path(&self) -> Utf8PathBuf {
        if self.no_diag {
            Utf8PathBuf::from(DEV_NULL)
        } else {
            diagnostics_path(&self.pidfile)
        }
    }

    pub fn set_no_diag(&mut self, no_diag: bool) {
        self.no_diag = no_diag;
    }

    pub fn set_jump_host(&mut self, jump_host: Option<JumpHost>) {
        self.jump_host = jump_host;
    }

    /// Register a tunnel, carried by the master from its next start.
    pub fn add_tunnel(&mut self, direction: TunnelDirection, spec: TunnelSpec) -> Result<(), SshError> {
        spec.validate(direction)?;
        let tunnels = match direction {
            TunnelDirection::Forward => &mut self.forward,
            TunnelDirection::Reverse => &mut self.reverse,
        };
        if tunnels.iter().any(|t| t.accept == spec.accept) {
            return Err(SshError::DuplicateTunnel {
                direction: direction.as_str(),
                endpoint: spec.accept.to_string(),
            });
        }
        tunnels.push(spec);
        Ok(())
    }

    pub fn get_tunnels(&self, direction: TunnelDirection) -> &[TunnelSpec] {
        match direction {
            TunnelDirection::Forward => &self.forward,
            TunnelDirection::Reverse => &self.reverse,
        }
    }

    pub fn tunnel_specs(&self, direction: TunnelDirection) -> Vec<String> {
        self.get_tunnels(direction).iter().map(ToString::to_string).collect()
    }

    pub fn delete_tunnels(&mut self, direction: TunnelDirection) {
        match direction {
            TunnelDirection::Forward => self.forward.clear(),
            TunnelDirection::Reverse => self.reverse.clear(),
        }
    }

    /// Refresh `pid` from the pidfile. A master counts only when both its
    /// socket and a live pid exist; otherwise a leftover pidfile is removed.
    pub fn read_pidfile(&mut self) -> Option<i32> {
        self.pid = None;
        if self.nomaster {
            return None;
        }
        let state = inspect_pidfile(&self.pidfile);
        if !self.control_path.exists() {
            if matches!(state, PidfileState::Running(_) | PidfileState::Stale) {
                self.remove_pidfile();
            }
            return None;
        }
        match state {
            PidfileState::Running(pid) => {
                self.pid = Some(pid);
                self.pid
            }
            PidfileState::Stale => {
                self.remove_pidfile();
                None
            }
            PidfileState::Missing | PidfileState::Starting => None,
        }
    }

    fn remove_pidfile(&self) {
        match std::fs::remove_file(&self.pidfile) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                tracing::warn!(path = %self.pidfile, "cannot remove pidfile: {}", e);
            }
            _ => {}
        }
    }

    /// Create the pidfile holding `0`, unless it already exists.
    fn try_claim(&self) -> Result<bool, SshError> {
        let opened = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&self.pidfile);
        match opened {
            Ok(mut file) => {
                file.write_all(b"0")
                    .map_err(|e| SshError::io("writing", self.pidfile.as_std_path(), e))?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(SshError::io("creating", self.pidfile.as_std_path(), e)),
        }
    }

    /// Take the right to launch the master. When another process holds it,
    /// wait for that launch to finish; false means that other master is
    /// the one to use (`pid` is set) or that the claim was lost.
    async fn claim_pidfile(&mut self) -> Result<bool, SshError> {
        if self.try_claim()? {
            return Ok(true);
        }
        let deadline = Instant::now() + self.config.spawn_wait();
        while inspect_pidfile(&self.pidfile) == PidfileState::Starting && Instant::now() < deadline {
            sleep(POLL_INTERVAL).await;
        }
        if self.read_pidfile().is_some() {
            return Ok(false);
        }
        // The other launch failed or was abandoned.
        self.remove_pidfile();
        self.try_claim()
    }

    fn open_diagnostics(&self) -> Result<File, SshError> {
        let path = self.diagnostics_path();
        OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o600)
            .open(&path)
            .map_err(|e| SshError::io("opening", path.as_std_path(), e))
    }

    fn log_diagnostics(&self, message: &str) {
        if self.no_diag {
            return;
        }
        let written = self
            .open_diagnostics()
            .map_err(|e| e.to_string())
            .and_then(|mut file| writeln!(file, "{}", message).map_err(|e| e.to_string()));
        if let Err(e) = written {
            tracing::debug!(key = %self.key, "cannot write diagnostics: {}", e);
        }
    }

    /// Options shared by the master and every command run through it, ending
    /// with the `user@host` destination.
    pub fn ssh_shared_options(&self, control_master: &str) -> Vec<String> {
        let mut args = vec!["-p".to_string(), self.key.port().to_string(), "-A".to_string()];
        let options = [
            "BatchMode=yes",
            "PasswordAuthentication=no",
            "KbdInteractiveAuthentication=no",
            "KbdInteractiveDevices=none",
        ]
        .into_iter()
        .map(str::to_string)
        .chain(self.config.master_options.iter().cloned());
        for option in options {
            args.push("-o".to_string());
            args.push(option);
        }
        if !self.nomaster {
            args.push("-o".to_string());
            args.push(format!("ControlMaster={}", control_master));
            args.push("-o".to_string());
            args.push(format!("ControlPath={}", self.control_path));
        }
        if let Some(jump) = &self.jump_host {
            args.push("-J".to_string());
            args.push(jump.to_string());
        }
        args.push(self.key.destination());
        args
    }

    /// Arguments of the long-lived `ssh -M` process.
    pub fn master_args(&self, label: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = ["-q", "-n", "-N", "-x", "-M"].map(str::to_string).to_vec();
        if let Some(label) = label.filter(|l| valid_label(l)) {
            args.push("-o".to_string());
            args.push(format!("SendEnv={}", label));
        }
        for direction in [TunnelDirection::Forward, TunnelDirection::Reverse] {
            for spec in self.tunnel_specs(direction) {
                args.push(direction.flag().to_string());
                args.push(spec);
            }
        }
        args.extend(self.ssh_shared_options("yes"));
        args
    }

    /// Launch the master unless one already runs for this key. Returns
    /// whether a master is running afterwards.
    pub async fn start(&mut self, label: Option<&str>) -> Result<bool, SshError> {
        if self.nomaster {
            return Ok(true);
        }
        if self.read_pidfile().is_some() {
            return Ok(true);
        }
        if !self.claim_pidfile().await? {
            return Ok(self.pid.is_some());
        }

        std::fs::remove_file(&self.control_path).ok();
        let diagnostics = self.open_diagnostics()?;
        let stderr = diagnostics
            .try_clone()
            .map_err(|e| SshError::io("opening", self.diagnostics_path().as_std_path(), e))?;

        let mut cmd = Command::new(&self.config.ssh_program);
        cmd.args(self.master_args(label))
            .stdin(Stdio::null())
            .stdout(diagnostics)
            .stderr(stderr)
            .process_group(0);
        tracing::debug!(key = %self.key, "spawning {} {:?}", self.config.ssh_program, cmd.as_std().get_args().collect::<Vec<_>>());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.remove_pidfile();
                return Err(SshError::Spawn(e));
            }
        };
        let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
            self.remove_pidfile();
            return Ok(false);
        };
        self.log_diagnostics(&format!(
            "Starting Master {} at {} as PID {}",
            self.key,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S %z"),
            pid
        ));
        std::fs::write(&self.pidfile, pid.to_string())
            .map_err(|e| SshError::io("writing", self.pidfile.as_std_path(), e))?;

        let deadline = Instant::now() + self.config.spawn_wait();
        while !self.control_path.exists()
            && Instant::now() < deadline
            && matches!(child.try_wait(), Ok(None))
        {
            sleep(POLL_INTERVAL).await;
        }
        // The master outlives this handle; the runtime reaps it when it exits.
        drop(child);

        if self.read_pidfile().is_some() {
            tracing::info!(key = %self.key, pid, "started SSH master");
            return Ok(true);
        }
        tracing::warn!(key = %self.key, pid, "SSH master did not come up");
        terminate(pid, self.config.stop_grace()).await;
        self.remove_pidfile();
        Ok(false)
    }

    /// Stop the running master. Returns false when there was none.
    pub async fn stop(&mut self) -> bool {
        if self.nomaster {
            return true;
        }
        let Some(pid) = self.read_pidfile() else {
            return false;
        };
        self.log_diagnostics(&format!(
            "Stopping Master {} at {}",
            self.key,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S %z")
        ));
        tracing::info!(key = %self.key, pid, "stopping SSH master");
        terminate(pid, self.config.stop_grace()).await;
        self.pid = None;
        self.remove_pidfile();
        std::fs::remove_file(&self.control_path).ok();
        true
    }

    /// Socket present and master process alive, without touching the network.
    pub fn quick_is_alive(&mut self) -> bool {
        if self.nomaster {
            return true;
        }
        let is_socket = std::fs::metadata(&self.control_path)
            .map(|m| m.file_type().is_socket())
            .unwrap_or(false);
        is_socket && self.read_pidfile().is_some()
    }

    /// Round-trip a marker through the connection. A probe that does not
    /// answer within `is_alive_timeout` is killed and the master stopped.
    pub async fn is_alive(&mut self) -> bool {
        if !self.quick_is_alive() {
            return false;
        }
        let marker = format!("OK-{}", std::process::id());
        let mut cmd = Command::new(&self.config.ssh_program);
        cmd.args(["-q", "-x", "-n"])
            .args(self.ssh_shared_options("no"))
            .arg(format!("echo {}", marker))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        let probe = match cmd.spawn() {
            Ok(probe) => probe,
            Err(e) => {
                tracing::warn!(key = %self.key, "cannot launch aliveness probe: {}", e);
                return false;
            }
        };

        match tokio::time::timeout(self.config.is_alive_timeout(), probe.wait_with_output()).await {
            Ok(Ok(output)) => String::from_utf8_lossy(&output.stdout).contains(&marker),
            Ok(Err(e)) => {
                tracing::warn!(key = %self.key, "aliveness probe failed: {}", e);
                false
            }
            Err(_) => {
                tracing::warn!(key = %self.key, "aliveness probe timed out, stopping master");
                self.stop().await;
                false
            }
        }
    }

    fn remote_command_line(&self, command: &str, options: &RemoteCommandOptions, pipe: Option<Pipe>) -> String {
        let stdin = redirection(0, "<", options.stdin.as_deref(), false);
        let stdout = redirection(1, ">", options.stdout.as_deref(), options.stdout_append);
        let stderr = redirection(2, ">", options.stderr.as_deref(), options.stderr_append);

        let mut words = vec![shell_escape(&self.config.ssh_program), "-q".to_string(), "-x".to_string()];
        if options.stdin.as_deref() == Some(DEV_NULL) {
            words.push("-n".to_string());
        }
        if options.force_pseudo_tty {
            words.push("-t".to_string());
        }
        words.extend(self.ssh_shared_options("no").iter().map(|w| shell_escape(w)));
        words.push(shell_escape(command));
        words.extend(stderr);
        if pipe != Some(Pipe::Reader) {
            words.extend(stdout);
        }
        if pipe != Some(Pipe::Writer) {
            words.extend(stdin);
        }
        words.join(" ")
    }

    fn spawn_remote(&self, command: &str, options: &RemoteCommandOptions, pipe: Option<Pipe>) -> Result<Child, SshError> {
        let line = self.remote_command_line(command, options, pipe);
        tracing::debug!(key = %self.key, "remote command: {}", line);
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&line);
        // Streams without a pipe or a redirection are inherited.
        match pipe {
            Some(Pipe::Reader) => cmd.stdout(Stdio::piped()),
            Some(Pipe::Writer) => cmd.stdin(Stdio::piped()),
            None => &mut cmd,
        };
        cmd.spawn().map_err(SshError::Spawn)
    }

    /// Run `command` remotely; its stdout is available from the child.
    pub fn remote_shell_command_reader(
        &self,
        command: &str,
        options: &RemoteCommandOptions,
    ) -> Result<Child, SshError> {
        self.spawn_remote(command, options, Some(Pipe::Reader))
    }

    /// Run `command` remotely, fed from the child's stdin.
    pub fn remote_shell_command_writer(
        &self,
        command: &str,
        options: &RemoteCommandOptions,
    ) -> Result<Child, SshError> {
        self.spawn_remote(command, options, Some(Pipe::Writer))
    }

    /// Run `command` remotely with file redirections only, and wait for it.
    pub async fn run_remote_shell_command(
        &self,
        command: &str,
        options: &RemoteCommandOptions,
    ) -> Result<ExitStatus, SshError> {
        let mut child = self.spawn_remote(command, options, None)?;
        child.wait().await.map_err(SshError::Spawn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{config_in, fake_ssh};
    use std::os::unix::net::UnixListener;

    fn master(config: &Arc<SshConfig>, nomaster: bool) -> SshMaster {
        let key = MasterKey::new("alice", "hpc.example.org", 2222).unwrap();
        SshMaster::new(key, Arc::clone(config), nomaster).unwrap()
    }

    #[test]
    fn test_tunnels() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(&dir));
        let mut m = master(&config, false);

        m.add_tunnel(TunnelDirection::Forward, TunnelSpec::tcp(8080, "db", 5432)).unwrap();
        m.add_tunnel(TunnelDirection::Reverse, "9000:localhost:9000".parse().unwrap())
            .unwrap();
        assert!(matches!(
            m.add_tunnel(TunnelDirection::Forward, TunnelSpec::tcp(8080, "web", 80)),
            Err(SshError::DuplicateTunnel { .. })
        ));
        // The same accept port in the other direction is fine.
        m.add_tunnel(TunnelDirection::Reverse, TunnelSpec::tcp(8080, "web", 80)).unwrap();

        assert_eq!(m.tunnel_specs(TunnelDirection::Forward), vec!["8080:db:5432"]);
        assert_eq!(m.get_tunnels(TunnelDirection::Reverse).len(), 2);

        let args = m.master_args(Some("PORTAL_ID"));
        let joined = args.join(" ");
        assert!(joined.starts_with("-q -n -N -x -M -o SendEnv=PORTAL_ID -L 8080:db:5432 -R 9000:localhost:9000"));
        assert!(joined.contains("-o ControlMaster=yes"));
        assert!(joined.ends_with("alice@hpc.example.org"));

        m.delete_tunnels(TunnelDirection::Reverse);
        assert!(m.get_tunnels(TunnelDirection::Reverse).is_empty());
        assert!(!m.master_args(Some("bad label")).join(" ").contains("SendEnv"));
    }

    #[test]
    fn test_shared_options() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(&dir));
        let mut m = master(&config, false);
        m.set_jump_host(Some(JumpHost::new("gate", "bastion", 22).unwrap()));

        let args = m.ssh_shared_options("no");
        assert_eq!(&args[..3], ["-p", "2222", "-A"]);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=10".to_string()));
        assert!(args.contains(&format!("ControlPath={}", m.control_path())));
        assert_eq!(&args[args.len() - 3..], ["-J", "gate@bastion:22", "alice@hpc.example.org"]);

        let plain = master(&config, true).ssh_shared_options("no");
        assert!(!plain.iter().any(|a| a.starts_with("ControlPath")));
    }

    #[test]
    fn test_remote_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(SshConfig {
            master_options: Vec::new(),
            ..config_in(&dir)
        });
        let m = master(&config, true);
        let options = RemoteCommandOptions {
            stdin: Some(DEV_NULL.to_string()),
            stdout: Some("/tmp/out".to_string()),
            stderr: Some("/tmp/err".to_string()),
            stderr_append: true,
            ..Default::default()
        };
        let prefix = format!(
            "{} -q -x -n '-p' '2222' '-A' '-o' 'BatchMode=yes' '-o' 'PasswordAuthentication=no' \
             '-o' 'KbdInteractiveAuthentication=no' '-o' 'KbdInteractiveDevices=none' \
             'alice@hpc.example.org' 'ls -l' 2>>'/tmp/err'",
            shell_escape(&config.ssh_program)
        );
        assert_eq!(
            m.remote_command_line("ls -l", &options, None),
            format!("{} 1>'/tmp/out' 0<'/dev/null'", prefix)
        );
        assert_eq!(
            m.remote_command_line("ls -l", &options, Some(Pipe::Reader)),
            format!("{} 0<'/dev/null'", prefix)
        );
        assert_eq!(
            m.remote_command_line("ls -l", &options, Some(Pipe::Writer)),
            format!("{} 1>'/tmp/out'", prefix)
        );
    }

    #[tokio::test]
    async fn test_nomaster_is_trivially_running() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(&dir));
        let mut m = master(&config, true);
        assert!(m.start(None).await.unwrap());
        assert!(m.quick_is_alive());
        assert!(m.stop().await);
        assert_eq!(m.pid(), None);
    }

    #[test]
    fn test_reattach_to_running_master() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(&dir));
        let first = master(&config, false);

        let _socket = UnixListener::bind(first.control_path()).unwrap();
        std::fs::write(first.pidfile_path(), std::process::id().to_string()).unwrap();

        let mut second = master(&config, false);
        assert_eq!(second.pid(), Some(std::process::id() as i32));
        assert!(second.quick_is_alive());
    }

    #[test]
    fn test_stale_pidfile_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(&dir));
        let mut m = master(&config, false);

        std::fs::write(m.pidfile_path(), "99999999").unwrap();
        assert_eq!(m.read_pidfile(), None);
        assert!(!m.pidfile_path().exists());

        // A launch in progress elsewhere keeps its claim.
        std::fs::write(m.pidfile_path(), "0").unwrap();
        assert_eq!(m.read_pidfile(), None);
        assert!(m.pidfile_path().exists());
        assert!(!m.quick_is_alive());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config_in(&dir));
        let mut m = master(&config, false);
        m.add_tunnel(TunnelDirection::Forward, TunnelSpec::tcp(8080, "db", 5432)).unwrap();

        assert!(m.start(Some("PORTAL")).await.unwrap());
        let pid = m.pid().unwrap();
        assert!(process_alive(pid));
        assert_eq!(std::fs::read_to_string(m.pidfile_path()).unwrap(), pid.to_string());

        let log = std::fs::read_to_string(m.diagnostics_path()).unwrap();
        assert!(log.contains(&format!("Starting Master {}", m.key())));
        assert!(log.contains("-L 8080:db:5432"));

        // Starting again attaches to the same process.
        assert!(m.start(None).await.unwrap());
        assert_eq!(m.pid(), Some(pid));

        assert!(m.stop().await);
        assert!(!m.pidfile_path().exists());
        assert!(!m.control_path().exists());
        let log = std::fs::read_to_string(m.diagnostics_path()).unwrap();
        assert!(log.contains("Stopping Master"));
        assert!(!m.stop().await);
    }

    #[tokio::test]
    async fn test_failed_start_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        fake_ssh(&dir, "exec sleep 30");
        let config = Arc::new(SshConfig {
            spawn_wait_secs: 1,
            stop_grace_secs: 0,
            ..config_in(&dir)
        });
        let mut m = master(&config, false);
        assert!(!m.start(None).await.unwrap());
        assert!(!m.pidfile_path().exists());
        assert_eq!(m.pid(), None);
    }

    #[tokio::test]
    async fn test_is_alive() {
        let dir = tempfile::tempdir().unwrap();
        // Run the remote command locally.
        fake_ssh(&dir, "eval \"${@: -1}\"");
        let config = Arc::new(config_in(&dir));
        let mut m = master(&config, true);
        assert!(m.is_alive().await);

        fake_ssh(&dir, "echo 'Connection refused'");
        assert!(!m.is_alive().await);
    }

    #[tokio::test]
    async fn test_hung_probe_stops_master() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(SshConfig {
            is_alive_timeout_secs: 1,
            stop_grace_secs: 0,
            ..config_in(&dir)
        });
        let mut m = master(&config, false);
        assert!(m.start(None).await.unwrap());

        std::fs::remove_file(m.control_path()).unwrap();
        let _socket = UnixListener::bind(m.control_path()).unwrap();
        // Later invocations hang instead of answering.
        fake_ssh(&dir, "exec sleep 30");
        assert!(!m.is_alive().await);
        assert!(!m.pidfile_path().exists());
    }

    #[tokio::test]
    async fn test_remote_commands() {
        let dir = tempfile::tempdir().unwrap();
        fake_ssh(&dir, "eval \"${@: -1}\"");
        let config = Arc::new(config_in(&dir));
        let m = master(&config, true);

        let out = dir.path().join("out.txt");
        let options = RemoteCommandOptions {
            stdout: Some(out.to_str().unwrap().to_string()),
            ..Default::default()
        };
        let status = m.run_remote_shell_command("echo hello", &options).await.unwrap();
        assert!(status.success());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\n");

        let append = RemoteCommandOptions {
            stdout_append: true,
            ..options
        };
        m.run_remote_shell_command("echo again", &append).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\nagain\n");

        let reader = m
            .remote_shell_command_reader("echo streamed", &RemoteCommandOptions::default())
            .unwrap();
        let output = reader.wait_with_output().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout), "streamed\n");

        let mut writer = m
            .remote_shell_command_writer("cat", &append)
            .unwrap();
        {
            use tokio::io::AsyncWriteExt;
            let mut stdin = writer.stdin.take().unwrap();
            stdin.write_all(b"piped\n").await.unwrap();
        }
        writer.wait().await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello\nagain\npiped\n");
    }
}

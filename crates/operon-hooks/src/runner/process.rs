use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Environment variables every hook sees, all pointing at the project directory
pub const PROJECT_DIR_VARS: [&str; 3] =
    ["OPERON_PROJECT_DIR", "GEMINI_PROJECT_DIR", "CLAUDE_PROJECT_DIR"];

/// How a hook process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookExit {
    Code { code: i32 },
    /// Killed by a signal it did not ask for
    Signal { signal: i32 },
    TimedOut,
    /// Could not be spawned or waited on
    Error,
}

impl HookExit {
    /// Numeric exit code when the process exited normally. Never fabricated.
    pub fn display_code(&self) -> Option<i32> {
        match self {
            HookExit::Code { code } => Some(*code),
            _ => None,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return HookExit::Code { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return HookExit::Signal { signal };
            }
        }
        HookExit::Error
    }
}

/// Captured result of one child process
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit: HookExit,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Terminating,
    Killed,
}

#[derive(Debug, Clone, Copy)]
enum Escalation {
    Terminate,
    Kill,
}

/// Run `command` through `sh -c` in `cwd`, feeding `input` on stdin.
///
/// On timeout the whole process group gets SIGTERM, then SIGKILL after
/// `grace`. If even that does not release the pipes within another `grace`,
/// the process is abandoned with whatever output was captured.
pub async fn run(
    command: &str,
    cwd: &Path,
    input: String,
    timeout: Duration,
    grace: Duration,
) -> std::io::Result<ProcessOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(expand_project_dir(command, cwd))
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for var in PROJECT_DIR_VARS {
        cmd.env(var, cwd);
    }
    // Own group so a timeout reaches grandchildren holding our pipes
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child.id();
    debug!(command, pid, "Hook process spawned");

    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                // Hooks that never read stdin close it early
                if e.kind() != ErrorKind::BrokenPipe {
                    debug!(error = %e, "Failed to write hook input");
                }
            }
            let _ = stdin.shutdown().await;
        });
    }

    let (stdout_task, stdout) = capture(child.stdout.take());
    let (stderr_task, stderr) = capture(child.stderr.take());
    let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

    let completion = async move {
        let status = child.wait().await;
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        status
    };
    tokio::pin!(completion);

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let mut phase = Phase::Running;

    let status = loop {
        tokio::select! {
            done = &mut completion => break done,
            () = &mut deadline => {
                phase = match phase {
                    Phase::Running => {
                        warn!(command, timeout_ms = timeout.as_millis() as u64, "Hook timed out, terminating");
                        signal_group(pid, Escalation::Terminate);
                        Phase::Terminating
                    }
                    Phase::Terminating => {
                        warn!(command, "Hook ignored SIGTERM, killing");
                        signal_group(pid, Escalation::Kill);
                        Phase::Killed
                    }
                    Phase::Killed => {
                        warn!(command, "Hook did not exit after SIGKILL, abandoning it");
                        readers.iter().for_each(|reader| reader.abort());
                        return Ok(ProcessOutput {
                            exit: HookExit::TimedOut,
                            stdout: drain(&stdout),
                            stderr: drain(&stderr),
                        });
                    }
                };
                deadline.as_mut().reset(Instant::now() + grace);
            }
        }
    };

    let exit = match (phase, status) {
        (Phase::Running, Ok(status)) => HookExit::from_status(status),
        (Phase::Running, Err(e)) => {
            warn!(command, error = %e, "Failed to wait for hook process");
            HookExit::Error
        }
        _ => HookExit::TimedOut,
    };

    Ok(ProcessOutput {
        exit,
        stdout: drain(&stdout),
        stderr: drain(&stderr),
    })
}

/// Bytes read from a pipe so far, visible before the reader finishes
type Captured = Arc<Mutex<Vec<u8>>>;

/// Drain a pipe to the end; whatever was read before an error is kept
fn capture<R>(stream: Option<R>) -> (JoinHandle<()>, Captured)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let captured = Captured::default();
    let sink = Arc::clone(&captured);
    let task = tokio::spawn(async move {
        let Some(mut stream) = stream else { return };
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Hook pipe read failed");
                    break;
                }
            }
        }
    });
    (task, captured)
}

fn drain(captured: &Captured) -> String {
    captured
        .lock()
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, escalation: Escalation) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else { return };
    let signal = match escalation {
        Escalation::Terminate => Signal::SIGTERM,
        Escalation::Kill => Signal::SIGKILL,
    };
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        // ESRCH: the group is already gone
        debug!(pid, ?signal, error = %e, "Failed to signal hook process group");
    }
}

// Without process groups the child is killed when `completion` is dropped
#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _escalation: Escalation) {}

/// Substitute `$VAR` and `${VAR}` references to the project directory
/// variables, quoting the path only when the shell would split it
pub fn expand_project_dir(command: &str, cwd: &Path) -> String {
    let dir = shell_quote(&cwd.to_string_lossy());
    let mut expanded = command.to_string();
    for var in PROJECT_DIR_VARS {
        expanded = expanded
            .replace(&format!("${{{}}}", var), &dir)
            .replace(&format!("${}", var), &dir);
    }
    expanded
}

fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:@%,=".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

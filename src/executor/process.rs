//! Subject process control
//!
//! Spawns one subject with a merged stdout/stderr pipe, feeds its stdin,
//! and captures a bounded prefix of its output under a wall-clock deadline.
//!
//! The deadline and the capped reader are composed into a single `select!`,
//! so exactly one path decides the outcome; stdin is fed from its own task.
//! The deadline branch is polled first: once it has fired, the test is timed
//! out no matter what the subject does afterwards. Whatever the outcome, the
//! child is reaped before [`ProcessRunner::run`] returns.

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::models::{Outcome, TestSpec};

const READ_CHUNK: usize = 4096;

/// Raw result of one subject run
#[derive(Clone, Debug)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub output: Vec<u8>,
    pub outcome: Outcome,
    pub pid: Option<u32>,
}

/// Runs subject processes under a time limit and an output cap
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    time_limit: Duration,
    output_limit: usize,
}

impl ProcessRunner {
    pub fn new(time_limit: Duration, output_limit: usize) -> Self {
        Self {
            time_limit,
            output_limit,
        }
    }

    pub fn for_spec(spec: &TestSpec) -> Self {
        Self::new(spec.time_limit(), spec.output_limit())
    }

    /// Run `args` in `dir`, writing `input` (if any) to its stdin
    pub async fn run(
        &self,
        args: &[String],
        dir: &Path,
        input: Option<Vec<u8>>,
    ) -> io::Result<ProcessOutput> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;

        let (reader, writer) = io::pipe()?;

        // The command owns our copies of the write end; it must be dropped
        // right after spawning or the reader never sees end of file.
        let mut child = {
            let mut command = Command::new(resolve_program(program, dir));
            command
                .args(rest)
                .current_dir(dir)
                .stdin(Stdio::piped())
                .stdout(writer.try_clone()?)
                .stderr(writer)
                .kill_on_drop(true);
            command.spawn()?
        };

        let pid = child.id();
        debug!(?pid, ?args, "spawned subject");

        let mut output = pipe::Receiver::from_file(File::from(OwnedFd::from(reader)))?;
        let stdin = child.stdin.take();

        // Fed concurrently so a subject that writes before reading cannot
        // stall the capture.
        let feeder = tokio::spawn(async move {
            let Some(mut stdin) = stdin else { return };
            if let Some(bytes) = input {
                // A subject may exit without reading its input
                if let Err(e) = stdin.write_all(&bytes).await {
                    debug!("input not fully delivered: {e}");
                }
            }
            drop(stdin);
        });

        let mut captured = Vec::with_capacity(self.output_limit.min(READ_CHUNK));
        let limit = self.output_limit;

        let deadline = tokio::time::sleep(self.time_limit);
        tokio::pin!(deadline);

        let outcome = tokio::select! {
            biased;
            _ = &mut deadline => Outcome::TimedOut,
            result = async {
                if read_capped(&mut output, &mut captured, limit).await? {
                    return Ok::<_, io::Error>(Outcome::OutputLimitExceeded);
                }
                // Output closed; the deadline still covers the exit.
                child.wait().await?;
                Ok(Outcome::Completed)
            } => result?,
        };

        if outcome != Outcome::Completed {
            debug!(?pid, %outcome, "killing subject");
            kill(&mut child);
        }

        let status = child.wait().await?;
        feeder.abort();
        let exit_code = exit_code(status);
        debug!(?pid, exit_code, bytes = captured.len(), "subject finished");

        Ok(ProcessOutput {
            exit_code,
            output: captured,
            outcome,
            pid,
        })
    }
}

/// Read at most `limit` bytes into `buf`, then try to read one more.
///
/// Returns `true` if the stream held more than `limit` bytes. Each `read`
/// is cancel safe, so a deadline firing mid-capture keeps what was read.
async fn read_capped<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];

    while buf.len() < limit {
        let want = (limit - buf.len()).min(READ_CHUNK);
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Ok(false);
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let n = reader.read(&mut chunk[..1]).await?;
    Ok(n > 0)
}

fn kill(child: &mut Child) {
    // Fails only if the child was already reaped
    if let Err(e) = child.start_kill() {
        debug!("kill failed: {e}");
    }
}

/// Exit code, or the negated signal number for a killed process
fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

/// Relative paths such as `./prog` are resolved against the working directory
fn resolve_program(program: &str, dir: &Path) -> PathBuf {
    let path = Path::new(program);
    if path.is_relative() && program.contains('/') {
        dir.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn runner(millis: u64, cap: usize) -> ProcessRunner {
        ProcessRunner::new(Duration::from_millis(millis), cap)
    }

    #[tokio::test]
    async fn test_captures_merged_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(5000, 1024)
            .run(&sh("echo out; echo err >&2; exit 3"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(out.outcome, Outcome::Completed);
        assert_eq!(out.exit_code, 3);
        assert_eq!(String::from_utf8_lossy(&out.output), "out\nerr\n");
        assert!(out.pid.is_some());
    }

    #[tokio::test]
    async fn test_delivers_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(5000, 1024)
            .run(&sh("cat"), dir.path(), Some(b"hello\nworld\n".to_vec()))
            .await
            .unwrap();

        assert_eq!(out.outcome, Outcome::Completed);
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.output, b"hello\nworld\n");
    }

    #[tokio::test]
    async fn test_silent_infinite_loop_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(300, 1024)
            .run(&sh("while :; do :; done"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(out.outcome, Outcome::TimedOut);
        assert!(out.output.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(500, 1024)
            .run(&sh("echo started; exec sleep 30"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(out.outcome, Outcome::TimedOut);
        assert_eq!(out.output, b"started\n");
    }

    #[tokio::test]
    async fn test_deadline_covers_closed_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(300, 1024)
            .run(&sh("exec >/dev/null 2>&1; sleep 30"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(out.outcome, Outcome::TimedOut);
    }

    #[tokio::test]
    async fn test_output_flood_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(10_000, 100)
            .run(&sh("exec yes"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(out.outcome, Outcome::OutputLimitExceeded);
        assert_eq!(out.output.len(), 100);
    }

    #[tokio::test]
    async fn test_output_exactly_at_cap_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let out = runner(5000, 4)
            .run(&sh("printf abcd"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(out.outcome, Outcome::Completed);
        assert_eq!(out.output, b"abcd");
    }

    #[tokio::test]
    async fn test_relative_program_resolved_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("prog");
        std::fs::write(&script, "#!/bin/sh\necho from prog\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let out = runner(5000, 1024)
            .run(&["./prog".to_string()], dir.path(), None)
            .await
            .unwrap();
        assert_eq!(out.output, b"from prog\n");
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = runner(1000, 10)
            .run(&["./does-not-exist".to_string()], dir.path(), None)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_signal_exit_code() {
        assert_eq!(exit_code(ExitStatus::from_raw(9)), -9);
        assert_eq!(exit_code(ExitStatus::from_raw(2 << 8)), 2);
    }
}

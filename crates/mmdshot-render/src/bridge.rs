//! Renderer subprocess bridge.
//!
//! The external renderer is a black box speaking a one-shot protocol:
//! - the normalized batch request is written to its stdin as one JSON
//!   document, then stdin is closed
//! - on success it prints a JSON array of base64 images on stdout, one per
//!   diagram, in request order
//! - anything written to stderr means the batch failed
//!
//! [`RendererBridge`] drains stdout and stderr on dedicated threads while the
//! request is written, so neither side can stall on a full pipe. The whole
//! round-trip, from spawn to both pipes closing and the process exiting, is
//! bounded by one deadline. The renderer runs in its own process group, owned
//! by a guard that kills the group and reaps the child on every exit path.

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use mmdshot_schema::BatchRequest;

use crate::consts::EXIT_POLL_INTERVAL;

/// Something that turns a batch request into one encoded image per diagram.
///
/// Implementations must return images in request order.
pub trait Renderer: Send + Sync {
    /// Render every diagram in `request`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError`] if rendering fails or the output breaks the protocol.
    fn render(&self, request: &BatchRequest) -> Result<Vec<String>, BridgeError>;
}

/// Renderer failure.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The command string could not be split into program and arguments.
    #[error("invalid renderer command: {0}")]
    Command(String),
    /// The renderer process could not be started.
    #[error("failed to spawn renderer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// I/O failure talking to the renderer.
    #[error("renderer I/O error: {0}")]
    Io(#[from] io::Error),
    /// The request could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The renderer wrote to stderr.
    #[error("renderer reported an error: {stderr}")]
    Render { stderr: String },
    /// The renderer exited unsuccessfully without writing to stderr.
    #[error("renderer exited with {0}")]
    Exit(ExitStatus),
    /// The renderer output does not follow the protocol.
    #[error("renderer protocol error: {0}")]
    Protocol(String),
    /// The renderer did not finish before the deadline and was killed.
    #[error("renderer timed out after {0:?}")]
    Timeout(Duration),
}

/// Check that the renderer returned exactly one image per diagram.
///
/// # Errors
///
/// Returns [`BridgeError::Protocol`] on a count mismatch.
pub fn check_image_count(expected: usize, images: &[String]) -> Result<(), BridgeError> {
    if images.len() == expected {
        Ok(())
    } else {
        Err(BridgeError::Protocol(format!(
            "expected {expected} images, renderer returned {}",
            images.len()
        )))
    }
}

/// Parse renderer stdout into the ordered image list.
fn parse_images(stdout: &[u8], expected: usize) -> Result<Vec<String>, BridgeError> {
    let images: Vec<String> = serde_json::from_slice(stdout).map_err(|e| {
        BridgeError::Protocol(format!("stdout is not a JSON array of strings: {e}"))
    })?;
    check_image_count(expected, &images)?;
    Ok(images)
}

/// Renderer running as a subprocess.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use mmdshot_render::{Renderer, RendererBridge};
///
/// let bridge = RendererBridge::new("yarn -s electron src/electron.js")?
///     .timeout(Duration::from_secs(60));
/// let images = bridge.render(&request)?;
/// ```
#[derive(Debug, Clone)]
pub struct RendererBridge {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl RendererBridge {
    /// Create a bridge from a command line, split with shell-word rules.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Command`] if the command is empty or has
    /// unbalanced quotes.
    pub fn new(command: &str) -> Result<Self, BridgeError> {
        let mut words = shell_words::split(command)
            .map_err(|e| BridgeError::Command(format!("{e}: {command}")))?
            .into_iter();
        let program = words
            .next()
            .ok_or_else(|| BridgeError::Command("empty command".to_owned()))?;

        Ok(Self {
            program,
            args: words.collect(),
            timeout: Duration::from_secs(mmdshot_config::DEFAULT_TIMEOUT_SECS),
        })
    }

    /// Set the deadline for one batch round-trip.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program that will be launched.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn spawn(&self) -> Result<ChildGuard, BridgeError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so helpers started by the renderer die with it.
        #[cfg(unix)]
        std::os::unix::process::CommandExt::process_group(&mut command, 0);

        let child = command.spawn().map_err(|source| BridgeError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        Ok(ChildGuard::new(child))
    }
}

impl Renderer for RendererBridge {
    fn render(&self, request: &BatchRequest) -> Result<Vec<String>, BridgeError> {
        let payload = serde_json::to_vec(request)?;
        let start = Instant::now();
        let deadline = start + self.timeout;

        let mut guard = self.spawn()?;
        let pipes_missing = || BridgeError::Io(io::Error::other("renderer pipes unavailable"));
        let stdin = guard.child.stdin.take().ok_or_else(pipes_missing)?;
        let stdout = guard.child.stdout.take().ok_or_else(pipes_missing)?;
        let stderr = guard.child.stderr.take().ok_or_else(pipes_missing)?;

        tracing::debug!(
            program = %self.program,
            bytes = payload.len(),
            diagrams = request.len(),
            "Sending batch to renderer"
        );

        let writer = thread::spawn(move || {
            let mut stdin = stdin;
            stdin.write_all(&payload)
            // stdin dropped here, closing the pipe
        });
        let (tx, rx) = crossbeam_channel::bounded(2);
        spawn_drain(Stream::Stdout, stdout, tx.clone());
        spawn_drain(Stream::Stderr, stderr, tx);

        let output = collect_output(&rx, deadline, self.timeout);
        if let Err(BridgeError::Timeout(_)) = &output {
            tracing::warn!(
                pid = guard.child.id(),
                "Renderer output not closed before deadline, killing process group"
            );
            guard.kill();
        }
        let (stdout, stderr) = output?;
        let status = guard.wait_until(deadline, self.timeout)?;

        // A helper that inherited stdin can keep the writer blocked; it is
        // not waited on.
        let write_result = if writer.is_finished() {
            writer
                .join()
                .map_err(|_| io::Error::other("request writer thread panicked"))?
        } else {
            tracing::debug!("Request writer still blocked after renderer exit");
            Ok(())
        };

        tracing::debug!(
            status = %status,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            elapsed_ms = start.elapsed().as_millis(),
            "Renderer finished"
        );

        if !stderr.is_empty() {
            return Err(BridgeError::Render {
                stderr: String::from_utf8_lossy(&stderr).trim_end().to_owned(),
            });
        }
        if let Err(e) = write_result
            && e.kind() != io::ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }
        if !status.success() {
            return Err(BridgeError::Exit(status));
        }

        parse_images(&stdout, request.len())
    }
}

/// Renderer output pipe.
#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

type Drained = (Stream, io::Result<Vec<u8>>);

/// Read a pipe to EOF on its own thread and send the bytes to `tx`.
fn spawn_drain<R: Read + Send + 'static>(
    stream: Stream,
    mut pipe: R,
    tx: crossbeam_channel::Sender<Drained>,
) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        // The receiver is gone after a timeout.
        let _ = tx.send((stream, result));
    });
}

/// Wait for both pipes to reach EOF before `deadline`.
fn collect_output(
    rx: &crossbeam_channel::Receiver<Drained>,
    deadline: Instant,
    timeout: Duration,
) -> Result<(Vec<u8>, Vec<u8>), BridgeError> {
    let mut stdout = None;
    let mut stderr = None;
    while stdout.is_none() || stderr.is_none() {
        let (stream, bytes) = rx.recv_deadline(deadline).map_err(|e| match e {
            RecvTimeoutError::Timeout => BridgeError::Timeout(timeout),
            RecvTimeoutError::Disconnected => {
                BridgeError::Io(io::Error::other("pipe reader thread exited early"))
            }
        })?;
        match stream {
            Stream::Stdout => stdout = Some(bytes?),
            Stream::Stderr => stderr = Some(bytes?),
        }
    }
    Ok((stdout.unwrap_or_default(), stderr.unwrap_or_default()))
}

/// Owns the renderer process group; kills and reaps it unless it was waited on.
struct ChildGuard {
    child: Child,
    reaped: bool,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    /// Wait for exit, killing the process group if `deadline` passes first.
    fn wait_until(
        &mut self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<ExitStatus, BridgeError> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.reaped = true;
                return Ok(status);
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(pid = self.child.id(), "Renderer deadline passed, killing process group");
                self.kill();
                return Err(BridgeError::Timeout(timeout));
            }
            thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn kill(&mut self) {
        if self.reaped {
            return;
        }
        // The unreaped leader keeps the group id reserved.
        self.kill_group();
        if let Err(e) = self.child.kill() {
            tracing::debug!(error = %e, "Failed to kill renderer");
        }
        let _ = self.child.wait();
        self.reaped = true;
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Ok(pgid) = i32::try_from(self.child.id()) else {
            return;
        };
        if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            tracing::debug!(error = %e, pgid, "Failed to kill renderer process group");
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmdshot_schema::{AppConfig, DiagramRequest, MermaidConfig};

    fn batch(n: usize) -> BatchRequest {
        BatchRequest {
            diagrams: (0..n)
                .map(|i| DiagramRequest::new(format!("flowchart TD\n a{i} --> b{i}")))
                .collect(),
            mermaid_config: MermaidConfig::default(),
            app_config: AppConfig::default(),
        }
    }

    #[test]
    fn test_new_splits_shell_words() {
        let bridge =
            RendererBridge::new(r#"yarn -s electron --trace-warnings "src/my renderer.js""#)
                .unwrap();
        assert_eq!(bridge.program(), "yarn");
        assert_eq!(
            bridge.args(),
            ["-s", "electron", "--trace-warnings", "src/my renderer.js"]
        );
    }

    #[test]
    fn test_new_rejects_bad_commands() {
        assert!(matches!(RendererBridge::new(""), Err(BridgeError::Command(_))));
        assert!(matches!(RendererBridge::new("   "), Err(BridgeError::Command(_))));
        assert!(matches!(
            RendererBridge::new("node 'unterminated"),
            Err(BridgeError::Command(_))
        ));
    }

    #[test]
    fn test_check_image_count() {
        let images = vec!["a".to_owned(), "b".to_owned()];
        assert!(check_image_count(2, &images).is_ok());
        let err = check_image_count(3, &images).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(err.to_string().contains("expected 3 images"));
    }

    #[test]
    fn test_parse_images_rejects_non_array() {
        let err = parse_images(br#"{"mmd": []}"#, 0).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
        let err = parse_images(b"[1, 2]", 2).unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));
    }

    #[test]
    fn test_parse_images_accepts_trailing_newline() {
        let images = parse_images(b"[\"aGVsbG8=\"]\n", 1).unwrap();
        assert_eq!(images, vec!["aGVsbG8=".to_owned()]);
    }

    #[test]
    fn test_spawn_failure() {
        let bridge = RendererBridge::new("mmdshot-test-no-such-renderer --flag").unwrap();
        let err = bridge.render(&batch(0)).unwrap_err();
        assert!(matches!(err, BridgeError::Spawn { .. }));
        assert!(err.to_string().contains("mmdshot-test-no-such-renderer"));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use tempfile::TempDir;

        #[test]
        fn test_render_success() {
            let bridge =
                RendererBridge::new(r#"sh -c 'cat > /dev/null; printf "[\"aGVsbG8=\",\"d29ybGQ=\"]"'"#)
                    .unwrap();
            let images = bridge.render(&batch(2)).unwrap();
            assert_eq!(images, vec!["aGVsbG8=".to_owned(), "d29ybGQ=".to_owned()]);
        }

        #[test]
        fn test_request_written_to_stdin() {
            let tmp = TempDir::new().unwrap();
            let capture = tmp.path().join("request.json");
            let command = format!(
                r#"sh -c 'cat > "$0"; printf "[\"eA==\"]"' '{}'"#,
                capture.display()
            );
            let request = batch(1);

            RendererBridge::new(&command).unwrap().render(&request).unwrap();

            let written = std::fs::read_to_string(&capture).unwrap();
            assert_eq!(written, serde_json::to_string(&request).unwrap());
        }

        #[test]
        fn test_stderr_fails_regardless_of_exit_code() {
            let bridge =
                RendererBridge::new(r#"sh -c 'cat > /dev/null; echo "[Renderer: error]" >&2; printf "[]"'"#)
                    .unwrap();
            let err = bridge.render(&batch(0)).unwrap_err();
            match err {
                BridgeError::Render { stderr } => assert_eq!(stderr, "[Renderer: error]"),
                other => panic!("expected Render error, got {other:?}"),
            }
        }

        #[test]
        fn test_nonzero_exit_without_stderr() {
            let bridge = RendererBridge::new("sh -c 'cat > /dev/null; exit 3'").unwrap();
            let err = bridge.render(&batch(0)).unwrap_err();
            assert!(matches!(err, BridgeError::Exit(status) if status.code() == Some(3)));
        }

        #[test]
        fn test_wrong_image_count_is_protocol_error() {
            let bridge =
                RendererBridge::new(r#"sh -c 'cat > /dev/null; printf "[\"eA==\"]"'"#).unwrap();
            let err = bridge.render(&batch(3)).unwrap_err();
            assert!(matches!(err, BridgeError::Protocol(_)));
        }

        #[test]
        fn test_malformed_output_is_protocol_error() {
            let bridge = RendererBridge::new("sh -c 'cat > /dev/null; printf done'").unwrap();
            let err = bridge.render(&batch(1)).unwrap_err();
            assert!(matches!(err, BridgeError::Protocol(_)));
        }

        #[test]
        fn test_renderer_ignoring_stdin() {
            // Closing stdin early must not turn into an I/O error.
            let bridge = RendererBridge::new(r#"sh -c 'exec 0<&-; printf "[]"'"#).unwrap();
            let images = bridge.render(&batch(0)).unwrap();
            assert!(images.is_empty());
        }

        #[test]
        fn test_timeout_kills_renderer() {
            let bridge = RendererBridge::new("sh -c 'exec sleep 5'")
                .unwrap()
                .timeout(Duration::from_millis(200));
            let start = Instant::now();
            let err = bridge.render(&batch(1)).unwrap_err();
            assert!(matches!(err, BridgeError::Timeout(_)));
            assert!(start.elapsed() < Duration::from_secs(4));
        }

        #[test]
        fn test_timeout_covers_output_drain() {
            // The direct child exits at once, but a helper keeps stdout open.
            let bridge = RendererBridge::new(r#"sh -c 'cat > /dev/null; sleep 3 & printf "[]"'"#)
                .unwrap()
                .timeout(Duration::from_millis(300));
            let start = Instant::now();
            let err = bridge.render(&batch(0)).unwrap_err();
            assert!(matches!(err, BridgeError::Timeout(_)));
            assert!(start.elapsed() < Duration::from_secs(2));
        }

        /// Whether `pid` has exited (gone or a zombie awaiting its reaper).
        #[cfg(target_os = "linux")]
        fn process_exited(pid: &str) -> bool {
            match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
                Err(_) => true,
                Ok(stat) => stat
                    .rsplit_once(") ")
                    .is_some_and(|(_, rest)| rest.starts_with('Z')),
            }
        }

        #[cfg(target_os = "linux")]
        #[test]
        fn test_timeout_kills_renderer_helpers() {
            let tmp = TempDir::new().unwrap();
            let pid_file = tmp.path().join("helper.pid");
            let command = format!(
                r#"sh -c 'cat > /dev/null; sleep 30 & echo $! > "$0"; wait' '{}'"#,
                pid_file.display()
            );
            let bridge = RendererBridge::new(&command)
                .unwrap()
                .timeout(Duration::from_millis(500));

            let err = bridge.render(&batch(1)).unwrap_err();
            assert!(matches!(err, BridgeError::Timeout(_)));

            let pid = std::fs::read_to_string(&pid_file).unwrap();
            let pid = pid.trim();
            let start = Instant::now();
            while !process_exited(pid) && start.elapsed() < Duration::from_secs(2) {
                thread::sleep(Duration::from_millis(20));
            }
            assert!(process_exited(pid), "helper process {pid} still running");
        }
    }
}

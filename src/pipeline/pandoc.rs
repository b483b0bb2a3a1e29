//! External converter adapter: DOCX → intermediate HTML via pandoc.
//!
//! ## Why a subprocess?
//!
//! pandoc's DOCX reader understands numbering definitions, OMML equations,
//! merged cells and embedded media far better than anything we could write
//! against the raw OOXML. We treat it as a black box with a narrow contract:
//! one input path in, one HTML5 file plus an extracted-media directory out.
//!
//! ## Process hygiene
//!
//! ```text
//! spawn ──▶ wait (deadline) ──┬─▶ exit 0      → HtmlOutput
//!                             ├─▶ exit ≠ 0    → NonZeroExit{stderr}
//!                             └─▶ deadline    → kill + reap → Timeout
//! ```
//!
//! The child is spawned with `kill_on_drop(true)`; on timeout it is killed and
//! awaited explicitly so no zombie outlives the task. The caller owns the
//! work directory, so temp files vanish with it on every path.

use crate::error::{ConverterError, FailureReason};
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Name of the HTML file written inside the work directory.
pub const HTML_FILE: &str = "document.html";

/// Directory (inside the work directory) pandoc extracts media below.
pub const MEDIA_DIR: &str = "extracted";

/// What a successful conversion leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlOutput {
    pub html_path: PathBuf,
    /// Root of the extracted media. May not exist when the document has none.
    pub media_dir: PathBuf,
    /// `[WARNING]` lines pandoc printed while still succeeding.
    pub diagnostics: Vec<String>,
}

/// A subprocess-backed DOCX → HTML converter.
///
/// [`PandocConverter`] is the production implementation; the trait exists so
/// another backend (or a test double) can stand in without touching the
/// orchestrator.
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Probe the backend. Called once when the orchestrator is built.
    async fn version(&self) -> Result<String, ConverterError>;

    /// Convert `source` into HTML below `work_dir` within `timeout`.
    ///
    /// `work_dir` must be writable and exclusive to this invocation.
    async fn convert(
        &self,
        source: &Path,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<HtmlOutput, ConverterError>;
}

/// Runs the `pandoc` executable.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    program: PathBuf,
}

impl PandocConverter {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments for one conversion, in the order pandoc receives them.
    pub fn arguments(source: &Path, work_dir: &Path) -> Vec<String> {
        let title = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        vec![
            source.display().to_string(),
            "--from=docx".into(),
            "--to=html5".into(),
            "--standalone".into(),
            "--mathml".into(),
            format!("--extract-media={}", work_dir.join(MEDIA_DIR).display()),
            format!("--output={}", work_dir.join(HTML_FILE).display()),
            // Standalone output wants a title; pagetitle sets <title> without
            // adding a visible title block.
            format!("--metadata=pagetitle:{title}"),
        ]
    }

    fn command(&self, args: &[String], cwd: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(
        &self,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<ProcessOutput, ConverterError> {
        let program = self.program.display().to_string();
        debug!("Running {} {}", program, args.join(" "));

        let mut child = self.command(args, cwd).spawn().map_err(|e| match e.kind() {
            IoErrorKind::NotFound => ConverterError::NotFound {
                program: program.clone(),
            },
            _ => ConverterError::Spawn {
                program: program.clone(),
                detail: e.to_string(),
            },
        })?;

        let stdout_task = child.stdout.take().map(|s| tokio::spawn(drain(s)));
        let stderr_task = child.stderr.take().map(|s| tokio::spawn(drain(s)));

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(ConverterError::Spawn {
                    program,
                    detail: format!("wait failed: {e}"),
                })
            }
            Err(_) => {
                warn!(
                    "{} exceeded {}s; killing pid {:?}",
                    program,
                    timeout.as_secs(),
                    child.id()
                );
                // kill() sends SIGKILL and reaps the child
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", program, e);
                }
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                return Err(ConverterError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
        };

        let stdout = join_drain(stdout_task).await;
        let stderr = join_drain(stderr_task).await;
        Ok(ProcessOutput {
            code: status.code(),
            success: status.success(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

struct ProcessOutput {
    code: Option<i32>,
    success: bool,
    stdout: String,
    stderr: String,
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    // A read error just truncates the captured text
    let _ = reader.read_to_end(&mut buf).await;
    buf
}

async fn join_drain(task: Option<tokio::task::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

/// Lines pandoc prefixes with `[WARNING]`, without the prefix.
fn diagnostics(stderr: &str) -> Vec<String> {
    stderr
        .lines()
        .filter_map(|line| line.trim().strip_prefix("[WARNING]"))
        .map(|rest| rest.trim().to_string())
        .filter(|msg| !msg.is_empty())
        .collect()
}

/// How long the startup probe may take.
const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
impl DocumentConverter for PandocConverter {
    async fn version(&self) -> Result<String, ConverterError> {
        let out = self
            .run(&["--version".to_string()], None, VERSION_TIMEOUT)
            .await?;
        if !out.success {
            return Err(ConverterError::NonZeroExit {
                code: out.code,
                reason: FailureReason::Unknown,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out.stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn convert(
        &self,
        source: &Path,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<HtmlOutput, ConverterError> {
        let args = Self::arguments(source, work_dir);
        let out = self.run(&args, Some(work_dir), timeout).await?;

        if !out.success {
            let stderr = out.stderr.trim().to_string();
            return Err(ConverterError::NonZeroExit {
                code: out.code,
                reason: FailureReason::classify(out.code, &stderr),
                stderr,
            });
        }

        let html_path = work_dir.join(HTML_FILE);
        if !html_path.is_file() {
            // Exit 0 without output is still a failure we cannot process
            return Err(ConverterError::NonZeroExit {
                code: out.code,
                reason: FailureReason::Unknown,
                stderr: format!("no HTML written to {}", html_path.display()),
            });
        }

        Ok(HtmlOutput {
            html_path,
            media_dir: work_dir.join(MEDIA_DIR),
            diagnostics: diagnostics(&out.stderr),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_request_html5_mathml_and_media() {
        let args = PandocConverter::arguments(
            Path::new("/w/source.docx"),
            Path::new("/w"),
        );
        assert_eq!(args[0], "/w/source.docx");
        assert!(args.contains(&"--to=html5".to_string()));
        assert!(args.contains(&"--mathml".to_string()));
        assert!(args.contains(&"--extract-media=/w/extracted".to_string()));
        assert!(args.contains(&"--output=/w/document.html".to_string()));
        assert!(args.contains(&"--metadata=pagetitle:source".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--toc")));
    }

    #[test]
    fn diagnostics_keep_only_warnings() {
        let stderr = "[WARNING] Could not convert TeX math \\foo\n\
                      [INFO] Loaded\n\
                      [WARNING]   \n";
        assert_eq!(
            diagnostics(stderr),
            vec!["Could not convert TeX math \\foo".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let conv = PandocConverter::new("/definitely/not/here/pandoc");
        let err = conv.version().await.unwrap_err();
        assert!(matches!(err, ConverterError::NotFound { .. }), "{err}");
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-pandoc");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn non_zero_exit_carries_stderr() {
            let dir = tempfile::TempDir::new().unwrap();
            let prog = script(dir.path(), "echo 'Couldn'\"'\"'t parse docx file' >&2\nexit 1");
            let err = PandocConverter::new(prog)
                .convert(Path::new("x.docx"), dir.path(), Duration::from_secs(10))
                .await
                .unwrap_err();
            match err {
                ConverterError::NonZeroExit { code, stderr, reason } => {
                    assert_eq!(code, Some(1));
                    assert!(stderr.contains("parse docx"), "got: {stderr}");
                    assert_eq!(reason, FailureReason::CorruptDocument);
                }
                other => panic!("unexpected: {other}"),
            }
        }

        #[tokio::test]
        async fn timeout_kills_the_process() {
            let dir = tempfile::TempDir::new().unwrap();
            let prog = script(dir.path(), "exec sleep 30");
            let started = Instant::now();
            let err = PandocConverter::new(prog)
                .convert(Path::new("x.docx"), dir.path(), Duration::from_secs(1))
                .await
                .unwrap_err();
            assert_eq!(err, ConverterError::Timeout { secs: 1 });
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn success_without_output_is_an_error() {
            let dir = tempfile::TempDir::new().unwrap();
            let prog = script(dir.path(), "exit 0");
            let err = PandocConverter::new(prog)
                .convert(Path::new("x.docx"), dir.path(), Duration::from_secs(10))
                .await
                .unwrap_err();
            assert!(matches!(err, ConverterError::NonZeroExit { .. }), "{err}");
        }

        #[tokio::test]
        async fn version_reads_first_line() {
            let dir = tempfile::TempDir::new().unwrap();
            let prog = script(dir.path(), "echo 'pandoc 3.1.9'\necho 'Features: +server'");
            let version = PandocConverter::new(prog).version().await.unwrap();
            assert_eq!(version, "pandoc 3.1.9");
        }
    }
}

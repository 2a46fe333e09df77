//! Media extraction: a download plan turned into a live byte stream.
//!
//! The extractor spawns yt-dlp writing the chosen format to stdout and
//! exposes the pipe as a `Stream` of chunks. Back-pressure is inherited
//! from the pipe: the child blocks on writes until the consumer polls the
//! next chunk, so nothing ever buffers a whole media file. The child is
//! spawned with `kill_on_drop`, which makes dropping the stream (client
//! disconnect, handler error) terminate the process on every exit path.

use std::{
    io,
    path::PathBuf,
    pin::Pin,
    process::Stdio,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::Stream;
use thiserror::Error;
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::io::ReaderStream;

use crate::selector::DownloadPlan;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to run {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: io::Error,
    },
    #[error("extractor produced no output pipe")]
    MissingStdout,
}

/// Terminal state of a streaming transfer. A request rejected before any
/// body byte never reaches this type; it is reported through the handler's
/// error response instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The pipe drained and the extractor exited cleanly.
    Completed,
    /// The stream died after bytes may already have reached the client.
    /// The connection is closed; nothing more can be sent.
    Aborted,
}

/// Spawns the external extraction tool. Cloneable, immutable configuration
/// injected at construction; there is no per-request shared state.
#[derive(Debug, Clone)]
pub struct MediaExtractor {
    bin: PathBuf,
    ffmpeg_location: Option<PathBuf>,
}

impl MediaExtractor {
    pub fn new(bin: PathBuf, ffmpeg_location: Option<PathBuf>) -> Self {
        Self {
            bin,
            ffmpeg_location,
        }
    }

    /// Starts an extraction for `url` realizing `plan` and returns the live
    /// byte stream. The child writes the media to stdout (`--output -`);
    /// stderr is discarded because once streaming starts the only possible
    /// reaction to extractor noise is logging the final outcome.
    pub fn extract(&self, url: &str, plan: &DownloadPlan) -> Result<ExtractionStream, ExtractError> {
        let mut command = Command::new(&self.bin);
        command
            .arg("--format")
            .arg(plan.format_spec())
            .arg("--output")
            .arg("-")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg("--quiet");

        if let Some(location) = &self.ffmpeg_location {
            command.arg("--ffmpeg-location").arg(location);
        }

        command
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| ExtractError::Spawn {
            bin: self.bin.display().to_string(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or(ExtractError::MissingStdout)?;

        Ok(ExtractionStream {
            child: Some(child),
            stdout: ReaderStream::new(stdout),
            outcome: None,
        })
    }
}

/// Live byte stream backed by a running extractor process.
///
/// Chunk order is preserved exactly as produced. When the pipe drains the
/// child's exit status decides the outcome; a read error mid-transfer marks
/// the transfer aborted. Dropping the stream while the child still runs
/// kills it, so an abandoned response never leaves an orphaned process.
#[derive(Debug)]
pub struct ExtractionStream {
    child: Option<Child>,
    stdout: ReaderStream<ChildStdout>,
    outcome: Option<StreamOutcome>,
}

impl ExtractionStream {
    /// Terminal outcome, available once the stream has ended.
    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }

    /// OS pid of the running extractor, absent once the child has been
    /// handed off for reaping.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|child| child.id())
    }

    fn finish(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        match child.try_wait() {
            Ok(Some(status)) if status.success() => {
                self.outcome = Some(StreamOutcome::Completed);
            }
            Ok(Some(status)) => {
                self.outcome = Some(StreamOutcome::Aborted);
                eprintln!("extractor exited with {status} after the stream ended");
            }
            _ => {
                // Pipe closed before the exit status was observable. Assume
                // a clean finish but reap the child off-path so it cannot
                // linger as a zombie.
                self.outcome = Some(StreamOutcome::Completed);
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if !status.success() => {
                            eprintln!("extractor exited with {status} after the stream ended");
                        }
                        Err(err) => eprintln!("failed to reap extractor: {err}"),
                        Ok(_) => {}
                    }
                });
            }
        }
    }
}

impl Stream for ExtractionStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.stdout).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(err))) => {
                this.outcome = Some(StreamOutcome::Aborted);
                eprintln!("extractor stream failed mid-transfer: {err}");
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if this.outcome.is_none() {
                    this.finish();
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::DownloadPlan;
    use futures::StreamExt;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    #[cfg(unix)]
    fn install_stub(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("yt-dlp");
        fs::write(&path, script).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn relays_stub_output_byte_for_byte() {
        let dir = tempdir().unwrap();
        let stub = install_stub(
            dir.path(),
            "#!/usr/bin/env bash\nprintf 'chunk-one'\nprintf 'chunk-two'\n",
        );

        let extractor = MediaExtractor::new(stub, None);
        let mut stream = extractor
            .extract("https://www.youtube.com/watch?v=abc", &DownloadPlan::BestMuxed)
            .unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"chunk-onechunk-two");
        assert_eq!(stream.outcome(), Some(StreamOutcome::Completed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_after_output_marks_the_transfer_aborted() {
        let dir = tempdir().unwrap();
        let stub = install_stub(
            dir.path(),
            "#!/usr/bin/env bash\nprintf 'partial'\nsleep 0.2\nexit 3\n",
        );

        let extractor = MediaExtractor::new(stub, None);
        let mut stream = extractor
            .extract("https://www.youtube.com/watch?v=abc", &DownloadPlan::BestAudio)
            .unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"partial");
        assert_eq!(stream.outcome(), Some(StreamOutcome::Aborted));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stub_receives_the_plan_format_spec() {
        let dir = tempdir().unwrap();
        // Echo the --format argument back so the test can observe it.
        let stub = install_stub(
            dir.path(),
            "#!/usr/bin/env bash\nprev=\"\"\nfor arg in \"$@\"; do\n  if [[ \"$prev\" == \"--format\" ]]; then printf '%s' \"$arg\"; fi\n  prev=\"$arg\"\ndone\n",
        );

        let extractor = MediaExtractor::new(stub, None);
        let mut stream = extractor
            .extract("https://www.youtube.com/watch?v=abc", &DownloadPlan::BestAudio)
            .unwrap();

        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"ba/b");
    }

    /// A process counts as gone once its pid is unknown or only a zombie
    /// entry remains awaiting reaping.
    #[cfg(target_os = "linux")]
    fn process_gone(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat.split_whitespace().nth(2) == Some("Z"),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn dropping_the_stream_kills_the_extractor_process() {
        let dir = tempdir().unwrap();
        // A producer that would stream forever if nobody stopped it.
        let stub = install_stub(
            dir.path(),
            "#!/usr/bin/env bash\nwhile true; do printf 'x'; sleep 0.01; done\n",
        );

        let extractor = MediaExtractor::new(stub, None);
        let mut stream = extractor
            .extract("https://www.youtube.com/watch?v=abc", &DownloadPlan::BestMuxed)
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        let pid = stream.pid().unwrap();
        drop(stream);

        // kill_on_drop issues SIGKILL; give the kernel a bounded window to
        // tear the process down before declaring it orphaned.
        let mut gone = false;
        for _ in 0..50 {
            if process_gone(pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(gone, "extractor process {pid} outlived the dropped stream");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let extractor = MediaExtractor::new(PathBuf::from("/nonexistent/yt-dlp"), None);
        let err = extractor
            .extract("https://www.youtube.com/watch?v=abc", &DownloadPlan::BestMuxed)
            .unwrap_err();
        assert!(matches!(err, ExtractError::Spawn { .. }));
    }
}

//! Request/response multiplexing over the sidecar's stdio.

use super::protocol::{Request, Response};
use crate::Result;
use crate::error::AtlasDriverError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One sidecar process, or any byte stream speaking the same protocol.
pub struct BridgeSession {
    writer: tokio::sync::Mutex<BoxedWriter>,
    pending: PendingCalls,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    child: Mutex<Option<Child>>,
}

impl BridgeSession {
    /// Wraps an already connected byte stream.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_responses(
            reader,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));

        Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            reader,
            child: Mutex::new(None),
        }
    }

    /// Launches `<program> -jar <artifact>` and talks to it over stdio.
    ///
    /// The child is killed when the session is dropped.
    ///
    /// # Errors
    /// Returns an I/O error when the process cannot be started
    pub fn spawn(program: &Path, artifact: &Path) -> Result<Self> {
        let mut child = Command::new(program)
            .arg("-jar")
            .arg(artifact)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AtlasDriverError::io(
                    format!(
                        "Failed to launch bridge '{} -jar {}'",
                        program.display(),
                        artifact.display()
                    ),
                    e,
                )
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(AtlasDriverError::protocol(
                "bridge process did not expose its stdio",
            ));
        };

        if let Some(stderr) = child.stderr.take() {
            let pid = child.id();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(bridge_pid = ?pid, "bridge: {}", line);
                }
            });
        }

        let session = Self::from_io(stdout, stdin);
        *session.lock_child() = Some(child);
        Ok(session)
    }

    /// Whether the sidecar has stopped answering.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sends one request and waits for its response.
    ///
    /// # Errors
    /// Returns `QueryExecution` with the sidecar's (unwrapped) message when
    /// it reports an error, `Protocol` when the session is gone, and
    /// `Serialization` when the result does not have the expected shape
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + Sync,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = serde_json::to_value(params).map_err(|e| {
            AtlasDriverError::serialization(format!("Failed to encode '{}' params", method), e)
        })?;
        let mut line = serde_json::to_vec(&Request { id, method, params }).map_err(|e| {
            AtlasDriverError::serialization(format!("Failed to encode '{}' request", method), e)
        })?;
        line.push(b'\n');

        let (tx, rx) = oneshot::channel();
        {
            // Checked under the pending lock: the reader marks the session
            // closed before it fails everything still pending.
            let mut pending = self.lock_pending();
            if self.is_closed() {
                return Err(AtlasDriverError::protocol("bridge session is closed"));
            }
            pending.insert(id, tx);
        }

        let written = {
            let mut writer = self.writer.lock().await;
            match writer.write_all(&line).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.lock_pending().remove(&id);
            return Err(AtlasDriverError::io(
                format!("Failed to send '{}' to the bridge", method),
                e,
            ));
        }
        trace!(request_id = id, method, "Bridge request sent");

        let value = rx.await.map_err(|_| {
            AtlasDriverError::protocol(format!("bridge closed before answering '{}'", method))
        })??;

        serde_json::from_value(value).map_err(|e| {
            AtlasDriverError::serialization(format!("Unexpected '{}' result", method), e)
        })
    }

    /// Stops the reader and kills the sidecar. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.reader.abort();
        fail_pending(&self.pending, "bridge session was shut down");
        let child = self.lock_child().take();
        if let Some(mut child) = child
            && let Err(e) = child.kill().await
        {
            warn!("Failed to stop bridge process: {}", e);
        }
    }

    fn lock_pending(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Result<Value>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_child(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BridgeSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads response lines and hands each to the call waiting on its id.
///
/// Lines that are not protocol responses (JVM chatter on stdout) are
/// skipped. When the stream ends every outstanding call fails.
async fn read_responses<R>(reader: R, pending: PendingCalls, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Bridge output failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Response>(&line) {
            Ok(response) => response,
            Err(e) => {
                debug!("Skipping non-protocol bridge output ({}): {}", e, line);
                continue;
            }
        };

        let result = match response.error {
            Some(error) => Err(AtlasDriverError::query_failed(error.into_message())),
            None => Ok(response.result.unwrap_or(Value::Null)),
        };

        let sender = pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&response.id);
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!(request_id = response.id, "Response for unknown bridge request"),
        }
    }

    closed.store(true, Ordering::Release);
    fail_pending(&pending, "bridge process closed its output");
}

/// Fails every call still waiting for a response.
fn fail_pending(pending: &PendingCalls, reason: &str) {
    let waiting: Vec<_> = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    for (_, tx) in waiting {
        let _ = tx.send(Err(AtlasDriverError::protocol(reason)));
    }
}

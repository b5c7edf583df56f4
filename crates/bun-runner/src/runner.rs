//! bun process runner.

use blake3::Hasher;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fs;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

const BUN_SCRIPT_FILENAME: &str = "bun-sourcemap-compiler.mjs";
const BUN_SCRIPT_SOURCE: &str = r#"import { createInterface } from 'node:readline';
import { stdin, stdout } from 'node:process';
import { createRequire } from 'node:module';
import { pathToFileURL } from 'node:url';

let svelte = null;
try {
  const require = createRequire(pathToFileURL(process.cwd() + '/'));
  const compilerPath = require.resolve('svelte/compiler');
  svelte = await import(pathToFileURL(compilerPath).href);
} catch (err) {
  const message = err && err.message ? err.message : String(err);
  console.error(`sourcemap-check bun runner failed to load svelte/compiler: ${message}`);
  process.exit(2);
}

stdout.write(JSON.stringify({ ready: true, version: svelte.VERSION || null }) + '\n');

const rl = createInterface({ input: stdin, crlfDelay: Infinity });

const artifact = (output) =>
  output ? { code: output.code, map: output.map ? JSON.parse(JSON.stringify(output.map)) : null } : null;

for await (const line of rl) {
  if (!line.trim()) continue;

  let req;
  try {
    req = JSON.parse(line);
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    stdout.write(JSON.stringify({ id: null, error: `invalid json: ${message}` }) + '\n');
    continue;
  }

  try {
    const { js, css } = svelte.compile(req.source, req.options || {});
    stdout.write(JSON.stringify({ id: req.id, js: artifact(js), css: artifact(css) }) + '\n');
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    stdout.write(JSON.stringify({ id: req.id, error: message }) + '\n');
  }
}
"#;

/// Error types for bun runner.
#[derive(Debug, Error)]
pub enum BunError {
    /// Failed to spawn bun process.
    #[error("failed to spawn bun: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// bun process exited with error.
    #[error("bun exited with code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    /// bun binary not found.
    #[error("bun binary not found at: {0}")]
    NotFound(Utf8PathBuf),

    /// Failed to prepare the runner script.
    #[error("failed to prepare bun runner: {0}")]
    SetupFailed(String),

    /// bun runner protocol error.
    #[error("bun runner protocol error: {0}")]
    ProtocolError(String),

    /// Failed to parse bun response.
    #[error("failed to parse bun response: {0}")]
    ParseError(String),

    /// `svelte/compiler` rejected the input.
    #[error("svelte compile failed: {0}")]
    CompileFailed(String),
}

/// Options forwarded to `compile`. `extra` is merged in verbatim.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BunCompileOptions {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css_output_filename: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One compiled file: code plus its map as raw JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct BunOutputFile {
    pub code: String,
    #[serde(default)]
    pub map: Option<serde_json::Value>,
}

/// The script output and the stylesheet output, if any.
#[derive(Debug, Clone)]
pub struct BunCompileOutput {
    pub js: BunOutputFile,
    pub css: Option<BunOutputFile>,
}

#[derive(Debug, Serialize)]
struct BunRequest<'a> {
    id: u64,
    source: &'a str,
    options: &'a BunCompileOptions,
}

#[derive(Debug, Deserialize)]
struct BunResponse {
    id: Option<u64>,
    js: Option<BunOutputFile>,
    css: Option<BunOutputFile>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BunReady {
    ready: bool,
    version: Option<String>,
}

/// The bun runner.
#[derive(Debug, Clone)]
pub struct BunRunner {
    bun_path: Utf8PathBuf,
    workspace_root: Utf8PathBuf,
    script_path: Utf8PathBuf,
}

impl BunRunner {
    /// Creates a new bun runner. `workspace_root` is where `svelte/compiler`
    /// is resolved from.
    pub fn new(bun_path: Utf8PathBuf, workspace_root: Utf8PathBuf) -> Result<Self, BunError> {
        if !bun_path.exists() {
            return Err(BunError::NotFound(bun_path));
        }
        let script_path = ensure_script()?;
        Ok(Self {
            bun_path,
            workspace_root,
            script_path,
        })
    }

    /// Attempts to find bun in the workspace, PATH, or the home directory.
    /// 1. Workspace node_modules/.bin/bun (if workspace_root provided)
    /// 2. PATH
    /// 3. ~/.bun/bin/bun (default install location)
    pub fn find_bun(workspace_root: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
        if let Some(workspace) = workspace_root {
            let bin = workspace.join("node_modules/.bin");
            if let Some(path) = find_bun_in_bin(&bin) {
                return Some(path);
            }
        }

        if let Ok(path) = which::which("bun") {
            if let Ok(utf8_path) = Utf8PathBuf::try_from(path) {
                return Some(utf8_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            if let Ok(home) = Utf8PathBuf::try_from(home) {
                let bun_home = home.join(".bun/bin");
                if let Some(path) = find_bun_in_bin(&bun_home) {
                    return Some(path);
                }
            }
        }

        None
    }

    /// Gets the cache directory the runner script is written to.
    pub fn get_cache_dir() -> Option<Utf8PathBuf> {
        dirs::cache_dir()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .map(|p| p.join("sourcemap-check"))
    }

    /// Spawns a worker and waits for it to load `svelte/compiler`.
    pub async fn session(&self) -> Result<BunSession, BunError> {
        let (worker, version) =
            BunWorker::spawn(&self.bun_path, &self.workspace_root, &self.script_path).await?;
        debug!(version = version.as_deref().unwrap_or("unknown"), "bun worker ready");
        Ok(BunSession {
            worker: Mutex::new(worker),
            next_id: AtomicU64::new(1),
            svelte_version: version,
        })
    }
}

/// A live worker. Requests are answered in order, one at a time.
#[derive(Debug)]
pub struct BunSession {
    worker: Mutex<BunWorker>,
    next_id: AtomicU64,
    svelte_version: Option<String>,
}

impl BunSession {
    /// Returns the `svelte/compiler` version the worker loaded.
    pub fn svelte_version(&self) -> Option<&str> {
        self.svelte_version.as_deref()
    }

    /// Compiles one component.
    pub async fn compile(
        &self,
        source: &str,
        options: &BunCompileOptions,
    ) -> Result<BunCompileOutput, BunError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = BunRequest {
            id,
            source,
            options,
        };
        let line = serde_json::to_string(&request)
            .map_err(|e| BunError::ProtocolError(format!("failed to serialize request: {e}")))?;

        let mut worker = self.worker.lock().await;
        let response = worker.round_trip(&line).await?;
        check_response(id, response)
    }
}

/// Matches a response to request `id`. An error without an id means the
/// worker could not read the request at all.
fn check_response(id: u64, response: BunResponse) -> Result<BunCompileOutput, BunError> {
    if let Some(error) = response.error {
        return match response.id {
            Some(_) => Err(BunError::CompileFailed(error)),
            None => Err(BunError::ProtocolError(error)),
        };
    }

    match response.id {
        Some(got) if got == id => {}
        Some(got) => {
            return Err(BunError::ProtocolError(format!(
                "unexpected response id {got} (expected {id})"
            )))
        }
        None => return Err(BunError::ProtocolError("missing response id".to_string())),
    }

    let js = response
        .js
        .ok_or_else(|| BunError::ProtocolError("response without js output".to_string()))?;
    Ok(BunCompileOutput {
        js,
        css: response.css,
    })
}

fn find_bun_in_bin(bin: &Utf8Path) -> Option<Utf8PathBuf> {
    let candidates: &[&str] = if cfg!(windows) {
        &["bun.exe", "bun.cmd", "bun"]
    } else {
        &["bun"]
    };

    for candidate in candidates.iter() {
        let path = bin.join(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

fn ensure_script() -> Result<Utf8PathBuf, BunError> {
    let cache_dir = BunRunner::get_cache_dir()
        .ok_or_else(|| BunError::SetupFailed("could not determine cache directory".into()))?;
    fs::create_dir_all(&cache_dir)
        .map_err(|e| BunError::SetupFailed(format!("failed to create cache dir: {e}")))?;

    let script_path = cache_dir.join(BUN_SCRIPT_FILENAME);
    let mut hasher = Hasher::new();
    hasher.update(BUN_SCRIPT_SOURCE.as_bytes());
    let expected_hash = hasher.finalize();

    if let Ok(existing) = fs::read(&script_path) {
        let mut hasher = Hasher::new();
        hasher.update(&existing);
        if hasher.finalize() == expected_hash {
            return Ok(script_path);
        }
    }

    fs::write(&script_path, BUN_SCRIPT_SOURCE)
        .map_err(|e| BunError::SetupFailed(format!("failed to write bun runner script: {e}")))?;

    Ok(script_path)
}

#[derive(Debug)]
struct BunWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: tokio::io::Lines<BufReader<ChildStdout>>,
    stderr_task: Option<JoinHandle<String>>,
}

impl BunWorker {
    async fn spawn(
        bun_path: &Utf8Path,
        workspace_root: &Utf8Path,
        script_path: &Utf8Path,
    ) -> Result<(Self, Option<String>), BunError> {
        let mut child = Command::new(bun_path)
            .arg(script_path)
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(BunError::SpawnFailed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BunError::ProtocolError("failed to open bun stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BunError::ProtocolError("failed to open bun stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BunError::ProtocolError("failed to open bun stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut reader = BufReader::new(stderr);
            let mut buffer = String::new();
            let _ = reader.read_to_string(&mut buffer).await;
            buffer
        });

        let mut stdout_reader = BufReader::new(stdout).lines();

        let ready_line = stdout_reader
            .next_line()
            .await
            .map_err(|e| BunError::ProtocolError(format!("failed to read bun ready: {e}")))?;

        let Some(ready_line) = ready_line else {
            let stderr = stderr_task.await.unwrap_or_default();
            let status = child.wait().await.map_err(BunError::SpawnFailed)?;
            return Err(BunError::ProcessFailed {
                code: status.code().unwrap_or(-1),
                stderr,
            });
        };

        let ready: BunReady = serde_json::from_str(&ready_line)
            .map_err(|e| BunError::ParseError(format!("invalid ready response: {e}")))?;
        if !ready.ready {
            return Err(BunError::ProtocolError(format!(
                "unexpected bun ready response: {}",
                ready_line
            )));
        }

        let worker = Self {
            child,
            stdin,
            stdout: stdout_reader,
            stderr_task: Some(stderr_task),
        };
        Ok((worker, ready.version))
    }

    async fn round_trip(&mut self, line: &str) -> Result<BunResponse, BunError> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BunError::ProtocolError(format!("failed to write to bun stdin: {e}")))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| BunError::ProtocolError(format!("failed to write newline: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| BunError::ProtocolError(format!("failed to flush bun stdin: {e}")))?;

        let line = self
            .stdout
            .next_line()
            .await
            .map_err(|e| BunError::ProtocolError(format!("failed to read bun response: {e}")))?;

        let Some(line) = line else {
            let stderr = match self.stderr_task.take() {
                Some(handle) => handle.await.unwrap_or_default(),
                None => String::new(),
            };
            let status = self.child.wait().await.map_err(BunError::SpawnFailed)?;
            return Err(BunError::ProcessFailed {
                code: status.code().unwrap_or(-1),
                stderr,
            });
        };

        parse_response(&line)
    }
}

fn parse_response(line: &str) -> Result<BunResponse, BunError> {
    serde_json::from_str(line)
        .map_err(|e| BunError::ParseError(format!("invalid response: {e} ({line})")))
}

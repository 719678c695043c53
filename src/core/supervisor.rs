//! Decoder 子行程的監管
//!
//! 同一時間只擁有一個子行程。stdout 逐行送進有界 channel，stderr 另由獨立 task
//! 轉成診斷日誌。子行程不論以何種狀態結束都會在退避延遲後重啟，直到收到關閉訊號。
//!
//! ```text
//! Stopped -> Starting -> Running -> {Exited, Crashed} -> Restarting -> Starting -> ...
//! ```

use crate::utils::error::ProcessError;
use crate::utils::monitor::RelayMonitor;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl DecoderCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl fmt::Display for DecoderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub restart_delay: Duration,
    pub max_restart_delay: Duration,
    /// SIGTERM 之後等待多久才強制 kill
    pub shutdown_grace: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(1),
            max_restart_delay: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl RestartPolicy {
    /// 第 n 次連續失敗的等待時間：`restart_delay * 2^(n-1)`，上限 `max_restart_delay`
    pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(16);
        self.restart_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_restart_delay)
    }
}

const TRANSITION_BACKLOG: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Exited,
    Crashed,
    Restarting,
}

/// 單次執行的結束原因
enum RunOutcome {
    Shutdown,
    ReceiverClosed,
    Terminated {
        status: Option<ExitStatus>,
        produced_lines: bool,
    },
}

pub struct ProcessSupervisor {
    command: DecoderCommand,
    policy: RestartPolicy,
    state_tx: watch::Sender<SupervisorState>,
    transitions_tx: broadcast::Sender<SupervisorState>,
    monitor: Option<Arc<RelayMonitor>>,
}

/// 由 [`ProcessSupervisor::start`] 回傳；`lines` 只會在關閉時結束
pub struct DecoderHandle {
    pub lines: mpsc::Receiver<String>,
    pub state: watch::Receiver<SupervisorState>,
    pub task: JoinHandle<Result<(), ProcessError>>,
}

impl ProcessSupervisor {
    pub fn new(command: DecoderCommand, policy: RestartPolicy) -> Self {
        let (state_tx, _) = watch::channel(SupervisorState::Stopped);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_BACKLOG);
        Self {
            command,
            policy,
            state_tx,
            transitions_tx,
            monitor: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<RelayMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    /// 每一次狀態轉換（`subscribe` 只保留最新狀態，短暫經過的狀態會被覆蓋）
    pub fn transitions(&self) -> broadcast::Receiver<SupervisorState> {
        self.transitions_tx.subscribe()
    }

    /// 啟動子行程並開始監管。
    ///
    /// 第一次啟動失敗（例如找不到執行檔）直接回傳錯誤；之後的重啟失敗只記錄並重試。
    pub async fn start(
        self,
        buffer: usize,
        shutdown: CancellationToken,
    ) -> Result<DecoderHandle, ProcessError> {
        self.set_state(SupervisorState::Starting);
        let child = match self.spawn_child() {
            Ok(child) => child,
            Err(e) => {
                self.set_state(SupervisorState::Stopped);
                return Err(e);
            }
        };
        self.set_state(SupervisorState::Running);

        let (lines_tx, lines) = mpsc::channel(buffer.max(1));
        let state = self.subscribe();
        let task = tokio::spawn(self.supervise(child, lines_tx, shutdown));

        Ok(DecoderHandle { lines, state, task })
    }

    fn set_state(&self, state: SupervisorState) {
        tracing::debug!("Decoder state -> {:?}", state);
        self.state_tx.send_replace(state);
        // 沒有訂閱者時送出失敗，忽略即可
        let _ = self.transitions_tx.send(state);
    }

    fn spawn_child(&self) -> Result<Child, ProcessError> {
        tracing::info!("🚀 Starting decoder: {}", self.command);

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                program: self.command.program.clone(),
                source,
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(BufReader::new(stderr)));
        }

        tracing::info!("✅ Decoder running (pid {:?})", child.id());
        Ok(child)
    }

    async fn supervise(
        self,
        mut child: Child,
        lines_tx: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> Result<(), ProcessError> {
        let mut consecutive_failures: u32 = 0;

        loop {
            match self.run_child(&mut child, &lines_tx, &shutdown).await {
                RunOutcome::Shutdown => {
                    tracing::info!("🛑 Shutdown requested, stopping decoder");
                    self.terminate(&mut child).await;
                    self.set_state(SupervisorState::Stopped);
                    return Ok(());
                }
                RunOutcome::ReceiverClosed => {
                    tracing::info!("Line consumer went away, stopping decoder");
                    self.terminate(&mut child).await;
                    self.set_state(SupervisorState::Stopped);
                    return Ok(());
                }
                RunOutcome::Terminated {
                    status,
                    produced_lines,
                } => {
                    match status {
                        Some(status) if status.success() => {
                            self.set_state(SupervisorState::Exited);
                            tracing::warn!("⚠️ {}", ProcessError::Exited);
                        }
                        Some(status) => {
                            self.set_state(SupervisorState::Crashed);
                            tracing::error!(
                                "❌ {}",
                                ProcessError::Crashed {
                                    status: status.to_string()
                                }
                            );
                        }
                        None => {
                            self.set_state(SupervisorState::Crashed);
                            tracing::error!("❌ Decoder exit status unavailable");
                        }
                    }

                    consecutive_failures = if produced_lines {
                        1
                    } else {
                        consecutive_failures.saturating_add(1)
                    };
                }
            }

            // 重啟，直到成功或收到關閉訊號
            loop {
                self.set_state(SupervisorState::Restarting);
                if let Some(monitor) = &self.monitor {
                    monitor.record_restart();
                }

                let delay = self.policy.delay_for(consecutive_failures);
                tracing::info!("🔄 Restarting decoder in {:?}", delay);
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        self.set_state(SupervisorState::Stopped);
                        return Ok(());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                self.set_state(SupervisorState::Starting);
                match self.spawn_child() {
                    Ok(new_child) => {
                        child = new_child;
                        self.set_state(SupervisorState::Running);
                        break;
                    }
                    Err(e) => {
                        tracing::error!("❌ {}", e);
                        self.set_state(SupervisorState::Crashed);
                        consecutive_failures = consecutive_failures.saturating_add(1);
                    }
                }
            }
        }
    }

    async fn run_child(
        &self,
        child: &mut Child,
        lines_tx: &mpsc::Sender<String>,
        shutdown: &CancellationToken,
    ) -> RunOutcome {
        let mut produced_lines = false;

        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return RunOutcome::Shutdown,
                    read = read_line_lossy(&mut reader, &mut buf) => match read {
                        Ok(Some(line)) => {
                            produced_lines = true;
                            tokio::select! {
                                _ = shutdown.cancelled() => return RunOutcome::Shutdown,
                                sent = lines_tx.send(line) => {
                                    if sent.is_err() {
                                        return RunOutcome::ReceiverClosed;
                                    }
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::warn!("⚠️ Failed reading decoder stdout: {}", e);
                            break;
                        }
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => RunOutcome::Shutdown,
            status = child.wait() => {
                let status = match status {
                    Ok(status) => Some(status),
                    Err(e) => {
                        tracing::warn!("⚠️ {}", ProcessError::Io(e));
                        None
                    }
                };
                RunOutcome::Terminated { status, produced_lines }
            }
        }
    }

    /// 先送 SIGTERM，超過寬限時間才強制 kill
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // pid 來自仍由我們持有、尚未回收的子行程
            let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if ret != 0 {
                tracing::warn!(
                    "⚠️ SIGTERM to decoder failed: {}",
                    std::io::Error::last_os_error()
                );
            }
        }

        match tokio::time::timeout(self.policy.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => tracing::info!("Decoder stopped ({})", status),
            Ok(Err(e)) => tracing::warn!("⚠️ Waiting for decoder failed: {}", e),
            Err(_) => {
                tracing::warn!(
                    "⚠️ Decoder ignored SIGTERM for {:?}, killing",
                    self.policy.shutdown_grace
                );
                if let Err(e) = child.kill().await {
                    tracing::warn!("⚠️ Failed to kill decoder: {}", e);
                }
            }
        }
    }
}

/// 讀一行；非 UTF-8 內容以替代字元保留。`buf` 需跨呼叫保留，才能安全地放進 select!
async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let read = reader.read_until(b'\n', buf).await?;
    if read == 0 && buf.is_empty() {
        return Ok(None);
    }

    let line = String::from_utf8_lossy(buf)
        .trim_end_matches(['\r', '\n'])
        .to_string();
    buf.clear();
    Ok(Some(line))
}

async fn drain_stderr<R>(mut reader: R)
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        match read_line_lossy(&mut reader, &mut buf).await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => tracing::info!(target: "decoder", "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(target: "decoder", "stderr closed: {}", e);
                break;
            }
        }
    }
}

//! 外部后端进程（查询命令 + 流式安装）

use super::hub::{EventHub, EventStream};
use super::parser::{LineSplitter, OutputLine};
use super::{Backend, BackendCommand, BackendError, INSTALL_PROGRESS_EVENT};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;

/// 通过外部程序实现后端：`<program> <args...> <command> [manager]`
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
    hub: Arc<EventHub>,
}

impl ProcessBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            hub: Arc::new(EventHub::new()),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn argv(&self, command: &BackendCommand) -> Vec<String> {
        let mut argv = self.args.clone();
        argv.push(command.name().to_string());
        if let Some(manager) = command.manager() {
            argv.push(manager.to_string());
        }
        argv
    }

    /// 查询类命令：一次性读取 stdout 并按 JSON 解析
    async fn query(&self, command: &BackendCommand) -> Result<Value, BackendError> {
        let output = tokio::process::Command::new(&self.program)
            .args(self.argv(command))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Err(BackendError::failed(
                command,
                failure_message(&stderr, &stdout, output.status),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&stdout).map_err(|source| BackendError::Decode {
            command: command.name().to_string(),
            source,
        })
    }

    /// 安装命令：子进程输出逐行推送为 install-progress 事件
    async fn install(&self, command: BackendCommand) -> Result<Value, BackendError> {
        let program = self.program.clone();
        let argv = self.argv(&command);
        let hub = Arc::clone(&self.hub);

        tokio::task::spawn_blocking(move || run_streaming_command(&program, &argv, &command, &hub))
            .await
            .map_err(|e| BackendError::Join(e.to_string()))?
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    async fn call(&self, command: BackendCommand) -> Result<Value, BackendError> {
        match command {
            BackendCommand::InstallPackages { .. } => self.install(command).await,
            _ => self.query(&command).await,
        }
    }

    fn subscribe(&self, event: &str) -> EventStream {
        self.hub.subscribe(event)
    }
}

fn failure_message(stderr: &str, stdout: &str, status: ExitStatus) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    format!("backend exited with {}", status)
}

/// 从流中读取行并推送为事件
/// `\n` 行以字符串发送，stderr 加 `⚠ ` 前缀；
/// `\r` 行（下载进度条）以 `{"progress": ...}` 结构发送，不计入返回的文本。
fn read_stream_lines(stream: Option<impl Read>, hub: &EventHub, is_stderr: bool) -> String {
    let mut result = String::new();
    let Some(mut reader) = stream else {
        return result;
    };

    let mut emit = |line: OutputLine| match line {
        OutputLine::Log(text) => {
            let msg = if is_stderr {
                format!("⚠ {}", text)
            } else {
                text.clone()
            };
            hub.emit(INSTALL_PROGRESS_EVENT, Value::String(msg));
            result.push_str(&text);
            result.push('\n');
        }
        OutputLine::Progress(text) => {
            hub.emit(INSTALL_PROGRESS_EVENT, json!({ "progress": text.trim() }));
        }
    };

    let mut splitter = LineSplitter::new();
    let mut buffer = [0u8; 1024];
    while let Ok(n) = reader.read(&mut buffer) {
        if n == 0 {
            break;
        }
        for line in splitter.push(&buffer[..n]) {
            emit(line);
        }
    }
    if let Some(line) = splitter.finish() {
        emit(line);
    }
    result
}

fn run_streaming_command(
    program: &str,
    argv: &[String],
    command: &BackendCommand,
    hub: &EventHub,
) -> Result<Value, BackendError> {
    use std::os::unix::process::CommandExt;

    let mut cmd = Command::new(program);
    cmd.args(argv);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    unsafe {
        cmd.pre_exec(|| {
            // 独立进程组，包管理器派生的子进程随后端一起收尾
            libc::setpgid(0, 0);
            #[cfg(target_os = "linux")]
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
            Ok(())
        });
    }
    let mut child = cmd.spawn()?;
    log::debug!("backend {} started (pid={})", command.name(), child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (all_stdout, all_stderr) = std::thread::scope(|s| {
        let stdout_handle = s.spawn(|| read_stream_lines(stdout, hub, false));
        let stderr_handle = s.spawn(|| read_stream_lines(stderr, hub, true));
        (
            stdout_handle.join().unwrap_or_default(),
            stderr_handle.join().unwrap_or_default(),
        )
    });

    let status = child.wait()?;
    if status.success() {
        Ok(Value::Null)
    } else {
        Err(BackendError::failed(
            command,
            failure_message(&all_stderr, &all_stdout, status),
        ))
    }
}

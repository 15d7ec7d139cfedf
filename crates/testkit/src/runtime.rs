use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use ghostgate_core::api::{ContainerHandle, ContainerRuntime, ExecIo, RuntimeError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::script::{run_script, ShellState};

pub const FAKE_PROMPT: &str = "root@fake:/# ";

struct FakeContainer {
    handle: ContainerHandle,
    image: String,
    shell: Arc<tokio::sync::Mutex<ShellState>>,
    shells: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct Counters {
    creates: usize,
    starts: usize,
    removes: usize,
    execs: usize,
    tty_execs: usize,
}

/// In-memory container engine. Each container has its own scripted shell
/// state, so output from one container never shows up in another.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    counters: Mutex<Counters>,
    next_id: Mutex<u64>,
    unavailable: AtomicBool,
    exec_failure: Mutex<Option<String>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every call fail as if the daemon were down.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Makes `exec` fail with `message` until cleared.
    pub fn fail_exec(&self, message: Option<&str>) {
        *self.exec_failure.lock().unwrap() = message.map(str::to_string);
    }

    /// Registers a container that exists but is not running, as if left over
    /// from an earlier process.
    pub fn insert_stopped(&self, name: &str, image: &str) -> ContainerHandle {
        let handle = ContainerHandle {
            id: self.next_container_id(),
            name: name.to_string(),
            running: false,
        };
        self.containers.lock().unwrap().insert(
            name.to_string(),
            FakeContainer {
                handle: handle.clone(),
                image: image.to_string(),
                shell: Arc::new(tokio::sync::Mutex::new(ShellState::new(name))),
                shells: Vec::new(),
            },
        );
        handle
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn image_of(&self, name: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.image.clone())
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.containers
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.handle.running)
            .unwrap_or(false)
    }

    pub fn create_count(&self) -> usize {
        self.counters.lock().unwrap().creates
    }

    pub fn start_count(&self) -> usize {
        self.counters.lock().unwrap().starts
    }

    pub fn remove_count(&self) -> usize {
        self.counters.lock().unwrap().removes
    }

    pub fn exec_count(&self) -> usize {
        self.counters.lock().unwrap().execs
    }

    pub fn tty_exec_count(&self) -> usize {
        self.counters.lock().unwrap().tty_execs
    }

    fn next_container_id(&self) -> String {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        format!("fake{:08x}", *id)
    }

    fn check_available(&self) -> Result<(), RuntimeError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable("fake daemon is down".into()));
        }
        Ok(())
    }

    fn one_shot(shell: Arc<tokio::sync::Mutex<ShellState>>, command: &[String]) -> ExecIo {
        // ["/bin/sh", "-c", "<line>"] runs the line; anything else runs the joined words.
        let line = match command {
            [_, flag, line] if flag == "-c" => line.clone(),
            other => other.join(" "),
        };
        let output = futures::stream::once(async move {
            let mut state = shell.lock().await;
            Ok::<_, RuntimeError>(Bytes::from(run_script(&mut state, &line).await))
        })
        .filter(|chunk| {
            let keep = !matches!(chunk, Ok(b) if b.is_empty());
            async move { keep }
        });
        ExecIo {
            output: Box::pin(output),
            input: Box::pin(tokio::io::sink()),
        }
    }

    /// An interactive shell: echoes typed lines like a tty, runs them, prints a prompt.
    fn interactive(shell: Arc<tokio::sync::Mutex<ShellState>>) -> (ExecIo, JoinHandle<()>) {
        let (typed_tx, typed_rx) = tokio::io::duplex(64 * 1024);
        let (out_tx, out_rx) = mpsc::unbounded::<Result<Bytes, RuntimeError>>();

        let task = tokio::spawn(async move {
            let send = |s: String| out_tx.unbounded_send(Ok(Bytes::from(s))).is_ok();
            if !send(FAKE_PROMPT.to_string()) {
                return;
            }
            let mut lines = BufReader::new(typed_rx).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !send(format!("{line}\r\n")) {
                    return;
                }
                if line.trim() == "exit" {
                    let _ = send("exit\r\n".to_string());
                    return;
                }
                let out = {
                    let mut state = shell.lock().await;
                    run_script(&mut state, &line).await
                };
                if !out.is_empty() && !send(out.replace('\n', "\r\n")) {
                    return;
                }
                if !send(FAKE_PROMPT.to_string()) {
                    return;
                }
            }
        });

        let io = ExecIo {
            output: Box::pin(out_rx),
            input: Box::pin(typed_tx),
        };
        (io, task)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create(
        &self,
        image: &str,
        _command: &[String],
        _interactive: bool,
        name: &str,
    ) -> Result<ContainerHandle, RuntimeError> {
        self.check_available()?;
        let mut containers = self.containers.lock().unwrap();
        if containers.contains_key(name) {
            return Err(RuntimeError::operation(
                "create",
                name,
                "container name already in use",
            ));
        }
        let handle = ContainerHandle {
            id: self.next_container_id(),
            name: name.to_string(),
            running: false,
        };
        containers.insert(
            name.to_string(),
            FakeContainer {
                handle: handle.clone(),
                image: image.to_string(),
                shell: Arc::new(tokio::sync::Mutex::new(ShellState::new(name))),
                shells: Vec::new(),
            },
        );
        self.counters.lock().unwrap().creates += 1;
        Ok(handle)
    }

    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        self.check_available()?;
        Ok(self
            .containers
            .lock()
            .unwrap()
            .get(name)
            .map(|c| c.handle.clone()))
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.check_available()?;
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(&handle.name)
            .ok_or_else(|| RuntimeError::NotFound(handle.name.clone()))?;
        container.handle.running = true;
        self.counters.lock().unwrap().starts += 1;
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle, force: bool) -> Result<(), RuntimeError> {
        self.check_available()?;
        let mut containers = self.containers.lock().unwrap();
        match containers.get(&handle.name) {
            None => return Err(RuntimeError::NotFound(handle.name.clone())),
            Some(c) if c.handle.running && !force => {
                return Err(RuntimeError::operation(
                    "remove",
                    &handle.name,
                    "container is running",
                ))
            }
            Some(_) => {}
        }
        if let Some(container) = containers.remove(&handle.name) {
            for shell in container.shells {
                shell.abort();
            }
        }
        self.counters.lock().unwrap().removes += 1;
        Ok(())
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        tty: bool,
    ) -> Result<ExecIo, RuntimeError> {
        self.check_available()?;
        if let Some(message) = self.exec_failure.lock().unwrap().clone() {
            return Err(RuntimeError::operation("exec", &handle.name, message));
        }

        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(&handle.name)
            .ok_or_else(|| RuntimeError::NotFound(handle.name.clone()))?;
        if !container.handle.running {
            return Err(RuntimeError::operation(
                "exec",
                &handle.name,
                "container is not running",
            ));
        }

        let mut counters = self.counters.lock().unwrap();
        counters.execs += 1;
        if tty {
            counters.tty_execs += 1;
            let (io, task) = Self::interactive(container.shell.clone());
            container.shells.push(task);
            Ok(io)
        } else {
            Ok(Self::one_shot(container.shell.clone(), command))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn running(rt: &FakeRuntime, name: &str) -> ContainerHandle {
        let h = rt
            .create("ubuntu:24.04", &["/bin/bash".to_string()], true, name)
            .await
            .unwrap();
        rt.start(&h).await.unwrap();
        h
    }

    async fn collect(io: ExecIo) -> String {
        let chunks: Vec<_> = io.output.collect().await;
        let mut out = Vec::new();
        for c in chunks {
            out.extend_from_slice(&c.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn one_shot_exec_runs_script() {
        let rt = FakeRuntime::new();
        let h = running(&rt, "c1").await;
        let io = rt
            .exec(&h, &["/bin/sh".into(), "-c".into(), "echo hi".into()], false)
            .await
            .unwrap();
        assert_eq!(collect(io).await, "hi\n");
    }

    #[tokio::test]
    async fn interactive_shell_echoes_and_prompts() {
        let rt = FakeRuntime::new();
        let h = running(&rt, "c1").await;
        let mut io = rt.exec(&h, &["/bin/bash".into()], true).await.unwrap();
        io.input.write_all(b"pwd\nexit\n").await.unwrap();
        let out = collect(io).await;
        assert_eq!(
            out,
            format!("{FAKE_PROMPT}pwd\r\n/\r\n{FAKE_PROMPT}exit\r\nexit\r\n")
        );
    }

    #[tokio::test]
    async fn exec_requires_running_container() {
        let rt = FakeRuntime::new();
        let h = rt.insert_stopped("old", "alpine");
        assert!(rt.exec(&h, &["true".into()], false).await.is_err());
        rt.set_unavailable(true);
        assert!(matches!(
            rt.get("old").await,
            Err(RuntimeError::Unavailable(_))
        ));
    }
}

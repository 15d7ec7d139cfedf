//! Session registry and execution adapter against the in-memory runtime.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use ghostgate_core::api::{
    container_name, run_bridge, AppConfig, AppContext, BridgeEnd, CaptureBuffer, CapturedOutput,
    CommandExecutor, ContainerRuntime, ContainerSession, ExecStrategy, ExecutionAdapter,
    PtyProvider, RegistryOptions, RegistryPtyProvider, RuntimeError, SessionError,
    SessionRegistry,
};
use pretty_assertions::assert_eq;
use testkit::{FakeRuntime, FAKE_PROMPT};

struct CollectStrategy;

#[async_trait]
impl ExecStrategy for CollectStrategy {
    fn name(&self) -> &'static str {
        "collect"
    }

    fn needs_pty(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        runtime: &dyn ContainerRuntime,
        session: &ContainerSession,
        command: &str,
    ) -> Result<CapturedOutput, RuntimeError> {
        let argv = vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()];
        let mut io = runtime.exec(&session.container, &argv, false).await?;
        let mut buf = CaptureBuffer::new(4096);
        while let Some(chunk) = io.output.next().await {
            buf.push(&chunk?);
        }
        Ok(buf.finish())
    }
}

fn options(attach_pty: bool) -> RegistryOptions {
    RegistryOptions::from_config(&AppConfig::default().container, attach_pty)
}

fn registry(rt: &Arc<FakeRuntime>, attach_pty: bool) -> Arc<SessionRegistry> {
    Arc::new(SessionRegistry::new(rt.clone(), options(attach_pty)))
}

#[tokio::test]
async fn concurrent_first_use_creates_one_container() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, false);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let reg = reg.clone();
        tasks.push(tokio::spawn(async move {
            reg.get_or_create("sess_a", None).await.unwrap()
        }));
    }
    let mut ids = Vec::new();
    for t in tasks {
        ids.push(t.await.unwrap().container.id.clone());
    }
    ids.dedup();

    assert_eq!(ids.len(), 1);
    assert_eq!(rt.create_count(), 1);
    assert_eq!(rt.container_names(), vec!["ghostshell_sess_a".to_string()]);
}

#[tokio::test]
async fn sessions_get_independent_containers() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, false);
    let adapter = ExecutionAdapter::new(reg.clone(), Arc::new(CollectStrategy));

    assert_eq!(adapter.run("s1", "cd /tmp").await.text, "");
    assert_eq!(adapter.run("s1", "pwd").await.text, "/tmp\n");
    assert_eq!(adapter.run("s2", "pwd").await.text, "/\n");
    assert_eq!(
        adapter.run("s1", "hostname").await.text,
        "ghostshell_s1\n"
    );
    assert_eq!(
        adapter.run("s2", "hostname").await.text,
        "ghostshell_s2\n"
    );
    assert_eq!(rt.create_count(), 2);
}

#[tokio::test]
async fn existing_stopped_container_is_reused() {
    let rt = FakeRuntime::new();
    let name = container_name("ghostshell", "old");
    let leftover = rt.insert_stopped(&name, "debian:12");
    let reg = registry(&rt, false);

    let session = reg.get_or_create("old", Some("alpine:latest")).await.unwrap();
    assert_eq!(session.container.id, leftover.id);
    assert!(session.container.running);
    assert!(rt.is_running(&name));
    assert_eq!(rt.create_count(), 0);
    assert_eq!(rt.start_count(), 1);
}

#[tokio::test]
async fn explicit_image_is_used_for_new_containers() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, false);
    reg.get_or_create("py", Some("python:3.11-slim")).await.unwrap();
    assert_eq!(
        rt.image_of("ghostshell_py").as_deref(),
        Some("python:3.11-slim")
    );
}

#[tokio::test]
async fn stop_removes_and_next_use_starts_fresh() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, false);

    let first = reg.get_or_create("s1", None).await.unwrap();
    reg.stop("s1").await.unwrap();
    assert!(rt.container_names().is_empty());
    assert!(matches!(
        reg.stop("s1").await,
        Err(SessionError::NotRunning(id)) if id == "s1"
    ));

    let second = reg.get_or_create("s1", None).await.unwrap();
    assert_ne!(first.container.id, second.container.id);
    assert_eq!(rt.create_count(), 2);
}

#[tokio::test]
async fn status_and_list_report_sessions() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, false);
    assert!(reg.status("s1").await.unwrap().is_none());

    reg.get_or_create("s1", None).await.unwrap();
    reg.get_or_create("s2", None).await.unwrap();

    let status = reg.status("s1").await.unwrap().unwrap();
    assert_eq!(status.container_name, "ghostshell_s1");
    assert_eq!(status.image, "ubuntu:24.04");
    assert!(status.running);

    let listed: Vec<String> = reg.list().await.into_iter().map(|s| s.session_id).collect();
    assert_eq!(listed.len(), 2);
    assert!(listed.contains(&"s2".to_string()));

    assert_eq!(reg.stop_all().await, 2);
    assert!(reg.list().await.is_empty());
}

#[tokio::test]
async fn pty_sessions_attach_an_interactive_shell() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, true);

    let session = reg.get_or_create("s1", None).await.unwrap();
    reg.get_or_create("s1", None).await.unwrap();
    assert_eq!(rt.tty_exec_count(), 1);
    assert!(session.lock_pty().await.is_some());
}

#[tokio::test]
async fn runtime_failures_become_output_text() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, false);
    let adapter = ExecutionAdapter::new(reg.clone(), Arc::new(CollectStrategy));

    rt.set_unavailable(true);
    let out = adapter.run("s1", "echo hi").await;
    assert!(out.failed);
    assert!(out.text.starts_with("error: "));
    assert!(out.text.contains("unavailable"));

    rt.set_unavailable(false);
    rt.fail_exec(Some("exec refused"));
    let out = adapter.run("s1", "echo hi").await;
    assert!(out.failed);
    assert!(out.text.contains("exec refused"));

    rt.fail_exec(None);
    let out = adapter.run("s1", "echo hi").await;
    assert!(!out.failed);
    assert_eq!(out.text, "hi\n");
}

#[tokio::test]
async fn bridge_streams_a_fresh_shell() {
    let rt = FakeRuntime::new();
    let reg = registry(&rt, false);
    let provider = RegistryPtyProvider::new(reg.clone());

    let pty = provider.open("s1").await.unwrap();
    let inbound = futures::stream::iter(vec![Bytes::from_static(b"echo hi\nexit\n")]).chain(
        // keep the network side open until the shell exits
        futures::stream::pending(),
    );
    let (tx, rx) = futures::channel::mpsc::unbounded::<Bytes>();

    let summary = run_bridge("s1", pty, inbound, tx).await;
    assert_eq!(summary.closed_by, BridgeEnd::Pty);

    let received: Vec<Bytes> = rx.collect().await;
    let text: String = received
        .iter()
        .map(|b| String::from_utf8_lossy(b).into_owned())
        .collect();
    assert!(text.starts_with(FAKE_PROMPT));
    assert!(text.contains("echo hi\r\nhi\r\n"));
    assert_eq!(rt.tty_exec_count(), 1);
}

#[tokio::test]
async fn context_exposes_session_status() {
    let rt = FakeRuntime::new();
    let ctx = AppContext::new(AppConfig::default(), rt.clone(), Arc::new(CollectStrategy));
    assert!(ctx.session_status("s1").await.unwrap().is_none());
    ctx.registry().get_or_create("s1", None).await.unwrap();
    assert!(ctx.session_status("s1").await.unwrap().is_some());
    assert_eq!(ctx.runtime_name(), "fake");
}

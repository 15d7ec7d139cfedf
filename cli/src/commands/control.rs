use std::time::Duration;

use futures::{pin_mut, StreamExt};
use ghostgate_core::api::{CliError, GateEvent, PendingCommand, SessionStatus};

use crate::client::ControlClient;
use crate::commands::cli::{PolicyArgs, SessionAction};

pub fn client_for(base_url: &str, request_timeout_ms: u64) -> Result<ControlClient, CliError> {
    ControlClient::new(base_url, Duration::from_millis(request_timeout_ms))
}

fn pending_line(entry: &PendingCommand) -> String {
    format!(
        "#{:<4} {:<8} [{}] {}",
        entry.id,
        entry.status.to_string(),
        entry.session_id,
        entry.command_text
    )
}

fn session_line(s: &SessionStatus) -> String {
    format!(
        "{:<20} {:<8} {:<24} {} (since {})",
        s.session_id,
        if s.running { "running" } else { "stopped" },
        s.container_name,
        s.image,
        s.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}

fn event_line(ev: &GateEvent) -> String {
    match ev {
        GateEvent::Submitted { entry } => format!("submitted {}", pending_line(entry)),
        GateEvent::Resolved { entry } => format!("resolved  {}", pending_line(entry)),
        GateEvent::Withdrawn { id, reason } => format!("withdrawn #{id} ({reason})"),
        GateEvent::PolicyChanged { policy } => format!(
            "policy    allow_all={} paused={}",
            policy.allow_all, policy.paused
        ),
    }
}

pub async fn handle_pending(client: &ControlClient) -> Result<(), CliError> {
    let pending = client.pending().await?;
    if pending.is_empty() {
        println!("no pending commands");
    }
    for entry in &pending {
        println!("{}", pending_line(entry));
    }
    Ok(())
}

pub async fn handle_history(client: &ControlClient) -> Result<(), CliError> {
    for entry in client.history().await? {
        println!("{}", pending_line(&entry));
    }
    Ok(())
}

pub async fn handle_decide(client: &ControlClient, id: u64, approve: bool) -> Result<(), CliError> {
    let entry = client.decide(id, approve).await?;
    println!("{}", pending_line(&entry));
    if let Some(output) = entry.output.filter(|o| !o.is_empty()) {
        print!("{output}");
        if !output.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

pub async fn handle_policy(client: &ControlClient, args: PolicyArgs) -> Result<(), CliError> {
    let policy = if args.allow_all.is_none() && args.paused.is_none() {
        client.policy().await?
    } else {
        client.update_policy(args.allow_all, args.paused).await?
    };
    println!("allow_all={} paused={}", policy.allow_all, policy.paused);
    Ok(())
}

pub async fn handle_session(client: &ControlClient, action: SessionAction) -> Result<(), CliError> {
    match action {
        SessionAction::List => {
            for s in client.sessions().await? {
                println!("{}", session_line(&s));
            }
        }
        SessionAction::Status { id } => println!("{}", session_line(&client.session(&id).await?)),
        SessionAction::Start { id, image } => {
            println!("{}", session_line(&client.start_session(&id, image).await?))
        }
        SessionAction::Stop { id } => {
            client.stop_session(&id).await?;
            println!("stopped {id}");
        }
    }
    Ok(())
}

pub async fn handle_watch(client: &ControlClient) -> Result<(), CliError> {
    let events = client.events().await?;
    pin_mut!(events);
    while let Some(ev) = events.next().await {
        println!("{}", event_line(&ev?));
    }
    Ok(())
}

pub async fn handle_shutdown(client: &ControlClient) -> Result<(), CliError> {
    println!("{}", client.shutdown().await?);
    Ok(())
}

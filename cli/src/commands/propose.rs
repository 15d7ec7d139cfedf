use ghostgate_core::api::{propose, AppConfig, CliError, Endpoint, Framing, ProposalRequest};
use uuid::Uuid;

use crate::commands::cli::ProposeArgs;

/// `sess_` plus ten lowercase alphanumerics, the id shape agents use.
pub fn generate_session_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("sess_{}", &hex[..10])
}

/// Sends one proposal and prints the output. Returns the process exit code:
/// 0 when approved, 1 when rejected.
pub async fn handle_propose(args: ProposeArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let listen = args.listen.as_deref().unwrap_or(&cfg.listener.listen);
    let endpoint = Endpoint::parse(listen)?;
    let session = args.session.unwrap_or_else(generate_session_id);
    let framing = if args.length_prefixed {
        Framing::LengthPrefixed
    } else {
        Framing::Line
    };

    tracing::debug!(
        target: "ghostgate.protocol",
        endpoint = %endpoint,
        session_id = %session,
        "sending proposal"
    );
    let verdict = propose(&endpoint, &ProposalRequest::new(session, args.command), framing).await?;

    if args.json {
        let line = serde_json::to_string(&verdict)
            .map_err(|e| CliError::Command(format!("failed to encode response: {e}")))?;
        println!("{line}");
    } else {
        print!("{}", verdict.output);
        if !verdict.is_approved() {
            eprintln!("[rejected]");
        }
    }
    Ok(if verdict.is_approved() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_look_like_agent_sessions() {
        let id = generate_session_id();
        assert_eq!(id.len(), 15);
        assert!(id.starts_with("sess_"));
        assert!(id[5..]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(id, generate_session_id());
    }
}

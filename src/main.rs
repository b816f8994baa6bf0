mod backup;
mod config;
mod db;
mod fingerprint;
mod ipc;
mod qr;
mod registry;
mod validation;

use std::io::{self, BufRead, Write};

fn main() {
    let cfg = config::DaemonConfig::from_env();
    config::init_logging(&cfg);

    let mut state = ipc::AppState::new();
    if let Some(path) = cfg.workspace.as_deref() {
        // A startup workspace that fails to open is not fatal; the client can
        // still select another one.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            tracing::warn!(
                workspace = %path.to_string_lossy(),
                error = %e,
                "startup workspace not opened"
            );
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "docsigd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                tracing::debug!(error = %e, "malformed request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, shutting down");
}

mod auth;
mod backup;
mod config;
mod db;
mod ipc;
mod store;

use std::io::{self, BufRead, Write};

fn main() {
    dotenvy::dotenv().ok();
    let (cfg, cfg_err) = match config::DaemonConfig::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (config::DaemonConfig::default(), Some(e)),
    };

    // stdout carries responses; env_logger writes to stderr.
    env_logger::Builder::new()
        .filter_level(cfg.log_filter())
        .parse_default_env()
        .init();
    if let Some(e) = cfg_err {
        log::warn!("ignoring invalid configuration: {e:#}");
    }
    log::info!("gradebookd {} starting", env!("CARGO_PKG_VERSION"));

    let mut state = ipc::AppState::default();
    if let Some(workspace) = cfg.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, workspace) {
            log::error!("failed to open configured workspace {}: {e:#}", workspace.display());
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                log::warn!("dropping malformed request: {e}");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
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

    log::info!("stdin closed, shutting down");
}

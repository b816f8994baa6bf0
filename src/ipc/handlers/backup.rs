use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::registry::Registry;
use serde_json::json;
use std::path::PathBuf;

fn handle_export_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let (Some(workspace_path), Some(conn)) = (state.workspace.clone(), state.db.as_ref()) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let document_count = match Registry::new(conn).count_all() {
        Ok(n) => n,
        Err(e) => return err(&req.id, e.code(), e.to_string(), None),
    };
    if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(FULL)") {
        tracing::debug!(error = %e, "wal checkpoint skipped");
    }

    let out = PathBuf::from(&out_path);
    let export = match backup::export_registry_bundle(&workspace_path, &out, document_count) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "documentCount": export.document_count
        }),
    )
}

fn handle_import_workspace_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    // Drop open handle before replacing file.
    state.db = None;

    let import = backup::import_registry_bundle(&src, &workspace_path);
    // Reopen either way so a failed import leaves the old registry usable.
    let reopened = db::open_db(&workspace_path);
    let import = match import {
        Ok(v) => v,
        Err(e) => {
            if let Ok(conn) = reopened {
                state.db = Some(conn);
            }
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": src.to_string_lossy() })),
            );
        }
    };

    match reopened {
        Ok(conn) => {
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": workspace_path.to_string_lossy(),
                    "bundleFormatDetected": import.bundle_format_detected,
                    "documentCount": import.document_count
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export_workspace_bundle(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import_workspace_bundle(state, req)),
        _ => None,
    }
}

use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::params::{check_file_size, get_optional_str, get_required_str, path_param};
use crate::ipc::types::{AppState, Request};
use crate::qr::QrError;
use crate::registry::Registry;
use crate::validation::{
    CompareError, ValidationSession, ValidationState, INVALID_SIGNATURE_MESSAGE,
};
use serde_json::json;
use std::fs::File;

fn invalid_signature(session: &ValidationSession) -> HandlerErr {
    let message = session.error().unwrap_or(INVALID_SIGNATURE_MESSAGE);
    HandlerErr::new("invalid_signature", message).with_details(json!({ "session": session }))
}

fn qr_failure(e: &QrError, session: &ValidationSession) -> HandlerErr {
    HandlerErr::new(e.code(), e.user_message()).with_details(json!({
        "reason": e.to_string(),
        "session": session
    }))
}

/// Shape of a successful step one: the fields of `GET /validate/{signature}`.
fn matched_result(
    registry: &Registry<'_>,
    session: &ValidationSession,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(doc) = session.document_info() else {
        return Err(invalid_signature(session));
    };
    let match_count = registry.count_by_signature(&doc.file_signature)?;
    Ok(json!({
        "fileSignature": doc.file_signature,
        "documentName": doc.document_name,
        "filePath": doc.file_path,
        "matchCount": match_count,
        "session": session
    }))
}

fn lookup(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let registry = Registry::new(conn);
    let mut session = ValidationSession::new();

    if let Some(url) = get_optional_str(params, "url") {
        session
            .validate_from_url(&registry, &url)
            .map_err(|e| qr_failure(&e, &session))?;
    } else {
        // Blank signatures go through the session so they get the generic reply too.
        let signature = params
            .get("signature")
            .and_then(|v| v.as_str())
            .ok_or_else(|| HandlerErr::new("bad_params", "missing signature or url"))?;
        session.validate_signature(&registry, signature);
    }

    matched_result(&registry, &session)
}

fn lookup_qr(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let path = path_param(params, "path")?;
    let limits = setup::load_limits(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let registry = Registry::new(conn);
    let mut session = ValidationSession::new();
    if let Err(e) = check_file_size(&path, limits.max_qr_image_bytes, "image_load_failed") {
        if e.code == "file_too_large" {
            return Err(e);
        }
        let e = QrError::ImageLoad(format!("{}: {}", path.to_string_lossy(), e.message));
        session.fail_qr(&e);
        return Err(qr_failure(&e, &session));
    }

    session
        .validate_from_qr_path(&registry, &path)
        .map_err(|e| qr_failure(&e, &session))?;

    let mut result = matched_result(&registry, &session)?;
    result["signature"] = json!(session.signature());
    Ok(result)
}

fn compare(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let expected = get_required_str(params, "expectedSignature")?;
    let path = path_param(params, "path")?;
    let limits = setup::load_limits(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;

    let registry = Registry::new(conn);
    let mut session = ValidationSession::new();
    session.validate_signature(&registry, &expected);
    if session.state() != ValidationState::SignatureMatched {
        return Err(invalid_signature(&session));
    }

    check_file_size(&path, limits.max_file_bytes, "file_read_failed")?;
    let file = File::open(&path).map_err(|e| {
        HandlerErr::new("file_read_failed", e.to_string())
            .with_details(json!({ "path": path.to_string_lossy() }))
    })?;

    match session.compare_file_signature(file, &expected) {
        Ok(_) => {}
        Err(CompareError::FileRead(e)) => {
            return Err(HandlerErr::new("file_read_failed", e.to_string())
                .with_details(json!({ "path": path.to_string_lossy() })))
        }
        Err(e @ CompareError::NotReady(_)) => {
            return Err(HandlerErr::new("bad_state", e.to_string()))
        }
    }
    let Some(result) = session.comparison_result() else {
        return Err(HandlerErr::new("bad_state", "comparison did not complete"));
    };

    Ok(json!({
        "isMatch": result.is_match,
        "uploadedSignature": result.uploaded_signature,
        "expectedSignature": result.expected_signature,
        "session": session
    }))
}

fn with_db(
    state: &mut AppState,
    req: &Request,
    f: fn(&rusqlite::Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "validate.lookup" => Some(with_db(state, req, lookup)),
        "validate.qr" => Some(with_db(state, req, lookup_qr)),
        "validate.compare" => Some(with_db(state, req, compare)),
        _ => None,
    }
}

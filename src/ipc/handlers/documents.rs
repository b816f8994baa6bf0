use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::handlers::setup;
use crate::ipc::params::{
    check_file_size, get_optional_str, get_optional_usize, get_required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::registry::{NewDocument, Registry, SearchFilters};
use serde_json::json;
use std::path::PathBuf;

fn handle_documents_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match create_document(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn create_document(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let document_name = get_required_str(params, "documentName")?;
    let source = PathBuf::from(get_required_str(params, "path")?);
    // The stored reference defaults to where the bytes were read from.
    let file_path = get_optional_str(params, "filePath")
        .unwrap_or_else(|| source.to_string_lossy().to_string());
    let file_signature = get_optional_str(params, "fileSignature");

    let limits = setup::load_limits(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    check_file_size(&source, limits.max_file_bytes, "file_read_failed")?;

    let outcome = Registry::new(conn).create_from_path(
        NewDocument {
            document_name,
            file_path,
            file_signature,
        },
        &source,
    )?;

    let mut result = json!({ "document": outcome.record });
    if let Some(w) = outcome.duplicate {
        result["duplicateWarning"] = json!(w);
    }
    Ok(result)
}

fn handle_documents_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "documents": [] }));
    };
    match Registry::new(conn).list_all() {
        Ok(documents) => ok(&req.id, json!({ "documents": documents })),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

fn handle_documents_search(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match search_documents(conn, &req.params) {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    }
}

fn search_documents(
    conn: &rusqlite::Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let limits = setup::load_limits(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let limit = get_optional_usize(params, "limit")?
        .unwrap_or(limits.default_page_size)
        .min(limits.max_page_size);
    let offset = get_optional_usize(params, "offset")?.unwrap_or(0);

    let filters = SearchFilters {
        query: get_optional_str(params, "query"),
        signature_prefix: get_optional_str(params, "signaturePrefix"),
        created_from: get_optional_str(params, "createdFrom"),
        created_to: get_optional_str(params, "createdTo"),
        limit: Some(limit),
        offset,
    };
    let page = Registry::new(conn).search(&filters)?;
    Ok(json!({
        "documents": page.documents,
        "total": page.total,
        "limit": limit,
        "offset": offset
    }))
}

fn handle_documents_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let id = match get_required_str(&req.params, "id") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    match Registry::new(conn).delete(&id) {
        Ok(true) => ok(&req.id, json!({ "deleted": true, "id": id })),
        Ok(false) => err(
            &req.id,
            "not_found",
            "document not found",
            Some(json!({ "id": id })),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "documents.create" => Some(handle_documents_create(state, req)),
        "documents.list" => Some(handle_documents_list(state, req)),
        "documents.search" => Some(handle_documents_search(state, req)),
        "documents.delete" => Some(handle_documents_delete(state, req)),
        _ => None,
    }
}

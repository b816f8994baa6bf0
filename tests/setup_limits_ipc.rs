mod test_support;

use serde_json::json;
use test_support::{
    error_code, request_err, request_ok, select_workspace, spawn_sidecar, temp_dir, write_file,
};

#[test]
fn setup_defaults_and_patch_persist() {
    let workspace = temp_dir("docsig-setup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let all = request_ok(&mut stdin, &mut reader, "1", "setup.get", json!({}));
    assert_eq!(all["validation"]["maxFileBytes"], json!(64 * 1024 * 1024));
    assert_eq!(all["validation"]["maxQrImageBytes"], json!(16 * 1024 * 1024));
    assert_eq!(all["registry"]["defaultPageSize"], json!(50));
    assert_eq!(all["registry"]["maxPageSize"], json!(500));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "setup.update",
        json!({ "section": "registry", "patch": { "defaultPageSize": 5 } }),
    );
    assert_eq!(updated["values"]["defaultPageSize"], json!(5));
    assert_eq!(updated["values"]["maxPageSize"], json!(500));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "setup.update",
        json!({ "section": "registry", "patch": { "maxPageSize": 2 } }),
    );
    assert_eq!(error_code(&error), "bad_params");
    let error = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "setup.update",
        json!({ "section": "appearance", "patch": {} }),
    );
    assert_eq!(error_code(&error), "bad_params");
    drop(stdin);
    let _ = child.wait();

    // Stored in the workspace, so a new process sees it.
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    let registry = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "setup.get",
        json!({ "section": "registry" }),
    );
    assert_eq!(registry["section"], json!("registry"));
    assert_eq!(registry["values"]["defaultPageSize"], json!(5));
    let search = request_ok(&mut stdin, &mut reader, "6", "documents.search", json!({}));
    assert_eq!(search["limit"], json!(5));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn oversized_files_are_rejected_before_reading() {
    let workspace = temp_dir("docsig-setup-limits");
    let big = write_file(&workspace, "big.bin", &[7u8; 2048]);
    let small = write_file(&workspace, "small.txt", b"HELLO WORLD");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "setup.update",
        json!({
            "section": "validation",
            "patch": { "maxFileBytes": 1024, "maxQrImageBytes": 1024 }
        }),
    );

    let error = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "documents.create",
        json!({ "documentName": "Big", "path": big.to_string_lossy() }),
    );
    assert_eq!(error_code(&error), "file_too_large");
    assert_eq!(error["details"]["size"], json!(2048));
    assert_eq!(error["details"]["maxBytes"], json!(1024));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "validate.qr",
        json!({ "path": big.to_string_lossy() }),
    );
    assert_eq!(error_code(&error), "file_too_large");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "documents.create",
        json!({ "documentName": "Small", "path": small.to_string_lossy() }),
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "validate.compare",
        json!({ "expectedSignature": "787ec76", "path": big.to_string_lossy() }),
    );
    assert_eq!(error_code(&error), "file_too_large");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

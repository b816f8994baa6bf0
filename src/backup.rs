use anyhow::{anyhow, Context};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/docsig.sqlite3";
pub const BUNDLE_FORMAT: &str = "docsig-registry-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

const DB_FILE_NAME: &str = "docsig.sqlite3";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub document_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub document_count: Option<usize>,
}

pub fn export_registry_bundle(
    workspace_path: &Path,
    out_path: &Path,
    document_count: usize,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "registry database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.to_string_lossy()))?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "documentCount": document_count,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;
    tracing::info!(
        out = %out_path.to_string_lossy(),
        documents = document_count,
        "registry bundle exported"
    );

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: 2,
        document_count,
    })
}

/// Replaces the workspace database with the one in `in_path`. The caller must
/// have dropped any open connection to it.
pub fn import_registry_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp_dst = workspace_path.join(format!("{DB_FILE_NAME}.importing"));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }

    let magic = read_magic(in_path)?;
    let summary = if magic.starts_with(&ZIP_MAGIC) {
        extract_bundle_db(in_path, &tmp_dst)?
    } else if magic == *SQLITE_MAGIC {
        std::fs::copy(in_path, &tmp_dst).with_context(|| {
            format!(
                "failed to copy sqlite file {} to {}",
                in_path.to_string_lossy(),
                tmp_dst.to_string_lossy()
            )
        })?;
        ImportSummary {
            bundle_format_detected: RAW_SQLITE_FORMAT.to_string(),
            document_count: None,
        }
    } else {
        return Err(anyhow!(
            "{} is neither a registry bundle nor a sqlite database",
            in_path.to_string_lossy()
        ));
    };

    // rename replaces an existing database in one step.
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move imported database to {}",
            dst.to_string_lossy()
        )
    })?;
    tracing::info!(
        from = %in_path.to_string_lossy(),
        format = %summary.bundle_format_detected,
        "registry bundle imported"
    );

    Ok(summary)
}

fn extract_bundle_db(in_path: &Path, tmp_dst: &Path) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let document_count = manifest
        .get("documentCount")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize);

    let mut db_out = File::create(tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .with_context(|| format!("bundle missing {DB_ENTRY}"))?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
    }
    db_out
        .flush()
        .context("failed to flush extracted database")?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT.to_string(),
        document_count,
    })
}

fn read_magic(path: &Path) -> anyhow::Result<[u8; 16]> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut magic = [0u8; 16];
    let mut filled = 0;
    while filled < magic.len() {
        let n = f
            .read(&mut magic[filled..])
            .context("failed to read file header")?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(magic)
}

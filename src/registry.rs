use crate::fingerprint::{self, Fingerprint, FingerprintError};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::io::Read;
use std::path::Path;
use uuid::Uuid;

const RECORD_COLUMNS: &str =
    "id, file_signature, document_name, file_path, content_sha256, byte_len, created_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSignatureRecord {
    pub id: String,
    pub file_signature: String,
    pub document_name: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub byte_len: Option<i64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_name: String,
    pub file_path: String,
    /// Used as-is when present; computed from the content otherwise.
    pub file_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSignatureWarning {
    pub file_signature: String,
    pub existing_ids: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub record: DocumentSignatureRecord,
    pub duplicate: Option<DuplicateSignatureWarning>,
}

#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub query: Option<String>,
    pub signature_prefix: Option<String>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct SearchPage {
    pub documents: Vec<DocumentSignatureRecord>,
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("{0}")]
    BadInput(String),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fingerprint(_) => "file_read_failed",
            Self::Db(_) => "db_query_failed",
            Self::BadInput(_) => "bad_params",
        }
    }
}

/// Read access the validation flow needs from the registry.
pub trait SignatureLookup {
    fn find_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<DocumentSignatureRecord>, RegistryError>;
}

pub struct Registry<'c> {
    conn: &'c Connection,
}

impl<'c> Registry<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn create_from_path(
        &self,
        new: NewDocument,
        path: &Path,
    ) -> Result<CreateOutcome, RegistryError> {
        let (document_name, file_path) = checked_fields(&new)?;
        let fp = fingerprint::signature_from_path(path)?;
        self.register(document_name, file_path, new.file_signature, fp)
    }

    pub fn create<R: Read>(
        &self,
        new: NewDocument,
        content: R,
    ) -> Result<CreateOutcome, RegistryError> {
        let (document_name, file_path) = checked_fields(&new)?;
        let fp = fingerprint::signature_from_reader(content)?;
        self.register(document_name, file_path, new.file_signature, fp)
    }

    fn register(
        &self,
        document_name: String,
        file_path: String,
        supplied: Option<String>,
        fp: Fingerprint,
    ) -> Result<CreateOutcome, RegistryError> {
        let file_signature = match supplied
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(supplied) if supplied != fp.signature => {
                tracing::warn!(
                    supplied = %supplied,
                    computed = %fp.signature,
                    "supplied signature does not match file content"
                );
                return Err(RegistryError::BadInput(format!(
                    "fileSignature {supplied} does not match the file content ({})",
                    fp.signature
                )));
            }
            Some(supplied) => supplied,
            None => fp.signature.clone(),
        };

        let duplicate = self.check_duplicate(&file_signature, &fp.sha256)?;

        let record = DocumentSignatureRecord {
            id: Uuid::new_v4().to_string(),
            file_signature,
            document_name,
            file_path,
            content_sha256: Some(fp.sha256),
            byte_len: Some(fp.byte_len as i64),
            created_at: now_timestamp(),
        };
        self.conn.execute(
            "INSERT INTO documents(id, file_signature, document_name, file_path, content_sha256, byte_len, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &record.id,
                &record.file_signature,
                &record.document_name,
                &record.file_path,
                &record.content_sha256,
                record.byte_len,
                &record.created_at,
            ),
        )?;
        tracing::info!(
            id = %record.id,
            signature = %record.file_signature,
            name = %record.document_name,
            "document signature registered"
        );

        Ok(CreateOutcome { record, duplicate })
    }

    fn check_duplicate(
        &self,
        signature: &str,
        sha256: &str,
    ) -> Result<Option<DuplicateSignatureWarning>, RegistryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, content_sha256 FROM documents WHERE file_signature = ?")?;
        let existing = stmt
            .query_map([signature], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, Option<String>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        if existing.is_empty() {
            return Ok(None);
        }

        // Rows without a stored digest predate content_sha256 and count as different.
        let conflicting: Vec<String> = existing
            .iter()
            .filter(|(_, other)| other.as_deref() != Some(sha256))
            .map(|(id, _)| id.clone())
            .collect();
        if conflicting.is_empty() {
            tracing::info!(
                signature = %signature,
                count = existing.len(),
                "identical content already registered"
            );
            return Ok(None);
        }

        tracing::warn!(
            signature = %signature,
            existing = ?conflicting,
            "signature already registered for a different file"
        );
        Ok(Some(DuplicateSignatureWarning {
            file_signature: signature.to_string(),
            message: format!(
                "signature {} is already registered for {} other document(s)",
                signature,
                conflicting.len()
            ),
            existing_ids: conflicting,
        }))
    }

    pub fn count_by_signature(&self, signature: &str) -> Result<usize, RegistryError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE file_signature = ?",
            [signature],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }

    pub fn count_all(&self) -> Result<usize, RegistryError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    pub fn list_all(&self) -> Result<Vec<DocumentSignatureRecord>, RegistryError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM documents ORDER BY created_at DESC, rowid DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn search(&self, filters: &SearchFilters) -> Result<SearchPage, RegistryError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut bind: Vec<Value> = Vec::new();

        if let Some(q) = filters.query.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            clauses.push("instr(lower(document_name), lower(?)) > 0");
            bind.push(Value::Text(q.to_string()));
        }
        if let Some(p) = filters
            .signature_prefix
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            clauses.push("substr(file_signature, 1, ?) = ?");
            bind.push(Value::Integer(p.chars().count() as i64));
            bind.push(Value::Text(p.to_string()));
        }
        if let Some(from) = filters.created_from.as_deref() {
            clauses.push("created_at >= ?");
            bind.push(Value::Text(parse_bound(from, false)?));
        }
        if let Some(to) = filters.created_to.as_deref() {
            clauses.push("created_at < ?");
            bind.push(Value::Text(parse_bound(to, true)?));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM documents{where_sql}"),
            params_from_iter(bind.iter()),
            |r| r.get(0),
        )?;

        let limit = filters.limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM documents{where_sql}
             ORDER BY created_at DESC, rowid DESC
             LIMIT {limit} OFFSET {}",
            filters.offset
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let documents = stmt
            .query_map(params_from_iter(bind.iter()), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SearchPage {
            documents,
            total: total as usize,
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool, RegistryError> {
        let n = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?", [id])?;
        if n > 0 {
            tracing::info!(id = %id, "document signature deleted");
        }
        Ok(n > 0)
    }
}

impl SignatureLookup for Registry<'_> {
    /// Exact, case-sensitive match. The oldest row wins when a signature is shared.
    fn find_by_signature(
        &self,
        signature: &str,
    ) -> Result<Option<DocumentSignatureRecord>, RegistryError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM documents
             WHERE file_signature = ?
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1"
        );
        let record = self
            .conn
            .query_row(&sql, [signature], record_from_row)
            .optional()?;
        Ok(record)
    }
}

fn checked_fields(new: &NewDocument) -> Result<(String, String), RegistryError> {
    let document_name = new.document_name.trim().to_string();
    if document_name.is_empty() {
        return Err(RegistryError::BadInput(
            "documentName must not be empty".into(),
        ));
    }
    let file_path = new.file_path.trim().to_string();
    if file_path.is_empty() {
        return Err(RegistryError::BadInput("filePath must not be empty".into()));
    }
    Ok((document_name, file_path))
}

fn record_from_row(r: &Row<'_>) -> rusqlite::Result<DocumentSignatureRecord> {
    Ok(DocumentSignatureRecord {
        id: r.get(0)?,
        file_signature: r.get(1)?,
        document_name: r.get(2)?,
        file_path: r.get(3)?,
        content_sha256: r.get(4)?,
        byte_len: r.get(5)?,
        created_at: r.get(6)?,
    })
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Normalizes a date or RFC 3339 bound into the stored timestamp format.
/// Date-only upper bounds are inclusive of the whole day.
fn parse_bound(raw: &str, upper: bool) -> Result<String, RegistryError> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        let t = t.with_timezone(&Utc);
        // Upper bounds compare with `<`; nudge so the instant itself is included.
        let t = if upper {
            t + chrono::Duration::microseconds(1)
        } else {
            t
        };
        return Ok(format_timestamp(t));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        RegistryError::BadInput(format!(
            "invalid date bound {raw:?}; expected YYYY-MM-DD or RFC 3339"
        ))
    })?;
    let date = if upper {
        date.succ_opt().ok_or_else(|| {
            RegistryError::BadInput(format!("date bound out of range: {raw}"))
        })?
    } else {
        date
    };
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| RegistryError::BadInput(format!("invalid date bound {raw:?}")))?;
    Ok(format_timestamp(midnight.and_utc()))
}

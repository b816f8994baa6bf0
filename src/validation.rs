//! Guest verification flow.
//!
//! A `ValidationSession` is a plain value owned by whoever drives one
//! verification attempt. Step one looks a signature up in the registry, step
//! two hashes a candidate file and compares it with the expected signature.
//! Nothing here writes to the registry.

use crate::fingerprint::{self, FingerprintError};
use crate::qr::{self, QrError};
use crate::registry::{DocumentSignatureRecord, SignatureLookup};
use serde::Serialize;
use std::io::Read;
use std::path::Path;

/// Shown for every failed lookup, whether the signature is unknown or the
/// registry could not be queried.
pub const INVALID_SIGNATURE_MESSAGE: &str = "Invalid Signature Passed, Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationState {
    AwaitingSignature,
    SignatureMatched,
    SignatureInvalid,
    ComparisonComplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub is_match: bool,
    pub uploaded_signature: String,
    pub expected_signature: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("no document matched yet (state {0:?}); validate a signature first")]
    NotReady(ValidationState),
    #[error(transparent)]
    FileRead(#[from] FingerprintError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSession {
    state: ValidationState,
    signature: Option<String>,
    document_info: Option<DocumentSignatureRecord>,
    comparison_result: Option<ComparisonResult>,
    error: Option<String>,
}

impl Default for ValidationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationSession {
    pub fn new() -> Self {
        Self {
            state: ValidationState::AwaitingSignature,
            signature: None,
            document_info: None,
            comparison_result: None,
            error: None,
        }
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn document_info(&self) -> Option<&DocumentSignatureRecord> {
        self.document_info.as_ref()
    }

    pub fn comparison_result(&self) -> Option<&ComparisonResult> {
        self.comparison_result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Starts a new attempt with `signature`. Any earlier match or comparison
    /// is dropped first.
    pub fn validate_signature<L: SignatureLookup>(&mut self, lookup: &L, signature: &str) {
        self.reset();
        let signature = signature.trim();
        if signature.is_empty() {
            self.fail_lookup();
            return;
        }
        self.signature = Some(signature.to_string());

        match lookup.find_by_signature(signature) {
            Ok(Some(record)) => {
                tracing::debug!(signature = %signature, id = %record.id, "signature matched");
                self.document_info = Some(record);
                self.state = ValidationState::SignatureMatched;
            }
            Ok(None) => {
                tracing::debug!(
                    signature = %signature,
                    shaped = fingerprint::is_signature_shaped(signature),
                    "signature not found"
                );
                self.fail_lookup();
            }
            Err(e) => {
                tracing::warn!(
                    signature = %signature,
                    code = e.code(),
                    error = %e,
                    "signature lookup failed"
                );
                self.fail_lookup();
            }
        }
    }

    fn fail_lookup(&mut self) {
        self.document_info = None;
        self.state = ValidationState::SignatureInvalid;
        self.error = Some(INVALID_SIGNATURE_MESSAGE.to_string());
    }

    /// Entry point for links of the form `...?signature=<value>`.
    pub fn validate_from_url<L: SignatureLookup>(
        &mut self,
        lookup: &L,
        url: &str,
    ) -> Result<(), QrError> {
        match qr::signature_from_url(url) {
            Ok(sig) => {
                self.validate_signature(lookup, &sig);
                Ok(())
            }
            Err(e) => {
                self.fail_qr(&e);
                Err(e)
            }
        }
    }

    /// Entry point for an uploaded photo of a QR code. QR failures are
    /// returned as-is and leave the session awaiting a signature.
    pub fn validate_from_qr_image<L: SignatureLookup>(
        &mut self,
        lookup: &L,
        image_bytes: &[u8],
    ) -> Result<(), QrError> {
        let extracted = qr::extract_signature_from_image_bytes(image_bytes);
        self.apply_qr_result(lookup, extracted)
    }

    /// Same as [`Self::validate_from_qr_image`] for an image stored on disk.
    pub fn validate_from_qr_path<L: SignatureLookup>(
        &mut self,
        lookup: &L,
        path: &Path,
    ) -> Result<(), QrError> {
        let extracted = qr::extract_signature_from_image_path(path);
        self.apply_qr_result(lookup, extracted)
    }

    fn apply_qr_result<L: SignatureLookup>(
        &mut self,
        lookup: &L,
        extracted: Result<String, QrError>,
    ) -> Result<(), QrError> {
        match extracted {
            Ok(sig) => {
                self.validate_signature(lookup, &sig);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(code = e.code(), error = %e, "qr extraction failed");
                self.fail_qr(&e);
                Err(e)
            }
        }
    }

    /// Records a QR failure that happened before any extraction ran.
    pub fn fail_qr(&mut self, e: &QrError) {
        self.reset();
        self.error = Some(e.user_message().to_string());
    }

    pub fn compare_file_signature<R: Read>(
        &mut self,
        candidate: R,
        expected_signature: &str,
    ) -> Result<&ComparisonResult, CompareError> {
        if self.state != ValidationState::SignatureMatched {
            return Err(CompareError::NotReady(self.state));
        }
        let uploaded = fingerprint::signature_from_reader(candidate)?;

        let result = ComparisonResult {
            is_match: uploaded.signature == expected_signature,
            uploaded_signature: uploaded.signature,
            expected_signature: expected_signature.to_string(),
        };
        tracing::info!(
            expected = %result.expected_signature,
            uploaded = %result.uploaded_signature,
            is_match = result.is_match,
            "file comparison complete"
        );
        self.state = ValidationState::ComparisonComplete;
        Ok(&*self.comparison_result.insert(result))
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

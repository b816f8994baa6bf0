use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Number of leading hex characters of the SHA-256 digest kept as the signature.
pub const SIGNATURE_LEN: usize = 7;

const READ_CHUNK: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("failed to read {}: {source}", describe(.path.as_deref()))]
    FileRead {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },
}

fn describe(path: Option<&Path>) -> String {
    match path {
        Some(p) => p.to_string_lossy().to_string(),
        None => "input stream".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub signature: String,
    pub sha256: String,
    pub byte_len: u64,
}

pub fn signature_from_reader<R: Read>(mut reader: R) -> Result<Fingerprint, FingerprintError> {
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; READ_CHUNK];
    let mut byte_len: u64 = 0;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(source) => return Err(FingerprintError::FileRead { path: None, source }),
        };
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        byte_len += n as u64;
    }

    Ok(finish(hasher, byte_len))
}

fn finish(hasher: Sha256, byte_len: u64) -> Fingerprint {
    let sha256 = format!("{:x}", hasher.finalize());
    Fingerprint {
        signature: sha256[..SIGNATURE_LEN].to_string(),
        sha256,
        byte_len,
    }
}

pub fn signature_from_path(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let file = File::open(path).map_err(|source| FingerprintError::FileRead {
        path: Some(path.to_path_buf()),
        source,
    })?;
    signature_from_reader(file).map_err(|e| match e {
        FingerprintError::FileRead { source, .. } => FingerprintError::FileRead {
            path: Some(path.to_path_buf()),
            source,
        },
    })
}

/// Signature of an in-memory buffer.
pub fn signature_from_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    finish(hasher, bytes.len() as u64).signature
}

/// True for strings that look like something this module produced.
pub fn is_signature_shaped(s: &str) -> bool {
    s.len() == SIGNATURE_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

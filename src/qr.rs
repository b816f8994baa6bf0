use std::path::Path;
use url::Url;

pub const SIGNATURE_PARAM: &str = "signature";

/// Failures of the QR path. Callers map each one to a different remediation,
/// so they are never folded together.
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("image could not be loaded: {0}")]
    ImageLoad(String),
    #[error("no QR code detected in image")]
    NoQrCodeDetected,
    #[error("QR payload is not a URL: {payload:?}")]
    InvalidPayloadFormat { payload: String },
    #[error("URL has no signature parameter: {url}")]
    SignatureParamMissing { url: String },
}

impl QrError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ImageLoad(_) => "image_load_failed",
            Self::NoQrCodeDetected => "no_qr_code",
            Self::InvalidPayloadFormat { .. } => "invalid_qr_payload",
            Self::SignatureParamMissing { .. } => "signature_param_missing",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ImageLoad(_) => {
                "The uploaded file could not be read as an image. Please upload a PNG or JPEG photo of the QR code."
            }
            Self::NoQrCodeDetected => {
                "No QR code was found in the image. Please retake the photo or enter the signature manually."
            }
            Self::InvalidPayloadFormat { .. } => {
                "The QR code does not contain a validation link. Please check where the QR code came from."
            }
            Self::SignatureParamMissing { .. } => {
                "The QR code link does not include a document signature. Please enter the signature manually."
            }
        }
    }
}

/// Reads the image at `path` and extracts its signature. The file bytes and
/// decoded pixels are dropped before this returns.
pub fn extract_signature_from_image_path(path: &Path) -> Result<String, QrError> {
    let bytes = std::fs::read(path)
        .map_err(|e| QrError::ImageLoad(format!("{}: {e}", path.to_string_lossy())))?;
    extract_signature_from_image_bytes(&bytes)
}

pub fn extract_signature_from_image_bytes(bytes: &[u8]) -> Result<String, QrError> {
    let payload = decode_qr_payload(bytes)?;
    signature_from_url(&payload)
}

/// Decodes the first readable QR code in the image and returns its text.
pub fn decode_qr_payload(bytes: &[u8]) -> Result<String, QrError> {
    let luma = image::load_from_memory(bytes)
        .map_err(|e| QrError::ImageLoad(e.to_string()))?
        .to_luma8();
    let (width, height) = luma.dimensions();

    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            luma.get_pixel(x as u32, y as u32).0[0]
        });
    let grids = prepared.detect_grids();
    if grids.is_empty() {
        return Err(QrError::NoQrCodeDetected);
    }

    for grid in &grids {
        match grid.decode() {
            Ok((_meta, content)) => return Ok(content),
            Err(e) => tracing::debug!(error = ?e, "qr grid found but not decodable"),
        }
    }
    // Finder patterns without a decodable grid are treated as "no code".
    Err(QrError::NoQrCodeDetected)
}

pub fn signature_from_url(raw: &str) -> Result<String, QrError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|_| QrError::InvalidPayloadFormat {
        payload: trimmed.to_string(),
    })?;

    url.query_pairs()
        .find(|(k, _)| k == SIGNATURE_PARAM)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| QrError::SignatureParamMissing {
            url: url.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn qr_png(text: &str) -> Vec<u8> {
        let code = qrcode::QrCode::new(text.as_bytes()).expect("encode qr");
        let modules = code.width() as i64;
        let colors = code.to_colors();
        let scale = 6_i64;
        let quiet = 4_i64;
        let side = ((modules + 2 * quiet) * scale) as u32;
        let img = image::GrayImage::from_fn(side, side, |x, y| {
            let mx = x as i64 / scale - quiet;
            let my = y as i64 / scale - quiet;
            let dark = (0..modules).contains(&mx)
                && (0..modules).contains(&my)
                && colors[(my * modules + mx) as usize] == qrcode::Color::Dark;
            image::Luma([if dark { 0 } else { 255 }])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    fn blank_png() -> Vec<u8> {
        let img = image::GrayImage::from_pixel(120, 120, image::Luma([255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png)
            .expect("encode png");
        out.into_inner()
    }

    #[test]
    fn qr_url_round_trip() {
        let png = qr_png("https://x/?signature=abc1234");
        let sig = extract_signature_from_image_bytes(&png).expect("extract");
        assert_eq!(sig, "abc1234");
    }

    #[test]
    fn blank_image_has_no_code() {
        let e = extract_signature_from_image_bytes(&blank_png()).expect_err("no code");
        assert!(matches!(e, QrError::NoQrCodeDetected), "{e:?}");
    }

    #[test]
    fn non_url_payload_is_distinct() {
        let png = qr_png("just some words");
        let e = extract_signature_from_image_bytes(&png).expect_err("not a url");
        assert!(matches!(e, QrError::InvalidPayloadFormat { .. }), "{e:?}");
        assert_eq!(e.code(), "invalid_qr_payload");
    }

    #[test]
    fn url_without_signature_is_distinct() {
        let png = qr_png("https://school.example/validate?doc=17");
        let e = extract_signature_from_image_bytes(&png).expect_err("no param");
        assert!(matches!(e, QrError::SignatureParamMissing { .. }), "{e:?}");
    }

    #[test]
    fn garbage_bytes_are_an_image_load_error() {
        let e = extract_signature_from_image_bytes(b"definitely not a png").expect_err("bad");
        assert!(matches!(e, QrError::ImageLoad(_)));
        assert_eq!(e.code(), "image_load_failed");
    }

    #[test]
    fn image_path_reads_file_and_maps_missing_to_image_load() {
        let dir = std::env::temp_dir().join(format!("docsigd-qr-path-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("dir");
        let p = dir.join("code.png");
        std::fs::write(&p, qr_png("https://x/?signature=def5678")).expect("write");
        assert_eq!(extract_signature_from_image_path(&p).expect("extract"), "def5678");

        let e = extract_signature_from_image_path(&dir.join("missing.png")).expect_err("missing");
        assert!(matches!(e, QrError::ImageLoad(_)), "{e:?}");
        let e = extract_signature_from_image_path(&dir).expect_err("directory");
        assert!(matches!(e, QrError::ImageLoad(_)), "{e:?}");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn url_param_is_trimmed_and_decoded() {
        assert_eq!(
            signature_from_url(" https://x/validate?a=1&signature=%20abc1234 ").expect("sig"),
            "abc1234"
        );
    }

    #[test]
    fn empty_param_counts_as_missing() {
        let e = signature_from_url("https://x/validate?signature=").expect_err("empty");
        assert!(matches!(e, QrError::SignatureParamMissing { .. }));
    }

    #[test]
    fn messages_differ_per_failure() {
        let all = [
            QrError::ImageLoad("x".into()),
            QrError::NoQrCodeDetected,
            QrError::InvalidPayloadFormat { payload: "x".into() },
            QrError::SignatureParamMissing { url: "x".into() },
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.user_message(), b.user_message());
                assert_ne!(a.code(), b.code());
            }
        }
    }
}

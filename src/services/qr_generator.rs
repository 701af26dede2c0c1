use qrcode::render::svg;
use qrcode::QrCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::signature;

const QUIET_ZONE_MODULES: u32 = 4;
const PNG_MODULE_SIZE: u32 = 10;

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("JSON serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Signature error: {0}")]
    SignatureError(#[from] signature::SignatureError),

    #[error("Badge is not signed")]
    MissingSignature,

    #[error("Image encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Content of a member badge QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgePayload {
    pub gym_id: Uuid,
    pub member_id: Uuid,
    pub badge_code: String,

    /// HMAC of the other fields, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl BadgePayload {
    pub fn new(gym_id: Uuid, member_id: Uuid, badge_code: String) -> Self {
        Self {
            gym_id,
            member_id,
            badge_code,
            signature: None,
        }
    }

    /// Canonical JSON of the unsigned fields
    fn to_signing_string(&self) -> Result<String, QrGenerationError> {
        let unsigned = Self {
            signature: None,
            ..self.clone()
        };
        Ok(serde_json::to_string(&unsigned)?)
    }

    /// Returns a copy carrying its signature
    pub fn signed(&self, signing_key: &[u8]) -> Result<Self, QrGenerationError> {
        let payload_str = self.to_signing_string()?;
        Ok(Self {
            signature: Some(signature::sign(payload_str.as_bytes(), signing_key)),
            ..self.clone()
        })
    }

    /// Serialized form embedded in the QR code
    pub fn to_qr_string(&self) -> Result<String, QrGenerationError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parses a scanned badge and checks its signature
pub fn verify_badge(raw: &str, signing_key: &[u8]) -> Result<BadgePayload, QrGenerationError> {
    let payload: BadgePayload = serde_json::from_str(raw.trim())?;
    let sig = payload
        .signature
        .as_deref()
        .ok_or(QrGenerationError::MissingSignature)?;

    let signing_string = payload.to_signing_string()?;
    signature::verify(signing_string.as_bytes(), sig, signing_key)?;

    Ok(payload)
}

/// Renders a signed badge as SVG
pub fn generate_qr_svg(payload: &BadgePayload) -> Result<String, QrGenerationError> {
    let code = QrCode::new(payload.to_qr_string()?.as_bytes())?;
    let svg = code.render::<svg::Color>().min_dimensions(200, 200).build();
    Ok(svg)
}

/// Renders a signed badge as PNG
pub fn generate_qr_png(payload: &BadgePayload) -> Result<Vec<u8>, QrGenerationError> {
    use image::{ImageBuffer, Luma};

    let code = QrCode::new(payload.to_qr_string()?.as_bytes())?;

    let width = code.width() as u32;
    let img_size = (width + 2 * QUIET_ZONE_MODULES) * PNG_MODULE_SIZE;

    let img = ImageBuffer::<Luma<u8>, Vec<u8>>::from_fn(img_size, img_size, |x, y| {
        let module_x = (x / PNG_MODULE_SIZE).checked_sub(QUIET_ZONE_MODULES);
        let module_y = (y / PNG_MODULE_SIZE).checked_sub(QUIET_ZONE_MODULES);
        match (module_x, module_y) {
            (Some(mx), Some(my)) if mx < width && my < width => {
                match code[(mx as usize, my as usize)] {
                    qrcode::types::Color::Dark => Luma([0u8]),
                    qrcode::types::Color::Light => Luma([255u8]),
                }
            }
            _ => Luma([255u8]),
        }
    });

    let mut png_data = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(
        &mut std::io::Cursor::new(&mut png_data),
        image::ImageFormat::Png,
    )?;

    Ok(png_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> BadgePayload {
        BadgePayload::new(Uuid::new_v4(), Uuid::new_v4(), "a1b2c3d4".to_string())
    }

    #[test]
    fn test_signed_badge_verifies() {
        let key = signature::derive_key("test-signing-key");
        let signed = payload().signed(&key).unwrap();
        let raw = signed.to_qr_string().unwrap();

        let verified = verify_badge(&raw, &key).unwrap();
        assert_eq!(verified, signed);
    }

    #[test]
    fn test_altered_badge_code_rejected() {
        let key = signature::derive_key("test-signing-key");
        let mut signed = payload().signed(&key).unwrap();
        signed.badge_code = "forged".to_string();
        let raw = signed.to_qr_string().unwrap();

        assert!(matches!(
            verify_badge(&raw, &key),
            Err(QrGenerationError::SignatureError(_))
        ));
    }

    #[test]
    fn test_unsigned_badge_rejected() {
        let key = signature::derive_key("test-signing-key");
        let raw = payload().to_qr_string().unwrap();

        assert!(matches!(
            verify_badge(&raw, &key),
            Err(QrGenerationError::MissingSignature)
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        let key = signature::derive_key("test-signing-key");
        assert!(verify_badge("not json", &key).is_err());
    }

    #[test]
    fn test_qr_svg_generation() {
        let key = signature::derive_key("test-signing-key");
        let svg = generate_qr_svg(&payload().signed(&key).unwrap()).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_qr_png_generation() {
        let key = signature::derive_key("test-signing-key");
        let png = generate_qr_png(&payload().signed(&key).unwrap()).unwrap();

        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}

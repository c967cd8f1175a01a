/// QR image rendering for gate passes
use crate::error::{PortalError, PortalResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use qrcode::{render::svg, QrCode};
use serde::Serialize;

/// What the guard's scanner reads back
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload<'a> {
    pub code: &'a str,
    pub property_id: &'a str,
    pub visitor: &'a str,
}

/// Render the payload as an SVG QR code wrapped in a data URL
pub fn render_data_url(payload: &QrPayload<'_>) -> PortalResult<String> {
    let json = serde_json::to_string(payload)
        .map_err(|e| PortalError::Internal(format!("QR payload encoding failed: {}", e)))?;

    let code = QrCode::new(json.as_bytes())
        .map_err(|e| PortalError::Internal(format!("QR generation failed: {}", e)))?;

    let image = code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_data_url() {
        let url = render_data_url(&QrPayload {
            code: "ABC234",
            property_id: "prop-1",
            visitor: "Achieng",
        })
        .unwrap();

        let encoded = url.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }
}

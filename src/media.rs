/// Image loading for the detail and report panels.
///
/// Failures are never fatal: callers show a placeholder instead.
use tracing::{debug, warn};

use crate::error::MediaError;

/// Which rendition of a damage photo is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageVariant {
    #[default]
    Annotated,
    Original,
}

impl ImageVariant {
    pub fn toggled(self) -> Self {
        match self {
            ImageVariant::Annotated => ImageVariant::Original,
            ImageVariant::Original => ImageVariant::Annotated,
        }
    }

    /// Label of the button that switches away from this variant
    pub fn toggle_label(self) -> &'static str {
        match self {
            ImageVariant::Annotated => "元画像を表示",
            ImageVariant::Original => "アノテーション画像を表示",
        }
    }
}

/// Rewrite an annotated image URL into its original counterpart.
/// URLs that follow neither convention come back unchanged.
pub fn original_image_url(annotated: &str) -> String {
    annotated
        .replace("/images_annotated/", "/images_original/")
        .replace("_annotated.jpg", "_original.jpg")
}

/// URL of the requested rendition
pub fn variant_url(image: &str, variant: ImageVariant) -> String {
    match variant {
        ImageVariant::Annotated => image.to_string(),
        ImageVariant::Original => original_image_url(image),
    }
}

/// Fetch an image from a URL or a local path and make sure it decodes.
pub async fn load_image(location: String) -> Result<Vec<u8>, MediaError> {
    let bytes = if location.starts_with("http://") || location.starts_with("https://") {
        let response = reqwest::get(&location).await?;
        if !response.status().is_success() {
            return Err(MediaError::Status(response.status().as_u16()));
        }
        response.bytes().await?.to_vec()
    } else {
        tokio::fs::read(&location)
            .await
            .map_err(|source| MediaError::Read {
                path: location.clone(),
                source,
            })?
    };

    let decoded = image::load_from_memory(&bytes)?;
    debug!(
        %location,
        width = decoded.width(),
        height = decoded.height(),
        "image loaded"
    );
    Ok(bytes)
}

/// `load_image` with failures logged and flattened for the UI
pub async fn load_image_or_placeholder(location: String) -> Option<Vec<u8>> {
    match load_image(location.clone()).await {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(%location, error = %err, "failed to load image");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_url_rewrite() {
        assert_eq!(
            original_image_url("https://r2.example/images_annotated/12_annotated.jpg"),
            "https://r2.example/images_original/12_original.jpg"
        );
        assert_eq!(
            original_image_url("assets/images/hibiware1.jpg"),
            "assets/images/hibiware1.jpg"
        );
    }

    #[test]
    fn test_variant_toggle() {
        let variant = ImageVariant::default();
        assert_eq!(variant, ImageVariant::Annotated);
        assert_eq!(variant.toggle_label(), "元画像を表示");
        assert_eq!(variant.toggled(), ImageVariant::Original);
        assert_eq!(variant.toggled().toggled(), ImageVariant::Annotated);
        assert_eq!(
            variant_url("x/images_annotated/1_annotated.jpg", ImageVariant::Original),
            "x/images_original/1_original.jpg"
        );
    }

    #[test]
    fn test_missing_file_is_placeholder() {
        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(load_image_or_placeholder(
                "assets/images/does-not-exist.jpg".to_string(),
            ));
        assert!(result.is_none());
    }

    #[test]
    fn test_undecodable_file_is_rejected() {
        let path = std::env::temp_dir().join(format!("not-an-image-{}.jpg", std::process::id()));
        std::fs::write(&path, b"plain text").unwrap();
        let result = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(load_image(path.to_string_lossy().to_string()));
        assert!(matches!(result, Err(MediaError::Decode(_))));
        let _ = std::fs::remove_file(path);
    }
}

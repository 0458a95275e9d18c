//! Image collection and eligibility classification.
//!
//! Every raster file the extraction tool wrote next to the text artifact is
//! recorded with its byte size and copied into the stable
//! `<output_root>/<base>/images/` directory, where the enriched text will
//! point. Only images strictly larger than the threshold are worth a
//! description; anything smaller is usually an icon, bullet or rule.

use crate::error::EnrichError;
use crate::output::ExtractedImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extensions treated as raster images (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// An extracted image together with its location in the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedImage {
    pub source: PathBuf,
    pub image: ExtractedImage,
}

/// `true` iff an image of `byte_size` should be sent for description.
pub fn is_eligible(byte_size: u64, threshold: u64) -> bool {
    byte_size > threshold
}

fn is_raster(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Enumerate raster images directly inside `document_dir`, sorted by name.
pub async fn collect_images(document_dir: &Path) -> Result<Vec<CollectedImage>, EnrichError> {
    let read_err = |e: std::io::Error| EnrichError::Workspace {
        detail: format!("cannot read extraction output '{}'", document_dir.display()),
        source: e,
    };

    let mut entries = tokio::fs::read_dir(document_dir).await.map_err(read_err)?;
    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        if !is_raster(&path) {
            continue;
        }
        let meta = entry.metadata().await.map_err(read_err)?;
        if !meta.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        images.push(CollectedImage {
            source: path,
            image: ExtractedImage::new(file_name, meta.len()),
        });
    }

    images.sort_by(|a, b| a.image.file_name.cmp(&b.image.file_name));
    debug!("Found {} images in {}", images.len(), document_dir.display());
    Ok(images)
}

/// Copy every collected image into `image_dir`, creating it first.
pub async fn copy_images(images: &[CollectedImage], image_dir: &Path) -> Result<(), EnrichError> {
    tokio::fs::create_dir_all(image_dir)
        .await
        .map_err(|e| EnrichError::OutputWriteFailed {
            path: image_dir.to_path_buf(),
            source: e,
        })?;

    for img in images {
        let dest = image_dir.join(&img.image.file_name);
        tokio::fs::copy(&img.source, &dest)
            .await
            .map_err(|e| EnrichError::OutputWriteFailed {
                path: dest.clone(),
                source: e,
            })?;
    }
    Ok(())
}

/// Indices of images eligible for description, in input order.
pub fn eligible_indices(images: &[CollectedImage], threshold: u64) -> Vec<usize> {
    images
        .iter()
        .enumerate()
        .filter(|(_, c)| is_eligible(c.image.byte_size, threshold))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn threshold_is_strict() {
        assert!(!is_eligible(20_000, 20_000));
        assert!(is_eligible(20_001, 20_000));
        assert!(!is_eligible(0, 20_000));
    }

    #[tokio::test]
    async fn collects_only_rasters_sorted() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.png"), vec![0u8; 30]).unwrap();
        std::fs::write(dir.path().join("a.JPG"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("c.jpeg"), vec![0u8; 5]).unwrap();
        std::fs::write(dir.path().join("doc.md"), "text").unwrap();
        std::fs::write(dir.path().join("meta.json"), "{}").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let images = collect_images(dir.path()).await.unwrap();
        let names: Vec<_> = images.iter().map(|c| c.image.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.jpeg"]);
        assert_eq!(images[1].image.byte_size, 30);
        assert!(images.iter().all(|c| c.image.description.is_empty()));
    }

    #[tokio::test]
    async fn copy_into_stable_dir() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("fig.png"), b"png").unwrap();
        let images = collect_images(src.path()).await.unwrap();

        let image_dir = dst.path().join("doc").join("images");
        copy_images(&images, &image_dir).await.unwrap();
        assert_eq!(std::fs::read(image_dir.join("fig.png")).unwrap(), b"png");
    }

    #[test]
    fn eligible_partition() {
        let mk = |name: &str, size| CollectedImage {
            source: PathBuf::from(name),
            image: ExtractedImage::new(name, size),
        };
        let images = vec![mk("a.png", 25_000), mk("b.png", 500), mk("c.png", 20_000)];
        assert_eq!(eligible_indices(&images, 20_000), vec![0]);
    }
}

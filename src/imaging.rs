//! Image derivatives.
//!
//! [`ImageDerivatives`] is the built-in post-processor for raster images.
//! For every configured width smaller than the source, it adds a resized
//! copy next to the original:
//!
//! ```text
//! /img/photo.jpg           original, copied as-is
//! /img/photo-800.jpg       800px wide, aspect ratio kept
//! /img/photo-400.jpg       400px wide
//! ```
//!
//! Resizing uses `Lanczos3`. JPEG output honours the configured quality;
//! PNG and WebP are lossless.

use crate::cache::hash_parts;
use crate::error::StageError;
use crate::metadata::Metadata;
use crate::node::{Node, NodeKind};
use crate::path::SitePath;
use crate::postprocess::{Artifact, PostProcessor};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

/// Extensions whose decoders and encoders are compiled in.
const SUPPORTED: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("webp", ImageFormat::WebP),
];

fn format_for(path: &SitePath) -> Option<ImageFormat> {
    let ext = path.extension()?;
    SUPPORTED
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, format)| *format)
}

/// Pixel dimensions of an encoded image, without a full decode.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Whether a path looks like an image we can read.
pub fn is_supported_image(path: &SitePath) -> bool {
    format_for(path).is_some()
}

/// Widths to generate for a source of `original_width`, largest first.
///
/// Sizes at or above the original are skipped (no upscaling); duplicates
/// collapse.
pub fn derivative_widths(original_width: u32, sizes: &[u32]) -> Vec<u32> {
    let mut widths: Vec<u32> = sizes
        .iter()
        .copied()
        .filter(|&w| w > 0 && w < original_width)
        .collect();
    widths.sort_unstable_by(|a, b| b.cmp(a));
    widths.dedup();
    widths
}

/// Path of the derivative of `original` at `width`.
pub fn derivative_path(original: &SitePath, width: u32) -> SitePath {
    let stem = original.file_stem().unwrap_or_default();
    match original.extension() {
        Some(ext) => original.with_file_name(&format!("{stem}-{width}.{ext}")),
        None => original.with_file_name(&format!("{stem}-{width}")),
    }
}

/// Post-processor that adds resized copies of static images.
#[derive(Debug, Clone)]
pub struct ImageDerivatives {
    sizes: Vec<u32>,
    quality: u8,
}

impl ImageDerivatives {
    pub fn new(sizes: Vec<u32>, quality: u8) -> Self {
        Self { sizes, quality }
    }

    fn encode(&self, image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, String> {
        let mut buf = Vec::new();
        match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
                DynamicImage::ImageRgb8(image.to_rgb8())
                    .write_with_encoder(encoder)
                    .map_err(|e| e.to_string())?;
            }
            other => image
                .write_to(&mut Cursor::new(&mut buf), other)
                .map_err(|e| e.to_string())?,
        }
        Ok(buf)
    }

    fn failed(&self, artifact: &SitePath, message: impl std::fmt::Display) -> StageError {
        StageError::PostProcess {
            processor: self.id().to_string(),
            message: format!("{artifact}: {message}"),
        }
    }
}

impl PostProcessor for ImageDerivatives {
    fn id(&self) -> &str {
        "image-derivatives"
    }

    fn config_hash(&self) -> String {
        let sizes: Vec<String> = self.sizes.iter().map(u32::to_string).collect();
        hash_parts([sizes.join(","), self.quality.to_string()])
    }

    fn applies_to(&self, node: &Node, artifact: &SitePath) -> bool {
        node.kind() == NodeKind::Static && !self.sizes.is_empty() && is_supported_image(artifact)
    }

    fn process(&self, artifact: Artifact, _metadata: &Metadata) -> Result<Vec<Artifact>, StageError> {
        let Some(format) = format_for(&artifact.path) else {
            return Ok(vec![artifact]);
        };
        let image = image::load_from_memory_with_format(&artifact.bytes, format)
            .map_err(|e| self.failed(&artifact.path, e))?;

        let mut out = Vec::new();
        for width in derivative_widths(image.width(), &self.sizes) {
            let resized = image.resize(width, image.height(), FilterType::Lanczos3);
            let bytes = self
                .encode(&resized, format)
                .map_err(|e| self.failed(&artifact.path, e))?;
            out.push(Artifact::new(derivative_path(&artifact.path, width), bytes));
        }
        out.insert(0, artifact);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeSpec, Payload, SiteTree};
    use image::{ImageEncoder, RgbImage};

    fn p(s: &str) -> SitePath {
        SitePath::parse(s).unwrap()
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, 90)
            .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
            .unwrap();
        buf
    }

    fn static_tree(path: &str) -> SiteTree {
        let mut tree = SiteTree::new();
        tree.add_node(
            SitePath::root(),
            NodeSpec::new(NodeKind::Index, Payload::Empty, Metadata::new()),
        )
        .unwrap();
        tree.add_node(
            p(path),
            NodeSpec::new(NodeKind::Static, Payload::Empty, Metadata::new()),
        )
        .unwrap();
        tree
    }

    // =========================================================================
    // Pure helpers
    // =========================================================================

    #[test]
    fn widths_skip_upscaling_and_duplicates() {
        assert_eq!(derivative_widths(1000, &[400, 800, 1000, 1600, 400]), vec![800, 400]);
        assert!(derivative_widths(100, &[400]).is_empty());
        assert!(derivative_widths(100, &[0]).is_empty());
    }

    #[test]
    fn derivative_path_inserts_width_before_extension() {
        assert_eq!(derivative_path(&p("/img/a.b.jpg"), 400), p("/img/a.b-400.jpg"));
        assert_eq!(derivative_path(&p("/img/raw"), 10), p("/img/raw-10"));
    }

    #[test]
    fn dimensions_from_bytes() {
        assert_eq!(image_dimensions(&jpeg(40, 30)), Some((40, 30)));
        assert_eq!(image_dimensions(b"not an image"), None);
    }

    // =========================================================================
    // Post-processor
    // =========================================================================

    #[test]
    fn produces_resized_derivatives() {
        let processor = ImageDerivatives::new(vec![20, 10, 100], 80);
        let tree = static_tree("/photo.jpg");
        let node = tree.get(&p("/photo.jpg")).unwrap();
        assert!(processor.applies_to(node, &p("/photo.jpg")));

        let original = Artifact::new(p("/photo.jpg"), jpeg(40, 30));
        let out = processor.process(original.clone(), &Metadata::new()).unwrap();

        let paths: Vec<_> = out.iter().map(|a| a.path.clone()).collect();
        assert_eq!(paths, vec![p("/photo.jpg"), p("/photo-20.jpg"), p("/photo-10.jpg")]);
        assert_eq!(out[0], original);
        assert_eq!(image_dimensions(&out[1].bytes), Some((20, 15)));
    }

    #[test]
    fn does_not_apply_to_documents_or_other_files() {
        let processor = ImageDerivatives::new(vec![20], 80);
        let tree = static_tree("/notes.txt");
        let node = tree.get(&p("/notes.txt")).unwrap();
        assert!(!processor.applies_to(node, &p("/notes.txt")));
        assert!(!processor.applies_to(tree.root().unwrap(), &p("/photo.jpg")));
    }

    #[test]
    fn corrupt_image_is_post_process_failure() {
        let processor = ImageDerivatives::new(vec![20], 80);
        let err = processor
            .process(Artifact::new(p("/bad.jpg"), b"junk".to_vec()), &Metadata::new())
            .unwrap_err();
        assert!(matches!(err, StageError::PostProcess { .. }));
    }

    #[test]
    fn config_hash_tracks_sizes_and_quality() {
        let a = ImageDerivatives::new(vec![400], 80).config_hash();
        assert_ne!(a, ImageDerivatives::new(vec![400], 90).config_hash());
        assert_ne!(a, ImageDerivatives::new(vec![800], 80).config_hash());
    }
}

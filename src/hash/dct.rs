//! Frequency-domain perceptual hash.
//!
//! The image is reduced to luminance, DCT-transformed, and the 8x8 lowest
//! frequencies are compared against their mean.

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};

use super::HashAlgorithm;

const LOW: u32 = 8;

/// DCT-based perceptual hash (64 bits)
#[derive(Debug, Clone, Copy, Default)]
pub struct DctHash;

impl HashAlgorithm for DctHash {
    fn name(&self) -> &str {
        "phash"
    }

    fn hash_image(&self, image: &DynamicImage) -> String {
        let hasher = HasherConfig::new()
            .hash_size(LOW, LOW)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        hex::encode(hasher.hash_image(image).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::MockFramebuffer;

    #[test]
    fn test_hash_length_is_64_bits() {
        let fb = MockFramebuffer::with_color(50, 40, [1, 2, 3]);
        let hash = DctHash.hash_image(&DynamicImage::ImageRgb8(fb.to_image()));
        assert_eq!(hash.len(), 16);
    }

    #[test]
    fn test_flat_images_hash_alike_at_any_brightness() {
        let dark = MockFramebuffer::with_color(64, 64, [40, 40, 40]);
        let light = MockFramebuffer::with_color(64, 64, [200, 200, 200]);
        assert_eq!(
            DctHash.hash_image(&DynamicImage::ImageRgb8(dark.to_image())),
            DctHash.hash_image(&DynamicImage::ImageRgb8(light.to_image())),
        );
    }
}

//! Blockhash: the image is cut into an `N x N` grid and each block
//! contributes one bit, set when its mean is above the median of its band.

use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig};

use super::HashAlgorithm;

/// Block-based hash with `bits_per_side^2` bits
#[derive(Debug, Clone, Copy)]
pub struct BlockMeanHash {
    bits_per_side: u32,
}

impl BlockMeanHash {
    /// Rounded up to a multiple of four, the band height blockhash works in
    pub fn new(bits_per_side: u32) -> Self {
        Self {
            bits_per_side: bits_per_side.max(4).div_ceil(4) * 4,
        }
    }

    pub fn bits_per_side(&self) -> u32 {
        self.bits_per_side
    }
}

impl Default for BlockMeanHash {
    fn default() -> Self {
        Self::new(16)
    }
}

impl HashAlgorithm for BlockMeanHash {
    fn name(&self) -> &str {
        "blockhash"
    }

    fn hash_image(&self, image: &DynamicImage) -> String {
        let hasher = HasherConfig::new()
            .hash_size(self.bits_per_side, self.bits_per_side)
            .hash_alg(HashAlg::Blockhash)
            .to_hasher();
        hex::encode(hasher.hash_image(image).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::normalized_distance;
    use crate::snapshot::MockFramebuffer;

    fn image_of(fb: &MockFramebuffer) -> DynamicImage {
        DynamicImage::ImageRgb8(fb.to_image())
    }

    #[test]
    fn test_hash_length_follows_grid() {
        let fb = MockFramebuffer::with_color(128, 128, [90, 90, 90]);
        assert_eq!(BlockMeanHash::default().hash_image(&image_of(&fb)).len(), 64);
        assert_eq!(BlockMeanHash::new(8).hash_image(&image_of(&fb)).len(), 16);
    }

    #[test]
    fn test_grid_rounds_up_to_bands() {
        assert_eq!(BlockMeanHash::new(2).bits_per_side(), 4);
        assert_eq!(BlockMeanHash::new(6).bits_per_side(), 8);
        assert_eq!(BlockMeanHash::new(16).bits_per_side(), 16);
    }

    #[test]
    fn test_mirrored_halves_differ_in_every_bit() {
        let mut left = MockFramebuffer::with_color(64, 64, [0, 0, 0]);
        left.draw_rect(0, 0, 32, 64, [255, 255, 255]);
        let mut right = MockFramebuffer::with_color(64, 64, [0, 0, 0]);
        right.draw_rect(32, 0, 32, 64, [255, 255, 255]);

        let algorithm = BlockMeanHash::new(4);
        let a = algorithm.hash_image(&image_of(&left));
        let b = algorithm.hash_image(&image_of(&right));
        assert_eq!(normalized_distance(&a, &b), 1.0);
    }
}

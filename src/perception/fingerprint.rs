use image_hasher::{HashAlg, HasherConfig};

use crate::perception::types::{FingerprintKey, Frame};

/// Computes the perceptual hash of a frame for cache keying.
///
/// DoubleGradient at 8×8 is robust to lossless re-encoding and to the one
/// or two pixels of jitter repeated captures of an unchanged screen show,
/// while still separating visibly distinct screens.
///
/// Never fails: a malformed frame yields the sentinel key, which the cache
/// treats as a guaranteed miss.
pub fn fingerprint(frame: &Frame) -> FingerprintKey {
    if !frame.is_well_formed() {
        tracing::debug!(
            width = frame.width,
            height = frame.height,
            len = frame.pixels.len(),
            "malformed frame, returning sentinel fingerprint"
        );
        return FingerprintKey::sentinel();
    }

    let Some(buffer) =
        image::RgbaImage::from_raw(frame.width, frame.height, frame.pixels.clone())
    else {
        return FingerprintKey::sentinel();
    };

    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();
    let hash = hasher.hash_image(&image::DynamicImage::ImageRgba8(buffer));
    FingerprintKey::from_hash(hash.to_base64())
}

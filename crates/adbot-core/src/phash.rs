//! Perceptual hashing (dHash) for duplicate-photo detection.
//!
//! The image is downscaled to a small grayscale grid of `(size + 1) x size`
//! pixels and each horizontal adjacent-pixel brightness difference becomes one
//! bit, rendered as a fixed-width lowercase hex string (64 bits at the default
//! size of 8). Deterministic and pure.
//!
//! Intake dedup compares fingerprints for exact equality only.
//! [`Fingerprint::hamming_distance`] is the seam for a bounded-similarity
//! policy should exact matching prove too strict for re-encoded images.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

pub const DEFAULT_HASH_SIZE: u32 = 8;

/// A fixed-width hex rendering of a dHash.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Number of differing bits, or `None` when the fingerprints were computed
    /// at different grid sizes.
    pub fn hamming_distance(&self, other: &Fingerprint) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }

        let mut dist = 0u32;
        for (a, b) in self.0.bytes().zip(other.0.bytes()) {
            let a = (a as char).to_digit(16)?;
            let b = (b as char).to_digit(16)?;
            dist += (a ^ b).count_ones();
        }
        Some(dist)
    }

    #[cfg(test)]
    pub(crate) fn from_hex(hex: &str) -> Self {
        Self(hex.to_string())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// dHash at the default 8x8 grid (64 bits, 16 hex digits).
pub fn dhash(bytes: &[u8]) -> Result<Fingerprint> {
    dhash_sized(bytes, DEFAULT_HASH_SIZE)
}

/// dHash at an explicit grid size. Accepts any raster format the `image`
/// crate can decode.
pub fn dhash_sized(bytes: &[u8], size: u32) -> Result<Fingerprint> {
    if size < 2 {
        return Err(Error::Image(format!("hash size too small: {size}")));
    }

    let img = image::load_from_memory(bytes).map_err(|e| Error::Image(e.to_string()))?;
    let gray = img
        .resize_exact(size + 1, size, FilterType::Lanczos3)
        .to_luma8();

    let nbits = (size * size) as usize;
    let mut bits = Vec::with_capacity(nbits);
    for y in 0..size {
        for x in 0..size {
            bits.push(gray.get_pixel(x, y)[0] > gray.get_pixel(x + 1, y)[0]);
        }
    }

    // Pack bit i into nibble i/4 (bit i%4), then render most-significant
    // nibble first so equal grids always produce identical strings.
    let width = nbits.div_ceil(4);
    let mut nibbles = vec![0u8; width];
    for (i, set) in bits.iter().enumerate() {
        if *set {
            nibbles[i / 4] |= 1 << (i % 4);
        }
    }

    let hex = nibbles
        .iter()
        .rev()
        .map(|n| format!("{n:x}"))
        .collect::<String>();

    Ok(Fingerprint(hex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage};
    use std::io::Cursor;

    fn png_bytes(img: GrayImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("png encode");
        buf
    }

    fn gradient(w: u32, h: u32, ascending: bool) -> Vec<u8> {
        png_bytes(GrayImage::from_fn(w, h, |x, _| {
            let v = (x * 255 / w.max(1)) as u8;
            image::Luma([if ascending { v } else { 255 - v }])
        }))
    }

    #[test]
    fn gradient_directions_produce_opposite_hashes() {
        // 9x8 input matches the sampling grid exactly, so no resampling noise.
        let asc = dhash(&gradient(9, 8, true)).unwrap();
        let desc = dhash(&gradient(9, 8, false)).unwrap();

        // Brightness strictly increasing left-to-right: every diff bit is 0.
        assert_eq!(asc.as_hex(), "0000000000000000");
        assert_eq!(desc.as_hex(), "ffffffffffffffff");
        assert_eq!(asc.hamming_distance(&desc), Some(64));
    }

    #[test]
    fn identical_bytes_hash_identically() {
        let bytes = gradient(48, 32, false);
        assert_eq!(dhash(&bytes).unwrap(), dhash(&bytes).unwrap());
    }

    #[test]
    fn hex_width_is_fixed_per_size() {
        let bytes = gradient(40, 40, true);
        assert_eq!(dhash_sized(&bytes, 8).unwrap().as_hex().len(), 16);
        assert_eq!(dhash_sized(&bytes, 4).unwrap().as_hex().len(), 4);
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        assert!(dhash(b"definitely not an image").is_err());
    }

    #[test]
    fn mismatched_widths_have_no_distance() {
        let a = Fingerprint::from_hex("00ff");
        let b = Fingerprint::from_hex("00ff00ff");
        assert_eq!(a.hamming_distance(&b), None);
    }
}

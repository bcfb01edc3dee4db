//! Content digests for array-shaped payloads.

use crate::array::{shape_tag, DType, NdArray};
use cachet_resource::DataHash;

/// BLAKE3 over `<dtype name>,<shape tag>,<raw bytes>`.
///
/// Identical bytes under a different element type or shape hash differently.
/// BLAKE3 stands in for a 64-bit non-cryptographic hash such as xxh3: it is
/// about as fast on large buffers, and its 256-bit digest is what ends up in
/// target file names, so accidental collisions between payloads are not a
/// practical concern.
pub fn array_digest(dtype: DType, shape: &[usize], bytes: &[u8]) -> DataHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(dtype.name().as_bytes());
    hasher.update(b",");
    hasher.update(shape_tag(shape).as_bytes());
    hasher.update(b",");
    hasher.update(bytes);
    DataHash::from_hasher(&hasher)
}

pub fn hash_array(array: &NdArray) -> DataHash {
    array_digest(array.dtype(), array.shape(), array.as_bytes())
}

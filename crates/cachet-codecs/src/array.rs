//! Dense n-dimensional arrays shared by the array, image and chunked codecs.
//!
//! Elements are stored as raw little-endian bytes in C (row-major) order, so
//! the bytes are exactly what `.npy`, TIFF strips and uncompressed zarr chunks
//! hold on disk.

use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    pub const ALL: [DType; 11] = [
        DType::Bool,
        DType::U8,
        DType::U16,
        DType::U32,
        DType::U64,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::F32,
        DType::F64,
    ];

    pub fn size(self) -> usize {
        match self {
            DType::Bool | DType::U8 | DType::I8 => 1,
            DType::U16 | DType::I16 => 2,
            DType::U32 | DType::I32 | DType::F32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }

    /// Canonical element type name, e.g. `uint8`.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::I8 => "int8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
        }
    }

    /// Array-interface type string used by `.npy` headers and zarr metadata.
    pub fn descr(self) -> &'static str {
        match self {
            DType::Bool => "|b1",
            DType::U8 => "|u1",
            DType::U16 => "<u2",
            DType::U32 => "<u4",
            DType::U64 => "<u8",
            DType::I8 => "|i1",
            DType::I16 => "<i2",
            DType::I32 => "<i4",
            DType::I64 => "<i8",
            DType::F32 => "<f4",
            DType::F64 => "<f8",
        }
    }

    /// Parse a little-endian or byte-order-free type string.
    pub fn from_descr(descr: &str) -> Option<Self> {
        let (Some(order), Some(code)) = (descr.get(..1), descr.get(1..)) else {
            return None;
        };
        if !matches!(order, "<" | "|" | "=") {
            return None;
        }
        Self::ALL.into_iter().find(|d| &d.descr()[1..] == code)
    }

    pub(crate) fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    pub(crate) fn is_signed(self) -> bool {
        matches!(self, DType::I8 | DType::I16 | DType::I32 | DType::I64)
    }

    /// Little-endian bytes of `value` converted to this element type.
    pub(crate) fn encode_scalar(self, value: f64) -> Vec<u8> {
        match self {
            DType::Bool => vec![u8::from(value != 0.0)],
            DType::U8 => (value as u8).to_le_bytes().to_vec(),
            DType::U16 => (value as u16).to_le_bytes().to_vec(),
            DType::U32 => (value as u32).to_le_bytes().to_vec(),
            DType::U64 => (value as u64).to_le_bytes().to_vec(),
            DType::I8 => (value as i8).to_le_bytes().to_vec(),
            DType::I16 => (value as i16).to_le_bytes().to_vec(),
            DType::I32 => (value as i32).to_le_bytes().to_vec(),
            DType::I64 => (value as i64).to_le_bytes().to_vec(),
            DType::F32 => (value as f32).to_le_bytes().to_vec(),
            DType::F64 => value.to_le_bytes().to_vec(),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArrayError {
    #[error("shape {shape:?} of {dtype} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        dtype: DType,
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("shape {shape:?} of {dtype} does not fit in memory")]
    TooLarge { dtype: DType, shape: Vec<usize> },
    #[error("expected {expected} slice ranges, got {actual}")]
    RankMismatch { expected: usize, actual: usize },
    #[error("range {start}..{end} is out of bounds for axis {axis} of length {len}")]
    OutOfBounds {
        axis: usize,
        start: usize,
        end: usize,
        len: usize,
    },
}

/// Bytes needed for `shape` elements of `dtype`, or `None` on overflow.
pub fn byte_len(dtype: DType, shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(dtype.size(), |acc, &d| acc.checked_mul(d))
}

#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl NdArray {
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<u8>) -> Result<Self, ArrayError> {
        let Some(expected) = byte_len(dtype, &shape) else {
            return Err(ArrayError::TooLarge { dtype, shape });
        };
        if expected != data.len() {
            return Err(ArrayError::LengthMismatch {
                dtype,
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dtype, shape, data })
    }

    /// Panics if the shape's byte length overflows `usize`.
    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Self {
        let len = byte_len(dtype, &shape).unwrap_or(usize::MAX);
        Self {
            dtype,
            shape,
            data: vec![0; len],
        }
    }

    pub fn from_u8(shape: Vec<usize>, values: Vec<u8>) -> Result<Self, ArrayError> {
        Self::new(DType::U8, shape, values)
    }

    pub fn from_u16(shape: Vec<usize>, values: &[u16]) -> Result<Self, ArrayError> {
        Self::new(DType::U16, shape, values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    pub fn from_i64(shape: Vec<usize>, values: &[i64]) -> Result<Self, ArrayError> {
        Self::new(DType::I64, shape, values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Result<Self, ArrayError> {
        Self::new(DType::F32, shape, values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    pub fn from_f64(shape: Vec<usize>, values: &[f64]) -> Result<Self, ArrayError> {
        Self::new(DType::F64, shape, values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Same bytes under a different shape with the same element count.
    pub fn reshape(self, shape: Vec<usize>) -> Result<Self, ArrayError> {
        Self::new(self.dtype, shape, self.data)
    }

    /// Copy out the sub-array selected by one range per axis.
    pub fn slice(&self, ranges: &[Range<usize>]) -> Result<Self, ArrayError> {
        if ranges.len() != self.ndim() {
            return Err(ArrayError::RankMismatch {
                expected: self.ndim(),
                actual: ranges.len(),
            });
        }
        for (axis, (r, &len)) in ranges.iter().zip(&self.shape).enumerate() {
            if r.start > r.end || r.end > len {
                return Err(ArrayError::OutOfBounds {
                    axis,
                    start: r.start,
                    end: r.end,
                    len,
                });
            }
        }

        let extent: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
        let origin: Vec<usize> = ranges.iter().map(|r| r.start).collect();
        let mut out = Self::zeros(self.dtype, extent.clone());
        copy_block(
            &Block::new(&self.data, &self.shape, &origin),
            &mut BlockMut::new(&mut out.data, &extent, &vec![0; extent.len()]),
            &extent,
            self.dtype.size(),
        );
        Ok(out)
    }
}

/// Python-style tuple rendering of a shape: `()`, `(3,)`, `(100, 100)`.
pub fn shape_tag(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_owned(),
        [only] => format!("({only},)"),
        _ => {
            let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
            format!("({})", dims.join(", "))
        }
    }
}

pub(crate) struct Block<'a> {
    pub data: &'a [u8],
    pub shape: &'a [usize],
    pub origin: &'a [usize],
}

impl<'a> Block<'a> {
    pub fn new(data: &'a [u8], shape: &'a [usize], origin: &'a [usize]) -> Self {
        Self {
            data,
            shape,
            origin,
        }
    }
}

pub(crate) struct BlockMut<'a> {
    pub data: &'a mut [u8],
    pub shape: &'a [usize],
    pub origin: &'a [usize],
}

impl<'a> BlockMut<'a> {
    pub fn new(data: &'a mut [u8], shape: &'a [usize], origin: &'a [usize]) -> Self {
        Self {
            data,
            shape,
            origin,
        }
    }
}

fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

/// Copy an `extent`-sized box between two C-ordered buffers.
///
/// Callers guarantee that the box fits inside both buffers at the given
/// origins.
pub(crate) fn copy_block(src: &Block<'_>, dst: &mut BlockMut<'_>, extent: &[usize], item: usize) {
    let ndim = extent.len();
    if ndim == 0 {
        dst.data[..item].copy_from_slice(&src.data[..item]);
        return;
    }
    if extent.contains(&0) {
        return;
    }

    let src_strides = strides(src.shape);
    let dst_strides = strides(dst.shape);
    let run = extent[ndim - 1] * item;
    let mut idx = vec![0usize; ndim - 1];

    loop {
        let mut s = (src.origin[ndim - 1]) * src_strides[ndim - 1];
        let mut d = (dst.origin[ndim - 1]) * dst_strides[ndim - 1];
        for (axis, &i) in idx.iter().enumerate() {
            s += (src.origin[axis] + i) * src_strides[axis];
            d += (dst.origin[axis] + i) * dst_strides[axis];
        }
        let (s, d) = (s * item, d * item);
        dst.data[d..d + run].copy_from_slice(&src.data[s..s + run]);

        // Odometer over every axis but the last.
        let mut axis = ndim - 1;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            idx[axis] += 1;
            if idx[axis] < extent[axis] {
                break;
            }
            idx[axis] = 0;
        }
    }
}

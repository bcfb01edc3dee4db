//! Raster images stored as baseline TIFF.
//!
//! Writing produces an uncompressed, single-strip, little-endian file for a
//! `(height, width)` grayscale or `(height, width, 3)` RGB array. Reading also
//! accepts big-endian files and multiple strips, as long as they are
//! uncompressed and chunky (interleaved).

use crate::array::{shape_tag, DType, NdArray};
use crate::fingerprint::hash_array;
use cachet_resource::{Codec, ContentHash, DataHash, Resource, ResourceError, Target};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const IMAGE_WIDTH: u16 = 256;
const IMAGE_LENGTH: u16 = 257;
const BITS_PER_SAMPLE: u16 = 258;
const COMPRESSION: u16 = 259;
const PHOTOMETRIC: u16 = 262;
const STRIP_OFFSETS: u16 = 273;
const SAMPLES_PER_PIXEL: u16 = 277;
const ROWS_PER_STRIP: u16 = 278;
const STRIP_BYTE_COUNTS: u16 = 279;
const PLANAR_CONFIG: u16 = 284;
const SAMPLE_FORMAT: u16 = 339;

const TYPE_BYTE: u16 = 1;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

/// Image kind: array payload plus metadata and resolution in the envelope.
///
/// Any file extension is accepted; the bytes on disk are always TIFF.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

pub type ImageSource = Resource<ImageCodec>;
pub type ImageTarget = Target<ImageCodec>;

impl Codec for ImageCodec {
    type Payload = NdArray;
    const KIND: &'static str = "image";
    const CARRIES_METADATA: bool = true;

    fn read(&self, path: &Path) -> Result<NdArray, ResourceError> {
        let bytes = fs::read(path)?;
        decode(&bytes).map_err(|reason| format_error(path, reason))
    }

    fn write(&self, path: &Path, payload: &NdArray) -> Result<(), ResourceError> {
        let bytes = encode(payload).map_err(|reason| format_error(path, reason))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    fn from_fields(_: &Map<String, Value>) -> Result<Self, ResourceError> {
        Ok(Self)
    }
}

impl ContentHash for ImageCodec {
    fn hash(&self, payload: &NdArray) -> DataHash {
        hash_array(payload)
    }
}

fn format_error(path: &Path, reason: String) -> ResourceError {
    ResourceError::Format {
        kind: ImageCodec::KIND,
        path: path.to_path_buf(),
        reason,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn u16(self, bytes: &[u8], at: usize) -> Option<u16> {
        let raw: [u8; 2] = bytes.get(at..at.checked_add(2)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u16::from_le_bytes(raw),
            ByteOrder::Big => u16::from_be_bytes(raw),
        })
    }

    fn u32(self, bytes: &[u8], at: usize) -> Option<u32> {
        let raw: [u8; 4] = bytes.get(at..at.checked_add(4)?)?.try_into().ok()?;
        Some(match self {
            ByteOrder::Little => u32::from_le_bytes(raw),
            ByteOrder::Big => u32::from_be_bytes(raw),
        })
    }

    fn put_u16(self, out: &mut Vec<u8>, v: u16) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u32(self, out: &mut Vec<u8>, v: u32) {
        match self {
            ByteOrder::Little => out.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => out.extend_from_slice(&v.to_be_bytes()),
        }
    }
}

struct Field {
    tag: u16,
    field_type: u16,
    values: Vec<u32>,
}

impl Field {
    fn short(tag: u16, values: Vec<u32>) -> Self {
        Self {
            tag,
            field_type: TYPE_SHORT,
            values,
        }
    }

    fn long(tag: u16, values: Vec<u32>) -> Self {
        Self {
            tag,
            field_type: TYPE_LONG,
            values,
        }
    }

    fn byte_len(&self) -> usize {
        let width = if self.field_type == TYPE_SHORT { 2 } else { 4 };
        width * self.values.len()
    }

    fn payload(&self, order: ByteOrder) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for &v in &self.values {
            if self.field_type == TYPE_SHORT {
                order.put_u16(&mut out, v as u16);
            } else {
                order.put_u32(&mut out, v);
            }
        }
        out
    }
}

/// Lay out header, one IFD, out-of-line field values and strips.
fn assemble(order: ByteOrder, mut fields: Vec<Field>, strips: &[&[u8]]) -> Vec<u8> {
    fields.push(Field::long(STRIP_OFFSETS, vec![0; strips.len()]));
    fields.push(Field::long(
        STRIP_BYTE_COUNTS,
        strips.iter().map(|s| s.len() as u32).collect(),
    ));
    fields.sort_by_key(|f| f.tag);

    let ifd_len = 2 + fields.len() * 12 + 4;
    let extra_start = 8 + ifd_len;
    let extra_len: usize = fields
        .iter()
        .map(Field::byte_len)
        .filter(|&n| n > 4)
        .map(|n| n + n % 2)
        .sum();
    let mut next = extra_start + extra_len;
    if let Some(offsets) = fields.iter_mut().find(|f| f.tag == STRIP_OFFSETS) {
        for (v, strip) in offsets.values.iter_mut().zip(strips) {
            *v = next as u32;
            next += strip.len();
        }
    }

    let mut out = Vec::with_capacity(next);
    out.extend_from_slice(match order {
        ByteOrder::Little => b"II",
        ByteOrder::Big => b"MM",
    });
    order.put_u16(&mut out, 42);
    order.put_u32(&mut out, 8);
    order.put_u16(&mut out, fields.len() as u16);

    let mut extra = Vec::with_capacity(extra_len);
    for field in &fields {
        order.put_u16(&mut out, field.tag);
        order.put_u16(&mut out, field.field_type);
        order.put_u32(&mut out, field.values.len() as u32);
        let mut payload = field.payload(order);
        if payload.len() <= 4 {
            payload.resize(4, 0);
            out.extend_from_slice(&payload);
        } else {
            order.put_u32(&mut out, (extra_start + extra.len()) as u32);
            extra.extend_from_slice(&payload);
            if extra.len() % 2 == 1 {
                extra.push(0);
            }
        }
    }
    order.put_u32(&mut out, 0);
    out.extend_from_slice(&extra);
    for strip in strips {
        out.extend_from_slice(strip);
    }
    out
}

pub fn encode(image: &NdArray) -> Result<Vec<u8>, String> {
    let (height, width, samples) = match *image.shape() {
        [h, w] => (h, w, 1),
        [h, w, 3] => (h, w, 3),
        _ => {
            return Err(format!(
                "unsupported image shape {}, expected (H, W) or (H, W, 3)",
                shape_tag(image.shape())
            ))
        }
    };
    let dtype = image.dtype();
    if dtype == DType::Bool {
        return Err("boolean images are not supported".to_owned());
    }
    let too_large = |what: &str| format!("image {what} exceeds the 32-bit TIFF limit");
    let width = u32::try_from(width).map_err(|_| too_large("width"))?;
    let height = u32::try_from(height).map_err(|_| too_large("height"))?;
    u32::try_from(image.as_bytes().len()).map_err(|_| too_large("data"))?;

    let bits = (dtype.size() * 8) as u32;
    let sample_format = if dtype.is_float() {
        3
    } else if dtype.is_signed() {
        2
    } else {
        1
    };
    let photometric = if samples == 3 { 2 } else { 1 };

    let fields = vec![
        Field::long(IMAGE_WIDTH, vec![width]),
        Field::long(IMAGE_LENGTH, vec![height]),
        Field::short(BITS_PER_SAMPLE, vec![bits; samples]),
        Field::short(COMPRESSION, vec![1]),
        Field::short(PHOTOMETRIC, vec![photometric]),
        Field::short(SAMPLES_PER_PIXEL, vec![samples as u32]),
        Field::long(ROWS_PER_STRIP, vec![height]),
        Field::short(PLANAR_CONFIG, vec![1]),
        Field::short(SAMPLE_FORMAT, vec![sample_format; samples]),
    ];
    Ok(assemble(ByteOrder::Little, fields, &[image.as_bytes()]))
}

fn read_fields(bytes: &[u8], order: ByteOrder) -> Result<BTreeMap<u16, Vec<u64>>, String> {
    const TRUNCATED: &str = "truncated image file directory";
    let ifd = order.u32(bytes, 4).ok_or(TRUNCATED)? as usize;
    let count = order.u16(bytes, ifd).ok_or(TRUNCATED)?;
    let mut fields = BTreeMap::new();

    for i in 0..usize::from(count) {
        let at = ifd + 2 + i * 12;
        let tag = order.u16(bytes, at).ok_or(TRUNCATED)?;
        let field_type = order.u16(bytes, at + 2).ok_or(TRUNCATED)?;
        let n = order.u32(bytes, at + 4).ok_or(TRUNCATED)? as usize;
        let width = match field_type {
            TYPE_BYTE => 1,
            TYPE_SHORT => 2,
            TYPE_LONG => 4,
            _ => continue,
        };
        let len = n.checked_mul(width).ok_or(TRUNCATED)?;
        let start = if len <= 4 {
            at + 8
        } else {
            order.u32(bytes, at + 8).ok_or(TRUNCATED)? as usize
        };

        let mut values = Vec::with_capacity(n.min(bytes.len()));
        for k in 0..n {
            let pos = start + k * width;
            let v = match field_type {
                TYPE_BYTE => bytes.get(pos).map(|&b| u64::from(b)),
                TYPE_SHORT => order.u16(bytes, pos).map(u64::from),
                _ => order.u32(bytes, pos).map(u64::from),
            };
            values.push(v.ok_or_else(|| format!("tag {tag} points past the end of the file"))?);
        }
        fields.insert(tag, values);
    }
    Ok(fields)
}

/// All values of a per-sample tag must agree; returns the common value.
fn uniform(fields: &BTreeMap<u16, Vec<u64>>, tag: u16, default: u64) -> Result<u64, String> {
    let Some(values) = fields.get(&tag) else {
        return Ok(default);
    };
    let first = values.first().copied().unwrap_or(default);
    if values.iter().any(|&v| v != first) {
        return Err(format!("mixed values for tag {tag} are not supported"));
    }
    Ok(first)
}

fn dtype_for(sample_format: u64, bits: u64) -> Option<DType> {
    Some(match (sample_format, bits) {
        (1, 8) => DType::U8,
        (1, 16) => DType::U16,
        (1, 32) => DType::U32,
        (1, 64) => DType::U64,
        (2, 8) => DType::I8,
        (2, 16) => DType::I16,
        (2, 32) => DType::I32,
        (2, 64) => DType::I64,
        (3, 32) => DType::F32,
        (3, 64) => DType::F64,
        _ => return None,
    })
}

pub fn decode(bytes: &[u8]) -> Result<NdArray, String> {
    let order = match bytes.get(..2) {
        Some(b"II") => ByteOrder::Little,
        Some(b"MM") => ByteOrder::Big,
        _ => return Err("not a TIFF file".to_owned()),
    };
    if order.u16(bytes, 2) != Some(42) {
        return Err("not a classic TIFF file".to_owned());
    }
    let fields = read_fields(bytes, order)?;

    let required = |tag: u16, name: &str| {
        fields
            .get(&tag)
            .and_then(|v| v.first().copied())
            .ok_or_else(|| format!("missing {name}"))
    };
    let width = required(IMAGE_WIDTH, "ImageWidth")? as usize;
    let height = required(IMAGE_LENGTH, "ImageLength")? as usize;
    let samples = uniform(&fields, SAMPLES_PER_PIXEL, 1)? as usize;
    let bits = uniform(&fields, BITS_PER_SAMPLE, 1)?;
    let sample_format = uniform(&fields, SAMPLE_FORMAT, 1)?;

    if uniform(&fields, COMPRESSION, 1)? != 1 {
        return Err("compressed images are not supported".to_owned());
    }
    if samples > 1 && uniform(&fields, PLANAR_CONFIG, 1)? != 1 {
        return Err("planar images are not supported".to_owned());
    }
    let dtype = dtype_for(sample_format, bits)
        .ok_or_else(|| format!("unsupported sample type (format {sample_format}, {bits} bits)"))?;

    let expected = height
        .checked_mul(width)
        .and_then(|n| n.checked_mul(samples))
        .and_then(|n| n.checked_mul(dtype.size()))
        .ok_or("image dimensions overflow")?;

    let offsets = fields.get(&STRIP_OFFSETS).ok_or("missing StripOffsets")?;
    let counts = fields
        .get(&STRIP_BYTE_COUNTS)
        .ok_or("missing StripByteCounts")?;
    if offsets.len() != counts.len() {
        return Err("StripOffsets and StripByteCounts disagree".to_owned());
    }
    let strips = offsets
        .iter()
        .zip(counts)
        .map(|(&offset, &count)| {
            let (offset, count) = (offset as usize, count as usize);
            offset
                .checked_add(count)
                .and_then(|end| bytes.get(offset..end))
                .ok_or("strip extends past the end of the file")
        })
        .collect::<Result<Vec<_>, _>>()?;
    let available: usize = strips.iter().map(|s| s.len()).sum();
    if available < expected {
        return Err(format!(
            "image needs {expected} bytes of strip data, found {available}"
        ));
    }
    let mut data = Vec::with_capacity(expected);
    for strip in strips {
        let take = strip.len().min(expected - data.len());
        data.extend_from_slice(&strip[..take]);
    }
    data.truncate(expected);
    if order == ByteOrder::Big {
        for element in data.chunks_exact_mut(dtype.size()) {
            element.reverse();
        }
    }

    let shape = if samples == 1 {
        vec![height, width]
    } else {
        vec![height, width, samples]
    };
    NdArray::new(dtype, shape, data).map_err(|e| e.to_string())
}

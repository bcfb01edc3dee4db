//! `.npy` array files (format version 1.0 on write, 1.0 through 3.0 on read).

use crate::array::{shape_tag, DType, NdArray};
use crate::fingerprint::hash_array;
use cachet_resource::{Codec, ContentHash, DataHash, Resource, ResourceError, Target};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGN: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct NpyCodec;

pub type NumpySource = Resource<NpyCodec>;
pub type NumpyTarget = Target<NpyCodec>;

impl Codec for NpyCodec {
    type Payload = NdArray;
    const KIND: &'static str = "numpy";
    const EXTENSIONS: &'static [&'static str] = &[".npy"];

    fn read(&self, path: &Path) -> Result<NdArray, ResourceError> {
        let bytes = fs::read(path)?;
        decode(&bytes).map_err(|reason| ResourceError::Format {
            kind: Self::KIND,
            path: path.to_path_buf(),
            reason,
        })
    }

    fn write(&self, path: &Path, payload: &NdArray) -> Result<(), ResourceError> {
        fs::write(path, encode(payload))?;
        Ok(())
    }

    fn from_fields(_: &Map<String, Value>) -> Result<Self, ResourceError> {
        Ok(Self)
    }
}

impl ContentHash for NpyCodec {
    fn hash(&self, payload: &NdArray) -> DataHash {
        hash_array(payload)
    }
}

pub fn encode(array: &NdArray) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        array.dtype().descr(),
        shape_tag(array.shape())
    );
    // magic(6) + version(2) + header_len(2) + header + '\n' is a multiple of ALIGN
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + array.as_bytes().len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(array.as_bytes());
    out
}

pub fn decode(bytes: &[u8]) -> Result<NdArray, String> {
    if bytes.len() < MAGIC.len() + 2 || &bytes[..MAGIC.len()] != MAGIC {
        return Err("missing NUMPY magic".to_owned());
    }
    let major = bytes[MAGIC.len()];
    let mut pos = MAGIC.len() + 2;
    let header_len = match major {
        1 => {
            let raw = bytes.get(pos..pos + 2).ok_or("truncated header length")?;
            pos += 2;
            usize::from(u16::from_le_bytes([raw[0], raw[1]]))
        }
        2 | 3 => {
            let raw = bytes.get(pos..pos + 4).ok_or("truncated header length")?;
            pos += 4;
            u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize
        }
        v => return Err(format!("unsupported format version {v}")),
    };

    let header = bytes
        .get(pos..pos + header_len)
        .ok_or("truncated header")?;
    let header = std::str::from_utf8(header).map_err(|e| format!("header is not text: {e}"))?;
    let body = &bytes[pos + header_len..];

    let descr = quoted_value(header, "descr").ok_or("header has no 'descr'")?;
    let dtype = DType::from_descr(descr).ok_or_else(|| format!("unsupported dtype '{descr}'"))?;
    if raw_value(header, "fortran_order").is_some_and(|v| v.starts_with("True")) {
        return Err("fortran-ordered arrays are not supported".to_owned());
    }
    let shape = parse_shape(header).ok_or("header has no valid 'shape'")?;

    NdArray::new(dtype, shape, body.to_vec()).map_err(|e| e.to_string())
}

fn raw_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("'{key}':");
    let start = header.find(&needle)? + needle.len();
    Some(header[start..].trim_start())
}

fn quoted_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let rest = raw_value(header, key)?;
    let quote = rest.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &rest[1..];
    Some(&rest[..rest.find(quote)?])
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let rest = raw_value(header, "shape")?.strip_prefix('(')?;
    let inner = &rest[..rest.find(')')?];
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('L').parse().ok())
        .collect()
}

//! Chunked array stores in the zarr v2 directory layout (uncompressed, C order).
//!
//! A store is read-only from the cache's point of view: it only ever backs a
//! source. With no slices configured, reading yields an [`ArrayHandle`] and
//! loads nothing; with slices, only the chunks intersecting the selected
//! region are read.

use crate::array::{byte_len, copy_block, Block, BlockMut, DType, NdArray};
use cachet_resource::{Codec, Resource, ResourceError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

const ARRAY_META: &str = ".zarray";
const GROUP_META: &str = ".zgroup";

/// How the backing store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Read only.
    #[default]
    R,
    /// Read/write, must exist.
    RPlus,
    /// Read/write, create if missing.
    A,
    /// Create, overwriting anything present.
    W,
    /// Create, failing if present.
    WMinus,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::R => "r",
            Mode::RPlus => "r+",
            Mode::A => "a",
            Mode::W => "w",
            Mode::WMinus => "w-",
        }
    }

    pub fn is_read_only(self) -> bool {
        self == Mode::R
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" => Ok(Mode::R),
            "r+" => Ok(Mode::RPlus),
            "a" => Ok(Mode::A),
            "w" => Ok(Mode::W),
            "w-" => Ok(Mode::WMinus),
            other => Err(ResourceError::InvalidField {
                field: "mode".to_owned(),
                reason: format!("unknown open mode '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArrayMeta {
    zarr_format: u32,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    dtype: String,
    #[serde(default)]
    compressor: Option<Value>,
    #[serde(default)]
    fill_value: Value,
    #[serde(default = "default_order")]
    order: String,
    #[serde(default)]
    filters: Option<Value>,
    #[serde(default = "default_separator")]
    dimension_separator: String,
}

fn default_order() -> String {
    "C".to_owned()
}

fn default_separator() -> String {
    ".".to_owned()
}

fn fill_value_of(value: &Value) -> Option<f64> {
    match value {
        Value::Null => Some(0.0),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

fn group_dir(root: &Path, group: &str) -> PathBuf {
    if group.is_empty() {
        root.to_path_buf()
    } else {
        root.join(group)
    }
}

/// An opened array inside a store. Holds metadata only; data is read on
/// demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayHandle {
    dir: PathBuf,
    dtype: DType,
    shape: Vec<usize>,
    chunks: Vec<usize>,
    fill_value: f64,
    separator: String,
    mode: Mode,
}

impl ArrayHandle {
    pub fn open(root: &Path, group: &str, mode: Mode) -> Result<Self, ResourceError> {
        let dir = group_dir(root, group);
        let meta_path = dir.join(ARRAY_META);
        if !meta_path.exists() {
            return Err(ResourceError::NotFound(meta_path));
        }
        let meta: ArrayMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
        Self::from_meta(dir, meta, mode).map_err(|reason| ResourceError::Format {
            kind: ZarrCodec::KIND,
            path: meta_path,
            reason,
        })
    }

    fn from_meta(dir: PathBuf, meta: ArrayMeta, mode: Mode) -> Result<Self, String> {
        if meta.zarr_format != 2 {
            return Err(format!("unsupported zarr_format {}", meta.zarr_format));
        }
        if meta.compressor.as_ref().is_some_and(|c| !c.is_null()) {
            return Err("compressed chunks are not supported".to_owned());
        }
        if meta
            .filters
            .as_ref()
            .is_some_and(|f| !f.is_null() && f.as_array().map_or(true, |a| !a.is_empty()))
        {
            return Err("chunk filters are not supported".to_owned());
        }
        if meta.order != "C" {
            return Err(format!("unsupported chunk order '{}'", meta.order));
        }
        if meta.chunks.len() != meta.shape.len() || meta.chunks.contains(&0) {
            return Err("chunk shape does not match array rank".to_owned());
        }
        let dtype = DType::from_descr(&meta.dtype)
            .ok_or_else(|| format!("unsupported dtype '{}'", meta.dtype))?;
        if byte_len(dtype, &meta.shape).is_none() || byte_len(dtype, &meta.chunks).is_none() {
            return Err("array dimensions overflow".to_owned());
        }
        let fill_value = fill_value_of(&meta.fill_value)
            .ok_or_else(|| format!("unsupported fill_value {}", meta.fill_value))?;
        Ok(Self {
            dir,
            dtype,
            shape: meta.shape,
            chunks: meta.chunks,
            fill_value,
            separator: meta.dimension_separator,
            mode,
        })
    }

    /// Create an empty array (every chunk reads as zero until written).
    ///
    /// `a` and `r+` open an existing array instead; `w` replaces one; `w-`
    /// refuses to.
    pub fn create(
        root: &Path,
        group: &str,
        dtype: DType,
        shape: Vec<usize>,
        chunks: Vec<usize>,
        mode: Mode,
    ) -> Result<Self, ResourceError> {
        let dir = group_dir(root, group);
        let exists = dir.join(ARRAY_META).exists();
        match mode {
            Mode::R => {
                return Err(ResourceError::Precondition(
                    "cannot create an array in mode r".to_owned(),
                ))
            }
            Mode::RPlus => return Self::open(root, group, mode),
            Mode::A if exists => return Self::open(root, group, mode),
            _ if group.trim_matches('/').is_empty() => {
                return Err(ResourceError::InvalidField {
                    field: "group".to_owned(),
                    reason: "arrays are created inside a named group, not the store root"
                        .to_owned(),
                })
            }
            Mode::WMinus if exists => {
                return Err(ResourceError::Precondition(format!(
                    "array already exists at {}",
                    dir.display()
                )))
            }
            Mode::W if exists => fs::remove_dir_all(&dir)?,
            Mode::A | Mode::W | Mode::WMinus => {}
        }
        if chunks.len() != shape.len() || chunks.contains(&0) {
            return Err(ResourceError::InvalidField {
                field: "chunks".to_owned(),
                reason: format!("{chunks:?} does not fit shape {shape:?}"),
            });
        }
        if byte_len(dtype, &shape).is_none() || byte_len(dtype, &chunks).is_none() {
            return Err(ResourceError::InvalidField {
                field: "shape".to_owned(),
                reason: format!("{shape:?} of {dtype} does not fit in memory"),
            });
        }

        fs::create_dir_all(&dir)?;
        let group_meta = root.join(GROUP_META);
        if !group_meta.exists() {
            fs::write(&group_meta, b"{\"zarr_format\": 2}")?;
        }
        let fill_value = match dtype {
            DType::Bool => Value::Bool(false),
            DType::F32 | DType::F64 => Value::from(0.0),
            _ => Value::from(0),
        };
        let meta = ArrayMeta {
            zarr_format: 2,
            shape,
            chunks,
            dtype: dtype.descr().to_owned(),
            compressor: None,
            fill_value,
            order: default_order(),
            filters: None,
            dimension_separator: default_separator(),
        };
        fs::write(dir.join(ARRAY_META), serde_json::to_vec_pretty(&meta)?)?;
        debug!("created {dtype} array {:?} at {}", meta.shape, dir.display());

        Ok(Self {
            dir,
            dtype,
            shape: meta.shape,
            chunks: meta.chunks,
            fill_value: 0.0,
            separator: meta.dimension_separator,
            mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    pub fn fill_value(&self) -> f64 {
        self.fill_value
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn chunk_path(&self, idx: &[usize]) -> PathBuf {
        if idx.is_empty() {
            return self.dir.join("0");
        }
        let key: Vec<String> = idx.iter().map(ToString::to_string).collect();
        self.dir.join(key.join(&self.separator))
    }

    fn chunk_bytes(&self) -> usize {
        self.chunks.iter().product::<usize>() * self.dtype.size()
    }

    fn read_chunk(&self, idx: &[usize]) -> Result<Vec<u8>, ResourceError> {
        let path = self.chunk_path(idx);
        if !path.exists() {
            debug!("chunk {idx:?} missing, using fill value");
            let n = self.chunks.iter().product::<usize>();
            return Ok(self.dtype.encode_scalar(self.fill_value).repeat(n));
        }
        let bytes = fs::read(&path)?;
        if bytes.len() != self.chunk_bytes() {
            return Err(ResourceError::Format {
                kind: ZarrCodec::KIND,
                path,
                reason: format!(
                    "chunk holds {} bytes, expected {}",
                    bytes.len(),
                    self.chunk_bytes()
                ),
            });
        }
        Ok(bytes)
    }

    fn check_ranges(&self, ranges: &[Range<usize>]) -> Result<(), ResourceError> {
        let invalid = |reason: String| ResourceError::InvalidField {
            field: "slices".to_owned(),
            reason,
        };
        if ranges.len() != self.shape.len() {
            return Err(invalid(format!(
                "expected {} ranges, got {}",
                self.shape.len(),
                ranges.len()
            )));
        }
        for (axis, (r, &len)) in ranges.iter().zip(&self.shape).enumerate() {
            if r.start > r.end || r.end > len {
                return Err(invalid(format!(
                    "{}..{} is out of bounds for axis {axis} of length {len}",
                    r.start, r.end
                )));
            }
        }
        Ok(())
    }

    /// Visit the index of every chunk that intersects `ranges`.
    fn for_each_chunk(
        &self,
        ranges: &[Range<usize>],
        mut visit: impl FnMut(&[usize]) -> Result<(), ResourceError>,
    ) -> Result<(), ResourceError> {
        if ranges.iter().any(|r| r.is_empty()) {
            return Ok(());
        }
        let first: Vec<usize> = ranges
            .iter()
            .zip(&self.chunks)
            .map(|(r, c)| r.start / c)
            .collect();
        let last: Vec<usize> = ranges
            .iter()
            .zip(&self.chunks)
            .map(|(r, c)| (r.end - 1) / c)
            .collect();
        let mut idx = first.clone();
        loop {
            visit(&idx)?;
            let mut axis = idx.len();
            loop {
                if axis == 0 {
                    return Ok(());
                }
                axis -= 1;
                idx[axis] += 1;
                if idx[axis] <= last[axis] {
                    break;
                }
                idx[axis] = first[axis];
            }
        }
    }

    /// Per-axis overlap of chunk `idx` with `ranges`: (lower corner, extent).
    fn overlap(&self, idx: &[usize], ranges: &[Range<usize>]) -> (Vec<usize>, Vec<usize>) {
        let mut lo = Vec::with_capacity(idx.len());
        let mut extent = Vec::with_capacity(idx.len());
        for ((&i, &c), r) in idx.iter().zip(&self.chunks).zip(ranges) {
            let start = (i * c).max(r.start);
            let end = ((i + 1) * c).min(r.end);
            lo.push(start);
            extent.push(end - start);
        }
        (lo, extent)
    }

    /// Read the region selected by one range per axis, touching only the
    /// chunks it intersects.
    pub fn read_region(&self, ranges: &[Range<usize>]) -> Result<NdArray, ResourceError> {
        self.check_ranges(ranges)?;
        let out_shape: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
        let item = self.dtype.size();
        let mut out = vec![0u8; out_shape.iter().product::<usize>() * item];
        let mut touched = 0usize;

        self.for_each_chunk(ranges, |idx| {
            let chunk = self.read_chunk(idx)?;
            let (lo, extent) = self.overlap(idx, ranges);
            let src_origin: Vec<usize> =
                lo.iter().zip(idx).zip(&self.chunks).map(|((l, i), c)| l - i * c).collect();
            let dst_origin: Vec<usize> = lo.iter().zip(ranges).map(|(l, r)| l - r.start).collect();
            copy_block(
                &Block::new(&chunk, &self.chunks, &src_origin),
                &mut BlockMut::new(&mut out, &out_shape, &dst_origin),
                &extent,
                item,
            );
            touched += 1;
            Ok(())
        })?;
        debug!("read {touched} chunk(s) from {}", self.dir.display());

        NdArray::new(self.dtype, out_shape, out).map_err(|e| ResourceError::Format {
            kind: ZarrCodec::KIND,
            path: self.dir.clone(),
            reason: e.to_string(),
        })
    }

    pub fn read_all(&self) -> Result<NdArray, ResourceError> {
        let ranges: Vec<Range<usize>> = self.shape.iter().map(|&n| 0..n).collect();
        self.read_region(&ranges)
    }

    /// Write `data` with its first element at `origin`, rewriting every chunk
    /// it touches.
    pub fn write_region(&self, origin: &[usize], data: &NdArray) -> Result<(), ResourceError> {
        if self.mode.is_read_only() {
            return Err(ResourceError::Precondition(format!(
                "array at {} is opened read-only (mode r)",
                self.dir.display()
            )));
        }
        if data.dtype() != self.dtype {
            return Err(ResourceError::InvalidField {
                field: "dtype".to_owned(),
                reason: format!("cannot write {} into a {} array", data.dtype(), self.dtype),
            });
        }
        if origin.len() != data.ndim() {
            return Err(ResourceError::InvalidField {
                field: "origin".to_owned(),
                reason: format!("expected {} coordinates, got {}", data.ndim(), origin.len()),
            });
        }
        let ranges: Vec<Range<usize>> = origin
            .iter()
            .zip(data.shape())
            .map(|(&o, &n)| o..o + n)
            .collect();
        self.check_ranges(&ranges)?;
        let item = self.dtype.size();

        self.for_each_chunk(&ranges, |idx| {
            let mut chunk = self.read_chunk(idx)?;
            let (lo, extent) = self.overlap(idx, &ranges);
            let src_origin: Vec<usize> = lo.iter().zip(origin).map(|(l, o)| l - o).collect();
            let dst_origin: Vec<usize> =
                lo.iter().zip(idx).zip(&self.chunks).map(|((l, i), c)| l - i * c).collect();
            copy_block(
                &Block::new(data.as_bytes(), data.shape(), &src_origin),
                &mut BlockMut::new(&mut chunk, &self.chunks, &dst_origin),
                &extent,
                item,
            );
            let path = self.chunk_path(idx);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &chunk)?;
            Ok(())
        })
    }
}

/// Create (or replace) `group` under `root` holding `array`, split into
/// `chunks`.
pub fn write_array(
    root: &Path,
    group: &str,
    array: &NdArray,
    chunks: &[usize],
) -> Result<ArrayHandle, ResourceError> {
    let handle = ArrayHandle::create(
        root,
        group,
        array.dtype(),
        array.shape().to_vec(),
        chunks.to_vec(),
        Mode::W,
    )?;
    handle.write_region(&vec![0; array.ndim()], array)?;
    Ok(handle)
}

/// What reading a store yields.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkedData {
    /// No slices configured: the opened array, nothing loaded.
    Array(ArrayHandle),
    /// The selected sub-region, materialized.
    Region(NdArray),
}

impl ChunkedData {
    pub fn as_array(&self) -> Option<&ArrayHandle> {
        match self {
            ChunkedData::Array(h) => Some(h),
            ChunkedData::Region(_) => None,
        }
    }

    pub fn as_region(&self) -> Option<&NdArray> {
        match self {
            ChunkedData::Region(a) => Some(a),
            ChunkedData::Array(_) => None,
        }
    }
}

/// Resolve one Python-style slice bound against an axis length: negative
/// values count from the end and everything is clamped to `0..=len`.
fn resolve_bound(bound: i64, len: usize) -> usize {
    let len_i = len as i64;
    let v = if bound < 0 { bound + len_i } else { bound };
    v.clamp(0, len_i) as usize
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZarrCodec {
    group: String,
    slices_start: Vec<i64>,
    slices_stop: Vec<i64>,
    mode: Mode,
}

pub type ZarrSource = Resource<ZarrCodec>;

impl Default for ZarrCodec {
    fn default() -> Self {
        Self {
            group: "0".to_owned(),
            slices_start: Vec::new(),
            slices_stop: Vec::new(),
            mode: Mode::R,
        }
    }
}

impl ZarrCodec {
    pub fn new(
        group: impl Into<String>,
        slices_start: Vec<i64>,
        slices_stop: Vec<i64>,
        mode: Mode,
    ) -> Result<Self, ResourceError> {
        if slices_start.len() != slices_stop.len() {
            return Err(ResourceError::InvalidField {
                field: "slices_stop".to_owned(),
                reason: format!(
                    "{} stops for {} starts",
                    slices_stop.len(),
                    slices_start.len()
                ),
            });
        }
        Ok(Self {
            group: group.into(),
            slices_start,
            slices_stop,
            mode,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn has_slices(&self) -> bool {
        !self.slices_start.is_empty()
    }

    /// Concrete ranges for an array of `shape`. Axes beyond the configured
    /// slices take their full extent.
    pub fn resolve(&self, shape: &[usize]) -> Result<Vec<Range<usize>>, ResourceError> {
        if self.slices_start.len() > shape.len() {
            return Err(ResourceError::InvalidField {
                field: "slices_start".to_owned(),
                reason: format!(
                    "{} slices for an array of rank {}",
                    self.slices_start.len(),
                    shape.len()
                ),
            });
        }
        Ok(shape
            .iter()
            .enumerate()
            .map(|(axis, &len)| match (self.slices_start.get(axis), self.slices_stop.get(axis)) {
                (Some(&start), Some(&stop)) => {
                    let start = resolve_bound(start, len);
                    start..resolve_bound(stop, len).max(start)
                }
                _ => 0..len,
            })
            .collect())
    }
}

fn int_list(fields: &Map<String, Value>, key: &str) -> Result<Vec<i64>, ResourceError> {
    let invalid = || ResourceError::InvalidField {
        field: key.to_owned(),
        reason: "expected a list of integers".to_owned(),
    };
    match fields.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_i64().ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}

impl Codec for ZarrCodec {
    type Payload = ChunkedData;
    const KIND: &'static str = "zarr";

    fn read(&self, path: &Path) -> Result<ChunkedData, ResourceError> {
        let handle = ArrayHandle::open(path, &self.group, self.mode)?;
        if !self.has_slices() {
            return Ok(ChunkedData::Array(handle));
        }
        let ranges = self.resolve(handle.shape())?;
        Ok(ChunkedData::Region(handle.read_region(&ranges)?))
    }

    fn write(&self, path: &Path, payload: &ChunkedData) -> Result<(), ResourceError> {
        match payload {
            ChunkedData::Array(handle) if handle.path().starts_with(path) => Ok(()),
            ChunkedData::Array(handle) => Err(ResourceError::Precondition(format!(
                "array handle for {} cannot be written to {}",
                handle.path().display(),
                path.display()
            ))),
            ChunkedData::Region(region) => {
                let handle = ArrayHandle::open(path, &self.group, self.mode)?;
                let ranges = self.resolve(handle.shape())?;
                let extent: Vec<usize> = ranges.iter().map(|r| r.end - r.start).collect();
                if extent != region.shape() {
                    return Err(ResourceError::InvalidField {
                        field: "slices".to_owned(),
                        reason: format!(
                            "selection {extent:?} does not match region {:?}",
                            region.shape()
                        ),
                    });
                }
                let origin: Vec<usize> = ranges.iter().map(|r| r.start).collect();
                handle.write_region(&origin, region)
            }
        }
    }

    fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("group".to_owned(), Value::from(self.group.clone()));
        fields.insert("slices_start".to_owned(), Value::from(self.slices_start.clone()));
        fields.insert("slices_stop".to_owned(), Value::from(self.slices_stop.clone()));
        fields.insert("mode".to_owned(), Value::from(self.mode.as_str()));
        fields
    }

    fn from_fields(fields: &Map<String, Value>) -> Result<Self, ResourceError> {
        let group = match fields.get("group") {
            None | Some(Value::Null) => "0".to_owned(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ResourceError::InvalidField {
                    field: "group".to_owned(),
                    reason: "expected a string".to_owned(),
                })
            }
        };
        let mode = match fields.get("mode").and_then(Value::as_str) {
            Some(s) => s.parse()?,
            None => Mode::R,
        };
        Self::new(
            group,
            int_list(fields, "slices_start")?,
            int_list(fields, "slices_stop")?,
            mode,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iota(shape: Vec<usize>) -> NdArray {
        let n: usize = shape.iter().product();
        let values: Vec<u16> = (0..n).map(|v| v as u16).collect();
        NdArray::from_u16(shape, &values).unwrap()
    }

    #[test]
    fn bounds_follow_python_slicing() {
        assert_eq!(resolve_bound(-10, 100), 90);
        assert_eq!(resolve_bound(-200, 100), 0);
        assert_eq!(resolve_bound(500, 100), 100);
        assert_eq!(resolve_bound(3, 100), 3);
    }

    #[test]
    fn resolve_fills_trailing_axes() {
        let codec = ZarrCodec::new("0", vec![2], vec![-2], Mode::R).unwrap();
        assert_eq!(codec.resolve(&[10, 4]).unwrap(), vec![2..8, 0..4]);
        let inverted = ZarrCodec::new("0", vec![5], vec![1], Mode::R).unwrap();
        assert_eq!(inverted.resolve(&[10]).unwrap(), vec![5..5]);
        assert!(codec.resolve(&[]).is_err());
    }

    #[test]
    fn mismatched_slice_lists_are_rejected() {
        assert!(ZarrCodec::new("0", vec![0, 0], vec![1], Mode::R).is_err());
    }

    #[test]
    fn mode_strings() {
        for m in [Mode::R, Mode::RPlus, Mode::A, Mode::W, Mode::WMinus] {
            assert_eq!(m.as_str().parse::<Mode>().unwrap(), m);
        }
        assert!("x".parse::<Mode>().is_err());
    }

    #[test]
    fn region_spanning_chunks_matches_slice() {
        let dir = tempfile::tempdir().unwrap();
        let a = iota(vec![7, 5]);
        let handle = write_array(dir.path(), "0", &a, &[3, 2]).unwrap();
        assert!(dir.path().join(".zgroup").exists());
        assert!(dir.path().join("0/.zarray").exists());
        assert!(dir.path().join("0/2.2").exists());

        let region = handle.read_region(&[2..6, 1..4]).unwrap();
        assert_eq!(region, a.slice(&[2..6, 1..4]).unwrap());
        assert_eq!(handle.read_all().unwrap(), a);
    }

    #[test]
    fn missing_chunks_read_as_fill_value() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArrayHandle::create(
            dir.path(),
            "g",
            DType::U8,
            vec![4, 4],
            vec![2, 2],
            Mode::W,
        )
        .unwrap();
        handle
            .write_region(&[0, 0], &NdArray::from_u8(vec![2, 2], vec![1, 2, 3, 4]).unwrap())
            .unwrap();
        let all = handle.read_all().unwrap();
        assert_eq!(&all.as_bytes()[..4], &[1, 2, 0, 0]);
        assert!(all.as_bytes()[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn read_only_handles_refuse_writes() {
        let dir = tempfile::tempdir().unwrap();
        write_array(dir.path(), "0", &iota(vec![4]), &[2]).unwrap();
        let handle = ArrayHandle::open(dir.path(), "0", Mode::R).unwrap();
        let err = handle.write_region(&[0], &iota(vec![2])).unwrap_err();
        assert!(matches!(err, ResourceError::Precondition(_)));
    }

    #[test]
    fn create_modes() {
        let dir = tempfile::tempdir().unwrap();
        write_array(dir.path(), "0", &iota(vec![4]), &[2]).unwrap();
        let create = |mode| ArrayHandle::create(dir.path(), "0", DType::U8, vec![8], vec![4], mode);
        assert!(create(Mode::WMinus).is_err());
        assert!(create(Mode::R).is_err());
        assert_eq!(create(Mode::A).unwrap().dtype(), DType::U16);
        assert_eq!(create(Mode::W).unwrap().dtype(), DType::U8);
    }

    #[test]
    fn compressed_stores_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("0")).unwrap();
        fs::write(
            dir.path().join("0/.zarray"),
            r#"{"zarr_format": 2, "shape": [4], "chunks": [2], "dtype": "<f8",
                "compressor": {"id": "blosc"}, "fill_value": "NaN", "order": "C", "filters": null}"#,
        )
        .unwrap();
        let err = ArrayHandle::open(dir.path(), "0", Mode::R).unwrap_err();
        assert!(matches!(err, ResourceError::Format { .. }));
    }

    #[test]
    fn overflowing_metadata_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("0")).unwrap();
        fs::write(
            dir.path().join("0/.zarray"),
            r#"{"zarr_format": 2, "shape": [4294967296, 4294967296, 2],
                "chunks": [4294967296, 4294967296, 2], "dtype": "<f8",
                "compressor": null, "fill_value": 0, "order": "C", "filters": null}"#,
        )
        .unwrap();
        let err = ArrayHandle::open(dir.path(), "0", Mode::R).unwrap_err();
        assert!(matches!(err, ResourceError::Format { .. }));
    }

    #[test]
    fn store_root_is_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        write_array(dir.path(), "0", &iota(vec![4]), &[2]).unwrap();
        for mode in [Mode::W, Mode::WMinus, Mode::A] {
            for group in ["", "/"] {
                let err = ArrayHandle::create(dir.path(), group, DType::U8, vec![2], vec![2], mode)
                    .unwrap_err();
                assert!(matches!(err, ResourceError::InvalidField { .. }), "{mode} {group:?}");
            }
        }
        assert!(dir.path().join(".zgroup").exists());
        assert!(ArrayHandle::open(dir.path(), "0", Mode::R).is_ok());
    }

    #[test]
    fn fields_roundtrip() {
        let codec = ZarrCodec::new("labels", vec![0, -3], vec![10, -1], Mode::A).unwrap();
        assert_eq!(ZarrCodec::from_fields(&codec.fields()).unwrap(), codec);
        assert_eq!(ZarrCodec::from_fields(&Map::new()).unwrap(), ZarrCodec::default());
    }

    #[test]
    fn source_without_slices_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store.zarr");
        write_array(&store, "0", &iota(vec![6, 6]), &[3, 3]).unwrap();

        let mut src = ZarrSource::from_path(store.to_str().unwrap()).unwrap();
        let data = src.get_data(true).unwrap();
        let handle = data.as_array().unwrap();
        assert_eq!(handle.shape(), &[6, 6]);
        assert_eq!(handle.mode(), Mode::R);
    }

    #[test]
    fn source_with_slices_loads_region() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store.zarr");
        let a = iota(vec![6, 6]);
        write_array(&store, "0", &a, &[3, 3]).unwrap();

        let codec = ZarrCodec::new("0", vec![1, -4], vec![-1, 6], Mode::R).unwrap();
        let mut src = ZarrSource::from_path_with(store.to_str().unwrap(), codec).unwrap();
        let data = src.get_data(true).unwrap();
        assert_eq!(data.as_region().unwrap(), &a.slice(&[1..5, 2..6]).unwrap());
    }
}

//! Concrete data kinds for cachet resources.
//!
//! Each kind is a [`Codec`](cachet_resource::Codec) over one payload type:
//!
//! - [`tabular`]: [`Table`] as `.csv` with an index column
//! - [`npy`]: [`NdArray`] as `.npy`
//! - [`raster`]: [`NdArray`] images as baseline TIFF under any extension, with metadata
//!   and resolution carried in the envelope
//! - [`chunked`]: zarr v2 directory stores, source only
//!
//! Every hashable kind derives its digest from content alone, see
//! [`fingerprint`].

pub mod array;
pub mod chunked;
pub mod fingerprint;
pub mod npy;
pub mod raster;
pub mod tabular;

pub use array::{byte_len, shape_tag, ArrayError, DType, NdArray};
pub use chunked::{write_array, ArrayHandle, ChunkedData, Mode, ZarrCodec, ZarrSource};
pub use fingerprint::{array_digest, hash_array};
pub use npy::{NpyCodec, NumpySource, NumpyTarget};
pub use raster::{ImageCodec, ImageSource, ImageTarget};
pub use tabular::{Cell, CsvCodec, CsvSource, CsvTarget, Table};

//! scadview core - parameter normalization and response sizing
//!
//! The pieces of the scadview MCP server that do not talk to OpenSCAD or the
//! MCP transport:
//!
//! - [`normalize`] turns loosely-typed tool arguments (arrays, objects,
//!   JSON strings, `"800x600"`, `"a,b"`, `"k=v"`) into canonical values
//! - [`response`] decides whether rendered images are returned inline,
//!   recompressed, or written to disk to stay within a size budget
//! - [`compress`] holds the size estimate and PNG recompression shared by
//!   the two

pub mod compress;
pub mod error;
pub mod normalize;
pub mod response;

pub use compress::{
    CompressionEffort, ImageCompressor, PngCompressor, compression_ratio, estimate_response_size,
};
pub use error::{Error, Result};
pub use normalize::{
    ImageSize, MAX_TOTAL_PIXELS, Vector3, json_type_name, normalize_dict, normalize_image_size,
    normalize_list, normalize_vector3,
};
pub use response::{
    ImageDescriptor, ImageRecord, ImageSet, ManagedImages, ManagedResponse, OutputFormat,
    PNG_MIME, ResponseManager, save_image_to_file, unique_file_name,
};

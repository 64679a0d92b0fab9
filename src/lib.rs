#![doc = include_str!("../README.md")]
//! See [`GeomBuilder`] for the streaming build API, [`from_wkt`] /
//! [`from_wkb`] for the bundled token sources, and [`parse_blob`] for
//! decoding blobs back into [`Geometry`] trees.

pub mod blob;
pub mod builder;
mod emit;
pub mod encode;
pub mod error;
pub mod node;
pub mod types;
pub mod wkb;
pub mod wkt;

pub use blob::{
    extract_srid, parse_blob, parse_blob_standard, peek_header, write_blob, write_blob_standard,
    BlobHeader, Coord, Geom, Geometry,
};
pub use builder::GeomBuilder;
pub use encode::Encoding;
pub use error::{GeoserError, Result};
pub use types::{Dimensions, GeometryKind};
pub use wkb::{from_wkb, from_wkb_hex};
pub use wkt::{from_wkt, from_wkt_default};

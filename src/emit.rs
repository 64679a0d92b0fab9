//! Emission engine: a single walk over the completed node list.
//!
//! Structure is built before the final byte layout is known (shrunk count
//! fields change widths after the fact), so the size slot at offset 0 is
//! written as a placeholder and patched with the true remainder size once
//! the walk has finished.

use byteorder::{ByteOrder, LittleEndian};

use crate::encode::{self, Encoding};
use crate::error::{GeoserError, Result};
use crate::node::{Node, NodePool};
use crate::types::{Dimensions, HEADER_M_FLAG, HEADER_SRID_FLAG, HEADER_Z_FLAG};

/// Build-wide state the walk needs beyond the nodes themselves.
pub(crate) struct BuildMeta {
    pub dims: Option<Dimensions>,
    pub srid: Option<i32>,
    pub encoding: Encoding,
    pub shrink: bool,
    /// Upper bound on the output size, from the incremental pass.
    pub capacity: usize,
}

/// Walk the node list once, producing the final contiguous blob.
pub(crate) fn emit(pool: &NodePool, meta: &BuildMeta) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(meta.capacity);
    // Consumed by the first header written; nested headers never re-emit it.
    let mut pending_srid = meta.srid;

    for node in pool.nodes() {
        match *node {
            Node::Size => out.extend_from_slice(&[0u8; 4]),
            Node::Header { kind } => {
                write_header(&mut out, kind, meta.dims, &mut pending_srid);
            }
            Node::Count { n } => encode::write_count(&mut out, n, meta.shrink),
            Node::HeaderCount { kind, n } => {
                write_header(&mut out, kind, meta.dims, &mut pending_srid);
                encode::write_count(&mut out, n, meta.shrink);
            }
            Node::Coord { vals, ndims } => {
                encode::write_ordinates(&mut out, &vals[..ndims as usize], meta.encoding);
            }
        }
    }

    // The size field must appear before the content it measures, so its
    // true value is only known now.
    let total =
        u32::try_from(out.len() - 4).map_err(|_| GeoserError::SizeOverflow)?;
    LittleEndian::write_u32(&mut out[0..4], total);
    Ok(out)
}

fn write_header(
    out: &mut Vec<u8>,
    kind: crate::types::GeometryKind,
    dims: Option<Dimensions>,
    pending_srid: &mut Option<i32>,
) {
    let mut tag: u8 = kind.into();
    // A build that never saw a coordinate has no dimensionality to record.
    if let Some(d) = dims {
        if d.has_z() {
            tag |= HEADER_Z_FLAG;
        }
        if d.has_m() {
            tag |= HEADER_M_FLAG;
        }
    }
    if pending_srid.is_some() {
        tag |= HEADER_SRID_FLAG;
    }
    out.push(tag);
    if let Some(srid) = pending_srid.take() {
        out.extend_from_slice(&srid.to_le_bytes());
    }
}

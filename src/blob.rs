//! Decoded geometry tree and the blob codec.
//!
//! Blob layout (canonical standard mode, little-endian throughout):
//!
//! ```text
//! [u32 size]     total size of the remainder  [outermost only]
//! [header byte]  bits 0-3 kind, bit 4 M, bit 5 Z, bit 6 SRID-present
//! [i32 SRID]     only after the outermost header, iff flag set
//! body           Point: ordinates inline;
//!                LineString/CircularString: count + coordinate tuples;
//!                Polygon: ring count + per-ring(count + tuples);
//!                Multi/Collection: child count + nested geometries
//! ```
//!
//! Compact mode swaps 4-byte fixed-point integers for the 8-byte doubles;
//! the shrink option swaps tagged variable-width counts for plain `u32`.
//! Both are out-of-band flags supplied by the caller, not recorded in the
//! stream.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::builder::GeomBuilder;
use crate::encode::{decode_compact, Encoding};
use crate::error::{GeoserError, Result};
use crate::types::{
    Dimensions, GeometryKind, HEADER_KIND_MASK, HEADER_M_FLAG, HEADER_SRID_FLAG, HEADER_Z_FLAG,
};

/// One coordinate; unused ordinates stay at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub m: f64,
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Self {
        Coord {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Coord {
            x,
            y,
            z,
            ..Default::default()
        }
    }

    pub fn xym(x: f64, y: f64, m: f64) -> Self {
        Coord {
            x,
            y,
            m,
            ..Default::default()
        }
    }

    pub fn xyzm(x: f64, y: f64, z: f64, m: f64) -> Self {
        Coord { x, y, z, m }
    }
}

/// Structural geometry tree produced by [`parse_blob`].
///
/// Polygon rings are bare coordinate sequences; every other nested child
/// is a full geometry with its own header byte in the serialized form.
#[derive(Debug, Clone, PartialEq)]
pub enum Geom {
    Point(Coord),
    LineString(Vec<Coord>),
    CircularString(Vec<Coord>),
    Polygon(Vec<Vec<Coord>>),
    CompoundCurve(Vec<Geom>),
    CurvePolygon(Vec<Geom>),
    MultiPoint(Vec<Geom>),
    MultiLineString(Vec<Geom>),
    MultiCurve(Vec<Geom>),
    MultiPolygon(Vec<Geom>),
    MultiSurface(Vec<Geom>),
    GeometryCollection(Vec<Geom>),
}

impl Geom {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geom::Point(_) => GeometryKind::Point,
            Geom::LineString(_) => GeometryKind::LineString,
            Geom::CircularString(_) => GeometryKind::CircularString,
            Geom::Polygon(_) => GeometryKind::Polygon,
            Geom::CompoundCurve(_) => GeometryKind::CompoundCurve,
            Geom::CurvePolygon(_) => GeometryKind::CurvePolygon,
            Geom::MultiPoint(_) => GeometryKind::MultiPoint,
            Geom::MultiLineString(_) => GeometryKind::MultiLineString,
            Geom::MultiCurve(_) => GeometryKind::MultiCurve,
            Geom::MultiPolygon(_) => GeometryKind::MultiPolygon,
            Geom::MultiSurface(_) => GeometryKind::MultiSurface,
            Geom::GeometryCollection(_) => GeometryKind::GeometryCollection,
        }
    }
}

/// A decoded geometry value: tree, dimensionality, optional SRID.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub srid: Option<i32>,
    pub dims: Dimensions,
    pub geom: Geom,
}

/// Parsed blob header metadata, readable without decoding the body.
#[derive(Debug, Clone)]
pub struct BlobHeader {
    pub kind: GeometryKind,
    pub dims: Dimensions,
    pub srid: Option<i32>,
    /// Byte offset where the body starts (after size, header, and SRID).
    pub data_offset: usize,
}

/// Peek at the blob header without decoding the geometry body.
///
/// # Example
///
/// ```
/// use geoser::{from_wkt_default, peek_header, GeometryKind};
///
/// let blob = from_wkt_default("SRID=4326;POINT(1 2)").unwrap();
/// let hdr = peek_header(&blob).unwrap();
/// assert_eq!(hdr.kind, GeometryKind::Point);
/// assert_eq!(hdr.srid, Some(4326));
/// ```
pub fn peek_header(blob: &[u8]) -> Result<BlobHeader> {
    if blob.len() < 5 {
        return Err(GeoserError::InvalidBlob("blob too short"));
    }
    let declared = LittleEndian::read_u32(&blob[0..4]) as usize;
    if declared != blob.len() - 4 {
        return Err(GeoserError::InvalidBlob("size field mismatch"));
    }

    let tag = blob[4];
    let kind = GeometryKind::try_from(tag & HEADER_KIND_MASK)
        .map_err(|_| GeoserError::InvalidBlob("unknown geometry kind"))?;
    let dims = Dimensions::from_flags(tag & HEADER_Z_FLAG != 0, tag & HEADER_M_FLAG != 0);

    let mut offset = 5usize;
    let srid = if tag & HEADER_SRID_FLAG != 0 {
        if blob.len() < 9 {
            return Err(GeoserError::InvalidBlob("SRID flag set but blob too short"));
        }
        offset += 4;
        Some(LittleEndian::read_i32(&blob[5..9]))
    } else {
        None
    };

    Ok(BlobHeader {
        kind,
        dims,
        srid,
        data_offset: offset,
    })
}

/// Extract only the SRID from a blob (cheap, no body decoding).
pub fn extract_srid(blob: &[u8]) -> Option<i32> {
    peek_header(blob).ok().and_then(|h| h.srid)
}

/// Decode a standard-mode blob without shrunk counts (the canonical form).
///
/// # Example
///
/// ```
/// use geoser::{from_wkt_default, parse_blob_standard, Geom};
///
/// let blob = from_wkt_default("POINT(1 2)").unwrap();
/// let geometry = parse_blob_standard(&blob).unwrap();
/// assert!(matches!(geometry.geom, Geom::Point(_)));
/// ```
pub fn parse_blob_standard(blob: &[u8]) -> Result<Geometry> {
    parse_blob(blob, Encoding::Standard, false)
}

/// Decode a blob into a [`Geometry`] tree.
///
/// `encoding` and `shrink` are the out-of-band flags the blob was built
/// with; they are not recorded in the stream.
pub fn parse_blob(blob: &[u8], encoding: Encoding, shrink: bool) -> Result<Geometry> {
    let header = peek_header(blob)?;
    let mut reader = Reader {
        buf: blob,
        pos: 4,
        encoding,
        shrink,
    };
    let geom = read_geom(&mut reader, &header, true)?;
    if reader.pos != blob.len() {
        return Err(GeoserError::InvalidBlob("trailing bytes after geometry"));
    }
    Ok(Geometry {
        srid: header.srid,
        dims: header.dims,
        geom,
    })
}

/// Serialize a [`Geometry`] tree, driving a [`GeomBuilder`].
///
/// # Example
///
/// ```
/// use geoser::{parse_blob_standard, write_blob_standard, Coord, Dimensions, Geom, Geometry};
///
/// let geometry = Geometry {
///     srid: Some(4326),
///     dims: Dimensions::Xy,
///     geom: Geom::Point(Coord::xy(1.0, 2.0)),
/// };
/// let blob = write_blob_standard(&geometry).unwrap();
/// assert_eq!(parse_blob_standard(&blob).unwrap(), geometry);
/// ```
pub fn write_blob_standard(geometry: &Geometry) -> Result<Vec<u8>> {
    write_blob(geometry, Encoding::Standard, false)
}

/// Serialize a [`Geometry`] tree with explicit encoding options.
pub fn write_blob(geometry: &Geometry, encoding: Encoding, shrink: bool) -> Result<Vec<u8>> {
    let mut builder = GeomBuilder::with_options(encoding, shrink);
    builder.set_srid(geometry.srid);
    // XYZ/XYZM/XY are inferred from coordinate arity; only the XYM layout
    // needs declaring ahead of the first coordinate.
    if geometry.dims == Dimensions::Xym {
        builder.set_dimensions(false, true)?;
    }
    drive(&mut builder, &geometry.geom, geometry.dims)?;
    builder.finish()
}

// ── Builder driver ────────────────────────────────────────────────────────────

fn drive(b: &mut GeomBuilder, geom: &Geom, dims: Dimensions) -> Result<()> {
    match geom {
        Geom::Point(c) => {
            b.open(GeometryKind::Point)?;
            push_coord(b, c, dims)?;
            b.close()
        }
        Geom::LineString(coords) => drive_string(b, GeometryKind::LineString, coords, dims),
        Geom::CircularString(coords) => drive_string(b, GeometryKind::CircularString, coords, dims),
        Geom::Polygon(rings) => {
            b.open(GeometryKind::Polygon)?;
            for ring in rings {
                b.open_ring()?;
                for c in ring {
                    push_coord(b, c, dims)?;
                }
                b.close()?;
            }
            b.close()
        }
        Geom::CompoundCurve(children) => drive_children(b, GeometryKind::CompoundCurve, children, dims),
        Geom::CurvePolygon(children) => {
            b.open(GeometryKind::CurvePolygon)?;
            for child in children {
                drive_boundary(b, child, dims)?;
            }
            b.close()
        }
        Geom::MultiPoint(children) => drive_children(b, GeometryKind::MultiPoint, children, dims),
        Geom::MultiLineString(children) => {
            drive_children(b, GeometryKind::MultiLineString, children, dims)
        }
        Geom::MultiCurve(children) => drive_children(b, GeometryKind::MultiCurve, children, dims),
        Geom::MultiPolygon(children) => drive_children(b, GeometryKind::MultiPolygon, children, dims),
        Geom::MultiSurface(children) => drive_children(b, GeometryKind::MultiSurface, children, dims),
        Geom::GeometryCollection(children) => {
            drive_children(b, GeometryKind::GeometryCollection, children, dims)
        }
    }
}

fn drive_string(
    b: &mut GeomBuilder,
    kind: GeometryKind,
    coords: &[Coord],
    dims: Dimensions,
) -> Result<()> {
    b.open(kind)?;
    for c in coords {
        push_coord(b, c, dims)?;
    }
    b.close()
}

/// A curve-polygon boundary: same as [`drive`], but line, arc, and
/// compound children are opened with the ring-closure rule armed.
fn drive_boundary(b: &mut GeomBuilder, geom: &Geom, dims: Dimensions) -> Result<()> {
    match geom {
        Geom::LineString(coords) => {
            b.open_closed(GeometryKind::LineString)?;
            for c in coords {
                push_coord(b, c, dims)?;
            }
            b.close()
        }
        Geom::CircularString(coords) => {
            b.open_closed(GeometryKind::CircularString)?;
            for c in coords {
                push_coord(b, c, dims)?;
            }
            b.close()
        }
        Geom::CompoundCurve(children) => {
            b.open_closed(GeometryKind::CompoundCurve)?;
            for child in children {
                drive(b, child, dims)?;
            }
            b.close()
        }
        other => drive(b, other, dims),
    }
}

fn drive_children(
    b: &mut GeomBuilder,
    kind: GeometryKind,
    children: &[Geom],
    dims: Dimensions,
) -> Result<()> {
    b.open(kind)?;
    for child in children {
        drive(b, child, dims)?;
    }
    b.close()
}

fn push_coord(b: &mut GeomBuilder, c: &Coord, dims: Dimensions) -> Result<()> {
    match dims {
        Dimensions::Xy => b.coord2(c.x, c.y),
        Dimensions::Xyz => b.coord3(c.x, c.y, c.z),
        Dimensions::Xym => b.coord3(c.x, c.y, c.m),
        Dimensions::Xyzm => b.coord4(c.x, c.y, c.z, c.m),
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    encoding: Encoding,
    shrink: bool,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(GeoserError::InvalidBlob("unexpected end of input"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn read_count(&mut self) -> Result<u32> {
        if !self.shrink {
            return self.read_u32();
        }
        // low bit tags the packed single-byte form
        if self.buf.get(self.pos).copied().unwrap_or(0) & 1 == 1 {
            Ok((self.read_u8()? >> 1) as u32)
        } else {
            Ok(self.read_u32()? >> 1)
        }
    }

    fn read_ordinate(&mut self) -> Result<f64> {
        match self.encoding {
            Encoding::Standard => Ok(LittleEndian::read_f64(self.take(8)?)),
            Encoding::Compact => Ok(decode_compact(self.read_u32()?)),
        }
    }

    fn read_coord(&mut self, dims: Dimensions) -> Result<Coord> {
        let mut c = Coord {
            x: self.read_ordinate()?,
            y: self.read_ordinate()?,
            ..Default::default()
        };
        if dims.has_z() {
            c.z = self.read_ordinate()?;
        }
        if dims.has_m() {
            c.m = self.read_ordinate()?;
        }
        Ok(c)
    }

    fn read_coords(&mut self, n: u32, dims: Dimensions) -> Result<Vec<Coord>> {
        let mut coords = Vec::with_capacity(n.min(4096) as usize);
        for _ in 0..n {
            coords.push(self.read_coord(dims)?);
        }
        Ok(coords)
    }
}

fn read_geom(reader: &mut Reader<'_>, outer: &BlobHeader, outermost: bool) -> Result<Geom> {
    let tag = reader.read_u8()?;
    let kind = GeometryKind::try_from(tag & HEADER_KIND_MASK)
        .map_err(|_| GeoserError::InvalidBlob("unknown geometry kind"))?;
    let dims = Dimensions::from_flags(tag & HEADER_Z_FLAG != 0, tag & HEADER_M_FLAG != 0);

    if outermost {
        if outer.srid.is_some() {
            // peek_header validated the srid bytes
            reader.pos += 4;
        }
    } else {
        if tag & HEADER_SRID_FLAG != 0 {
            return Err(GeoserError::InvalidBlob("nested SRID field"));
        }
        if dims != outer.dims {
            return Err(GeoserError::InvalidBlob("inconsistent dimensionality"));
        }
    }

    match kind {
        GeometryKind::Point => Ok(Geom::Point(reader.read_coord(dims)?)),
        GeometryKind::LineString => {
            let n = reader.read_count()?;
            Ok(Geom::LineString(reader.read_coords(n, dims)?))
        }
        GeometryKind::CircularString => {
            let n = reader.read_count()?;
            Ok(Geom::CircularString(reader.read_coords(n, dims)?))
        }
        GeometryKind::Polygon => {
            let nrings = reader.read_count()?;
            let mut rings = Vec::with_capacity(nrings.min(4096) as usize);
            for _ in 0..nrings {
                let npoints = reader.read_count()?;
                rings.push(reader.read_coords(npoints, dims)?);
            }
            Ok(Geom::Polygon(rings))
        }
        kind => {
            let n = reader.read_count()?;
            let mut children = Vec::with_capacity(n.min(4096) as usize);
            for _ in 0..n {
                children.push(read_geom(reader, outer, false)?);
            }
            Ok(match kind {
                GeometryKind::CompoundCurve => Geom::CompoundCurve(children),
                GeometryKind::CurvePolygon => Geom::CurvePolygon(children),
                GeometryKind::MultiPoint => Geom::MultiPoint(children),
                GeometryKind::MultiLineString => Geom::MultiLineString(children),
                GeometryKind::MultiCurve => Geom::MultiCurve(children),
                GeometryKind::MultiPolygon => Geom::MultiPolygon(children),
                GeometryKind::MultiSurface => Geom::MultiSurface(children),
                _ => Geom::GeometryCollection(children),
            })
        }
    }
}

// ── EWKT display ──────────────────────────────────────────────────────────────

impl fmt::Display for Geometry {
    /// Renders EWKT: an `SRID=n;` prefix when present, then WKT with the
    /// `M` keyword suffix for XYM layouts.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(srid) = self.srid {
            write!(f, "SRID={srid};")?;
        }
        write_geom(f, &self.geom, self.dims)
    }
}

fn write_geom(f: &mut fmt::Formatter<'_>, geom: &Geom, dims: Dimensions) -> fmt::Result {
    let suffix = if dims == Dimensions::Xym { "M" } else { "" };
    match geom {
        Geom::Point(c) => {
            write!(f, "POINT{suffix}(")?;
            write_coord(f, c, dims)?;
            write!(f, ")")
        }
        Geom::LineString(coords) => write_string(f, "LINESTRING", suffix, coords, dims),
        Geom::CircularString(coords) => write_string(f, "CIRCULARSTRING", suffix, coords, dims),
        Geom::Polygon(rings) => {
            write!(f, "POLYGON{suffix}")?;
            write_ring_group(f, rings, dims)
        }
        Geom::CompoundCurve(ch) => write_children(f, "COMPOUNDCURVE", suffix, ch, dims),
        Geom::CurvePolygon(ch) => write_children(f, "CURVEPOLYGON", suffix, ch, dims),
        // the homogeneous Multi kinds render their children untagged, as
        // the WKT grammar expects
        Geom::MultiPoint(ch) => {
            write!(f, "MULTIPOINT{suffix}(")?;
            for (i, child) in ch.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                match child {
                    Geom::Point(c) => write_coord(f, c, dims)?,
                    other => write_geom(f, other, dims)?,
                }
            }
            write!(f, ")")
        }
        Geom::MultiLineString(ch) => {
            write!(f, "MULTILINESTRING{suffix}(")?;
            for (i, child) in ch.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                match child {
                    Geom::LineString(coords) => write_ring(f, coords, dims)?,
                    other => write_geom(f, other, dims)?,
                }
            }
            write!(f, ")")
        }
        Geom::MultiCurve(ch) => write_children(f, "MULTICURVE", suffix, ch, dims),
        Geom::MultiPolygon(ch) => {
            write!(f, "MULTIPOLYGON{suffix}(")?;
            for (i, child) in ch.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                match child {
                    Geom::Polygon(rings) => write_ring_group(f, rings, dims)?,
                    other => write_geom(f, other, dims)?,
                }
            }
            write!(f, ")")
        }
        Geom::MultiSurface(ch) => write_children(f, "MULTISURFACE", suffix, ch, dims),
        Geom::GeometryCollection(ch) => {
            if ch.is_empty() {
                return write!(f, "GEOMETRYCOLLECTION{suffix} EMPTY");
            }
            write!(f, "GEOMETRYCOLLECTION{suffix}(")?;
            for (i, child) in ch.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write_geom(f, child, dims)?;
            }
            write!(f, ")")
        }
    }
}

fn write_string(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    suffix: &str,
    coords: &[Coord],
    dims: Dimensions,
) -> fmt::Result {
    write!(f, "{name}{suffix}")?;
    write_ring(f, coords, dims)
}

fn write_children(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    suffix: &str,
    children: &[Geom],
    dims: Dimensions,
) -> fmt::Result {
    write!(f, "{name}{suffix}(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write_geom(f, child, dims)?;
    }
    write!(f, ")")
}

fn write_ring_group(
    f: &mut fmt::Formatter<'_>,
    rings: &[Vec<Coord>],
    dims: Dimensions,
) -> fmt::Result {
    write!(f, "(")?;
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write_ring(f, ring, dims)?;
    }
    write!(f, ")")
}

fn write_ring(f: &mut fmt::Formatter<'_>, coords: &[Coord], dims: Dimensions) -> fmt::Result {
    write!(f, "(")?;
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            write!(f, ",")?;
        }
        write_coord(f, c, dims)?;
    }
    write!(f, ")")
}

fn write_coord(f: &mut fmt::Formatter<'_>, c: &Coord, dims: Dimensions) -> fmt::Result {
    write!(f, "{} {}", c.x, c.y)?;
    if dims.has_z() {
        write!(f, " {}", c.z)?;
    }
    if dims.has_m() {
        write!(f, " {}", c.m)?;
    }
    Ok(())
}

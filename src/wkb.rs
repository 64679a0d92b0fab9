//! Well-known-binary reader: consumes (E)WKB and drives a [`GeomBuilder`].
//!
//! Both byte orders are accepted, per geometry, from the leading
//! byte-order flag. Dimensionality is taken from the EWKB high bits
//! (`Z`/`M`/`SRID`) or from the ISO 1000-series type codes; an embedded
//! SRID is honored on the outermost geometry only.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::builder::GeomBuilder;
use crate::encode::Encoding;
use crate::error::{GeoserError, Result};
use crate::types::GeometryKind;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

/// Build a blob from (E)WKB bytes.
///
/// An SRID embedded in the stream takes precedence over the `srid`
/// argument.
pub fn from_wkb(bytes: &[u8], srid: Option<i32>, encoding: Encoding, shrink: bool) -> Result<Vec<u8>> {
    let mut builder = GeomBuilder::with_options(encoding, shrink);
    let mut cursor = Cursor { buf: bytes, pos: 0 };
    let embedded = read_geometry(&mut cursor, &mut builder, true, false)?;
    builder.set_srid(embedded.or(srid));
    if cursor.pos != bytes.len() {
        return Err(GeoserError::InvalidWkb("trailing bytes after geometry"));
    }
    builder.finish()
}

/// Build a blob from hex-encoded (E)WKB, the usual text transport form.
///
/// # Example
///
/// ```
/// use geoser::{from_wkb_hex, parse_blob_standard, Coord, Geom};
///
/// // POINT(1 2), little-endian
/// let hex = "0101000000000000000000F03F0000000000000040";
/// let blob = from_wkb_hex(hex, None, geoser::Encoding::Standard, false).unwrap();
/// let geometry = parse_blob_standard(&blob).unwrap();
/// assert_eq!(geometry.geom, Geom::Point(Coord::xy(1.0, 2.0)));
/// ```
pub fn from_wkb_hex(hex: &str, srid: Option<i32>, encoding: Encoding, shrink: bool) -> Result<Vec<u8>> {
    from_wkb(&decode_hex(hex)?, srid, encoding, shrink)
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return Err(GeoserError::InvalidWkb("odd-length hex input"));
    }
    let digit = |b: u8| -> Result<u8> {
        match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'a'..=b'f' => Ok(b - b'a' + 10),
            b'A'..=b'F' => Ok(b - b'A' + 10),
            _ => Err(GeoserError::InvalidWkb("invalid hex digit")),
        }
    };
    hex.as_bytes()
        .chunks_exact(2)
        .map(|pair| Ok(digit(pair[0])? << 4 | digit(pair[1])?))
        .collect()
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(GeoserError::InvalidWkb("unexpected end of input"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self, be: bool) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(if be {
            BigEndian::read_u32(bytes)
        } else {
            LittleEndian::read_u32(bytes)
        })
    }

    fn read_i32(&mut self, be: bool) -> Result<i32> {
        Ok(self.read_u32(be)? as i32)
    }

    fn read_f64(&mut self, be: bool) -> Result<f64> {
        let bytes = self.take(8)?;
        Ok(if be {
            BigEndian::read_f64(bytes)
        } else {
            LittleEndian::read_f64(bytes)
        })
    }
}

/// WKB type codes (the low digits, after any 1000-series dims offset).
fn wkb_kind(code: u32) -> Result<GeometryKind> {
    Ok(match code {
        1 => GeometryKind::Point,
        2 => GeometryKind::LineString,
        3 => GeometryKind::Polygon,
        4 => GeometryKind::MultiPoint,
        5 => GeometryKind::MultiLineString,
        6 => GeometryKind::MultiPolygon,
        7 => GeometryKind::GeometryCollection,
        8 => GeometryKind::CircularString,
        9 => GeometryKind::CompoundCurve,
        10 => GeometryKind::CurvePolygon,
        11 => GeometryKind::MultiCurve,
        12 => GeometryKind::MultiSurface,
        _ => return Err(GeoserError::InvalidWkb("unsupported geometry type code")),
    })
}

/// One geometry, recursively. Returns the embedded SRID, if any.
///
/// `must_close` marks line/arc geometries standing as curve-polygon
/// boundaries, which have to end where they start.
fn read_geometry(
    cursor: &mut Cursor<'_>,
    builder: &mut GeomBuilder,
    outermost: bool,
    must_close: bool,
) -> Result<Option<i32>> {
    let be = match cursor.read_u8()? {
        0 => true,
        1 => false,
        _ => return Err(GeoserError::InvalidWkb("bad byte-order flag")),
    };
    let raw = cursor.read_u32(be)?;

    let mut has_z = raw & EWKB_Z != 0;
    let mut has_m = raw & EWKB_M != 0;
    let has_srid = raw & EWKB_SRID != 0;
    let mut code = raw & 0x0FFF_FFFF;
    // ISO encodes dimensionality as a thousands offset instead of flags
    match code / 1000 {
        0 => {}
        1 => has_z = true,
        2 => has_m = true,
        3 => {
            has_z = true;
            has_m = true;
        }
        _ => return Err(GeoserError::InvalidWkb("unsupported geometry type code")),
    }
    code %= 1000;
    let kind = wkb_kind(code)?;

    let srid = if has_srid {
        if !outermost {
            return Err(GeoserError::InvalidWkb("SRID on a nested geometry"));
        }
        Some(cursor.read_i32(be)?)
    } else {
        None
    };

    if has_z || has_m {
        builder.set_dimensions(has_z, has_m)?;
    }
    let ndims = 2 + usize::from(has_z) + usize::from(has_m);

    if must_close
        && matches!(
            kind,
            GeometryKind::LineString | GeometryKind::CircularString | GeometryKind::CompoundCurve
        )
    {
        builder.open_closed(kind)?;
    } else {
        builder.open(kind)?;
    }

    match kind {
        GeometryKind::Point => {
            read_coordinate(cursor, builder, be, ndims)?;
        }
        GeometryKind::LineString | GeometryKind::CircularString => {
            let n = cursor.read_u32(be)?;
            for _ in 0..n {
                read_coordinate(cursor, builder, be, ndims)?;
            }
        }
        GeometryKind::Polygon => {
            let nrings = cursor.read_u32(be)?;
            for _ in 0..nrings {
                builder.open_ring()?;
                let npoints = cursor.read_u32(be)?;
                for _ in 0..npoints {
                    read_coordinate(cursor, builder, be, ndims)?;
                }
                builder.close()?;
            }
        }
        container => {
            let n = cursor.read_u32(be)?;
            let close_children = container == GeometryKind::CurvePolygon;
            for _ in 0..n {
                read_geometry(cursor, builder, false, close_children)?;
            }
        }
    }
    builder.close()?;
    Ok(srid)
}

fn read_coordinate(
    cursor: &mut Cursor<'_>,
    builder: &mut GeomBuilder,
    be: bool,
    ndims: usize,
) -> Result<()> {
    let mut vals = [0.0f64; 4];
    for v in vals.iter_mut().take(ndims) {
        *v = cursor.read_f64(be)?;
    }
    match ndims {
        2 => builder.coord2(vals[0], vals[1]),
        // the declared layout decides whether the third ordinate is Z or M
        3 => builder.coord3(vals[0], vals[1], vals[2]),
        _ => builder.coord4(vals[0], vals[1], vals[2], vals[3]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{parse_blob_standard, Coord, Geom};
    use crate::types::Dimensions;

    fn le_header(code: u32) -> Vec<u8> {
        let mut out = vec![1u8];
        out.extend_from_slice(&code.to_le_bytes());
        out
    }

    fn le_f64s(vals: &[f64]) -> Vec<u8> {
        vals.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn le_point(x: f64, y: f64) -> Vec<u8> {
        let mut out = le_header(1);
        out.extend(le_f64s(&[x, y]));
        out
    }

    #[test]
    fn point_little_endian() {
        let blob = from_wkb(&le_point(1.0, 2.0), None, Encoding::Standard, false).unwrap();
        let g = parse_blob_standard(&blob).unwrap();
        assert_eq!(g.geom, Geom::Point(Coord::xy(1.0, 2.0)));
        assert_eq!(g.srid, None);
    }

    #[test]
    fn point_big_endian() {
        let mut wkb = vec![0u8];
        wkb.extend_from_slice(&1u32.to_be_bytes());
        wkb.extend_from_slice(&1.0f64.to_be_bytes());
        wkb.extend_from_slice(&2.0f64.to_be_bytes());
        let blob = from_wkb(&wkb, None, Encoding::Standard, false).unwrap();
        assert_eq!(
            parse_blob_standard(&blob).unwrap().geom,
            Geom::Point(Coord::xy(1.0, 2.0))
        );
    }

    #[test]
    fn ewkb_srid_beats_argument() {
        let mut wkb = le_header(1 | EWKB_SRID);
        wkb.extend_from_slice(&4326i32.to_le_bytes());
        wkb.extend(le_f64s(&[1.0, 2.0]));
        let blob = from_wkb(&wkb, Some(999), Encoding::Standard, false).unwrap();
        assert_eq!(parse_blob_standard(&blob).unwrap().srid, Some(4326));

        let blob = from_wkb(&le_point(1.0, 2.0), Some(999), Encoding::Standard, false).unwrap();
        assert_eq!(parse_blob_standard(&blob).unwrap().srid, Some(999));
    }

    #[test]
    fn ewkb_z_flag() {
        let mut wkb = le_header(1 | EWKB_Z);
        wkb.extend(le_f64s(&[1.0, 2.0, 3.0]));
        let g = parse_blob_standard(&from_wkb(&wkb, None, Encoding::Standard, false).unwrap())
            .unwrap();
        assert_eq!(g.dims, Dimensions::Xyz);
        assert_eq!(g.geom, Geom::Point(Coord::xyz(1.0, 2.0, 3.0)));
    }

    #[test]
    fn iso_thousands_codes() {
        // 1001 = Point Z
        let mut wkb = le_header(1001);
        wkb.extend(le_f64s(&[1.0, 2.0, 3.0]));
        let g = parse_blob_standard(&from_wkb(&wkb, None, Encoding::Standard, false).unwrap())
            .unwrap();
        assert_eq!(g.dims, Dimensions::Xyz);

        // 2002 = LineString M
        let mut wkb = le_header(2002);
        wkb.extend_from_slice(&2u32.to_le_bytes());
        wkb.extend(le_f64s(&[1.0, 2.0, 7.0, 3.0, 4.0, 8.0]));
        let g = parse_blob_standard(&from_wkb(&wkb, None, Encoding::Standard, false).unwrap())
            .unwrap();
        assert_eq!(g.dims, Dimensions::Xym);
        assert_eq!(
            g.geom,
            Geom::LineString(vec![Coord::xym(1.0, 2.0, 7.0), Coord::xym(3.0, 4.0, 8.0)])
        );
    }

    #[test]
    fn polygon_rings() {
        let mut wkb = le_header(3);
        wkb.extend_from_slice(&1u32.to_le_bytes());
        wkb.extend_from_slice(&4u32.to_le_bytes());
        wkb.extend(le_f64s(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0]));
        let g = parse_blob_standard(&from_wkb(&wkb, None, Encoding::Standard, false).unwrap())
            .unwrap();
        assert!(matches!(g.geom, Geom::Polygon(ref rings) if rings[0].len() == 4));
    }

    #[test]
    fn multipoint_children_have_own_headers() {
        let mut wkb = le_header(4);
        wkb.extend_from_slice(&2u32.to_le_bytes());
        wkb.extend(le_point(1.0, 1.0));
        wkb.extend(le_point(2.0, 2.0));
        let g = parse_blob_standard(&from_wkb(&wkb, None, Encoding::Standard, false).unwrap())
            .unwrap();
        assert_eq!(
            g.geom,
            Geom::MultiPoint(vec![
                Geom::Point(Coord::xy(1.0, 1.0)),
                Geom::Point(Coord::xy(2.0, 2.0)),
            ])
        );
    }

    #[test]
    fn curvepolygon_boundary_must_close() {
        let mut wkb = le_header(10);
        wkb.extend_from_slice(&1u32.to_le_bytes());
        wkb.extend(le_header(2));
        wkb.extend_from_slice(&3u32.to_le_bytes());
        wkb.extend(le_f64s(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0])); // open
        assert_eq!(
            from_wkb(&wkb, None, Encoding::Standard, false).unwrap_err(),
            GeoserError::UnclosedRing
        );
    }

    #[test]
    fn compound_boundary_must_close_as_a_whole() {
        let curvepoly = |last: f64| {
            let mut wkb = le_header(10);
            wkb.extend_from_slice(&1u32.to_le_bytes());
            wkb.extend(le_header(9)); // compound curve boundary
            wkb.extend_from_slice(&1u32.to_le_bytes());
            wkb.extend(le_header(2));
            wkb.extend_from_slice(&3u32.to_le_bytes());
            wkb.extend(le_f64s(&[0.0, 0.0, 1.0, 1.0, last, last]));
            wkb
        };
        assert!(from_wkb(&curvepoly(0.0), None, Encoding::Standard, false).is_ok());
        assert_eq!(
            from_wkb(&curvepoly(5.0), None, Encoding::Standard, false).unwrap_err(),
            GeoserError::UnclosedRing
        );
    }

    #[test]
    fn hex_transport() {
        let hex = "0101000000000000000000F03F0000000000000040";
        let blob = from_wkb_hex(hex, None, Encoding::Standard, false).unwrap();
        assert_eq!(
            parse_blob_standard(&blob).unwrap().geom,
            Geom::Point(Coord::xy(1.0, 2.0))
        );
        // lowercase works too
        assert!(from_wkb_hex(&hex.to_lowercase(), None, Encoding::Standard, false).is_ok());
    }

    #[test]
    fn malformed_inputs_rejected() {
        assert_eq!(
            from_wkb(&[], None, Encoding::Standard, false).unwrap_err(),
            GeoserError::InvalidWkb("unexpected end of input")
        );
        assert_eq!(
            from_wkb(&[7], None, Encoding::Standard, false).unwrap_err(),
            GeoserError::InvalidWkb("bad byte-order flag")
        );

        let mut wkb = le_header(99);
        wkb.extend(le_f64s(&[1.0, 2.0]));
        assert_eq!(
            from_wkb(&wkb, None, Encoding::Standard, false).unwrap_err(),
            GeoserError::InvalidWkb("unsupported geometry type code")
        );

        let truncated = &le_point(1.0, 2.0)[..10];
        assert_eq!(
            from_wkb(truncated, None, Encoding::Standard, false).unwrap_err(),
            GeoserError::InvalidWkb("unexpected end of input")
        );

        let mut trailing = le_point(1.0, 2.0);
        trailing.push(0);
        assert_eq!(
            from_wkb(&trailing, None, Encoding::Standard, false).unwrap_err(),
            GeoserError::InvalidWkb("trailing bytes after geometry")
        );

        assert_eq!(
            decode_hex("abc").unwrap_err(),
            GeoserError::InvalidWkb("odd-length hex input")
        );
        assert_eq!(
            decode_hex("zz").unwrap_err(),
            GeoserError::InvalidWkb("invalid hex digit")
        );
    }

    #[test]
    fn nested_srid_rejected() {
        let mut wkb = le_header(4);
        wkb.extend_from_slice(&1u32.to_le_bytes());
        let mut child = le_header(1 | EWKB_SRID);
        child.extend_from_slice(&4326i32.to_le_bytes());
        child.extend(le_f64s(&[1.0, 1.0]));
        wkb.extend(child);
        assert_eq!(
            from_wkb(&wkb, None, Encoding::Standard, false).unwrap_err(),
            GeoserError::InvalidWkb("SRID on a nested geometry")
        );
    }
}

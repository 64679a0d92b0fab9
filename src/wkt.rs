//! Well-known-text reader: a recursive-descent pass over (E)WKT that
//! drives a [`GeomBuilder`] token by token.
//!
//! Accepts the `SRID=n;` EWKT prefix, glued dimensionality suffixes
//! (`POINTM`) as well as separate `Z`/`M`/`ZM` words, `EMPTY` bodies,
//! and the curve kinds (`CIRCULARSTRING`, `COMPOUNDCURVE`,
//! `CURVEPOLYGON`, `MULTICURVE`, `MULTISURFACE`). Keywords are
//! case-insensitive.

use crate::builder::GeomBuilder;
use crate::encode::Encoding;
use crate::error::{GeoserError, Result};
use crate::types::GeometryKind;

/// Build a blob from WKT/EWKT in canonical standard mode.
///
/// # Example
///
/// ```
/// use geoser::{from_wkt_default, parse_blob_standard};
///
/// let blob = from_wkt_default("SRID=4326;LINESTRING(0 0, 1 1, 2 2)").unwrap();
/// let geometry = parse_blob_standard(&blob).unwrap();
/// assert_eq!(geometry.srid, Some(4326));
/// ```
pub fn from_wkt_default(wkt: &str) -> Result<Vec<u8>> {
    from_wkt(wkt, None, Encoding::Standard, false)
}

/// Build a blob from WKT/EWKT with explicit options.
///
/// An `SRID=n;` prefix embedded in the text takes precedence over the
/// `srid` argument.
pub fn from_wkt(wkt: &str, srid: Option<i32>, encoding: Encoding, shrink: bool) -> Result<Vec<u8>> {
    let mut parser = Parser { src: wkt, pos: 0 };
    let mut builder = GeomBuilder::with_options(encoding, shrink);

    let embedded = parser.srid_prefix()?;
    builder.set_srid(embedded.or(srid));

    parser.geometry(&mut builder)?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("trailing characters after geometry"));
    }
    builder.finish()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, msg: &str) -> GeoserError {
        GeoserError::InvalidWkt(format!("{msg} at offset {}", self.pos))
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while self
            .rest()
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.rest().bytes().next()
    }

    fn expect(&mut self, ch: u8) -> Result<()> {
        if self.peek() == Some(ch) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", ch as char)))
        }
    }

    fn eat(&mut self, ch: u8) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a run of letters; empty at non-letter input.
    fn word(&mut self) -> &'a str {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
        self.pos += len;
        &rest[..len]
    }

    /// Consume the given word if it is next, case-insensitively.
    fn eat_word(&mut self, expected: &str) -> bool {
        let save = self.pos;
        if self.word().eq_ignore_ascii_case(expected) {
            true
        } else {
            self.pos = save;
            false
        }
    }

    fn number(&mut self) -> Result<f64> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .bytes()
            .take_while(|b| matches!(b, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E'))
            .count();
        let text = &rest[..len];
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error("expected a number"))?;
        self.pos += len;
        Ok(value)
    }

    fn srid_prefix(&mut self) -> Result<Option<i32>> {
        if !self.eat_word("SRID") {
            return Ok(None);
        }
        self.expect(b'=')?;
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .bytes()
            .take_while(|b| b.is_ascii_digit() || *b == b'-' || *b == b'+')
            .count();
        let srid = rest[..len]
            .parse::<i32>()
            .map_err(|_| self.error("invalid SRID value"))?;
        self.pos += len;
        self.expect(b';')?;
        Ok(Some(srid))
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn geometry(&mut self, b: &mut GeomBuilder) -> Result<()> {
        let word = self.word();
        let (kind, glued_m) = keyword(word).ok_or_else(|| {
            GeoserError::InvalidWkt(format!("unknown geometry keyword '{word}'"))
        })?;
        if glued_m {
            b.set_dimensions(false, true)?;
        } else if self.eat_word("ZM") {
            b.set_dimensions(true, true)?;
        } else if self.eat_word("Z") {
            b.set_dimensions(true, false)?;
        } else if self.eat_word("M") {
            b.set_dimensions(false, true)?;
        }
        self.body(b, kind)
    }

    fn body(&mut self, b: &mut GeomBuilder, kind: GeometryKind) -> Result<()> {
        b.open(kind)?;
        if self.eat_word("EMPTY") {
            b.mark_empty()?;
            return b.close();
        }
        self.expect(b'(')?;
        match kind {
            GeometryKind::Point => self.coordinate(b)?,
            GeometryKind::LineString | GeometryKind::CircularString => self.coordinates(b)?,
            GeometryKind::Polygon => self.rings(b)?,
            GeometryKind::CompoundCurve => self.list(b, Self::compound_component)?,
            GeometryKind::CurvePolygon => self.list(b, Self::boundary_component)?,
            GeometryKind::MultiPoint => self.list(b, Self::point_item)?,
            GeometryKind::MultiLineString => self.list(b, Self::linestring_item)?,
            GeometryKind::MultiCurve => self.list(b, Self::curve_item)?,
            GeometryKind::MultiPolygon => self.list(b, Self::polygon_item)?,
            GeometryKind::MultiSurface => self.list(b, Self::surface_item)?,
            GeometryKind::GeometryCollection => self.list(b, Self::geometry)?,
        }
        self.expect(b')')?;
        b.close()
    }

    fn list(
        &mut self,
        b: &mut GeomBuilder,
        mut item: impl FnMut(&mut Self, &mut GeomBuilder) -> Result<()>,
    ) -> Result<()> {
        loop {
            item(self, b)?;
            if !self.eat(b',') {
                return Ok(());
            }
        }
    }

    /// One coordinate tuple: two to four numbers.
    fn coordinate(&mut self, b: &mut GeomBuilder) -> Result<()> {
        let x = self.number()?;
        let y = self.number()?;
        if !self.starts_number() {
            return b.coord2(x, y);
        }
        let third = self.number()?;
        if !self.starts_number() {
            return b.coord3(x, y, third);
        }
        let fourth = self.number()?;
        b.coord4(x, y, third, fourth)
    }

    fn starts_number(&mut self) -> bool {
        matches!(self.peek(), Some(b'0'..=b'9' | b'+' | b'-' | b'.'))
    }

    fn coordinates(&mut self, b: &mut GeomBuilder) -> Result<()> {
        loop {
            self.coordinate(b)?;
            if !self.eat(b',') {
                return Ok(());
            }
        }
    }

    fn rings(&mut self, b: &mut GeomBuilder) -> Result<()> {
        loop {
            b.open_ring()?;
            self.expect(b'(')?;
            self.coordinates(b)?;
            self.expect(b')')?;
            b.close()?;
            if !self.eat(b',') {
                return Ok(());
            }
        }
    }

    /// CompoundCurve component: a tagged arc/line, or a bare coordinate
    /// list standing for a LineString.
    fn compound_component(&mut self, b: &mut GeomBuilder) -> Result<()> {
        self.tagged_curve(b, false)
    }

    /// CurvePolygon boundary: like a compound component, but simple
    /// components must close on themselves.
    fn boundary_component(&mut self, b: &mut GeomBuilder) -> Result<()> {
        self.tagged_curve(b, true)
    }

    fn tagged_curve(&mut self, b: &mut GeomBuilder, closed: bool) -> Result<()> {
        let open = |b: &mut GeomBuilder, kind| {
            if closed {
                b.open_closed(kind)
            } else {
                b.open(kind)
            }
        };
        if self.peek() == Some(b'(') {
            self.pos += 1;
            open(b, GeometryKind::LineString)?;
            self.coordinates(b)?;
            self.expect(b')')?;
            return b.close();
        }
        if self.eat_word("CIRCULARSTRING") {
            open(b, GeometryKind::CircularString)?;
            self.expect(b'(')?;
            self.coordinates(b)?;
            self.expect(b')')?;
            return b.close();
        }
        if self.eat_word("LINESTRING") {
            open(b, GeometryKind::LineString)?;
            self.expect(b'(')?;
            self.coordinates(b)?;
            self.expect(b')')?;
            return b.close();
        }
        if self.eat_word("COMPOUNDCURVE") {
            open(b, GeometryKind::CompoundCurve)?;
            if self.eat_word("EMPTY") {
                b.mark_empty()?;
                return b.close();
            }
            self.expect(b'(')?;
            self.list(b, Self::compound_component)?;
            self.expect(b')')?;
            return b.close();
        }
        Err(self.error("expected a curve component"))
    }

    /// MultiPoint item: `(x y)` or the bare `x y` form.
    fn point_item(&mut self, b: &mut GeomBuilder) -> Result<()> {
        b.open(GeometryKind::Point)?;
        if self.eat(b'(') {
            self.coordinate(b)?;
            self.expect(b')')?;
        } else {
            self.coordinate(b)?;
        }
        b.close()
    }

    fn linestring_item(&mut self, b: &mut GeomBuilder) -> Result<()> {
        b.open(GeometryKind::LineString)?;
        self.expect(b'(')?;
        self.coordinates(b)?;
        self.expect(b')')?;
        b.close()
    }

    fn curve_item(&mut self, b: &mut GeomBuilder) -> Result<()> {
        self.tagged_curve(b, false)
    }

    fn polygon_item(&mut self, b: &mut GeomBuilder) -> Result<()> {
        b.open(GeometryKind::Polygon)?;
        self.expect(b'(')?;
        self.rings(b)?;
        self.expect(b')')?;
        b.close()
    }

    /// MultiSurface member: a bare polygon body, or a tagged POLYGON or
    /// CURVEPOLYGON.
    fn surface_item(&mut self, b: &mut GeomBuilder) -> Result<()> {
        if self.peek() == Some(b'(') {
            self.pos += 1;
            b.open(GeometryKind::Polygon)?;
            self.rings(b)?;
            self.expect(b')')?;
            return b.close();
        }
        if self.eat_word("POLYGON") {
            return self.body(b, GeometryKind::Polygon);
        }
        if self.eat_word("CURVEPOLYGON") {
            return self.body(b, GeometryKind::CurvePolygon);
        }
        Err(self.error("expected a surface member"))
    }
}

/// Resolve a geometry keyword, allowing a glued `M` suffix (`POINTM`).
fn keyword(word: &str) -> Option<(GeometryKind, bool)> {
    if let Some(kind) = plain_keyword(word) {
        return Some((kind, false));
    }
    let stripped = word
        .strip_suffix('M')
        .or_else(|| word.strip_suffix('m'))?;
    plain_keyword(stripped).map(|kind| (kind, true))
}

fn plain_keyword(word: &str) -> Option<GeometryKind> {
    const TABLE: [(&str, GeometryKind); 12] = [
        ("POINT", GeometryKind::Point),
        ("LINESTRING", GeometryKind::LineString),
        ("CIRCULARSTRING", GeometryKind::CircularString),
        ("POLYGON", GeometryKind::Polygon),
        ("COMPOUNDCURVE", GeometryKind::CompoundCurve),
        ("CURVEPOLYGON", GeometryKind::CurvePolygon),
        ("MULTIPOINT", GeometryKind::MultiPoint),
        ("MULTILINESTRING", GeometryKind::MultiLineString),
        ("MULTICURVE", GeometryKind::MultiCurve),
        ("MULTIPOLYGON", GeometryKind::MultiPolygon),
        ("MULTISURFACE", GeometryKind::MultiSurface),
        ("GEOMETRYCOLLECTION", GeometryKind::GeometryCollection),
    ];
    TABLE
        .iter()
        .find(|(name, _)| word.eq_ignore_ascii_case(name))
        .map(|&(_, kind)| kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{parse_blob_standard, Coord, Geom};
    use crate::types::{Dimensions, HEADER_M_FLAG, HEADER_Z_FLAG};

    fn parsed(wkt: &str) -> Geom {
        parse_blob_standard(&from_wkt_default(wkt).unwrap())
            .unwrap()
            .geom
    }

    #[test]
    fn point() {
        assert_eq!(parsed("POINT(1 2)"), Geom::Point(Coord::xy(1.0, 2.0)));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(parsed("point(1 2)"), parsed("PoInT(1 2)"));
    }

    #[test]
    fn scientific_notation_and_signs() {
        assert_eq!(
            parsed("POINT(-1.5e2 +0.25)"),
            Geom::Point(Coord::xy(-150.0, 0.25))
        );
    }

    #[test]
    fn srid_prefix_beats_argument() {
        let blob = from_wkt("SRID=4326;POINT(1 2)", Some(999), Encoding::Standard, false).unwrap();
        assert_eq!(parse_blob_standard(&blob).unwrap().srid, Some(4326));

        let blob = from_wkt("POINT(1 2)", Some(999), Encoding::Standard, false).unwrap();
        assert_eq!(parse_blob_standard(&blob).unwrap().srid, Some(999));
    }

    #[test]
    fn dimensionality_words() {
        let g = parse_blob_standard(&from_wkt_default("POINT Z (1 2 3)").unwrap()).unwrap();
        assert_eq!(g.dims, Dimensions::Xyz);

        let g = parse_blob_standard(&from_wkt_default("POINT ZM (1 2 3 4)").unwrap()).unwrap();
        assert_eq!(g.dims, Dimensions::Xyzm);

        // glued and separated M are equivalent
        let glued = from_wkt_default("POINTM(1 2 3)").unwrap();
        let spaced = from_wkt_default("POINT M (1 2 3)").unwrap();
        assert_eq!(glued, spaced);
        assert_eq!(glued[4] & HEADER_M_FLAG, HEADER_M_FLAG);
        assert_eq!(glued[4] & HEADER_Z_FLAG, 0);
    }

    #[test]
    fn bare_three_ordinates_mean_z() {
        let g = parse_blob_standard(&from_wkt_default("POINT(1 2 3)").unwrap()).unwrap();
        assert_eq!(g.dims, Dimensions::Xyz);
        assert_eq!(g.geom, Geom::Point(Coord::xyz(1.0, 2.0, 3.0)));
    }

    #[test]
    fn empty_geometry() {
        let blob = from_wkt_default("GEOMETRYCOLLECTION EMPTY").unwrap();
        assert_eq!(blob.len(), 9);
        assert_eq!(parsed("POINT EMPTY"), Geom::GeometryCollection(vec![]));
    }

    #[test]
    fn polygon_with_hole() {
        let g = parsed("POLYGON((0 0,10 0,10 10,0 10,0 0),(2 2,4 2,4 4,2 2))");
        match g {
            Geom::Polygon(rings) => {
                assert_eq!(rings.len(), 2);
                assert_eq!(rings[0].len(), 5);
                assert_eq!(rings[1].len(), 4);
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_polygon_ring_rejected() {
        let err = from_wkt_default("POLYGON((0 0,1 0,1 1))").unwrap_err();
        assert_eq!(err, GeoserError::UnclosedRing);
    }

    #[test]
    fn multipoint_both_syntaxes() {
        let bare = parsed("MULTIPOINT(1 1,2 2)");
        let wrapped = parsed("MULTIPOINT((1 1),(2 2))");
        assert_eq!(bare, wrapped);
        assert_eq!(
            bare,
            Geom::MultiPoint(vec![
                Geom::Point(Coord::xy(1.0, 1.0)),
                Geom::Point(Coord::xy(2.0, 2.0)),
            ])
        );
    }

    #[test]
    fn multilinestring() {
        let g = parsed("MULTILINESTRING((0 0,1 1),(2 2,3 3))");
        assert_eq!(
            g,
            Geom::MultiLineString(vec![
                Geom::LineString(vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0)]),
                Geom::LineString(vec![Coord::xy(2.0, 2.0), Coord::xy(3.0, 3.0)]),
            ])
        );
    }

    #[test]
    fn multipolygon() {
        let g = parsed("MULTIPOLYGON(((0 0,1 0,1 1,0 0)),((5 5,6 5,6 6,5 5)))");
        match g {
            Geom::MultiPolygon(polys) => assert_eq!(polys.len(), 2),
            other => panic!("expected multipolygon, got {other:?}"),
        }
    }

    #[test]
    fn circularstring_parity_enforced() {
        assert!(from_wkt_default("CIRCULARSTRING(0 0,1 1,2 0)").is_ok());
        let err = from_wkt_default("CIRCULARSTRING(0 0,1 1,2 0,3 1)").unwrap_err();
        assert!(matches!(err, GeoserError::EvenPointCount { got: 4, .. }));
    }

    #[test]
    fn compoundcurve_components() {
        let g = parsed("COMPOUNDCURVE(CIRCULARSTRING(0 0,1 1,2 0),(2 0,4 0))");
        assert_eq!(
            g,
            Geom::CompoundCurve(vec![
                Geom::CircularString(vec![
                    Coord::xy(0.0, 0.0),
                    Coord::xy(1.0, 1.0),
                    Coord::xy(2.0, 0.0),
                ]),
                Geom::LineString(vec![Coord::xy(2.0, 0.0), Coord::xy(4.0, 0.0)]),
            ])
        );
    }

    #[test]
    fn curvepolygon_boundaries_must_close() {
        assert!(from_wkt_default("CURVEPOLYGON(CIRCULARSTRING(0 0,2 2,4 0,2 -2,0 0))").is_ok());
        assert!(from_wkt_default("CURVEPOLYGON((0 0,4 0,4 4,0 0))").is_ok());
        assert_eq!(
            from_wkt_default("CURVEPOLYGON((0 0,4 0,4 4))").unwrap_err(),
            GeoserError::UnclosedRing
        );
    }

    #[test]
    fn compound_boundary_must_close_as_a_whole() {
        assert!(from_wkt_default(
            "CURVEPOLYGON(COMPOUNDCURVE(CIRCULARSTRING(0 0,1 1,2 0),(2 0,0 0)))"
        )
        .is_ok());
        // the boundary starts at (0,0) and ends at (5,5)
        assert_eq!(
            from_wkt_default("CURVEPOLYGON(COMPOUNDCURVE(CIRCULARSTRING(0 0,1 1,2 0),(2 0,5 5)))")
                .unwrap_err(),
            GeoserError::UnclosedRing
        );
    }

    #[test]
    fn multicurve_and_multisurface() {
        let g = parsed("MULTICURVE((0 0,1 1),CIRCULARSTRING(0 0,1 1,2 0))");
        assert!(matches!(g, Geom::MultiCurve(ref ch) if ch.len() == 2));

        let g = parsed("MULTISURFACE(((0 0,1 0,1 1,0 0)),CURVEPOLYGON((0 0,2 0,2 2,0 0)))");
        assert!(matches!(g, Geom::MultiSurface(ref ch) if ch.len() == 2));
    }

    #[test]
    fn nested_collection() {
        let g = parsed("GEOMETRYCOLLECTION(POINT(1 1),GEOMETRYCOLLECTION(LINESTRING(0 0,1 1)))");
        match g {
            Geom::GeometryCollection(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Geom::GeometryCollection(ref inner)
                    if inner.len() == 1));
            }
            other => panic!("expected collection, got {other:?}"),
        }
    }

    #[test]
    fn mixed_dimensions_rejected() {
        let err = from_wkt_default("LINESTRING(1 2,3 4 5)").unwrap_err();
        assert_eq!(err, GeoserError::MixedDimensions);
    }

    #[test]
    fn malformed_inputs_rejected() {
        for bad in [
            "",
            "BOGUS(1 2)",
            "POINT(1)",
            "POINT(1 2",
            "POINT(1 2) extra",
            "POINT 1 2",
            "SRID=abc;POINT(1 2)",
            "LINESTRING(1 2,)",
        ] {
            assert!(from_wkt_default(bad).is_err(), "{bad:?} should fail");
        }
    }

    #[test]
    fn whitespace_is_flexible() {
        assert_eq!(
            parsed("  LINESTRING ( 0  0 , 1\t1 ,\n2 2 )  "),
            parsed("LINESTRING(0 0,1 1,2 2)")
        );
    }
}

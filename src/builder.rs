//! Streaming construction of serialized geometry blobs.
//!
//! A [`GeomBuilder`] is a per-build context driven by a token source (the
//! WKT/WKB readers, or any caller): open a container, add coordinates or
//! child containers, close it. Every operation appends pending write
//! actions to the node pool; nothing touches the output buffer until
//! [`GeomBuilder::finish`] runs the single emission walk. Structural
//! invariants — minimum point counts, ring closure, circular-arc parity,
//! dimensional homogeneity — are enforced as containers close, never
//! patched up after the fact.
//!
//! The first failing operation latches its error: later operations become
//! no-ops and `finish` re-reports the same error, so a failed build yields
//! exactly one error and no partial output.

use crate::emit::{self, BuildMeta};
use crate::encode::Encoding;
use crate::error::{GeoserError, Result};
use crate::node::{Node, NodeId, NodePool};
use crate::types::{Dimensions, GeometryKind};

/// Structural rules checked when a frame closes.
#[derive(Debug, Clone, Copy, Default)]
struct Rules {
    min_points: u32,
    check_closed: bool,
    odd_points: bool,
}

impl Rules {
    fn for_kind(kind: GeometryKind) -> Self {
        Rules {
            min_points: kind.min_points(),
            check_closed: false,
            odd_points: kind.odd_points(),
        }
    }

    fn for_ring() -> Self {
        Rules {
            min_points: 3,
            check_closed: true,
            odd_points: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameFlavor {
    /// A geometry container with a header byte.
    Geometry(GeometryKind),
    /// A bare polygon ring: count field only, no header byte.
    Ring,
    /// A container rewritten by the empty override; closes unchecked.
    EmptyTerminal,
}

impl FrameFlavor {
    fn name(self) -> &'static str {
        match self {
            FrameFlavor::Geometry(kind) => kind.name(),
            FrameFlavor::Ring => "polygon ring",
            FrameFlavor::EmptyTerminal => "empty geometry",
        }
    }
}

/// One currently-open container.
#[derive(Debug)]
struct Frame {
    flavor: FrameFlavor,
    /// Header node; `None` for bare rings.
    header: Option<NodeId>,
    /// Deferred count node patched at close; `None` for points.
    count_node: Option<NodeId>,
    /// Immediate children/points only, never grandchildren.
    count: u32,
    /// Byte-size estimate at the moment the header landed, for the
    /// empty-geometry rollback.
    size_at_open: usize,
    rules: Rules,
    first: Option<[f64; 4]>,
    last: Option<[f64; 4]>,
}

/// Per-build context: node pool, builder stack, established dimensionality,
/// and pending SRID. Each build owns an independent instance; there is no
/// shared mutable state, so concurrent builds cannot corrupt each other.
///
/// # Example
///
/// ```
/// use geoser::{Encoding, GeomBuilder, GeometryKind};
///
/// let mut b = GeomBuilder::new(Encoding::Standard);
/// b.set_srid(Some(4326));
/// b.open(GeometryKind::LineString).unwrap();
/// b.coord2(0.0, 0.0).unwrap();
/// b.coord2(1.0, 1.0).unwrap();
/// b.close().unwrap();
/// let blob = b.finish().unwrap();
/// // size(4) + header(1) + srid(4) + count(4) + 2 coords(32)
/// assert_eq!(blob.len(), 45);
/// ```
#[derive(Debug)]
pub struct GeomBuilder {
    pool: NodePool,
    stack: Vec<Frame>,
    dims: Option<Dimensions>,
    srid: Option<i32>,
    encoding: Encoding,
    shrink: bool,
    /// Running upper bound on the output size (shrink savings excluded).
    est_size: usize,
    opened_any: bool,
    failed: Option<GeoserError>,
}

impl Default for GeomBuilder {
    fn default() -> Self {
        Self::new(Encoding::Standard)
    }
}

impl GeomBuilder {
    pub fn new(encoding: Encoding) -> Self {
        Self::with_options(encoding, false)
    }

    /// Create a builder with the count-shrink option. Shrink applies in
    /// standard mode only and is ignored for compact builds.
    pub fn with_options(encoding: Encoding, shrink: bool) -> Self {
        let mut builder = GeomBuilder {
            pool: NodePool::new(),
            stack: Vec::new(),
            dims: None,
            srid: None,
            encoding,
            shrink: shrink && encoding == Encoding::Standard,
            est_size: 0,
            opened_any: false,
            failed: None,
        };
        builder.reset();
        builder
    }

    /// Clear all per-build state, bulk-recycling the node pool. Must be
    /// called between builds on the same context; calling it twice in a
    /// row is harmless.
    pub fn reset(&mut self) {
        self.pool.reset();
        self.stack.clear();
        self.dims = None;
        self.srid = None;
        self.opened_any = false;
        self.failed = None;
        self.pool.acquire(Node::Size);
        self.est_size = 4;
    }

    /// Set (or clear) the SRID attached once to the outermost geometry.
    pub fn set_srid(&mut self, srid: Option<i32>) {
        self.srid = srid;
    }

    /// Declare dimensionality ahead of the first coordinate (WKT `POINTM`,
    /// WKB Z/M flags). Conflicting declarations abort the build.
    pub fn set_dimensions(&mut self, has_z: bool, has_m: bool) -> Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let declared = Dimensions::from_flags(has_z, has_m);
        let r = match self.dims {
            None => {
                self.dims = Some(declared);
                Ok(())
            }
            Some(d) if d == declared => Ok(()),
            Some(_) => Err(GeoserError::MixedDimensions),
        };
        self.latch(r)
    }

    /// Open a geometry container.
    pub fn open(&mut self, kind: GeometryKind) -> Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let r = self.try_open(kind, Rules::for_kind(kind));
        self.latch(r)
    }

    /// Open a container whose first and last points must coincide: the
    /// closed boundary components of curve polygons. For a CompoundCurve
    /// the check spans its components, first point of the first against
    /// last point of the last.
    pub fn open_closed(&mut self, kind: GeometryKind) -> Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let mut rules = Rules::for_kind(kind);
        rules.check_closed = true;
        let r = self.try_open(kind, rules);
        self.latch(r)
    }

    /// Open a bare polygon ring: a count field with no header byte,
    /// minimum three points, must close.
    pub fn open_ring(&mut self) -> Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let r = self.try_open_ring();
        self.latch(r)
    }

    /// Add a 2-D coordinate.
    pub fn coord2(&mut self, x: f64, y: f64) -> Result<()> {
        self.push_coord([x, y, 0.0, 0.0], 2)
    }

    /// Add a 3-D coordinate. The third ordinate is Z unless the build has
    /// declared or established an XYM layout.
    pub fn coord3(&mut self, x: f64, y: f64, zm: f64) -> Result<()> {
        self.push_coord([x, y, zm, 0.0], 3)
    }

    /// Add a 4-D (XYZM) coordinate.
    pub fn coord4(&mut self, x: f64, y: f64, z: f64, m: f64) -> Result<()> {
        self.push_coord([x, y, z, m], 4)
    }

    /// Validate and close the innermost open container.
    pub fn close(&mut self) -> Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let r = self.try_close();
        self.latch(r)
    }

    /// Empty-geometry override: discard every node created since the
    /// innermost geometry container opened and rewrite it as a zero-child
    /// collection terminal. The container still needs its `close` call.
    pub fn mark_empty(&mut self) -> Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let r = self.try_mark_empty();
        self.latch(r)
    }

    /// Run the emission walk, producing the finished contiguous blob.
    pub fn finish(&mut self) -> Result<Vec<u8>> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if !self.stack.is_empty() {
            let err = GeoserError::UnclosedContainers;
            self.failed = Some(err.clone());
            return Err(err);
        }
        if !self.opened_any {
            return Err(GeoserError::EmptyBuild);
        }
        let meta = BuildMeta {
            dims: self.dims,
            srid: self.srid,
            encoding: self.encoding,
            shrink: self.shrink,
            capacity: self.est_size + if self.srid.is_some() { 4 } else { 0 },
        };
        emit::emit(&self.pool, &meta)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Dimensionality established so far, if any coordinate or declaration
    /// has fixed it.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dims
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn latch<T>(&mut self, r: Result<T>) -> Result<T> {
        if let Err(err) = &r {
            if self.failed.is_none() {
                self.failed = Some(err.clone());
            }
        }
        r
    }

    fn bump_innermost(&mut self) {
        if let Some(frame) = self.stack.last_mut() {
            frame.count += 1;
        }
    }

    fn try_open(&mut self, kind: GeometryKind, rules: Rules) -> Result<()> {
        self.bump_innermost();
        self.est_size += 1;
        let header = self.pool.acquire(Node::Header { kind });
        let size_at_open = self.est_size;
        let count_node = if kind.has_count_field() {
            self.est_size += 4;
            Some(self.pool.acquire(Node::Count { n: 0 }))
        } else {
            None
        };
        self.stack.push(Frame {
            flavor: FrameFlavor::Geometry(kind),
            header: Some(header),
            count_node,
            count: 0,
            size_at_open,
            rules,
            first: None,
            last: None,
        });
        self.opened_any = true;
        Ok(())
    }

    fn try_open_ring(&mut self) -> Result<()> {
        match self.stack.last() {
            Some(Frame {
                flavor: FrameFlavor::Geometry(kind),
                ..
            }) if kind.takes_rings() => {}
            _ => return Err(GeoserError::RingOutsidePolygon),
        }
        self.bump_innermost();
        self.est_size += 4;
        let count_node = self.pool.acquire(Node::Count { n: 0 });
        let size_at_open = self.est_size;
        self.stack.push(Frame {
            flavor: FrameFlavor::Ring,
            header: None,
            count_node: Some(count_node),
            count: 0,
            size_at_open,
            rules: Rules::for_ring(),
            first: None,
            last: None,
        });
        Ok(())
    }

    fn push_coord(&mut self, vals: [f64; 4], arity: u8) -> Result<()> {
        if self.failed.is_some() {
            return Ok(());
        }
        let r = self.try_push_coord(vals, arity);
        self.latch(r)
    }

    fn try_push_coord(&mut self, vals: [f64; 4], arity: u8) -> Result<()> {
        if self.stack.is_empty() {
            return Err(GeoserError::NoOpenContainer("coordinate"));
        }
        // The first coordinate establishes dimensionality for the whole
        // build; three ordinates mean XYZ unless XYM was declared.
        let candidate = match arity {
            2 => Dimensions::Xy,
            3 => match self.dims {
                Some(Dimensions::Xym) => Dimensions::Xym,
                _ => Dimensions::Xyz,
            },
            _ => Dimensions::Xyzm,
        };
        match self.dims {
            None => self.dims = Some(candidate),
            Some(d) if d == candidate => {}
            Some(_) => return Err(GeoserError::MixedDimensions),
        }

        self.est_size += arity as usize * self.encoding.ordinate_size();
        self.pool.acquire(Node::Coord { vals, ndims: arity });

        let frame = self
            .stack
            .last_mut()
            .ok_or(GeoserError::NoOpenContainer("coordinate"))?;
        frame.count += 1;
        if frame.count == 1 {
            frame.first = Some(vals);
        }
        frame.last = Some(vals);
        Ok(())
    }

    fn try_close(&mut self) -> Result<()> {
        let frame = self
            .stack
            .pop()
            .ok_or(GeoserError::NoOpenContainer("close"))?;
        if frame.flavor == FrameFlavor::EmptyTerminal {
            return Ok(());
        }

        if frame.count < frame.rules.min_points {
            return Err(GeoserError::TooFewPoints {
                kind: frame.flavor.name(),
                got: frame.count,
                min: frame.rules.min_points,
            });
        }
        if frame.rules.odd_points && frame.count % 2 == 0 {
            return Err(GeoserError::EvenPointCount {
                kind: frame.flavor.name(),
                got: frame.count,
            });
        }
        if frame.rules.check_closed && !self.ring_is_closed(&frame) {
            return Err(GeoserError::UnclosedRing);
        }
        if self.shrink && frame.count > u32::MAX >> 1 {
            return Err(GeoserError::SizeOverflow);
        }

        if let Some(count_node) = frame.count_node {
            self.pool.set_count(count_node, frame.count);
        }

        // The enclosing frame inherits the closed child's endpoints, so a
        // container standing as a closed boundary (a compound curve ring)
        // is checked across its components as a whole.
        if let Some(parent) = self.stack.last_mut() {
            if parent.first.is_none() {
                parent.first = frame.first;
            }
            if frame.last.is_some() {
                parent.last = frame.last;
            }
        }
        Ok(())
    }

    /// First and last points compared bitwise over the active ordinates.
    /// A mismatch is a hard error, never silently fixed.
    fn ring_is_closed(&self, frame: &Frame) -> bool {
        let ndims = match self.dims {
            Some(d) => d.ndims() as usize,
            None => return true,
        };
        match (frame.first, frame.last) {
            (Some(first), Some(last)) => first[..ndims]
                .iter()
                .zip(&last[..ndims])
                .all(|(a, b)| a.to_bits() == b.to_bits()),
            _ => true,
        }
    }

    fn try_mark_empty(&mut self) -> Result<()> {
        // Bare rings cannot be emptied; find the innermost geometry frame.
        let idx = self
            .stack
            .iter()
            .rposition(|f| f.flavor != FrameFlavor::Ring)
            .ok_or(GeoserError::NoOpenContainer("mark_empty"))?;
        self.stack.truncate(idx + 1);

        let frame = &mut self.stack[idx];
        let header = frame
            .header
            .ok_or(GeoserError::NoOpenContainer("mark_empty"))?;
        self.pool.truncate_after(header);

        if frame.flavor != FrameFlavor::EmptyTerminal {
            // Rewritten as a zero-child collection terminal; the enclosing
            // container's child count is unaffected.
            self.pool.set(
                header,
                Node::HeaderCount {
                    kind: GeometryKind::GeometryCollection,
                    n: 0,
                },
            );
            frame.flavor = FrameFlavor::EmptyTerminal;
            frame.count_node = None;
            frame.rules = Rules::default();
        }
        frame.count = 0;
        frame.first = None;
        frame.last = None;
        self.est_size = frame.size_at_open + 4;
        Ok(())
    }
}

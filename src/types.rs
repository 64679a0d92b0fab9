//! Geometry kinds, coordinate dimensionality, and the header-byte layout.
//!
//! Every container in a serialized blob starts with a single header byte:
//!   bits 0–3 — geometry kind code
//!   bit 4    — M ordinate present
//!   bit 5    — Z ordinate present
//!   bit 6    — SRID follows (set on the outermost header only)

use num_enum::{IntoPrimitive, TryFromPrimitive};

// ── Header-byte flag constants ────────────────────────────────────────────────
pub const HEADER_M_FLAG: u8 = 0x10;
pub const HEADER_Z_FLAG: u8 = 0x20;
pub const HEADER_SRID_FLAG: u8 = 0x40;
pub const HEADER_KIND_MASK: u8 = 0x0F;

/// Geometry kind codes as stored in the low four bits of the header byte.
///
/// Codes 10–12 are reserved: historical streams used them as in-band
/// duplicates of Point/LineString/Polygon for the fixed-point integer
/// encoding, which is now signalled out-of-band (see [`crate::Encoding`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum GeometryKind {
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
    CircularString = 8,
    CompoundCurve = 9,
    CurvePolygon = 13,
    MultiCurve = 14,
    MultiSurface = 15,
}

impl GeometryKind {
    /// Human-readable name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
            GeometryKind::GeometryCollection => "GeometryCollection",
            GeometryKind::CircularString => "CircularString",
            GeometryKind::CompoundCurve => "CompoundCurve",
            GeometryKind::CurvePolygon => "CurvePolygon",
            GeometryKind::MultiCurve => "MultiCurve",
            GeometryKind::MultiSurface => "MultiSurface",
        }
    }

    /// Minimum direct point count enforced when the container closes.
    ///
    /// Container-only kinds hold child geometries or rings instead of
    /// points and have no direct minimum; polygon rings carry their own
    /// minimum of three.
    pub fn min_points(self) -> u32 {
        match self {
            GeometryKind::Point => 1,
            GeometryKind::LineString => 2,
            GeometryKind::CircularString => 3,
            _ => 0,
        }
    }

    /// Whether the point count must be odd (circular-arc parity).
    pub fn odd_points(self) -> bool {
        matches!(self, GeometryKind::CircularString)
    }

    /// Whether the serialized body starts with a child/point count field.
    /// Points inline their ordinates directly after the header byte.
    pub fn has_count_field(self) -> bool {
        !matches!(self, GeometryKind::Point)
    }

    /// Whether the container holds coordinates directly (as opposed to
    /// rings or nested child geometries).
    pub fn takes_coordinates(self) -> bool {
        matches!(
            self,
            GeometryKind::Point | GeometryKind::LineString | GeometryKind::CircularString
        )
    }

    /// Whether bare rings (count field, no header byte) may be opened
    /// inside this container. CurvePolygon boundaries are full nested
    /// geometries instead, since a ring there may be an arc.
    pub fn takes_rings(self) -> bool {
        matches!(self, GeometryKind::Polygon)
    }
}

/// The set of ordinates present in every coordinate of one geometry value.
///
/// Fixed once per build: the first coordinate seen (or an explicit
/// declaration from the token source) establishes it, and every later
/// coordinate must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensions {
    Xy,
    Xyz,
    Xym,
    Xyzm,
}

impl Dimensions {
    pub fn from_flags(has_z: bool, has_m: bool) -> Self {
        match (has_z, has_m) {
            (false, false) => Dimensions::Xy,
            (true, false) => Dimensions::Xyz,
            (false, true) => Dimensions::Xym,
            (true, true) => Dimensions::Xyzm,
        }
    }

    /// Number of ordinates per coordinate (2, 3, or 4).
    pub fn ndims(self) -> u8 {
        match self {
            Dimensions::Xy => 2,
            Dimensions::Xyz | Dimensions::Xym => 3,
            Dimensions::Xyzm => 4,
        }
    }

    pub fn has_z(self) -> bool {
        matches!(self, Dimensions::Xyz | Dimensions::Xyzm)
    }

    pub fn has_m(self) -> bool {
        matches!(self, Dimensions::Xym | Dimensions::Xyzm)
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimensions::Xy => "XY",
            Dimensions::Xyz => "Z",
            Dimensions::Xym => "M",
            Dimensions::Xyzm => "ZM",
        }
    }
}

use thiserror::Error;

/// Errors reported by the builder, the blob codec, and the token sources.
///
/// `Clone` is required because the builder latches the first failure and
/// re-reports it from [`crate::GeomBuilder::finish`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoserError {
    #[error("{kind} requires at least {min} points, got {got}")]
    TooFewPoints {
        kind: &'static str,
        got: u32,
        min: u32,
    },

    #[error("geometry contains non-closed rings")]
    UnclosedRing,

    #[error("{kind} must have an odd number of points, got {got}")]
    EvenPointCount { kind: &'static str, got: u32 },

    #[error("cannot mix dimensionality in a geometry")]
    MixedDimensions,

    #[error("no open container for `{0}`")]
    NoOpenContainer(&'static str),

    #[error("rings are only valid inside a polygon")]
    RingOutsidePolygon,

    #[error("containers left open at end of input")]
    UnclosedContainers,

    #[error("no geometry was built")]
    EmptyBuild,

    #[error("geometry exceeds the 32-bit size field")]
    SizeOverflow,

    #[error("invalid WKT: {0}")]
    InvalidWkt(String),

    #[error("invalid WKB: {0}")]
    InvalidWkb(&'static str),

    #[error("invalid geometry blob: {0}")]
    InvalidBlob(&'static str),
}

pub type Result<T> = std::result::Result<T, GeoserError>;

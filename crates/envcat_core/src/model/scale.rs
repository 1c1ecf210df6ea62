//! Scale triplets: resolution, extent and support of one sampling dimension.
//!
//! # Responsibility
//! - Validate the "all three or none" rule at construction time.
//! - Provide structural (value) equality and serialization.
//!
//! # Invariants
//! - A constructed triplet always has resolution, extent and support.
//! - `support` lies in `(0.0, 1.0]` and defaults to `1.0`.
//! - Fields are private; a triplet attached to a data source is only ever
//!   replaced as a whole.

use crate::error::CatalogError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Support ratio used when a declared triplet omits it.
pub const DEFAULT_SUPPORT: f64 = 1.0;

/// Sampling dimension described by a triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDimension {
    Temporal,
    Spatial,
}

impl ScaleDimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temporal => "temporal",
            Self::Spatial => "spatial",
        }
    }
}

/// Construction-time validation error for scale triplets.
#[derive(Debug, Clone, PartialEq)]
pub enum ScaleError {
    /// Some, but not all, mandatory components were provided.
    Incomplete {
        dimension: ScaleDimension,
        missing: &'static str,
    },
    /// `support` is outside `(0.0, 1.0]` or not a number.
    SupportOutOfRange { dimension: ScaleDimension, value: f64 },
    /// Resolution must be strictly positive.
    InvalidResolution { dimension: ScaleDimension },
    /// Temporal resolution finer than one millisecond.
    ResolutionPrecision { dimension: ScaleDimension },
    /// Extent bounds are inverted or not finite.
    InvalidExtent { dimension: ScaleDimension },
}

impl Display for ScaleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incomplete { dimension, missing } => write!(
                f,
                "{} scale is missing `{missing}`",
                dimension.as_str()
            ),
            Self::SupportOutOfRange { dimension, value } => write!(
                f,
                "{} scale support {value} is outside (0.0, 1.0]",
                dimension.as_str()
            ),
            Self::InvalidResolution { dimension } => {
                write!(f, "{} scale resolution must be positive", dimension.as_str())
            }
            Self::ResolutionPrecision { dimension } => write!(
                f,
                "{} scale resolution must be a whole number of milliseconds",
                dimension.as_str()
            ),
            Self::InvalidExtent { dimension } => write!(
                f,
                "{} scale extent must be finite with start <= end",
                dimension.as_str()
            ),
        }
    }
}

impl Error for ScaleError {}

impl From<ScaleError> for CatalogError {
    fn from(value: ScaleError) -> Self {
        match value {
            ScaleError::Incomplete { dimension, missing } => {
                CatalogError::IncompleteScale { dimension, missing }
            }
            other => CatalogError::InvalidArgument(other.to_string()),
        }
    }
}

/// Observation period covered by a temporal triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Axis-aligned bounding box (WGS84 lon/lat) covered by a spatial triplet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|value| value.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }
}

/// Temporal resolution/extent/support triplet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemporalScaleRecord", into = "TemporalScaleRecord")]
pub struct TemporalScale {
    resolution_ms: i64,
    extent: TemporalExtent,
    support: f64,
}

impl TemporalScale {
    /// Builds a declared triplet; `support = None` means the default `1.0`.
    pub fn new(
        resolution: Duration,
        extent: TemporalExtent,
        support: Option<f64>,
    ) -> Result<Self, ScaleError> {
        let dimension = ScaleDimension::Temporal;
        if resolution <= Duration::zero() {
            return Err(ScaleError::InvalidResolution { dimension });
        }
        let resolution_ms = resolution.num_milliseconds();
        if Duration::milliseconds(resolution_ms) != resolution {
            return Err(ScaleError::ResolutionPrecision { dimension });
        }
        if extent.end < extent.start {
            return Err(ScaleError::InvalidExtent { dimension });
        }
        Ok(Self {
            resolution_ms,
            extent,
            support: validate_support(dimension, support)?,
        })
    }

    /// Applies the "all or none" rule to optional components.
    ///
    /// Returns `Ok(None)` when nothing was declared.
    pub fn from_parts(
        resolution: Option<Duration>,
        extent: Option<TemporalExtent>,
        support: Option<f64>,
    ) -> Result<Option<Self>, ScaleError> {
        match require_parts(ScaleDimension::Temporal, resolution, extent, support)? {
            Some((resolution, extent)) => Self::new(resolution, extent, support).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolution(&self) -> Duration {
        Duration::milliseconds(self.resolution_ms)
    }

    pub fn resolution_ms(&self) -> i64 {
        self.resolution_ms
    }

    pub fn extent(&self) -> TemporalExtent {
        self.extent
    }

    pub fn support(&self) -> f64 {
        self.support
    }

    /// Observed share of one resolution interval (`resolution * support`).
    pub fn support_duration(&self) -> Duration {
        let millis = (self.resolution_ms as f64 * self.support).round() as i64;
        Duration::milliseconds(millis)
    }
}

/// Spatial resolution/extent/support triplet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpatialScaleRecord", into = "SpatialScaleRecord")]
pub struct SpatialScale {
    resolution_m: f64,
    extent: BoundingBox,
    support: f64,
}

impl SpatialScale {
    /// Builds a declared triplet; resolution is a distance in meters.
    pub fn new(
        resolution_m: f64,
        extent: BoundingBox,
        support: Option<f64>,
    ) -> Result<Self, ScaleError> {
        let dimension = ScaleDimension::Spatial;
        if !resolution_m.is_finite() || resolution_m <= 0.0 {
            return Err(ScaleError::InvalidResolution { dimension });
        }
        if !extent.is_valid() {
            return Err(ScaleError::InvalidExtent { dimension });
        }
        Ok(Self {
            resolution_m,
            extent,
            support: validate_support(dimension, support)?,
        })
    }

    /// Applies the "all or none" rule to optional components.
    pub fn from_parts(
        resolution_m: Option<f64>,
        extent: Option<BoundingBox>,
        support: Option<f64>,
    ) -> Result<Option<Self>, ScaleError> {
        match require_parts(ScaleDimension::Spatial, resolution_m, extent, support)? {
            Some((resolution_m, extent)) => Self::new(resolution_m, extent, support).map(Some),
            None => Ok(None),
        }
    }

    pub fn resolution_m(&self) -> f64 {
        self.resolution_m
    }

    pub fn extent(&self) -> BoundingBox {
        self.extent
    }

    pub fn support(&self) -> f64 {
        self.support
    }

    /// Observed share of one resolution cell edge, in meters.
    pub fn support_m(&self) -> f64 {
        self.resolution_m * self.support
    }
}

fn require_parts<R, E>(
    dimension: ScaleDimension,
    resolution: Option<R>,
    extent: Option<E>,
    support: Option<f64>,
) -> Result<Option<(R, E)>, ScaleError> {
    match (resolution, extent) {
        (None, None) if support.is_none() => Ok(None),
        (Some(resolution), Some(extent)) => Ok(Some((resolution, extent))),
        (None, _) => Err(ScaleError::Incomplete {
            dimension,
            missing: "resolution",
        }),
        (Some(_), None) => Err(ScaleError::Incomplete {
            dimension,
            missing: "extent",
        }),
    }
}

fn validate_support(dimension: ScaleDimension, support: Option<f64>) -> Result<f64, ScaleError> {
    let value = support.unwrap_or(DEFAULT_SUPPORT);
    // NaN fails both comparisons.
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(ScaleError::SupportOutOfRange { dimension, value })
    }
}

#[derive(Serialize, Deserialize)]
struct TemporalScaleRecord {
    resolution_ms: Option<i64>,
    extent: Option<TemporalExtent>,
    support: Option<f64>,
}

impl TryFrom<TemporalScaleRecord> for TemporalScale {
    type Error = ScaleError;

    fn try_from(value: TemporalScaleRecord) -> Result<Self, Self::Error> {
        TemporalScale::from_parts(
            value.resolution_ms.map(Duration::milliseconds),
            value.extent,
            value.support,
        )?
        .ok_or(ScaleError::Incomplete {
            dimension: ScaleDimension::Temporal,
            missing: "resolution",
        })
    }
}

impl From<TemporalScale> for TemporalScaleRecord {
    fn from(value: TemporalScale) -> Self {
        Self {
            resolution_ms: Some(value.resolution_ms),
            extent: Some(value.extent),
            support: Some(value.support),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SpatialScaleRecord {
    resolution_m: Option<f64>,
    extent: Option<BoundingBox>,
    support: Option<f64>,
}

impl TryFrom<SpatialScaleRecord> for SpatialScale {
    type Error = ScaleError;

    fn try_from(value: SpatialScaleRecord) -> Result<Self, Self::Error> {
        SpatialScale::from_parts(value.resolution_m, value.extent, value.support)?.ok_or(
            ScaleError::Incomplete {
                dimension: ScaleDimension::Spatial,
                missing: "resolution",
            },
        )
    }
}

impl From<SpatialScale> for SpatialScaleRecord {
    fn from(value: SpatialScale) -> Self {
        Self {
            resolution_m: Some(value.resolution_m),
            extent: Some(value.extent),
            support: Some(value.support),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn extent() -> TemporalExtent {
        TemporalExtent {
            start: Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2019, 12, 31, 23, 50, 0).unwrap(),
        }
    }

    fn bbox() -> BoundingBox {
        BoundingBox {
            min_x: 7.5,
            min_y: 47.5,
            max_x: 8.5,
            max_y: 48.5,
        }
    }

    #[test]
    fn support_upper_bound_is_inclusive() {
        let scale = TemporalScale::new(Duration::minutes(10), extent(), Some(1.0)).unwrap();
        assert_eq!(scale.support(), 1.0);
    }

    #[test]
    fn support_zero_and_above_one_are_rejected() {
        for value in [0.0, 1.0001, -0.5, f64::NAN] {
            let err = SpatialScale::new(30.0, bbox(), Some(value)).unwrap_err();
            assert!(matches!(err, ScaleError::SupportOutOfRange { .. }));
            assert!(matches!(
                CatalogError::from(err),
                CatalogError::InvalidArgument(_)
            ));
        }
    }

    #[test]
    fn support_defaults_to_one() {
        let scale = SpatialScale::new(30.0, bbox(), None).unwrap();
        assert_eq!(scale.support(), DEFAULT_SUPPORT);
        assert_eq!(scale.support_m(), 30.0);
    }

    #[test]
    fn nothing_declared_yields_no_triplet() {
        assert_eq!(TemporalScale::from_parts(None, None, None).unwrap(), None);
        assert_eq!(SpatialScale::from_parts(None, None, None).unwrap(), None);
    }

    #[test]
    fn partial_declarations_fail_as_incomplete() {
        let err = TemporalScale::from_parts(Some(Duration::hours(1)), None, None).unwrap_err();
        assert_eq!(
            err,
            ScaleError::Incomplete {
                dimension: ScaleDimension::Temporal,
                missing: "extent"
            }
        );

        let err = SpatialScale::from_parts(None, Some(bbox()), Some(0.5)).unwrap_err();
        assert!(matches!(
            CatalogError::from(err),
            CatalogError::IncompleteScale {
                dimension: ScaleDimension::Spatial,
                missing: "resolution"
            }
        ));

        let err = SpatialScale::from_parts(None, None, Some(0.5)).unwrap_err();
        assert!(matches!(err, ScaleError::Incomplete { .. }));
    }

    #[test]
    fn equality_is_structural() {
        let a = TemporalScale::new(Duration::minutes(10), extent(), Some(0.5)).unwrap();
        let b = TemporalScale::new(Duration::seconds(600), extent(), Some(0.5)).unwrap();
        let c = TemporalScale::new(Duration::seconds(600), extent(), None).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.support_duration(), Duration::minutes(5));
    }

    #[test]
    fn sub_second_resolution_is_kept_exactly() {
        let scale = TemporalScale::new(Duration::milliseconds(1500), extent(), None).unwrap();
        assert_eq!(scale.resolution(), Duration::milliseconds(1500));
        assert_eq!(scale.resolution_ms(), 1500);

        let half = TemporalScale::new(Duration::milliseconds(500), extent(), None).unwrap();
        assert_eq!(half.resolution(), Duration::milliseconds(500));
        assert_ne!(scale, half);

        let encoded = serde_json::to_value(&half).unwrap();
        assert_eq!(encoded["resolution_ms"], 500);
        assert_eq!(serde_json::from_value::<TemporalScale>(encoded).unwrap(), half);
    }

    #[test]
    fn resolution_finer_than_a_millisecond_is_rejected() {
        let err = TemporalScale::new(Duration::microseconds(1500), extent(), None).unwrap_err();
        assert!(matches!(err, ScaleError::ResolutionPrecision { .. }));
        assert!(matches!(
            CatalogError::from(err),
            CatalogError::InvalidArgument(_)
        ));

        for zero_or_negative in [Duration::zero(), Duration::milliseconds(-500)] {
            assert!(matches!(
                TemporalScale::new(zero_or_negative, extent(), None),
                Err(ScaleError::InvalidResolution { .. })
            ));
        }
    }

    #[test]
    fn inverted_extent_is_rejected() {
        let inverted = TemporalExtent {
            start: extent().end,
            end: extent().start,
        };
        let err = TemporalScale::new(Duration::minutes(10), inverted, None).unwrap_err();
        assert!(matches!(err, ScaleError::InvalidExtent { .. }));
    }

    #[test]
    fn deserialization_enforces_the_same_rules() {
        let json = serde_json::json!({
            "resolution_m": 25.0,
            "extent": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
        });
        let scale: SpatialScale = serde_json::from_value(json).unwrap();
        assert_eq!(scale.support(), 1.0);

        let bad = serde_json::json!({
            "resolution_m": 25.0,
            "extent": {"min_x": 0.0, "min_y": 0.0, "max_x": 1.0, "max_y": 1.0},
            "support": 0.0,
        });
        assert!(serde_json::from_value::<SpatialScale>(bad).is_err());

        let encoded = serde_json::to_value(&scale).unwrap();
        assert_eq!(encoded["support"], 1.0);
    }
}

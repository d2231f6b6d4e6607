use crate::error::Result;
use std::{
    fmt::{self, Display, Formatter},
    path::Path,
};

/// Bounding rectangle in EPSG:4326 (longitude/latitude degrees).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Smallest extent covering all `points`.
    pub fn covering(points: &[(f64, f64)]) -> Option<Self> {
        let (&(x, y), rest) = points.split_first()?;

        Some(rest.iter().fold(Self::new(x, y, x, y), |extent, &(x, y)| {
            Self::new(
                extent.min_x.min(x),
                extent.min_y.min(y),
                extent.max_x.max(x),
                extent.max_y.max(y),
            )
        }))
    }

    pub fn is_valid(&self) -> bool {
        [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|value| value.is_finite())
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }
}

impl From<[f64; 4]> for Extent {
    fn from([min_x, min_y, max_x, max_y]: [f64; 4]) -> Self {
        Self::new(min_x, min_y, max_x, max_y)
    }
}

/// Rendering-engine notation: `xmin,xmax,ymin,ymax`.
impl Display for Extent {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{},{},{},{}",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

/// Corners of a raster of `width` x `height` pixels under a GDAL-style geo transform.
pub fn raster_corners(geo_transform: &[f64; 6], width: usize, height: usize) -> [(f64, f64); 4] {
    let project = |column: f64, row: f64| {
        (
            geo_transform[0] + column * geo_transform[1] + row * geo_transform[2],
            geo_transform[3] + column * geo_transform[4] + row * geo_transform[5],
        )
    };

    let (w, h) = (width as f64, height as f64);

    [
        project(0.0, 0.0),
        project(w, 0.0),
        project(0.0, h),
        project(w, h),
    ]
}

pub trait RasterInspector {
    /// Validates the raster and returns its extent reprojected to EPSG:4326.
    fn wgs84_extent(&self, raster_path: &Path) -> Result<Extent>;
}

#[cfg(feature = "georef")]
pub use gdal_inspector::GdalInspector;

/// Stands in for [`GdalInspector`] in builds without GDAL; rejects every raster.
#[cfg(not(feature = "georef"))]
pub struct UnsupportedInspector;

#[cfg(not(feature = "georef"))]
impl RasterInspector for UnsupportedInspector {
    fn wgs84_extent(&self, raster_path: &Path) -> Result<Extent> {
        Err(crate::error::Error::RasterOpen {
            path: raster_path.to_path_buf(),
            reason: "built without the georef feature".to_owned(),
        })
    }
}

#[cfg(feature = "georef")]
mod gdal_inspector {
    use super::{Extent, RasterInspector, raster_corners};
    use crate::error::{Error, Result};
    use gdal::Dataset;
    use proj::Proj;
    use std::path::Path;
    use tracing::info;

    /// Densification points per edge when reprojecting bounds.
    const DENSIFY_POINTS: i32 = 21;

    pub struct GdalInspector;

    impl RasterInspector for GdalInspector {
        fn wgs84_extent(&self, raster_path: &Path) -> Result<Extent> {
            let dataset = Dataset::open(raster_path).map_err(|err| Error::RasterOpen {
                path: raster_path.to_path_buf(),
                reason: err.to_string(),
            })?;

            let spatial_reference_error = |reason: String| Error::SpatialReference {
                path: raster_path.to_path_buf(),
                reason,
            };

            let source_crs = dataset
                .spatial_ref()
                .and_then(|srs| srs.to_wkt())
                .map_err(|err| spatial_reference_error(err.to_string()))?;

            if source_crs.trim().is_empty() {
                return Err(spatial_reference_error("empty definition".to_owned()));
            }

            let geo_transform = dataset
                .geo_transform()
                .map_err(|err| spatial_reference_error(err.to_string()))?;

            let (width, height) = dataset.raster_size();

            let native = Extent::covering(&raster_corners(&geo_transform, width, height))
                .filter(Extent::is_valid)
                .ok_or_else(|| spatial_reference_error("degenerate geo transform".to_owned()))?;

            let proj_to_4326 = Proj::new_known_crs(&source_crs, "EPSG:4326", None)
                .map_err(|err| Error::Reprojection(err.to_string()))?;

            let extent: Extent = proj_to_4326
                .transform_bounds(
                    native.min_x,
                    native.min_y,
                    native.max_x,
                    native.max_y,
                    DENSIFY_POINTS,
                )
                .map_err(|err| Error::Reprojection(err.to_string()))?
                .into();

            if !extent.is_valid() {
                return Err(Error::Reprojection(format!("invalid extent {extent}")));
            }

            info!("extent in EPSG:4326= {extent}");

            Ok(extent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_follow_north_up_geo_transform() {
        let corners = raster_corners(&[500_000.0, 10.0, 0.0, 4_400_000.0, 0.0, -10.0], 200, 100);

        assert_eq!(
            Extent::covering(&corners),
            Some(Extent::new(500_000.0, 4_399_000.0, 502_000.0, 4_400_000.0))
        );
    }

    #[test]
    fn rotated_geo_transform_covers_all_corners() {
        let corners = raster_corners(&[0.0, 1.0, 0.5, 0.0, 0.5, -1.0], 10, 10);

        let extent = Extent::covering(&corners).unwrap();

        assert_eq!(extent, Extent::new(0.0, -10.0, 15.0, 5.0));
    }

    #[test]
    fn displays_in_engine_order() {
        assert_eq!(
            Extent::new(26.97, 39.45, 27.0, 39.47).to_string(),
            "26.97,27,39.45,39.47"
        );
    }

    #[test]
    fn rejects_non_finite_or_inverted_extents() {
        assert!(!Extent::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
        assert!(!Extent::new(2.0, 0.0, 1.0, 1.0).is_valid());
        assert!(Extent::new(0.0, 0.0, 0.0, 0.0).is_valid());
        assert_eq!(Extent::covering(&[]), None);
    }
}

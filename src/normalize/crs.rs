//! Coordinate reference systems and reprojection to WGS84.

use std::fmt;
use std::sync::OnceLock;

use geo::{Coord, Geometry, MapCoords};
use proj4rs::proj::Proj;
use regex::Regex;

use crate::error::FetchError;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(u16);

impl Crs {
    /// WGS84 longitude/latitude, the canonical CRS of every artifact
    pub const WGS84: Crs = Crs(4326);

    pub fn epsg(code: u16) -> Self {
        Crs(code)
    }

    pub fn code(&self) -> u16 {
        self.0
    }

    /// Whether the EPSG registry bundled with the crate knows this code
    pub fn is_known(&self) -> bool {
        crs_definitions::from_code(self.0).is_some()
    }

    /// Identify the CRS of an ESRI `.prj` / OGC WKT definition.
    ///
    /// Only an `AUTHORITY["EPSG", ...]` of the outermost definition counts;
    /// an authority on a nested `GEOGCS` or `UNIT` says nothing about the
    /// projected coordinates. A bare WGS84 geographic definition without
    /// authority maps to [`Crs::WGS84`].
    pub fn from_wkt(wkt: &str) -> Option<Self> {
        static AUTHORITY: OnceLock<Regex> = OnceLock::new();
        let authority = AUTHORITY.get_or_init(|| {
            Regex::new(r#"AUTHORITY\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#).expect("static regex")
        });

        let outermost = authority.captures_iter(wkt).find(|caps| {
            caps.get(0)
                .is_some_and(|m| bracket_depth(&wkt[..m.start()]) == 1)
        });
        if let Some(caps) = outermost {
            return caps[1].parse().ok().map(Crs);
        }

        let trimmed = wkt.trim_start();
        if trimmed.starts_with("GEOGCS") && wkt.contains("WGS_1984") {
            return Some(Crs::WGS84);
        }
        None
    }
}

/// The name of the outermost WKT definition, e.g. `PROJCS["<name>", ...`.
pub fn wkt_name(wkt: &str) -> Option<&str> {
    let start = wkt.find('"')? + 1;
    let len = wkt[start..].find('"')?;
    Some(&wkt[start..start + len])
}

/// Nesting depth at the end of `prefix`, ignoring brackets inside names.
fn bracket_depth(prefix: &str) -> usize {
    let mut depth = 0usize;
    let mut quoted = false;
    for c in prefix.chars() {
        match c {
            '"' => quoted = !quoted,
            '[' if !quoted => depth += 1,
            ']' if !quoted => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

fn projection(crs: Crs) -> Result<Proj, FetchError> {
    let def = crs_definitions::from_code(crs.code()).ok_or_else(|| FetchError::Reprojection {
        code: crs.code(),
        reason: "unknown EPSG code".to_string(),
    })?;
    Proj::from_proj_string(def.proj4).map_err(|e| FetchError::Reprojection {
        code: crs.code(),
        reason: e.to_string(),
    })
}

/// Transforms geometries from one CRS into WGS84 degrees.
pub struct Reprojector {
    source: Crs,
    from: Proj,
    to: Proj,
}

impl Reprojector {
    pub fn to_wgs84(source: Crs) -> Result<Self, FetchError> {
        Ok(Self {
            source,
            from: projection(source)?,
            to: projection(Crs::WGS84)?,
        })
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    pub fn reproject(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>, FetchError> {
        geometry.try_map_coords(|coord| self.reproject_coord(coord))
    }

    fn reproject_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>, FetchError> {
        // proj4rs works in radians for geographic systems
        let mut point = if self.from.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(&self.from, &self.to, &mut point).map_err(|e| {
            FetchError::Reprojection {
                code: self.source.code(),
                reason: e.to_string(),
            }
        })?;
        Ok(Coord {
            x: point.0.to_degrees(),
            y: point.1.to_degrees(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn test_wkt_authority_uses_outermost_definition() {
        let wkt = r#"PROJCS["NAD83(HARN) / Washington North (ftUS)",GEOGCS["NAD83(HARN)",AUTHORITY["EPSG","4152"]],UNIT["US survey foot",0.3048006096012192,AUTHORITY["EPSG","9003"]],AUTHORITY["EPSG","2926"]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::epsg(2926)));
    }

    #[test]
    fn test_bare_esri_wgs84_prj() {
        let wkt = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::WGS84));
    }

    #[test]
    fn test_unidentified_projection() {
        let wkt = r#"PROJCS["NAD_1983_HARN_StatePlane_Washington_North_FIPS_4601_Feet",GEOGCS["GCS_North_American_1983_HARN"]]"#;
        assert_eq!(Crs::from_wkt(wkt), None);
    }

    #[test]
    fn test_nested_authority_does_not_identify_projection() {
        let wkt = r#"PROJCS["NAD_1983_HARN_StatePlane_Washington_North_FIPS_4601_Feet",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],AUTHORITY["EPSG","4326"]],PROJECTION["Lambert_Conformal_Conic"],UNIT["Foot_US",0.3048006096012192]]"#;
        assert_eq!(Crs::from_wkt(wkt), None);
    }

    #[test]
    fn test_unit_authority_is_not_the_crs() {
        let wkt = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433,AUTHORITY["EPSG","9122"]]]"#;
        assert_eq!(Crs::from_wkt(wkt), Some(Crs::WGS84));
    }

    #[test]
    fn test_authority_beyond_epsg_range() {
        // ESRI:102749 style codes do not fit the bundled EPSG table
        let wkt = r#"PROJCS["NAD_1983_StatePlane_Washington_North_FIPS_4601_Feet",GEOGCS["GCS_North_American_1983"],AUTHORITY["EPSG","102749"]]"#;
        assert_eq!(Crs::from_wkt(wkt), None);
    }

    #[test]
    fn test_web_mercator_to_wgs84() {
        let reprojector = Reprojector::to_wgs84(Crs::epsg(3857)).unwrap();
        // Seattle, roughly
        let geometry = Geometry::Point(point!(x: -13_617_000.0, y: 6_042_000.0));
        let Geometry::Point(p) = reprojector.reproject(&geometry).unwrap() else {
            panic!("expected a point");
        };
        assert!((p.x() - -122.33).abs() < 0.05, "lon {}", p.x());
        assert!((p.y() - 47.65).abs() < 0.05, "lat {}", p.y());
    }

    #[test]
    fn test_identity_for_wgs84() {
        let reprojector = Reprojector::to_wgs84(Crs::WGS84).unwrap();
        let geometry = Geometry::Point(point!(x: -122.5, y: 47.25));
        let Geometry::Point(p) = reprojector.reproject(&geometry).unwrap() else {
            panic!("expected a point");
        };
        assert!((p.x() - -122.5).abs() < 1e-9);
        assert!((p.y() - 47.25).abs() < 1e-9);
    }
}

//! XML namespace URIs used by EO-WCS services.
//!
//! The WCS-EO application profile went through a draft phase with a
//! different namespace; deployed services use either one, so lookups
//! that touch EO metadata try both.

pub const WCS: &str = "http://www.opengis.net/wcs/2.0";
pub const WCSEO_DRAFT: &str = "http://www.opengis.net/wcseo/1.0";
pub const WCSEO: &str = "http://www.opengis.net/wcs/wcseo/1.0";
pub const OWS: &str = "http://www.opengis.net/ows/2.0";
pub const GML: &str = "http://www.opengis.net/gml/3.2";
pub const GMLCOV: &str = "http://www.opengis.net/gmlcov/1.0";
pub const OM: &str = "http://www.opengis.net/om/2.0";
pub const EOP: &str = "http://www.opengis.net/eop/2.0";
pub const OPT: &str = "http://www.opengis.net/opt/2.0";
pub const SAR: &str = "http://www.opengis.net/sar/2.0";

/// Both published WCS-EO namespaces, draft first.
pub const WCSEO_VARIANTS: [&str; 2] = [WCSEO_DRAFT, WCSEO];

/// EarthObservation element namespaces per sensor profile.
pub const EO_PROFILE_VARIANTS: [&str; 3] = [EOP, OPT, SAR];

/// CRS URI used for GetCoverage spatial subsetting.
pub const EPSG_4326_URI: &str = "http://www.opengis.net/def/crs/EPSG/0/4326";

/// Assumed when the capabilities carry no ows:ServiceTypeVersion.
pub const DEFAULT_SERVICE_VERSION: &str = "2.0.1";

/// Resolve a conventional prefix to its namespace URI.
pub fn prefix_to_uri(prefix: &str) -> Option<&'static str> {
    match prefix {
        "wcs" => Some(WCS),
        "wcseo" => Some(WCSEO),
        "ows" => Some(OWS),
        "gml" => Some(GML),
        "gmlcov" => Some(GMLCOV),
        "om" => Some(OM),
        "eop" => Some(EOP),
        "opt" => Some(OPT),
        "sar" => Some(SAR),
        _ => None,
    }
}

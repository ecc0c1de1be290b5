//! Extractors for EO-WCS response documents.
//!
//! Deployed services disagree on the WCS-EO namespace (draft vs final)
//! and put the EarthObservation element in the eop, opt or sar profile
//! namespace depending on the sensor, so every lookup that enters the
//! EO metadata subtree tries the variants in order.

use eo_common::{Bbox, TimePeriod};
use tracing::warn;

use crate::ns;
use crate::xml::{Element, PathSeg};

/// One dataset series advertised by GetCapabilities.
#[derive(Debug, Clone)]
pub struct DatasetSeries {
    pub id: String,
    pub bbox: Option<Bbox>,
    pub period: Option<TimePeriod>,
}

/// WCS version from ows:ServiceTypeVersion, or the default when absent.
pub fn service_version(caps: &Element) -> String {
    caps.descendant(ns::OWS, "ServiceTypeVersion")
        .map(|e| e.text_trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| ns::DEFAULT_SERVICE_VERSION.to_string())
}

/// Dataset series summaries from a Capabilities document.
pub fn dataset_series(caps: &Element) -> Vec<DatasetSeries> {
    let mut out = Vec::new();

    let Some(contents) = caps.child(ns::WCS, "Contents") else {
        return out;
    };

    for wcseo in ns::WCSEO_VARIANTS {
        let summaries = contents.find_all(&[
            (Some(ns::WCS), "Extension"),
            (Some(wcseo), "DatasetSeriesSummary"),
        ]);
        for summary in summaries {
            let Some(id) = summary
                .child(wcseo, "DatasetSeriesId")
                .map(|e| e.text_trim().to_string())
                .filter(|s| !s.is_empty())
            else {
                warn!("DatasetSeriesSummary without a DatasetSeriesId, skipped");
                continue;
            };
            out.push(DatasetSeries {
                id,
                bbox: wgs84_bounding_box(summary),
                period: time_period(summary),
            });
        }
    }

    out
}

fn wgs84_bounding_box(summary: &Element) -> Option<Bbox> {
    let bb = summary.child(ns::OWS, "WGS84BoundingBox")?;
    let (lx, ly) = parse_pos(bb.child(ns::OWS, "LowerCorner")?.text_trim())?;
    let (ux, uy) = parse_pos(bb.child(ns::OWS, "UpperCorner")?.text_trim())?;
    Some(Bbox::new(lx, ly, ux, uy))
}

fn time_period(el: &Element) -> Option<TimePeriod> {
    let tp = el.descendant(ns::GML, "TimePeriod")?;
    let begin = tp.child(ns::GML, "beginPosition")?.text_trim();
    let end = tp.child(ns::GML, "endPosition")?.text_trim();
    match TimePeriod::from_strings(begin, end) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(begin, end, "Unparsable gml:TimePeriod: {}", e);
            None
        }
    }
}

/// Coverage descriptions from a DescribeEOCoverageSet response.
pub fn coverage_descriptions(root: &Element) -> Vec<&Element> {
    let container = if root.is(ns::WCS, "CoverageDescriptions") {
        Some(root)
    } else {
        root.descendant(ns::WCS, "CoverageDescriptions")
    };
    match container {
        Some(c) => c.children_named(ns::WCS, "CoverageDescription").collect(),
        None => Vec::new(),
    }
}

/// Coverage id from the wcs:CoverageId child, falling back to the
/// gml:id attribute.
pub fn coverage_id(cd: &Element) -> Option<String> {
    cd.child(ns::WCS, "CoverageId")
        .map(|e| e.text_trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| cd.attr("id").map(str::to_string))
}

/// WGS84 bbox from the coverage's gml:boundedBy envelope.
///
/// Envelopes in a CRS other than WGS84 are rejected with a warning.
/// The axis order is taken from the axisLabels attribute when present,
/// otherwise from the srsName URI style.
pub fn envelope_bbox(cd: &Element) -> Option<Bbox> {
    let env = cd.find(&[(Some(ns::GML), "boundedBy"), (Some(ns::GML), "Envelope")])?;

    let srs = env.attr("srsName");
    if !srs_is_wgs84(srs) {
        warn!(srs = srs.unwrap_or(""), "Envelope CRS is not WGS84, coverage skipped");
        return None;
    }
    let y_first = y_first(env.attr("axisLabels"), srs);

    let (la, lb) = parse_pos(env.child(ns::GML, "lowerCorner")?.text_trim())?;
    let (ua, ub) = parse_pos(env.child(ns::GML, "upperCorner")?.text_trim())?;

    if y_first {
        Some(Bbox::new(lb, la, ub, ua))
    } else {
        Some(Bbox::new(la, lb, ua, ub))
    }
}

/// The EarthObservation metadata element, wherever the service put it.
pub fn earth_observation(cd: &Element) -> Option<&Element> {
    for wcseo in ns::WCSEO_VARIANTS {
        for profile in ns::EO_PROFILE_VARIANTS {
            let found = cd.find(&[
                (Some(ns::GMLCOV), "metadata"),
                (Some(ns::GMLCOV), "Extension"),
                (Some(wcseo), "EOMetadata"),
                (Some(profile), "EarthObservation"),
            ]);
            if found.is_some() {
                return found;
            }
        }
    }
    None
}

/// Acquisition time period from om:phenomenonTime.
pub fn phenomenon_time(eo: &Element) -> Option<TimePeriod> {
    eo.child(ns::OM, "phenomenonTime").and_then(time_period)
}

// Profile-owned element names below match any namespace: opt and sar
// re-declare parts of the eop schema under their own URIs.

pub fn sensor_type(eo: &Element) -> Option<String> {
    text_at(
        eo,
        &[
            (Some(ns::OM), "procedure"),
            (None, "EarthObservationEquipment"),
            (None, "sensor"),
            (None, "Sensor"),
            (None, "sensorType"),
        ],
    )
}

pub fn incidence_angle(eo: &Element) -> Option<String> {
    text_at(
        eo,
        &[
            (Some(ns::OM), "procedure"),
            (None, "EarthObservationEquipment"),
            (None, "acquisitionParameters"),
            (None, "Acquisition"),
            (None, "incidenceAngle"),
        ],
    )
}

pub fn cloud_cover(eo: &Element) -> Option<String> {
    text_at(
        eo,
        &[
            (Some(ns::OM), "result"),
            (None, "EarthObservationResult"),
            (None, "cloudCoverPercentage"),
        ],
    )
}

pub fn identifier(eo: &Element) -> Option<String> {
    text_at(
        eo,
        &[
            (None, "metaDataProperty"),
            (None, "EarthObservationMetaData"),
            (None, "identifier"),
        ],
    )
}

/// Product footprint as (lon, lat) pairs from the first LinearRing of
/// the eop:Footprint multi-surface. `None` when no ring is present;
/// callers fall back to the envelope corners.
pub fn footprint(eo: &Element) -> Option<Vec<(f64, f64)>> {
    let surface = eo.find(&[
        (Some(ns::OM), "featureOfInterest"),
        (None, "Footprint"),
        (None, "multiExtentOf"),
        (Some(ns::GML), "MultiSurface"),
    ])?;

    let y_first = y_first(surface.attr("axisLabels"), surface.attr("srsName"));

    let pos_list = surface.find(&[
        (Some(ns::GML), "surfaceMember"),
        (Some(ns::GML), "Polygon"),
        (Some(ns::GML), "exterior"),
        (Some(ns::GML), "LinearRing"),
        (Some(ns::GML), "posList"),
    ])?;

    coords_from_pos_list(pos_list.text_trim(), y_first)
}

fn text_at(el: &Element, path: &[PathSeg<'_>]) -> Option<String> {
    el.find(path)
        .map(|e| e.text_trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_pos(s: &str) -> Option<(f64, f64)> {
    let mut it = s.split_whitespace();
    let a = it.next()?.parse().ok()?;
    let b = it.next()?.parse().ok()?;
    Some((a, b))
}

fn coords_from_pos_list(text: &str, y_first: bool) -> Option<Vec<(f64, f64)>> {
    let vals: Vec<f64> = text
        .split_whitespace()
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if vals.len() < 2 || vals.len() % 2 != 0 {
        warn!(n = vals.len(), "posList does not hold coordinate pairs");
        return None;
    }
    Some(
        vals.chunks_exact(2)
            .map(|c| if y_first { (c[1], c[0]) } else { (c[0], c[1]) })
            .collect(),
    )
}

fn srs_is_wgs84(srs: Option<&str>) -> bool {
    match srs {
        None => true,
        Some(s) if s.is_empty() => true,
        Some(s) => s.contains("4326") || s.contains("CRS84") || s.contains("WGS84"),
    }
}

fn y_first(axis_labels: Option<&str>, srs_name: Option<&str>) -> bool {
    if let Some(labels) = axis_labels {
        if let Some(first) = labels.split_whitespace().next() {
            let f = first.to_ascii_lowercase();
            return f.starts_with("lat") || f == "y";
        }
    }
    // urn-style EPSG:4326 identifiers imply lat/long axis order.
    srs_name.map_or(false, |s| s.contains("4326") && s.contains("urn:"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wcs:Capabilities xmlns:wcs="http://www.opengis.net/wcs/2.0"
    xmlns:ows="http://www.opengis.net/ows/2.0"
    xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:wcseo="http://www.opengis.net/wcseo/1.0">
  <ows:ServiceIdentification>
    <ows:ServiceTypeVersion>2.0.1</ows:ServiceTypeVersion>
  </ows:ServiceIdentification>
  <wcs:Contents>
    <wcs:Extension>
      <wcseo:DatasetSeriesSummary>
        <ows:WGS84BoundingBox>
          <ows:LowerCorner>8.0 50.0</ows:LowerCorner>
          <ows:UpperCorner>12.3 55.0</ows:UpperCorner>
        </ows:WGS84BoundingBox>
        <wcseo:DatasetSeriesId>Landsat_series</wcseo:DatasetSeriesId>
        <gml:TimePeriod gml:id="tp_1">
          <gml:beginPosition>2019-01-01T00:00:00Z</gml:beginPosition>
          <gml:endPosition>2020-12-31T23:59:59Z</gml:endPosition>
        </gml:TimePeriod>
      </wcseo:DatasetSeriesSummary>
    </wcs:Extension>
  </wcs:Contents>
</wcs:Capabilities>"#;

    const COVERAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wcs:CoverageDescriptions xmlns:wcs="http://www.opengis.net/wcs/2.0"
    xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:gmlcov="http://www.opengis.net/gmlcov/1.0"
    xmlns:wcseo="http://www.opengis.net/wcseo/1.0"
    xmlns:om="http://www.opengis.net/om/2.0"
    xmlns:eop="http://www.opengis.net/eop/2.0"
    xmlns:opt="http://www.opengis.net/opt/2.0">
  <wcs:CoverageDescription gml:id="cov_1">
    <gml:boundedBy>
      <gml:Envelope axisLabels="lat long" srsName="http://www.opengis.net/def/crs/EPSG/0/4326">
        <gml:lowerCorner>51.0 9.0</gml:lowerCorner>
        <gml:upperCorner>52.0 10.0</gml:upperCorner>
      </gml:Envelope>
    </gml:boundedBy>
    <wcs:CoverageId>p_2020_001</wcs:CoverageId>
    <gmlcov:metadata>
      <gmlcov:Extension>
        <wcseo:EOMetadata>
          <eop:EarthObservation gml:id="eo_1">
            <om:phenomenonTime>
              <gml:TimePeriod gml:id="tp_2">
                <gml:beginPosition>2020-06-01T10:00:00Z</gml:beginPosition>
                <gml:endPosition>2020-06-01T10:00:10Z</gml:endPosition>
              </gml:TimePeriod>
            </om:phenomenonTime>
            <om:procedure>
              <eop:EarthObservationEquipment gml:id="eq_1">
                <eop:sensor>
                  <eop:Sensor>
                    <eop:sensorType>OPTICAL</eop:sensorType>
                  </eop:Sensor>
                </eop:sensor>
                <eop:acquisitionParameters>
                  <eop:Acquisition>
                    <eop:incidenceAngle uom="deg">-12.5</eop:incidenceAngle>
                  </eop:Acquisition>
                </eop:acquisitionParameters>
              </eop:EarthObservationEquipment>
            </om:procedure>
            <om:featureOfInterest>
              <eop:Footprint gml:id="fp_1">
                <eop:multiExtentOf>
                  <gml:MultiSurface gml:id="ms_1" srsName="urn:ogc:def:crs:EPSG:6.3:4326">
                    <gml:surfaceMember>
                      <gml:Polygon gml:id="poly_1">
                        <gml:exterior>
                          <gml:LinearRing>
                            <gml:posList>51.0 9.0 51.0 10.0 52.0 10.0 52.0 9.0 51.0 9.0</gml:posList>
                          </gml:LinearRing>
                        </gml:exterior>
                      </gml:Polygon>
                    </gml:surfaceMember>
                  </gml:MultiSurface>
                </eop:multiExtentOf>
              </eop:Footprint>
            </om:featureOfInterest>
            <om:result>
              <opt:EarthObservationResult gml:id="res_1">
                <opt:cloudCoverPercentage uom="%">23.5</opt:cloudCoverPercentage>
              </opt:EarthObservationResult>
            </om:result>
            <eop:metaDataProperty>
              <eop:EarthObservationMetaData>
                <eop:identifier>L8_scene_001</eop:identifier>
              </eop:EarthObservationMetaData>
            </eop:metaDataProperty>
          </eop:EarthObservation>
        </wcseo:EOMetadata>
      </gmlcov:Extension>
    </gmlcov:metadata>
  </wcs:CoverageDescription>
</wcs:CoverageDescriptions>"#;

    #[test]
    fn test_service_version_with_default() {
        let caps = Element::parse(CAPS).unwrap();
        assert_eq!(service_version(&caps), "2.0.1");

        let bare = Element::parse("<Capabilities/>").unwrap();
        assert_eq!(service_version(&bare), ns::DEFAULT_SERVICE_VERSION);
    }

    #[test]
    fn test_dataset_series_extraction() {
        let caps = Element::parse(CAPS).unwrap();
        let series = dataset_series(&caps);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].id, "Landsat_series");

        let bbox = series[0].bbox.unwrap();
        assert_eq!(bbox, Bbox::new(8.0, 50.0, 12.3, 55.0));
        assert!(series[0].period.is_some());
    }

    #[test]
    fn test_coverage_description_fields() {
        let root = Element::parse(COVERAGE).unwrap();
        let cds = coverage_descriptions(&root);
        assert_eq!(cds.len(), 1);
        let cd = cds[0];

        assert_eq!(coverage_id(cd).unwrap(), "p_2020_001");

        // axisLabels say lat first, so the envelope is y-first.
        let bbox = envelope_bbox(cd).unwrap();
        assert_eq!(bbox, Bbox::new(9.0, 51.0, 10.0, 52.0));

        let eo = earth_observation(cd).unwrap();
        assert!(phenomenon_time(eo).is_some());
        assert_eq!(sensor_type(eo).unwrap(), "OPTICAL");
        assert_eq!(incidence_angle(eo).unwrap(), "-12.5");
        assert_eq!(cloud_cover(eo).unwrap(), "23.5");
        assert_eq!(identifier(eo).unwrap(), "L8_scene_001");

        // urn-style 4326 means lat first in the posList.
        let fp = footprint(eo).unwrap();
        assert_eq!(fp.len(), 5);
        assert_eq!(fp[0], (9.0, 51.0));
        assert_eq!(fp[2], (10.0, 52.0));
    }

    #[test]
    fn test_coverage_id_falls_back_to_gml_id() {
        let xml = r#"<wcs:CoverageDescription
            xmlns:wcs="http://www.opengis.net/wcs/2.0"
            xmlns:gml="http://www.opengis.net/gml/3.2"
            gml:id="fallback_id"/>"#;
        let cd = Element::parse(xml).unwrap();
        assert_eq!(coverage_id(&cd).unwrap(), "fallback_id");
    }

    #[test]
    fn test_non_wgs84_envelope_is_rejected() {
        let xml = r#"<wcs:CoverageDescription
            xmlns:wcs="http://www.opengis.net/wcs/2.0"
            xmlns:gml="http://www.opengis.net/gml/3.2">
          <gml:boundedBy>
            <gml:Envelope srsName="http://www.opengis.net/def/crs/EPSG/0/32632">
              <gml:lowerCorner>500000 5600000</gml:lowerCorner>
              <gml:upperCorner>600000 5700000</gml:upperCorner>
            </gml:Envelope>
          </gml:boundedBy>
        </wcs:CoverageDescription>"#;
        let cd = Element::parse(xml).unwrap();
        assert!(envelope_bbox(&cd).is_none());
    }
}

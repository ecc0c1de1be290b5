//! HTTP client and request URL construction for EO-WCS endpoints.

use std::time::Duration;

use eo_common::{Bbox, TimePeriod};
use tracing::{debug, instrument, warn};

use crate::error::{CatalogueError, Result};
use crate::ns;
use crate::xml::Element;

/// Data source flavours a scenario can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    EoWcs,
    Catalogue,
}

impl SourceKind {
    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "EOWCS" => Ok(SourceKind::EoWcs),
            "OSCAT" => Ok(SourceKind::Catalogue),
            other => Err(CatalogueError::UnsupportedSource(format!(
                "Unknown data source type '{}'",
                other
            ))),
        }
    }
}

/// Reject data sources we cannot talk to.
pub fn validate_source(dsrc: &str, kind: SourceKind) -> Result<()> {
    if kind == SourceKind::Catalogue {
        return Err(CatalogueError::UnsupportedSource(
            "Catalogues are not yet implemented".into(),
        ));
    }
    if !dsrc.starts_with("http://") && !dsrc.starts_with("https://") {
        return Err(CatalogueError::UnsupportedSource(format!(
            "Only http(s) data sources are supported: {}",
            dsrc
        )));
    }
    Ok(())
}

fn fmt_instant(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// GetCapabilities request URL.
pub fn get_capabilities_url(dsrc: &str) -> String {
    format!("{}?service=wcs&request=GetCapabilities", dsrc)
}

/// DescribeEOCoverageSet request URL for one dataset series, restricted
/// to the scenario's time period and area of interest.
pub fn describe_eo_coverage_set_url(
    dsrc: &str,
    version: &str,
    period: &TimePeriod,
    aoi: &Bbox,
    dss_id: &str,
) -> String {
    format!(
        "{}?service=wcs&version={}&request=DescribeEOCoverageSet\
         &subset=phenomenonTime(\"{}\",\"{}\")&containment=overlaps\
         &subset=Lat({},{})&subset=Long({},{})&EOId={}",
        dsrc,
        version,
        fmt_instant(&period.begin),
        fmt_instant(&period.end),
        aoi.min_y,
        aoi.max_y,
        aoi.min_x,
        aoi.max_x,
        dss_id
    )
}

/// GetCoverage URL prefix shared by all products of one run. The final
/// download URL appends the coverage id.
pub fn get_coverage_base_url(dsrc: &str, version: &str, subset: Option<&Bbox>) -> String {
    let mut url = format!(
        "{}?service=wcs&version={}&request=GetCoverage&format=image/tiff&mediatype=multipart/mixed",
        dsrc, version
    );
    if let Some(bb) = subset {
        url.push_str(&format!(
            "&subset=Lat,{uri}({},{})&subset=Long,{uri}({},{})",
            bb.min_y,
            bb.max_y,
            bb.min_x,
            bb.max_x,
            uri = ns::EPSG_4326_URI
        ));
    }
    url
}

pub fn coverage_url(base: &str, coverage_id: &str) -> String {
    format!("{}&CoverageId={}", base, coverage_id)
}

/// Catalogue HTTP client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Upper bound on response body size.
    pub max_response_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(30),
            max_response_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Client for catalogue metadata requests.
pub struct CatalogueClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl CatalogueClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Fetch and parse the service capabilities.
    #[instrument(skip(self))]
    pub async fn get_capabilities(&self, dsrc: &str) -> Result<Element> {
        self.fetch_xml(&get_capabilities_url(dsrc), "Capabilities")
            .await
    }

    /// Fetch the coverage set description for one dataset series.
    #[instrument(skip(self, period, aoi))]
    pub async fn describe_eo_coverage_set(
        &self,
        dsrc: &str,
        version: &str,
        period: &TimePeriod,
        aoi: &Bbox,
        dss_id: &str,
    ) -> Result<Element> {
        let url = describe_eo_coverage_set_url(dsrc, version, period, aoi, dss_id);
        self.fetch_xml(&url, "EOCoverageSetDescription").await
    }

    async fn fetch_xml(&self, url: &str, expected_root: &str) -> Result<Element> {
        debug!(url, "Catalogue request");
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let body = resp.text().await?;
        if body.len() > self.config.max_response_bytes {
            return Err(CatalogueError::ResponseTooLarge {
                size: body.len(),
                limit: self.config.max_response_bytes,
            });
        }

        let root = Element::parse(&body)?;
        if root.name == "ExceptionReport" {
            let detail = exception_text(&root);
            warn!(url, %detail, "Service returned an exception report");
            return Err(CatalogueError::ServiceException(detail));
        }
        if root.name != expected_root {
            return Err(CatalogueError::UnexpectedRoot {
                expected: expected_root.to_string(),
                found: root.name.clone(),
            });
        }
        Ok(root)
    }
}

fn exception_text(report: &Element) -> String {
    report
        .descendant(ns::OWS, "ExceptionText")
        .map(|e| e.text_trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unspecified service exception".to_string())
}

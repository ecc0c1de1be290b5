//! The ingestion pipeline for one scenario run.
//!
//! A run asks the data source for its capabilities, finds the dataset
//! series matching the scenario, fetches the coverage descriptions for
//! each series, filters them against the scenario's conditions and
//! submits the surviving GetCoverage URLs to the DM as one DAR.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use catalogue::{
    client, conditions, metadata, CatalogueClient, ClientConfig, Element, SourceKind,
};
use coastline::{LandMask, MaskCheck, Point};
use dm_client::{
    build_dar, dar_response_url, DarEntry, DarRegistry, DmClient, DmClientConfig,
};
use eo_common::Bbox;
use metrics::counter;
use storage::{status_text, Scenario, ScenarioStore};
use tracing::{error, info, instrument, warn};

use crate::dirs;
use crate::download::{self, DownloadReport};
use crate::error::{IngestError, Result};

/// Engine-level settings shared by all runs.
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Root of the download directory tree, shared with the DM.
    pub dl_root: PathBuf,
    /// Port the engine's own HTTP interface listens on; the DM fetches
    /// DAR documents back from it.
    pub engine_port: u16,
    /// Upper bound on one download phase, `None` to wait forever.
    pub max_download_wait: Option<Duration>,
}

/// What one ingestion run produced.
#[derive(Debug)]
pub enum IngestOutcome {
    /// No coverage passed the filters; nothing was downloaded.
    NothingIngested,
    Downloaded {
        /// Absolute path of the run's download directory.
        dl_dir: PathBuf,
        dar_url: String,
        dl_errors: usize,
        /// Product subdirectories whose download failed, relative to
        /// the download root.
        failed_dirs: Vec<String>,
    },
}

/// Runs the catalogue-to-download part of the pipeline.
pub struct IngestionEngine {
    store: ScenarioStore,
    catalogue: CatalogueClient,
    dm: DmClient,
    registry: Arc<DarRegistry>,
    config: IngestionConfig,
}

impl IngestionEngine {
    pub fn new(
        store: ScenarioStore,
        dm_base_url: String,
        registry: Arc<DarRegistry>,
        config: IngestionConfig,
    ) -> Result<Self> {
        let catalogue = CatalogueClient::new(ClientConfig::default())?;
        let dm = DmClient::new(dm_base_url, DmClientConfig::default())?;
        Ok(Self {
            store,
            catalogue,
            dm,
            registry,
            config,
        })
    }

    pub fn dm(&self) -> &DmClient {
        &self.dm
    }

    /// One full ingestion run for a scenario: generate the download
    /// URLs, submit the DAR and wait for the downloads to finish.
    #[instrument(skip(self, sc), fields(ncn_id = %sc.ncn_id))]
    pub async fn ingest(&self, sc: &Scenario) -> Result<IngestOutcome> {
        counter!("ingest_runs_total").increment(1);
        dirs::ensure_dl_root(&self.config.dl_root)?;

        let urls = self.generate_urls(sc).await?;
        if urls.is_empty() {
            warn!(ncn_id = %sc.ncn_id, "no GetCoverage requests generated");
            return Ok(IngestOutcome::NothingIngested);
        }

        let (dl_dir, dar_url) = self.request_download(&sc.ncn_id, &urls).await?;
        let report = download::wait_for_download(
            &self.store,
            &self.dm,
            &sc.ncn_id,
            &dar_url,
            self.config.max_download_wait,
        )
        .await?;

        let DownloadReport {
            n_errors,
            failed_dirs,
            ..
        } = report;
        Ok(IngestOutcome::Downloaded {
            dl_dir,
            dar_url,
            dl_errors: n_errors,
            failed_dirs,
        })
    }

    /// GetCoverage URLs for every coverage of the scenario's dataset
    /// series that passes the filters.
    pub async fn generate_urls(&self, sc: &Scenario) -> Result<Vec<String>> {
        let kind = SourceKind::from_str(&sc.dsrc_type)?;
        client::validate_source(&sc.dsrc, kind)?;

        let caps = self
            .catalogue
            .get_capabilities(&sc.dsrc)
            .await
            .map_err(|e| {
                IngestError::Failed(format!(
                    "cannot get Capabilities from '{}': {}",
                    sc.dsrc, e
                ))
            })?;
        self.check_stop(&sc.ncn_id).await?;

        let version = metadata::service_version(&caps);
        let period = sc.period().ok_or_else(|| {
            IngestError::Failed(format!(
                "scenario '{}' has no acquisition time window",
                sc.ncn_id
            ))
        })?;

        let dss_ids = if !sc.dssids.is_empty() {
            sc.dssids.clone()
        } else {
            self.select_series(sc, &caps).await?
        };
        info!(ncn_id = %sc.ncn_id, n_series = dss_ids.len(), "qualified dataset series");

        let mask = self.build_mask(sc);
        let base_url = client::get_coverage_base_url(
            &sc.dsrc,
            &version,
            sc.download_subset.then_some(&sc.aoi),
        );

        let mut urls = Vec::new();
        let total = dss_ids.len();
        for (i, dss_id) in dss_ids.iter().enumerate() {
            self.check_stop(&sc.ncn_id).await?;

            let percent = (((i as f64) / (total as f64)) * 100.0).max(1.0);
            self.store
                .set_status(&sc.ncn_id, false, status_text::CREATE_DAR, percent)
                .await?;

            info!(ncn_id = %sc.ncn_id, %dss_id, "processing coverage set description");
            let root = match self
                .catalogue
                .describe_eo_coverage_set(&sc.dsrc, &version, &period, &sc.aoi, dss_id)
                .await
            {
                Ok(root) => root,
                Err(e) => {
                    error!(%dss_id, error = %e, "cannot get coverage set description");
                    continue;
                }
            };

            urls.extend(
                self.filter_coverages(sc, &root, &base_url, dss_id, mask.as_ref())
                    .await?,
            );
        }

        self.store
            .set_status(&sc.ncn_id, false, status_text::CREATE_DAR, 100.0)
            .await?;
        Ok(urls)
    }

    /// Ids of the advertised dataset series whose extent and time range
    /// overlap the scenario. Series without a usable extent are skipped.
    async fn select_series(&self, sc: &Scenario, caps: &Element) -> Result<Vec<String>> {
        let period = sc.period();
        let mut ids = Vec::new();

        for dss in metadata::dataset_series(caps) {
            self.check_stop(&sc.ncn_id).await?;

            let Some(dss_period) = dss.period else {
                warn!(dss_id = %dss.id, "no time range in dataset series summary");
                continue;
            };
            if let Some(req) = &period {
                if !req.overlaps(&dss_period) {
                    continue;
                }
            }

            let Some(bbox) = dss.bbox else {
                warn!(dss_id = %dss.id, "no bounding box in dataset series summary");
                continue;
            };
            if bbox.overlaps(&sc.aoi) {
                ids.push(dss.id);
            }
        }
        Ok(ids)
    }

    /// Load the land mask once per run. A scenario asking for the check
    /// without a usable polygon file runs unfiltered, with a log trail.
    fn build_mask(&self, sc: &Scenario) -> Option<LandMask> {
        if !sc.coastline_check {
            return None;
        }
        let Some(file) = &sc.coastline_file else {
            warn!(ncn_id = %sc.ncn_id, "coastline check requested but no polygon file set");
            return None;
        };
        match LandMask::from_geojson(Path::new(file), &sc.aoi) {
            Ok(mask) => Some(mask),
            Err(e) => {
                error!(%file, error = %e, "NOT checking coastline, cannot initialise mask");
                None
            }
        }
    }

    /// Apply the scenario's filters to one coverage set description and
    /// return the GetCoverage URLs of the coverages that pass.
    async fn filter_coverages(
        &self,
        sc: &Scenario,
        root: &Element,
        base_url: &str,
        eoid: &str,
        mask: Option<&LandMask>,
    ) -> Result<Vec<String>> {
        let cds = metadata::coverage_descriptions(root);
        if cds.is_empty() {
            warn!(eoid, "no CoverageDescriptions in coverage set description");
        }

        let mut urls = Vec::new();
        let mut failed: BTreeSet<&str> = BTreeSet::new();

        for cd in &cds {
            self.check_stop(&sc.ncn_id).await?;

            let Some(coverage_id) = metadata::coverage_id(cd) else {
                error!(eoid, "cannot find CoverageId in coverage description");
                continue;
            };

            if sc.check_archived && self.store.is_archived(&sc.ncn_id, &coverage_id).await? {
                continue;
            }

            let bbox = metadata::envelope_bbox(cd);
            if !bbox.is_some_and(|bb| bb.overlaps(&sc.aoi)) {
                failed.insert("bbox");
                continue;
            }

            let eo = metadata::earth_observation(cd);

            if let Some(req_period) = sc.period() {
                match eo.and_then(metadata::phenomenon_time) {
                    Some(tp) => {
                        if !tp.overlaps(&req_period) {
                            failed.insert("TimePeriod");
                            continue;
                        }
                    }
                    None => {
                        warn!(%coverage_id, "phenomenonTime not found in EO metadata");
                        failed.insert("TimePeriod");
                        continue;
                    }
                }
            }

            let sensor = eo.and_then(metadata::sensor_type);
            if !conditions::check_text("sensor_type", sensor.as_deref(), sc.sensor_type.as_deref())
            {
                failed.insert("sensor_type");
                continue;
            }

            let angle = eo.and_then(metadata::incidence_angle);
            if !conditions::check_float_max(
                "view_angle",
                angle.as_deref(),
                sc.view_angle.as_deref(),
                true,
            )? {
                failed.insert("view_angle");
                continue;
            }

            let clouds = eo.and_then(metadata::cloud_cover);
            if !conditions::check_float_max(
                "cloud_cover",
                clouds.as_deref(),
                sc.cloud_cover.as_deref(),
                false,
            )? {
                failed.insert("cloud_cover");
                continue;
            }

            if let Some(mask) = mask {
                if !touches_land(mask, eo, bbox) {
                    failed.insert("coastline");
                    continue;
                }
            }

            if !sc.custom_conditions.is_empty() {
                let ok = match eo {
                    Some(eo) => conditions::check_custom(eo, &sc.custom_conditions)?,
                    None => false,
                };
                if !ok {
                    failed.insert("custom conditions");
                    continue;
                }
            }

            urls.push(client::coverage_url(base_url, &coverage_id));
        }

        info!(
            eoid,
            passed = urls.len(),
            total = cds.len(),
            failed_conditions = ?failed,
            "coverage descriptions filtered"
        );
        counter!("coverages_passed_total").increment(urls.len() as u64);
        counter!("coverages_rejected_total").increment((cds.len() - urls.len()) as u64);
        Ok(urls)
    }

    /// Build the DAR for the generated URLs, hand it to the registry
    /// and submit its callback URL to the DM.
    pub async fn request_download(
        &self,
        ncn_id: &str,
        urls: &[String],
    ) -> Result<(PathBuf, String)> {
        let (full_path, rel_path) =
            dirs::create_dl_dir(&self.config.dl_root, &format!("{}_", ncn_id), None)?;

        let entries: Vec<DarEntry> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| DarEntry {
                download_dir: format!(
                    "{}/{}",
                    rel_path,
                    dirs::subdir_name(ncn_id, i + 1, urls.len())
                ),
                url: url.clone(),
            })
            .collect();

        let dar_xml = build_dar(&entries)?;
        let seq = self.registry.register(dar_xml).await;
        let dar_url = dar_response_url(self.config.engine_port, seq);

        self.dm.submit_dar(&dar_url).await?;
        if !self.store.set_active_dar(ncn_id, &dar_url).await? {
            return Err(IngestError::Failed(format!(
                "scenario '{}' already has an active DAR",
                ncn_id
            )));
        }
        info!(ncn_id, %dar_url, n_products = urls.len(), "DAR submitted");
        Ok((full_path, dar_url))
    }

    async fn check_stop(&self, ncn_id: &str) -> Result<()> {
        if self.store.stop_requested(ncn_id).await? {
            return Err(IngestError::Stopped);
        }
        Ok(())
    }
}

/// Coastline filter: keep the product when its footprint touches land
/// or the check cannot be made.
fn touches_land(mask: &LandMask, eo: Option<&Element>, envelope: Option<Bbox>) -> bool {
    let footprint: Vec<Point> = match eo.and_then(metadata::footprint) {
        Some(coords) => coords.into_iter().map(|(x, y)| Point::new(x, y)).collect(),
        None => match envelope {
            // Fall back to the envelope corners.
            Some(bb) => vec![
                Point::new(bb.min_x, bb.min_y),
                Point::new(bb.max_x, bb.min_y),
                Point::new(bb.max_x, bb.max_y),
                Point::new(bb.min_x, bb.max_y),
            ],
            None => Vec::new(),
        },
    };

    match mask.check(&footprint) {
        MaskCheck::Intersects | MaskCheck::Unchecked => true,
        MaskCheck::Clear => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const COVERAGES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wcs:CoverageDescriptions xmlns:wcs="http://www.opengis.net/wcs/2.0"
    xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:gmlcov="http://www.opengis.net/gmlcov/1.0"
    xmlns:wcseo="http://www.opengis.net/wcseo/1.0"
    xmlns:om="http://www.opengis.net/om/2.0"
    xmlns:eop="http://www.opengis.net/eop/2.0"
    xmlns:opt="http://www.opengis.net/opt/2.0">
  <wcs:CoverageDescription gml:id="cov_1">
    <gml:boundedBy>
      <gml:Envelope axisLabels="lat long">
        <gml:lowerCorner>51.0 9.0</gml:lowerCorner>
        <gml:upperCorner>52.0 10.0</gml:upperCorner>
      </gml:Envelope>
    </gml:boundedBy>
    <wcs:CoverageId>p_clear</wcs:CoverageId>
    <gmlcov:metadata><gmlcov:Extension><wcseo:EOMetadata>
      <eop:EarthObservation gml:id="eo_1">
        <om:phenomenonTime>
          <gml:TimePeriod gml:id="tp_1">
            <gml:beginPosition>2020-06-01T10:00:00Z</gml:beginPosition>
            <gml:endPosition>2020-06-01T10:00:10Z</gml:endPosition>
          </gml:TimePeriod>
        </om:phenomenonTime>
        <om:procedure>
          <eop:EarthObservationEquipment gml:id="eq_1">
            <eop:sensor><eop:Sensor><eop:sensorType>OPTICAL</eop:sensorType></eop:Sensor></eop:sensor>
          </eop:EarthObservationEquipment>
        </om:procedure>
        <om:result>
          <opt:EarthObservationResult gml:id="res_1">
            <opt:cloudCoverPercentage uom="%">10</opt:cloudCoverPercentage>
          </opt:EarthObservationResult>
        </om:result>
      </eop:EarthObservation>
    </wcseo:EOMetadata></gmlcov:Extension></gmlcov:metadata>
  </wcs:CoverageDescription>
  <wcs:CoverageDescription gml:id="cov_2">
    <gml:boundedBy>
      <gml:Envelope axisLabels="lat long">
        <gml:lowerCorner>51.0 9.0</gml:lowerCorner>
        <gml:upperCorner>52.0 10.0</gml:upperCorner>
      </gml:Envelope>
    </gml:boundedBy>
    <wcs:CoverageId>p_cloudy</wcs:CoverageId>
    <gmlcov:metadata><gmlcov:Extension><wcseo:EOMetadata>
      <eop:EarthObservation gml:id="eo_2">
        <om:phenomenonTime>
          <gml:TimePeriod gml:id="tp_2">
            <gml:beginPosition>2020-06-02T10:00:00Z</gml:beginPosition>
            <gml:endPosition>2020-06-02T10:00:10Z</gml:endPosition>
          </gml:TimePeriod>
        </om:phenomenonTime>
        <om:result>
          <opt:EarthObservationResult gml:id="res_2">
            <opt:cloudCoverPercentage uom="%">85</opt:cloudCoverPercentage>
          </opt:EarthObservationResult>
        </om:result>
      </eop:EarthObservation>
    </wcseo:EOMetadata></gmlcov:Extension></gmlcov:metadata>
  </wcs:CoverageDescription>
  <wcs:CoverageDescription gml:id="cov_3">
    <gml:boundedBy>
      <gml:Envelope axisLabels="lat long">
        <gml:lowerCorner>-10.0 170.0</gml:lowerCorner>
        <gml:upperCorner>-9.0 171.0</gml:upperCorner>
      </gml:Envelope>
    </gml:boundedBy>
    <wcs:CoverageId>p_far_away</wcs:CoverageId>
  </wcs:CoverageDescription>
</wcs:CoverageDescriptions>"#;

    fn scenario() -> Scenario {
        Scenario {
            ncn_id: "sc_test_1".into(),
            name: "t".into(),
            description: String::new(),
            dsrc: "http://cat.example.com/wcs".into(),
            dsrc_type: "EOWCS".into(),
            aoi: Bbox::new(8.0, 50.0, 12.3, 55.0),
            from_date: Some("2020-01-01T00:00:00Z".parse().unwrap()),
            to_date: Some("2020-12-31T23:59:59Z".parse().unwrap()),
            cloud_cover: Some("30".into()),
            view_angle: None,
            sensor_type: None,
            dssids: vec![],
            custom_conditions: vec![],
            repeat_interval: 0,
            starting_date: Utc::now(),
            coastline_check: false,
            coastline_file: None,
            check_archived: true,
            cat_registration: false,
            download_subset: false,
            tar_result: false,
            ingest_scripts: vec![],
            delete_scripts: vec![],
        }
    }

    async fn engine(store: ScenarioStore) -> IngestionEngine {
        IngestionEngine::new(
            store,
            "http://127.0.0.1:18082/download-manager/".into(),
            Arc::new(DarRegistry::new()),
            IngestionConfig {
                dl_root: std::env::temp_dir(),
                engine_port: 18000,
                max_download_wait: None,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_filters_cloud_cover_and_bbox() {
        let store = ScenarioStore::open_memory().await.unwrap();
        let sc = scenario();
        store.upsert_scenario(&sc).await.unwrap();
        let engine = engine(store).await;

        let root = Element::parse(COVERAGES).unwrap();
        let urls = engine
            .filter_coverages(&sc, &root, "http://base", "dss_1", None)
            .await
            .unwrap();

        assert_eq!(urls, vec!["http://base&CoverageId=p_clear".to_string()]);
    }

    #[tokio::test]
    async fn test_archived_products_are_skipped() {
        let store = ScenarioStore::open_memory().await.unwrap();
        let sc = scenario();
        store.upsert_scenario(&sc).await.unwrap();
        store.add_archived(&sc.ncn_id, "p_clear").await.unwrap();
        let engine = engine(store).await;

        let root = Element::parse(COVERAGES).unwrap();
        let urls = engine
            .filter_coverages(&sc, &root, "http://base", "dss_1", None)
            .await
            .unwrap();
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn test_missing_time_period_fails_when_window_set() {
        let store = ScenarioStore::open_memory().await.unwrap();
        let mut sc = scenario();
        sc.cloud_cover = None;
        store.upsert_scenario(&sc).await.unwrap();
        let engine = engine(store).await;

        // cov_3 has no EO metadata at all; with a time window set it
        // must not pass even though its filters would.
        let root = Element::parse(COVERAGES).unwrap();
        let urls = engine
            .filter_coverages(&sc, &root, "http://base", "dss_1", None)
            .await
            .unwrap();
        assert!(!urls.iter().any(|u| u.contains("p_far_away")));
    }

    #[tokio::test]
    async fn test_bad_filter_value_aborts_run() {
        let store = ScenarioStore::open_memory().await.unwrap();
        let mut sc = scenario();
        sc.cloud_cover = Some("lots".into());
        store.upsert_scenario(&sc).await.unwrap();
        let engine = engine(store).await;

        let root = Element::parse(COVERAGES).unwrap();
        let result = engine
            .filter_coverages(&sc, &root, "http://base", "dss_1", None)
            .await;
        assert!(matches!(result, Err(IngestError::Catalogue(_))));
    }

    #[tokio::test]
    async fn test_stop_request_aborts_filtering() {
        let store = ScenarioStore::open_memory().await.unwrap();
        let sc = scenario();
        store.upsert_scenario(&sc).await.unwrap();
        store
            .set_status(&sc.ncn_id, false, status_text::STOP_REQUEST, 0.0)
            .await
            .unwrap();
        let engine = engine(store).await;

        let root = Element::parse(COVERAGES).unwrap();
        let result = engine
            .filter_coverages(&sc, &root, "http://base", "dss_1", None)
            .await;
        assert!(matches!(result, Err(IngestError::Stopped)));
    }

    #[test]
    fn test_touches_land_falls_back_to_envelope() {
        let mask = LandMask::from_rings(vec![vec![
            Point::new(9.0, 51.0),
            Point::new(11.0, 51.0),
            Point::new(11.0, 53.0),
            Point::new(9.0, 53.0),
        ]]);

        let on_land = Some(Bbox::new(9.5, 51.5, 10.5, 52.5));
        assert!(touches_land(&mask, None, on_land));

        let at_sea = Some(Bbox::new(20.0, 60.0, 21.0, 61.0));
        assert!(!touches_land(&mask, None, at_sea));

        // No footprint and no envelope: the check cannot be made.
        assert!(touches_land(&mask, None, None));
    }
}

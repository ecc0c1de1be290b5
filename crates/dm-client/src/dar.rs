//! ngEO data access request (DAR) document.
//!
//! The DM polls the callback URL we pass it and expects a
//! DataAccessMonitoring-Resp document listing every product URL with
//! its target download directory. The status is always IN_PROGRESS and
//! every product READY; the DM takes it from there.

use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;

use crate::error::{DmError, Result};

const NGEO_NS: &str = "http://ngeo.eo.esa.int/iicd-d-ws/1.0";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str =
    "http://ngeo.eo.esa.int/iicd-d-ws/1.0 IF-ngEO-DataAccessMonitoring-Resp.xsd";

/// One product in a DAR: where to put it and where to get it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DarEntry {
    pub download_dir: String,
    pub url: String,
}

/// Serialize the DAR document for the given products.
pub fn build_dar(entries: &[DarEntry]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element("ngeo:DataAccessMonitoring-Resp")
        .with_attributes([
            ("xmlns:ngeo", NGEO_NS),
            ("xmlns:xsi", XSI_NS),
            ("xsi:schemaLocation", SCHEMA_LOCATION),
        ])
        .write_inner_content(|w| {
            w.create_element("ngeo:MonitoringStatus")
                .write_text_content(BytesText::new("IN_PROGRESS"))?;

            w.create_element("ngeo:ProductAccessList")
                .write_inner_content(|w| {
                    for entry in entries {
                        w.create_element("ngeo:ProductAccess")
                            .write_inner_content(|w| {
                                w.create_element("ngeo:ProductAccessURL")
                                    .write_text_content(BytesText::new(&entry.url))?;
                                w.create_element("ngeo:ProductAccessStatus")
                                    .write_text_content(BytesText::new("READY"))?;
                                w.create_element("ngeo:ProductDownloadDirectory")
                                    .write_text_content(BytesText::new(&entry.download_dir))?;
                                Ok::<(), DmError>(())
                            })?;
                    }
                    Ok::<(), DmError>(())
                })?;
            Ok::<(), DmError>(())
        })?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_dar() {
        let entries = vec![
            DarEntry {
                download_dir: "2020/06/sc1_15_101502_123abcde/p_sc1_001".into(),
                url: "http://cat.example.com/wcs?request=GetCoverage&CoverageId=p1".into(),
            },
            DarEntry {
                download_dir: "2020/06/sc1_15_101502_123abcde/p_sc1_002".into(),
                url: "http://cat.example.com/wcs?request=GetCoverage&CoverageId=p2".into(),
            },
        ];

        let xml = build_dar(&entries).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains(
            "<ngeo:DataAccessMonitoring-Resp xmlns:ngeo=\"http://ngeo.eo.esa.int/iicd-d-ws/1.0\""
        ));
        assert!(xml.contains("<ngeo:MonitoringStatus>IN_PROGRESS</ngeo:MonitoringStatus>"));
        assert_eq!(xml.matches("<ngeo:ProductAccess>").count(), 2);
        assert_eq!(
            xml.matches("<ngeo:ProductAccessStatus>READY</ngeo:ProductAccessStatus>").count(),
            2
        );

        // URL comes before status, status before directory.
        let url_pos = xml.find("ProductAccessURL").unwrap();
        let status_pos = xml.find("ProductAccessStatus").unwrap();
        let dir_pos = xml.find("ProductDownloadDirectory").unwrap();
        assert!(url_pos < status_pos && status_pos < dir_pos);

        // Ampersands in URLs are escaped.
        assert!(xml.contains("request=GetCoverage&amp;CoverageId=p1"));
    }

    #[test]
    fn test_empty_dar_has_no_products() {
        let xml = build_dar(&[]).unwrap();
        assert!(!xml.contains("ProductAccess>"));
        assert!(xml.contains("ProductAccessList"));
    }
}

//! Namespace-aware XML document model.
//!
//! Catalogue responses are small enough to hold in memory, and the
//! extractors need to walk the same subtrees repeatedly under several
//! candidate namespaces, so the streaming events are folded into a
//! simple element tree first.

use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

use crate::error::{CatalogueError, Result};

/// One XML element: namespace URI, local name, attributes (by local
/// name), direct text content and child elements.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub ns: String,
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

/// A path segment: optional namespace URI (`None` matches any) plus
/// local name.
pub type PathSeg<'a> = (Option<&'a str>, &'a str);

impl Element {
    /// Parse a complete document into its root element.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = NsReader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let mut el = element_from_start(&reader, &e)?;
                    el.children = Vec::new();
                    stack.push(el);
                }
                Event::Empty(e) => {
                    let el = element_from_start(&reader, &e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(el),
                        None => return Ok(el),
                    }
                }
                Event::Text(t) => {
                    if let Some(el) = stack.last_mut() {
                        el.text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(t) => {
                    if let Some(el) = stack.last_mut() {
                        el.text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
                Event::End(_) => {
                    let el = match stack.pop() {
                        Some(el) => el,
                        None => {
                            return Err(CatalogueError::ServiceException(
                                "Malformed XML: unbalanced end tag".into(),
                            ))
                        }
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(el),
                        None => return Ok(el),
                    }
                }
                Event::Eof => {
                    return Err(CatalogueError::ServiceException(
                        "Malformed XML: no root element".into(),
                    ))
                }
                _ => {}
            }
        }
    }

    /// True when namespace URI and local name both match.
    pub fn is(&self, ns: &str, name: &str) -> bool {
        self.name == name && self.ns == ns
    }

    /// First direct child with the given namespace and local name.
    pub fn child(&self, ns: &str, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(ns, name))
    }

    /// All direct children with the given namespace and local name.
    pub fn children_named<'a>(
        &'a self,
        ns: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.is(ns, name))
    }

    /// Trimmed text content.
    pub fn text_trim(&self) -> &str {
        self.text.trim()
    }

    /// Attribute value by local name (prefixes are ignored).
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First element matching `path` below this one (depth-first over
    /// all matches at each level).
    pub fn find(&self, path: &[PathSeg<'_>]) -> Option<&Element> {
        let Some(((seg_ns, seg_name), rest)) = path.split_first() else {
            return Some(self);
        };
        self.children
            .iter()
            .filter(|c| seg_matches(c, *seg_ns, seg_name))
            .find_map(|c| c.find(rest))
    }

    /// All elements matching `path` below this one.
    pub fn find_all<'a>(&'a self, path: &[PathSeg<'_>]) -> Vec<&'a Element> {
        let Some(((seg_ns, seg_name), rest)) = path.split_first() else {
            return vec![self];
        };
        self.children
            .iter()
            .filter(|c| seg_matches(c, *seg_ns, seg_name))
            .flat_map(|c| c.find_all(rest))
            .collect()
    }

    /// Like [`Element::find`], but the path may start at any depth in
    /// the subtree rather than at a direct child. Mirrors an XPath
    /// `.//a/b` search: every element matching the path's head is
    /// tried, not just the first.
    pub fn find_anywhere(&self, path: &[PathSeg<'_>]) -> Option<&Element> {
        let Some(((seg_ns, seg_name), rest)) = path.split_first() else {
            return Some(self);
        };
        let mut stack: Vec<&Element> = vec![self];
        while let Some(el) = stack.pop() {
            for c in &el.children {
                if seg_matches(c, *seg_ns, seg_name) {
                    if let Some(found) = c.find(rest) {
                        return Some(found);
                    }
                }
                stack.push(c);
            }
        }
        None
    }

    /// First descendant (any depth) with the given namespace and name.
    pub fn descendant(&self, ns: &str, name: &str) -> Option<&Element> {
        for c in &self.children {
            if c.is(ns, name) {
                return Some(c);
            }
            if let Some(found) = c.descendant(ns, name) {
                return Some(found);
            }
        }
        None
    }
}

fn seg_matches(el: &Element, ns: Option<&str>, name: &str) -> bool {
    el.name == name && ns.map_or(true, |ns| el.ns == ns)
}

fn element_from_start(
    reader: &NsReader<&[u8]>,
    e: &quick_xml::events::BytesStart<'_>,
) -> Result<Element> {
    let (res, local) = reader.resolve_element(e.name());
    let ns = match res {
        ResolveResult::Bound(ns) => String::from_utf8_lossy(ns.as_ref()).into_owned(),
        _ => String::new(),
    };
    let name = String::from_utf8_lossy(local.as_ref()).into_owned();

    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        if attr.key.as_ref().starts_with(b"xmlns") {
            continue;
        }
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }

    Ok(Element {
        ns,
        name,
        attrs,
        text: String::new(),
        children: Vec::new(),
    })
}

/// Parse a slash-separated `prefix:name` path into segments. A segment
/// without a prefix matches any namespace; unknown prefixes are an
/// error.
pub fn parse_prefixed_path(path: &str) -> Result<Vec<(Option<String>, String)>> {
    let mut segs = Vec::new();
    for raw in path.split('/') {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CatalogueError::InvalidConditionPath(path.to_string()));
        }
        match raw.split_once(':') {
            Some((prefix, local)) => {
                let uri = crate::ns::prefix_to_uri(prefix).ok_or_else(|| {
                    CatalogueError::InvalidConditionPath(format!(
                        "{} (unknown prefix '{}')",
                        path, prefix
                    ))
                })?;
                segs.push((Some(uri.to_string()), local.to_string()));
            }
            None => segs.push((None, raw.to_string())),
        }
    }
    Ok(segs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wcs:Capabilities xmlns:wcs="http://www.opengis.net/wcs/2.0"
                  xmlns:ows="http://www.opengis.net/ows/2.0"
                  version="2.0.1">
  <ows:ServiceIdentification>
    <ows:ServiceTypeVersion>2.0.1</ows:ServiceTypeVersion>
  </ows:ServiceIdentification>
  <wcs:Contents>
    <wcs:CoverageSummary><wcs:CoverageId>a</wcs:CoverageId></wcs:CoverageSummary>
    <wcs:CoverageSummary><wcs:CoverageId>b</wcs:CoverageId></wcs:CoverageSummary>
  </wcs:Contents>
</wcs:Capabilities>"#;

    #[test]
    fn test_parse_resolves_namespaces() {
        let root = Element::parse(DOC).unwrap();
        assert!(root.is(ns::WCS, "Capabilities"));
        assert_eq!(root.attr("version"), Some("2.0.1"));
    }

    #[test]
    fn test_find_descends_namespaced_path() {
        let root = Element::parse(DOC).unwrap();
        let v = root
            .find(&[
                (Some(ns::OWS), "ServiceIdentification"),
                (Some(ns::OWS), "ServiceTypeVersion"),
            ])
            .unwrap();
        assert_eq!(v.text_trim(), "2.0.1");
    }

    #[test]
    fn test_find_all_returns_every_match() {
        let root = Element::parse(DOC).unwrap();
        let ids = root.find_all(&[
            (Some(ns::WCS), "Contents"),
            (Some(ns::WCS), "CoverageSummary"),
            (Some(ns::WCS), "CoverageId"),
        ]);
        let texts: Vec<&str> = ids.iter().map(|e| e.text_trim()).collect();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn test_find_anywhere_starts_at_any_depth() {
        let root = Element::parse(DOC).unwrap();

        // A single deep tag, unanchored.
        let id = root.find_anywhere(&[(Some(ns::WCS), "CoverageId")]).unwrap();
        assert_eq!(id.text_trim(), "a");

        // A partial path not rooted at a direct child.
        let id = root
            .find_anywhere(&[
                (Some(ns::WCS), "CoverageSummary"),
                (Some(ns::WCS), "CoverageId"),
            ])
            .unwrap();
        assert_eq!(id.text_trim(), "a");

        assert!(root.find_anywhere(&[(Some(ns::WCS), "nope")]).is_none());
    }

    #[test]
    fn test_prefixed_path_parsing() {
        let segs = parse_prefixed_path("om:procedure/eop:sensorType").unwrap();
        assert_eq!(segs[0], (Some(ns::OM.to_string()), "procedure".to_string()));
        assert_eq!(segs[1], (Some(ns::EOP.to_string()), "sensorType".to_string()));

        assert!(parse_prefixed_path("bogus:x").is_err());
        assert!(parse_prefixed_path("a//b").is_err());
    }

    #[test]
    fn test_unbalanced_document_is_an_error() {
        assert!(Element::parse("<a><b></a>").is_err());
    }
}

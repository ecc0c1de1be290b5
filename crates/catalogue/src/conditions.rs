//! Per-product filter predicates.
//!
//! A product is only downloaded when every configured condition holds.
//! Missing or unparsable metadata never disqualifies a product; only a
//! present value that violates the condition does. A malformed value on
//! the scenario side is a configuration error and aborts the run.

use tracing::warn;

use crate::error::{CatalogueError, Result};
use crate::xml::{parse_prefixed_path, Element, PathSeg};

/// Exact-text condition. Passes when nothing was requested or the
/// metadata lacks the field.
pub fn check_text(what: &str, md: Option<&str>, requested: Option<&str>) -> bool {
    let Some(req) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };
    match md.map(str::trim).filter(|s| !s.is_empty()) {
        None => {
            warn!(what, "Metadata field missing, condition not checked");
            true
        }
        Some(value) => value == req,
    }
}

/// Numeric upper-bound condition. With `use_abs` the magnitude of the
/// metadata value is compared, so e.g. a view angle of -12.5 violates a
/// maximum of 10.
pub fn check_float_max(
    what: &str,
    md: Option<&str>,
    requested: Option<&str>,
    use_abs: bool,
) -> Result<bool> {
    let Some(req_raw) = requested.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(true);
    };
    let req: f64 = req_raw.parse().map_err(|_| {
        CatalogueError::InvalidFilterValue(format!("{}: '{}'", what, req_raw))
    })?;

    let Some(md_raw) = md.map(str::trim).filter(|s| !s.is_empty()) else {
        warn!(what, "Metadata field missing, condition not checked");
        return Ok(true);
    };
    let value: f64 = match md_raw.parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(what, value = md_raw, "Unparsable metadata value, condition not checked");
            return Ok(true);
        }
    };

    let value = if use_abs { value.abs() } else { value };
    Ok(value <= req)
}

/// User-defined conditions against the EarthObservation subtree, ANDed.
///
/// Each condition is a prefixed element path plus an expected text; an
/// empty expected text only requires the element to exist. The path may
/// start anywhere in the subtree, so a single deep tag like
/// `eop:status` works without spelling out its ancestors. A path that
/// resolves to nothing fails the product.
pub fn check_custom(eo: &Element, conditions: &[(String, String)]) -> Result<bool> {
    for (path, expected) in conditions {
        if path.trim().is_empty() {
            continue;
        }
        let segs = parse_prefixed_path(path)?;
        let seg_refs: Vec<PathSeg<'_>> = segs
            .iter()
            .map(|(ns, name)| (ns.as_deref(), name.as_str()))
            .collect();

        let Some(found) = eo.find_anywhere(&seg_refs) else {
            return Ok(false);
        };
        let expected = expected.trim();
        if !expected.is_empty() && found.text_trim() != expected {
            return Ok(false);
        }
    }
    Ok(true)
}

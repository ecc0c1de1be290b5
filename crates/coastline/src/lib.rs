//! Land-mask construction and footprint testing.
//!
//! A scenario with the coastline check enabled only ingests products whose
//! footprint touches land. The mask is built once per run by clipping land
//! polygons to the scenario's area of interest; each candidate footprint is
//! then tested against the clipped rings.

pub mod clip;
pub mod mask;

pub use clip::{clip_ring, point_in_ring, Point};
pub use mask::{LandMask, MaskCheck, MaskError};

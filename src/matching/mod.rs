// src/matching/mod.rs
//
// Parcel matching subsystem.
//
// Signal flow:
//   Observation position → index (R-tree prefilter) ─┐
//                                                     ├→ matcher (two-pass) → MatchOutcome
//   Parcel boundaries → geometry (validated shapes) ─┘

pub mod geometry;
pub mod index;
pub mod matcher;

pub use geometry::{haversine_meters, BoundaryGeometry, LocalProjection, ParcelShape};
pub use index::ParcelIndex;
pub use matcher::{MatchOutcome, ParcelMatcher};

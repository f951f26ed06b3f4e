//! # rayloc-core: Event and Hypocenter Modeling Core
//!
//! Provides the fundamental data structures for single-event seismic
//! hypocenter location.
//!
//! ## Design Philosophy
//!
//! One [`Event`] owns everything mutable for a run:
//! - **Arenas**: stations and picks live in flat vectors addressed by the
//!   newtype indices [`StationIdx`] and [`PickIdx`], so groups and weighted
//!   residuals reference their owners without lifetimes or back-pointers.
//! - **Caches**: the hypocenter and every station carry precomputed
//!   geocentric trigonometry ([`geo::TrigCache`]); delta/azimuth updates per
//!   iteration are pure arithmetic.
//! - **Statuses, not exceptions**: the refinement loop reports
//!   [`StepStatus`]/[`LocStatus`] values; hard failures use [`LocError`].
//!
//! Reference data (craton polygons in [`CratonSet`], Marsden-square zone
//! statistics in [`ZoneStats`]) is immutable after load and may be shared
//! across events by read-only reference.
//!
//! ## Modules
//!
//! - [`geo`] - Great-circle distance/azimuth and geocentric conversions
//! - [`station`] / [`pick`] - Observation model
//! - [`hypo`] - Hypocenter state, step application, audit snapshots
//! - [`wres`] - Weighted residual rows for the R-estimator
//! - [`event`] - The owning event container
//! - [`craton`] / [`zones`] - Auxiliary reference data
//! - [`error`] / [`status`] - Error and status types

pub mod craton;
pub mod error;
pub mod event;
pub mod geo;
pub mod hypo;
pub mod pick;
pub mod station;
pub mod status;
pub mod wres;
pub mod zones;

pub use craton::{Craton, CratonSet};
pub use error::{LocError, LocResult};
pub use event::Event;
pub use geo::{delta_azimuth, geocen_colat, geographic_lat, wrap_lon, TrigCache, DEG2KM};
pub use hypo::{HypoAudit, Hypocenter, DEPTH_MAX, DEPTH_MIN};
pub use pick::{AuthorType, Pick, PickGroup, PickIdx, StationIdx};
pub use station::{Station, StationKey};
pub use status::{exit_code, ExitCode, LocStatus, StepStatus, DELTA_TOL, DEPTH_TOL};
pub use wres::WeightedResidual;
pub use zones::{ZoneStat, ZoneStats};

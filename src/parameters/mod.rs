//! # Parameter Layout
//!
//! The flat parameter vector holds, for each secondary body, the block
//! `sma, ecc, inc, aop, pan, tau`, followed by the shared `plx` and `mtot`:
//!
//! ```text
//! [sma1, ecc1, inc1, aop1, pan1, tau1, sma2, ..., tau2, plx, mtot]
//! ```
//!
//! [`ParameterIndexer`] resolves labels to positions so callers can target a
//! single dimension, e.g. to fix an eccentricity or shift an angle of every walker.
//!
//! ## Example Usage
//!
//! ```rust
//! use orbitfit_rs::parameters::{OrbitalElement, ParameterIndexer};
//!
//! let indexer = ParameterIndexer::new(1).unwrap();
//! let ecc = indexer.require("ecc1").unwrap();
//! assert_eq!(ecc, indexer.body_index(1, OrbitalElement::Eccentricity).unwrap());
//! assert_eq!(indexer.labels().last().unwrap(), "mtot");
//! ```

pub mod indexer;

pub use indexer::{OrbitalElement, ParameterIndexer, ELEMENTS_PER_BODY, SHARED_PARAMS};

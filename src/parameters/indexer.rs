//! Parameter indexer implementation
//!
//! Maps semantic parameter labels (`sma1`, `ecc1`, ..., `plx`, `mtot`) to fixed
//! positions in the flat parameter vector. The layout is a pure function of the
//! number of secondary bodies.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{OrbitFitError, Result};

/// Number of orbital elements per secondary body.
pub const ELEMENTS_PER_BODY: usize = 6;

/// Number of parameters shared by all bodies (parallax, total mass).
pub const SHARED_PARAMS: usize = 2;

/// The per-body orbital elements, in parameter-vector order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrbitalElement {
    /// Semi-major axis (AU)
    SemiMajorAxis,
    /// Eccentricity
    Eccentricity,
    /// Inclination (radians)
    Inclination,
    /// Argument of periastron (radians)
    ArgumentOfPeriastron,
    /// Position angle of the ascending node (radians)
    PositionAngleOfNodes,
    /// Epoch of periastron passage, as a fraction of the period past the reference epoch
    EpochOfPeriastron,
}

impl OrbitalElement {
    /// All elements in block order.
    pub const ALL: [OrbitalElement; ELEMENTS_PER_BODY] = [
        OrbitalElement::SemiMajorAxis,
        OrbitalElement::Eccentricity,
        OrbitalElement::Inclination,
        OrbitalElement::ArgumentOfPeriastron,
        OrbitalElement::PositionAngleOfNodes,
        OrbitalElement::EpochOfPeriastron,
    ];

    /// Offset of the element inside a body's block.
    pub fn offset(self) -> usize {
        match self {
            OrbitalElement::SemiMajorAxis => 0,
            OrbitalElement::Eccentricity => 1,
            OrbitalElement::Inclination => 2,
            OrbitalElement::ArgumentOfPeriastron => 3,
            OrbitalElement::PositionAngleOfNodes => 4,
            OrbitalElement::EpochOfPeriastron => 5,
        }
    }

    /// Short label prefix, e.g. `"sma"`.
    pub fn prefix(self) -> &'static str {
        match self {
            OrbitalElement::SemiMajorAxis => "sma",
            OrbitalElement::Eccentricity => "ecc",
            OrbitalElement::Inclination => "inc",
            OrbitalElement::ArgumentOfPeriastron => "aop",
            OrbitalElement::PositionAngleOfNodes => "pan",
            OrbitalElement::EpochOfPeriastron => "tau",
        }
    }
}

impl fmt::Display for OrbitalElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefix())
    }
}

/// Name-to-index mapping for the flat parameter vector.
///
/// # Examples
///
/// ```
/// use orbitfit_rs::parameters::ParameterIndexer;
///
/// let indexer = ParameterIndexer::new(2).unwrap();
/// assert_eq!(indexer.len(), 14);
/// assert_eq!(indexer.index("ecc2"), Some(7));
/// assert_eq!(indexer.index("plx"), Some(12));
/// assert_eq!(indexer.index("mtot"), Some(13));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterIndexer {
    num_bodies: usize,
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl ParameterIndexer {
    /// Build the mapping for `num_bodies` secondary bodies.
    pub fn new(num_bodies: usize) -> Result<Self> {
        if num_bodies == 0 {
            return Err(OrbitFitError::InvalidConfiguration(
                "number of secondary bodies must be at least 1".to_string(),
            ));
        }

        let mut labels = Vec::with_capacity(num_bodies * ELEMENTS_PER_BODY + SHARED_PARAMS);
        for body in 1..=num_bodies {
            for element in OrbitalElement::ALL {
                labels.push(format!("{}{}", element.prefix(), body));
            }
        }
        labels.push("plx".to_string());
        labels.push("mtot".to_string());

        let index = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (label.clone(), i))
            .collect();

        Ok(Self {
            num_bodies,
            labels,
            index,
        })
    }

    /// Number of secondary bodies.
    pub fn num_bodies(&self) -> usize {
        self.num_bodies
    }

    /// Total length of the parameter vector.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false: there is at least one body.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in parameter-vector order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Position of a label, if known.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Position of a label, or `ParameterNotFound`.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.index(name)
            .ok_or_else(|| OrbitFitError::ParameterNotFound(name.to_string()))
    }

    /// Position of `element` for the 1-based `body`.
    pub fn body_index(&self, body: usize, element: OrbitalElement) -> Result<usize> {
        if body == 0 || body > self.num_bodies {
            return Err(OrbitFitError::ParameterNotFound(format!(
                "{}{} (system has {} bodies)",
                element.prefix(),
                body,
                self.num_bodies
            )));
        }
        Ok((body - 1) * ELEMENTS_PER_BODY + element.offset())
    }

    /// Start of the 6-element block of the 1-based `body`.
    pub(crate) fn body_offset(&self, body: usize) -> usize {
        (body - 1) * ELEMENTS_PER_BODY
    }

    /// Position of the parallax.
    pub fn plx_index(&self) -> usize {
        self.labels.len() - 2
    }

    /// Position of the total mass.
    pub fn mtot_index(&self) -> usize {
        self.labels.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_for_two_bodies() {
        let indexer = ParameterIndexer::new(2).unwrap();
        let expected = vec![
            "sma1", "ecc1", "inc1", "aop1", "pan1", "tau1", "sma2", "ecc2", "inc2", "aop2",
            "pan2", "tau2", "plx", "mtot",
        ];
        assert_eq!(indexer.labels(), expected.as_slice());
    }

    #[test]
    fn test_shared_parameters_trail() {
        for n in 1..6 {
            let indexer = ParameterIndexer::new(n).unwrap();
            assert_eq!(indexer.len(), 6 * n + 2);
            assert_eq!(indexer.index("plx"), Some(indexer.len() - 2));
            assert_eq!(indexer.index("mtot"), Some(indexer.len() - 1));
            assert_eq!(indexer.plx_index(), indexer.len() - 2);
            assert_eq!(indexer.mtot_index(), indexer.len() - 1);
        }
    }

    #[test]
    fn test_indexer_is_reproducible() {
        let a = ParameterIndexer::new(3).unwrap();
        let b = ParameterIndexer::new(3).unwrap();
        assert_eq!(a, b);
        for label in a.labels() {
            assert_eq!(a.index(label), b.index(label));
        }
    }

    #[test]
    fn test_body_index() {
        let indexer = ParameterIndexer::new(2).unwrap();
        assert_eq!(
            indexer.body_index(2, OrbitalElement::PositionAngleOfNodes).unwrap(),
            indexer.index("pan2").unwrap()
        );
        assert!(indexer.body_index(0, OrbitalElement::Eccentricity).is_err());
        assert!(indexer.body_index(3, OrbitalElement::Eccentricity).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(ParameterIndexer::new(0).is_err());
        let indexer = ParameterIndexer::new(1).unwrap();
        assert!(indexer.index("sma2").is_none());
        match indexer.require("omega") {
            Err(OrbitFitError::ParameterNotFound(name)) => assert_eq!(name, "omega"),
            other => panic!("unexpected result {:?}", other),
        }
    }
}

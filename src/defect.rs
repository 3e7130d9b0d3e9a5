use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Strength of a +1 defect.
pub const PLUS: f64 = 1.0;
/// Strength of a −1 defect.
pub const MINUS: f64 = -1.0;

#[derive(Debug, Error, PartialEq)]
pub enum PopulationError {
    #[error("duplicate defect name `{0}`")]
    DuplicateName(String),
}

// MARK: Defect
/// A point-like topological defect in the film.
///
/// Strength is fixed at construction. Position is only moved by the
/// simulation's commit phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    name: String,
    strength: f64,
    orientation: f64,
    position: Vector2<f64>,
}

impl Defect {
    pub fn new(
        name: impl Into<String>,
        strength: f64,
        position: Vector2<f64>,
        orientation: f64,
    ) -> Self {
        Defect {
            name: name.into(),
            strength,
            orientation,
            position,
        }
    }

    pub fn plus(name: impl Into<String>, position: Vector2<f64>, orientation: f64) -> Self {
        Self::new(name, PLUS, position, orientation)
    }

    pub fn minus(name: impl Into<String>, position: Vector2<f64>, orientation: f64) -> Self {
        Self::new(name, MINUS, position, orientation)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn orientation(&self) -> f64 {
        self.orientation
    }

    pub fn position(&self) -> Vector2<f64> {
        self.position
    }

    pub fn distance_to(&self, other: &Defect) -> f64 {
        (other.position - self.position).norm()
    }
}

// MARK: Population
/// Ordered set of live defects with unique names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Defect>", into = "Vec<Defect>")]
pub struct Population {
    defects: Vec<Defect>,
}

impl Population {
    pub fn new(defects: Vec<Defect>) -> Result<Self, PopulationError> {
        let mut seen = HashSet::with_capacity(defects.len());
        for defect in &defects {
            if !seen.insert(defect.name.as_str()) {
                return Err(PopulationError::DuplicateName(defect.name.clone()));
            }
        }
        Ok(Population { defects })
    }

    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Defect> {
        self.defects.iter()
    }

    pub fn len(&self) -> usize {
        self.defects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defects.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Defect> {
        self.defects.iter().find(|d| d.name == name)
    }

    /// Sum of all strengths.
    pub fn net_charge(&self) -> f64 {
        self.defects.iter().map(|d| d.strength).sum()
    }

    /// Replace every position at once. `positions` is index-aligned with the
    /// current population.
    pub(crate) fn commit_positions(&mut self, positions: Vec<Vector2<f64>>) {
        debug_assert_eq!(positions.len(), self.defects.len());
        for (defect, position) in self.defects.iter_mut().zip(positions) {
            defect.position = position;
        }
    }

    /// Keep every defect whose index is not in `removed`; returns the names dropped.
    pub(crate) fn remove_indices(&mut self, removed: &BTreeSet<usize>) -> Vec<String> {
        if removed.is_empty() {
            return Vec::new();
        }
        let mut dropped = Vec::with_capacity(removed.len());
        let survivors = self
            .defects
            .iter()
            .enumerate()
            .filter_map(|(idx, defect)| {
                if removed.contains(&idx) {
                    dropped.push(defect.name.clone());
                    None
                } else {
                    Some(defect.clone())
                }
            })
            .collect();
        self.defects = survivors;
        dropped
    }
}

impl TryFrom<Vec<Defect>> for Population {
    type Error = PopulationError;

    fn try_from(defects: Vec<Defect>) -> Result<Self, Self::Error> {
        Population::new(defects)
    }
}

impl From<Population> for Vec<Defect> {
    fn from(population: Population) -> Self {
        population.defects
    }
}

impl<'a> IntoIterator for &'a Population {
    type Item = &'a Defect;
    type IntoIter = std::slice::Iter<'a, Defect>;

    fn into_iter(self) -> Self::IntoIter {
        self.defects.iter()
    }
}

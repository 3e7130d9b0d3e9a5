use crate::config::{AnnihilationPolicy, FilmConstants, VelocityLaw};
use crate::defect::Defect;
use nalgebra::Vector2;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PhysicsError {
    #[error("singular interaction between `{a}` and `{b}` at separation {separation:e} m")]
    Singular { a: String, b: String, separation: f64 },
    #[error("no defect at index {0}")]
    UnknownDefect(usize),
    #[error("invalid Brownian standard deviation {0}")]
    InvalidNoise(f64),
}

// MARK: Velocity Law
impl VelocityLaw {
    /// Denominator of the pairwise interaction at separation `dist`.
    pub fn denominator(&self, dist: f64, core_radius: f64) -> f64 {
        match self {
            VelocityLaw::Sqrt => dist * dist,
            VelocityLaw::Yurke => dist * dist * (dist / core_radius).ln(),
        }
    }
}

/// MARK: Velocity Field
/// Deterministic velocity felt by `population[exclude]` if it sat at `query`.
///
/// Every other defect contributes `-(K/η) s_self s_other d / denom` with
/// `d = other - query`. The defect at `exclude` never acts on itself. A
/// separation below `film.min_separation`, or a vanishing denominator, is an
/// error rather than an infinite velocity.
pub fn velocity(
    query: &Vector2<f64>,
    exclude: usize,
    population: &[Defect],
    film: &FilmConstants,
) -> Result<Vector2<f64>, PhysicsError> {
    let this = population.get(exclude).ok_or(PhysicsError::UnknownDefect(exclude))?;
    let mut velocity = Vector2::zeros();

    for (idx, other) in population.iter().enumerate() {
        if idx == exclude {
            continue;
        }

        let displacement = other.position() - query;
        let dist = displacement.norm();
        let denom = film.law.denominator(dist, film.core_radius);

        if dist < film.min_separation || denom == 0.0 || !denom.is_finite() {
            return Err(PhysicsError::Singular {
                a: this.name().to_string(),
                b: other.name().to_string(),
                separation: dist,
            });
        }

        velocity -= displacement * (film.mobility * this.strength() * other.strength() / denom);
    }

    Ok(velocity)
}

// MARK: Stochastic Step
/// Source of the per-step thermal displacement.
pub trait StochasticStep {
    fn draw(&mut self) -> Vector2<f64>;
}

/// Gaussian displacement with standard deviation `sqrt(4D)` on each axis.
pub struct BrownianStep<R: Rng> {
    rng: R,
    normal: Normal<f64>,
}

impl<R: Rng> BrownianStep<R> {
    pub fn new(rng: R, sigma: f64) -> Result<Self, PhysicsError> {
        // Normal::new only checks finiteness; a negative spread is still a bad input.
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(PhysicsError::InvalidNoise(sigma));
        }
        let normal = Normal::new(0.0, sigma).map_err(|_| PhysicsError::InvalidNoise(sigma))?;
        Ok(BrownianStep { rng, normal })
    }

    pub fn from_film(rng: R, film: &FilmConstants) -> Result<Self, PhysicsError> {
        Self::new(rng, film.sigma)
    }
}

impl<R: Rng> StochasticStep for BrownianStep<R> {
    fn draw(&mut self) -> Vector2<f64> {
        let dx = self.normal.sample(&mut self.rng);
        let dy = self.normal.sample(&mut self.rng);
        Vector2::new(dx, dy)
    }
}

/// No thermal motion at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroNoise;

impl StochasticStep for ZeroNoise {
    fn draw(&mut self) -> Vector2<f64> {
        Vector2::zeros()
    }
}

// MARK: Integrator
/// Classical RK4 drift of `population[index]` over one `dt`.
///
/// All four stages see the same population; only the evaluation point moves.
pub fn rk4_drift(
    index: usize,
    population: &[Defect],
    film: &FilmConstants,
) -> Result<Vector2<f64>, PhysicsError> {
    let x0 = population.get(index).ok_or(PhysicsError::UnknownDefect(index))?.position();
    let dt = film.dt;

    let k1 = velocity(&x0, index, population, film)? * dt;
    let k2 = velocity(&(x0 + k1 * 0.5), index, population, film)? * dt;
    let k3 = velocity(&(x0 + k2 * 0.5), index, population, film)? * dt;
    let k4 = velocity(&(x0 + k3), index, population, film)? * dt;

    Ok((k1 + k2 * 2.0 + k3 * 2.0 + k4) / 6.0)
}

/// New position of `population[index]` after one step: drift plus one noise draw.
pub fn step(
    index: usize,
    population: &[Defect],
    film: &FilmConstants,
    noise: &mut dyn StochasticStep,
) -> Result<Vector2<f64>, PhysicsError> {
    let x0 = population.get(index).ok_or(PhysicsError::UnknownDefect(index))?.position();
    let drift = rk4_drift(index, population, film)?;
    Ok(x0 + drift + noise.draw())
}

// MARK: Annihilation
/// Equal and opposite charges closer than `annihilation_dist` annihilate.
pub fn check_pair(d1: &Defect, d2: &Defect, annihilation_dist: f64) -> bool {
    let (s1, s2) = (d1.strength(), d2.strength());
    if !(s1 * s2 < 0.0 && s1.abs() == s2.abs()) {
        return false;
    }
    d1.distance_to(d2) < annihilation_dist
}

/// Pairs accepted by one annihilation pass, as population indices.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Annihilations {
    pub pairs: Vec<(usize, usize)>,
}

impl Annihilations {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Every index that takes part in at least one accepted pair.
    pub fn removed(&self) -> BTreeSet<usize> {
        self.pairs.iter().flat_map(|&(a, b)| [a, b]).collect()
    }
}

/// Read-only scan deciding which defects vanish this step.
pub fn find_annihilations(
    population: &[Defect],
    annihilation_dist: f64,
    policy: AnnihilationPolicy,
) -> Annihilations {
    match policy {
        AnnihilationPolicy::FirstMatch => first_match(population, annihilation_dist),
        AnnihilationPolicy::NearestPair => nearest_pair(population, annihilation_dist),
    }
}

fn first_match(population: &[Defect], annihilation_dist: f64) -> Annihilations {
    let mut marked = BTreeSet::new();
    let mut pairs = Vec::new();

    for (i, d1) in population.iter().enumerate() {
        if marked.contains(&i) {
            continue;
        }
        // Partners already marked by an earlier d1 stay eligible.
        let partner = population
            .iter()
            .enumerate()
            .find(|&(j, d2)| j != i && check_pair(d1, d2, annihilation_dist));

        if let Some((j, _)) = partner {
            marked.insert(i);
            marked.insert(j);
            pairs.push((i, j));
        }
    }

    Annihilations { pairs }
}

fn nearest_pair(population: &[Defect], annihilation_dist: f64) -> Annihilations {
    let mut candidates = Vec::new();
    for (i, d1) in population.iter().enumerate() {
        for (j, d2) in population.iter().enumerate().skip(i + 1) {
            if check_pair(d1, d2, annihilation_dist) {
                candidates.push((d1.distance_to(d2), i, j));
            }
        }
    }

    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut matched = BTreeSet::new();
    let mut pairs = Vec::new();
    for (_, i, j) in candidates {
        if matched.contains(&i) || matched.contains(&j) {
            continue;
        }
        matched.insert(i);
        matched.insert(j);
        pairs.push((i, j));
    }

    Annihilations { pairs }
}

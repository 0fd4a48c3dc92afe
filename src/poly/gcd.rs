//! The top-level gcd of multivariate polynomials over the integers and finite fields.
//!
//! The inputs are simplified as much as possible before a modular algorithm
//! is selected: monomial and coefficient contents are removed, exponents are
//! deflated, variables that occur in only one input are eliminated, and the
//! remaining variables are sorted by the estimated degree of the gcd.

use std::cmp::{min, Reverse};
use std::fmt::{self, Display};

use rand::thread_rng;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, instrument};

use crate::rings::finite_field::{
    FiniteField, FiniteFieldCore, FiniteFieldWorkspace, PrimeIteratorU64, Zp,
};
use crate::rings::galois_field::GaloisField;
use crate::rings::integer::IntegerRing;
use crate::rings::{EuclideanDomain, EvaluationField, Ring};

use super::bma::{bma_modular, gcd_bma};
use super::brown::{brown_modular, gcd_brown};
use super::evaluate::{random_point, ImageError};
use super::polynomial::MultivariatePolynomial;
use super::zippel::{gcd_zippel, zippel_modular};
use super::{Exponent, INLINED_EXPONENTS};

/// Tuning parameters of the gcd computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcdConfig {
    /// The number of primes whose images are computed in parallel.
    pub threads: usize,
    /// The integer gcd uses primes larger than this number.
    pub prime_start: u64,
    /// The maximal number of primes an integer gcd may use.
    pub max_primes: Option<usize>,
    /// The maximal number of restarts after the coefficient bound is exceeded
    /// or the learnt shape of the gcd turns out to be wrong.
    pub max_restarts: usize,
    /// The number of consecutive unlucky evaluation points or primes that is tolerated.
    pub max_unlucky_points: usize,
    /// Brown's algorithm is used up to this number of variables...
    pub dense_max_vars: usize,
    /// ...when the dense size of the gcd is at most this number.
    pub dense_max_size: u64,
    /// Allow Berlekamp-Massey interpolation when the Kronecker bound is small enough.
    pub allow_bma: bool,
    /// The largest Kronecker bound for which Berlekamp-Massey is selected.
    pub bma_max_kronecker: u64,
    /// The number of extra terms after which a recurrence is considered stable.
    pub bma_stable_terms: usize,
    /// Override the automatic choice of algorithm.
    pub strategy: Option<GcdStrategy>,
    /// Use the primitive remainder sequence when a prime field is too small
    /// to supply evaluation points.
    pub small_field_fallback: bool,
}

impl Default for GcdConfig {
    fn default() -> Self {
        GcdConfig {
            threads: 1,
            prime_start: 1 << 62,
            max_primes: None,
            max_restarts: 16,
            max_unlucky_points: 20,
            dense_max_vars: 3,
            dense_max_size: 1 << 16,
            allow_bma: true,
            bma_max_kronecker: 1 << 12,
            bma_stable_terms: 2,
            strategy: None,
            small_field_fallback: true,
        }
    }
}

impl GcdConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_prime_start(mut self, prime_start: u64) -> Self {
        self.prime_start = prime_start;
        self
    }

    pub fn with_max_primes(mut self, max_primes: Option<usize>) -> Self {
        self.max_primes = max_primes;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_max_unlucky_points(mut self, max_unlucky_points: usize) -> Self {
        self.max_unlucky_points = max_unlucky_points;
        self
    }

    pub fn with_dense_limits(mut self, max_vars: usize, max_size: u64) -> Self {
        self.dense_max_vars = max_vars;
        self.dense_max_size = max_size;
        self
    }

    pub fn with_bma(mut self, allow: bool, max_kronecker: u64, stable_terms: usize) -> Self {
        self.allow_bma = allow;
        self.bma_max_kronecker = max_kronecker;
        self.bma_stable_terms = stable_terms;
        self
    }

    pub fn with_strategy(mut self, strategy: Option<GcdStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_small_field_fallback(mut self, fallback: bool) -> Self {
        self.small_field_fallback = fallback;
        self
    }
}

/// The modular algorithm used for a multivariate gcd.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GcdStrategy {
    /// Dense interpolation of every variable.
    Brown,
    /// Sparse interpolation from the shape of a first image.
    Zippel,
    /// Sparse interpolation at Kronecker-substituted points with Berlekamp-Massey.
    BerlekampMassey,
}

/// The features of a gcd problem that determine the strategy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProblemShape {
    /// Degree bounds of the gcd, main variable first.
    pub degrees: Vec<u32>,
    /// The characteristic of the coefficient field, if it is a prime field.
    pub prime: Option<u64>,
}

impl ProblemShape {
    pub fn new(degrees: Vec<u32>, prime: Option<u64>) -> Self {
        ProblemShape { degrees, prime }
    }

    pub fn nvars(&self) -> usize {
        self.degrees.len()
    }

    /// The number of monomials of a dense polynomial with the degree bounds.
    pub fn dense_size(&self) -> u64 {
        self.degrees
            .iter()
            .fold(1u64, |acc, d| acc.saturating_mul(*d as u64 + 1))
    }

    /// An upper bound on the Kronecker substitution of the non-main variables.
    /// The leading coefficient of the gcd is scaled, which can at most double
    /// the degrees.
    pub fn kronecker_bound(&self) -> u64 {
        self.degrees
            .iter()
            .skip(1)
            .fold(1u64, |acc, d| acc.saturating_mul(2 * *d as u64 + 1))
    }
}

impl GcdStrategy {
    /// Select the algorithm for a problem of shape `shape`.
    pub fn select(shape: &ProblemShape, config: &GcdConfig) -> GcdStrategy {
        let kronecker = shape.kronecker_bound();
        let bma_fits = shape.prime.map(|p| kronecker < p - 1).unwrap_or(true);

        if let Some(s) = config.strategy {
            if s == GcdStrategy::BerlekampMassey && !bma_fits {
                debug!("Field too small for Berlekamp-Massey: using Zippel");
                return GcdStrategy::Zippel;
            }
            return s;
        }

        if shape.nvars() <= config.dense_max_vars && shape.dense_size() <= config.dense_max_size {
            GcdStrategy::Brown
        } else if config.allow_bma && kronecker <= config.bma_max_kronecker && bma_fits {
            GcdStrategy::BerlekampMassey
        } else {
            GcdStrategy::Zippel
        }
    }
}

/// A gcd computation that ran out of resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GcdError {
    /// No more good primes are available.
    PrimesExhausted,
    /// The computation restarted too many times.
    RestartLimit,
    /// The prime field is too small to supply evaluation points.
    EvaluationPointsExhausted,
}

impl Display for GcdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GcdError::PrimesExhausted => write!(f, "ran out of primes"),
            GcdError::RestartLimit => write!(f, "exceeded the maximal number of restarts"),
            GcdError::EvaluationPointsExhausted => {
                write!(f, "ran out of evaluation points in the prime field")
            }
        }
    }
}

impl std::error::Error for GcdError {}

/// The coefficient rings that support a multivariate gcd.
pub trait PolynomialGCD<E: Exponent>: EuclideanDomain {
    /// The gcd of polynomials in the single variable `x`.
    fn gcd_univariate(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        x: usize,
    ) -> MultivariatePolynomial<Self, E>;

    /// Estimate the degree of the gcd in every variable in `vars`. The estimate
    /// can be too low due to an unfortunate prime or evaluation point.
    fn gcd_var_bounds(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        loose_bounds: &[E],
        config: &GcdConfig,
    ) -> SmallVec<[E; INLINED_EXPONENTS]>;

    /// Compute the gcd of `a` and `b` with `strategy`. The inputs have no
    /// coefficient content and no content with respect to `vars[0]`.
    fn gcd_modular(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        bounds: &mut [E],
        tight_bounds: &mut [E],
        strategy: GcdStrategy,
        config: &GcdConfig,
    ) -> Result<MultivariatePolynomial<Self, E>, GcdError>;

    /// The characteristic if the ring is a prime field.
    fn prime(&self) -> Option<u64>;

    fn normalize(a: MultivariatePolynomial<Self, E>) -> MultivariatePolynomial<Self, E>;
}

impl<E: Exponent> PolynomialGCD<E> for IntegerRing {
    fn gcd_univariate(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        x: usize,
    ) -> MultivariatePolynomial<Self, E> {
        a.from_univariate(&a.to_univariate(x).gcd_prs(&b.to_univariate(x)), x)
    }

    fn gcd_var_bounds(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        loose_bounds: &[E],
        config: &GcdConfig,
    ) -> SmallVec<[E; INLINED_EXPONENTS]> {
        let mut tight_bounds: SmallVec<[E; INLINED_EXPONENTS]> = loose_bounds.into();

        for p in PrimeIteratorU64::new(1 << 31).take(10) {
            let field = Zp::new(p as u32);
            let ap = a.to_finite_field(&field);
            let bp = b.to_finite_field(&field);
            if ap.is_zero()
                || bp.is_zero()
                || ap.last_exponents() != a.last_exponents()
                || bp.last_exponents() != b.last_exponents()
            {
                debug!("Variable bounds failed due to unlucky prime {}", p);
                continue;
            }

            for var in vars {
                if let Some(d) = gcd_degree_bound(&ap, &bp, vars, *var, config) {
                    tight_bounds[*var] = min(d, loose_bounds[*var]);
                }
            }
            break;
        }

        tight_bounds
    }

    fn gcd_modular(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        bounds: &mut [E],
        tight_bounds: &mut [E],
        strategy: GcdStrategy,
        config: &GcdConfig,
    ) -> Result<MultivariatePolynomial<Self, E>, GcdError> {
        match strategy {
            GcdStrategy::Brown => gcd_brown(a, b, vars, config),
            GcdStrategy::Zippel => gcd_zippel(a, b, vars, bounds, tight_bounds, config),
            GcdStrategy::BerlekampMassey => gcd_bma(a, b, vars, config),
        }
    }

    fn prime(&self) -> Option<u64> {
        None
    }

    fn normalize(a: MultivariatePolynomial<Self, E>) -> MultivariatePolynomial<Self, E> {
        if a.lcoeff().is_negative() {
            -a
        } else {
            a
        }
    }
}

impl<UField: FiniteFieldWorkspace, E: Exponent> PolynomialGCD<E> for FiniteField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    fn gcd_univariate(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        x: usize,
    ) -> MultivariatePolynomial<Self, E> {
        a.from_univariate(&a.to_univariate(x).gcd(&b.to_univariate(x)), x)
    }

    fn gcd_var_bounds(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        loose_bounds: &[E],
        config: &GcdConfig,
    ) -> SmallVec<[E; INLINED_EXPONENTS]> {
        field_var_bounds(a, b, vars, loose_bounds, config)
    }

    fn gcd_modular(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        bounds: &mut [E],
        tight_bounds: &mut [E],
        strategy: GcdStrategy,
        config: &GcdConfig,
    ) -> Result<MultivariatePolynomial<Self, E>, GcdError> {
        field_gcd_modular(a, b, vars, bounds, tight_bounds, config, |bounds, tight_bounds| {
            match strategy {
                GcdStrategy::Brown => brown_modular(a, b, vars, config),
                GcdStrategy::Zippel => zippel_modular(a, b, vars, bounds, tight_bounds, config),
                GcdStrategy::BerlekampMassey => bma_modular(a, b, vars, config),
            }
        })
    }

    fn prime(&self) -> Option<u64> {
        Some(self.get_prime().to_u64())
    }

    fn normalize(a: MultivariatePolynomial<Self, E>) -> MultivariatePolynomial<Self, E> {
        a.make_monic()
    }
}

impl<UField: FiniteFieldWorkspace, E: Exponent> PolynomialGCD<E> for GaloisField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    fn gcd_univariate(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        x: usize,
    ) -> MultivariatePolynomial<Self, E> {
        a.from_univariate(&a.to_univariate(x).gcd(&b.to_univariate(x)), x)
    }

    fn gcd_var_bounds(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        loose_bounds: &[E],
        config: &GcdConfig,
    ) -> SmallVec<[E; INLINED_EXPONENTS]> {
        field_var_bounds(a, b, vars, loose_bounds, config)
    }

    fn gcd_modular(
        a: &MultivariatePolynomial<Self, E>,
        b: &MultivariatePolynomial<Self, E>,
        vars: &[usize],
        bounds: &mut [E],
        tight_bounds: &mut [E],
        strategy: GcdStrategy,
        config: &GcdConfig,
    ) -> Result<MultivariatePolynomial<Self, E>, GcdError> {
        field_gcd_modular(a, b, vars, bounds, tight_bounds, config, |bounds, tight_bounds| {
            match strategy {
                GcdStrategy::Brown => brown_modular(a, b, vars, config),
                GcdStrategy::Zippel => zippel_modular(a, b, vars, bounds, tight_bounds, config),
                GcdStrategy::BerlekampMassey => {
                    debug!("No Berlekamp-Massey over {}: using Zippel", a.field);
                    zippel_modular(a, b, vars, bounds, tight_bounds, config)
                }
            }
        })
    }

    fn prime(&self) -> Option<u64> {
        None
    }

    fn normalize(a: MultivariatePolynomial<Self, E>) -> MultivariatePolynomial<Self, E> {
        a.make_monic()
    }
}

fn field_var_bounds<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    vars: &[usize],
    loose_bounds: &[E],
    config: &GcdConfig,
) -> SmallVec<[E; INLINED_EXPONENTS]> {
    let mut tight_bounds: SmallVec<[E; INLINED_EXPONENTS]> = loose_bounds.into();
    for var in vars {
        if let Some(d) = gcd_degree_bound(a, b, vars, *var, config) {
            tight_bounds[*var] = min(d, loose_bounds[*var]);
        }
    }
    tight_bounds
}

/// Run the modular algorithm `image` until it succeeds, falling back to the
/// remainder sequence when the field is too small to supply evaluation points.
fn field_gcd_modular<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    vars: &[usize],
    bounds: &mut [E],
    tight_bounds: &mut [E],
    config: &GcdConfig,
    mut image: impl FnMut(&mut [E], &mut [E]) -> Result<MultivariatePolynomial<F, E>, ImageError>,
) -> Result<MultivariatePolynomial<F, E>, GcdError> {
    let max_degree = vars
        .iter()
        .map(|v| a.degree(*v).to_u32() as u64 + b.degree(*v).to_u32() as u64)
        .max()
        .unwrap_or(0);

    let fallback = |reason: &str| {
        if config.small_field_fallback {
            debug!("{}: using the remainder sequence", reason);
            Ok(a.gcd_prs(b))
        } else {
            Err(GcdError::EvaluationPointsExhausted)
        }
    };

    if a.field.size() <= 2 * max_degree + 2 {
        return fallback("Field too small");
    }

    let mut attempts = 0;
    loop {
        match image(&mut *bounds, &mut *tight_bounds) {
            Ok(g) => return Ok(g),
            Err(e) => {
                debug!("Modular gcd failed: {:?}", e);
                attempts += 1;
                if attempts > config.max_restarts {
                    return fallback("Out of evaluation points");
                }

                // the degree bounds may have been tightened wrongly
                if e == ImageError::BadCurrentImage {
                    tight_bounds.copy_from_slice(bounds);
                }
            }
        }
    }
}

/// Estimate the degree in `var` of the gcd of `a` and `b` by substituting
/// random values for all other variables in `vars`.
fn gcd_degree_bound<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    vars: &[usize],
    var: usize,
    config: &GcdConfig,
) -> Option<E> {
    let mut rng = thread_rng();
    let mut cache = vec![vec![]; a.nvars()];

    for _ in 0..=config.max_unlucky_points {
        for c in &mut cache {
            c.clear();
        }

        let r: SmallVec<[_; INLINED_EXPONENTS]> = vars
            .iter()
            .filter(|v| **v != var)
            .map(|v| (*v, random_point(&a.field, &mut rng)))
            .collect();

        let a1 = a.replace_all_except(var, &r, &mut cache);
        let b1 = b.replace_all_except(var, &r, &mut cache);

        if a1.degree(var) == a.degree(var) && b1.degree(var) == b.degree(var) {
            let g = a1.to_univariate(var).gcd(&b1.to_univariate(var));
            return Some(E::from_u32(g.degree() as u32));
        }

        debug!("Degree error during sampling: trying again");
    }

    None
}

impl<R: PolynomialGCD<E>, E: Exponent> MultivariatePolynomial<R, E> {
    /// Compute the gcd of two polynomials. The result has a positive leading
    /// coefficient over the integers and is monic over a prime field.
    pub fn gcd(&self, other: &Self) -> Result<Self, GcdError> {
        self.gcd_with_config(other, &GcdConfig::default())
    }

    /// Compute the gcd of two polynomials with the tuning parameters `config`.
    #[instrument(level = "debug", skip_all)]
    pub fn gcd_with_config(&self, other: &Self, config: &GcdConfig) -> Result<Self, GcdError> {
        self.check_context(other);

        #[cfg(debug_assertions)]
        {
            self.check_consistency();
            other.check_consistency();
        }

        debug!("gcd of {} and {}", self, other);
        let g = Self::gcd_impl(self, other, config)?;
        Ok(R::normalize(g))
    }

    /// Compute the gcd and the cofactors `self / gcd` and `other / gcd`.
    /// If both inputs are zero, all three polynomials are zero.
    pub fn gcd_with_cofactors(&self, other: &Self) -> Result<(Self, Self, Self), GcdError> {
        let g = self.gcd(other)?;
        if g.is_zero() {
            return Ok((g, self.zero(), other.zero()));
        }

        let a = self / &g;
        let b = other / &g;
        Ok((g, a, b))
    }

    /// The gcd of all polynomials in `f`, which must not all be zero.
    fn gcd_multiple(template: &Self, mut f: Vec<Self>, config: &GcdConfig) -> Result<Self, GcdError> {
        f.retain(|p| !p.is_zero());
        f.sort_unstable_by_key(|p| Reverse(p.nterms()));

        let Some(mut g) = f.pop() else {
            return Ok(template.zero());
        };

        while let Some(p) = f.pop() {
            if g.is_constant() && R::one_is_gcd_unit() && R::normalize(g.clone()).is_one() {
                break;
            }

            g = R::normalize(Self::gcd_impl(&g, &p, config)?);
        }

        Ok(g)
    }

    /// The gcd of the content of `self` and `other` with respect to `x`.
    fn univariate_content_gcd(&self, other: &Self, x: usize, config: &GcdConfig) -> Result<Self, GcdError> {
        let f = self
            .to_univariate_polynomial_list(x)
            .into_iter()
            .chain(other.to_univariate_polynomial_list(x))
            .map(|(c, _)| c)
            .collect();

        Self::gcd_multiple(self, f, config)
    }

    /// The gcd for zero and constant inputs.
    fn simple_gcd(a: &Self, b: &Self) -> Option<Self> {
        if a.is_zero() {
            return Some(b.clone());
        }
        if b.is_zero() {
            return Some(a.clone());
        }
        if a == b {
            return Some(a.clone());
        }

        for (p, q) in [(a, b), (b, a)] {
            if p.is_constant() {
                let g = a.field.gcd(&p.lcoeff(), &q.content());
                return Some(a.constant(g));
            }
        }

        None
    }

    /// If `a` and `b` are equal up to monomial and constant factors, return
    /// `a` without them.
    fn monomial_cofactor(a: &Self, b: &Self) -> Option<Self> {
        if a.nterms() != b.nterms() {
            return None;
        }

        let no_stride = vec![E::zero(); a.nvars()];
        let a1 = R::normalize(a.deflate(&a.monomial_content(), &no_stride).make_primitive());
        let b1 = R::normalize(b.deflate(&b.monomial_content(), &no_stride).make_primitive());
        (a1 == b1).then_some(a1)
    }

    fn gcd_impl(a: &Self, b: &Self, config: &GcdConfig) -> Result<Self, GcdError> {
        if let Some(g) = Self::simple_gcd(a, b) {
            debug!("Simple gcd: {}", g);
            return Ok(g);
        }

        let nvars = a.nvars();
        let ma = a.monomial_content();
        let mb = b.monomial_content();
        let shared: Vec<E> = ma.iter().zip(&mb).map(|(x, y)| *min(x, y)).collect();
        let coeff_gcd = a.field.gcd(&a.content(), &b.content());

        if let Some(g) = Self::monomial_cofactor(a, b) {
            debug!("Inputs agree up to a monomial: {}", g);
            return Ok(g.mul_exp(&shared).mul_coeff(&coeff_gcd));
        }

        // remove the monomial content of each input and the shared exponent strides
        let zero = vec![E::zero(); nvars];
        let mut a = a.deflate(&ma, &zero);
        let mut b = b.deflate(&mb, &zero);

        let stride: Vec<E> = a
            .exponent_strides(&zero)
            .iter()
            .zip(&b.exponent_strides(&zero))
            .map(|(x, y)| x.gcd(y))
            .collect();

        if stride.iter().any(|s| s.to_u32() > 1) {
            debug!("Deflating with strides {:?}", stride);
            a = a.deflate(&zero, &stride);
            b = b.deflate(&zero, &stride);
        }

        let restore = |g: Self| g.inflate(&shared, &stride);

        if let Some(g) = Self::simple_gcd(&a, &b) {
            return Ok(restore(g));
        }

        // store which variables appear in which polynomial
        let mut scratch: SmallVec<[u8; INLINED_EXPONENTS]> = smallvec![0; nvars];
        for (p, inc) in [(&a, 1), (&b, 2)] {
            for e in p.exponents_iter() {
                for (s, ee) in scratch.iter_mut().zip(e) {
                    if !ee.is_zero() {
                        *s |= inc;
                    }
                }
            }
        }

        // the gcd divides every coefficient with respect to variables that
        // occur in only one of the polynomials
        if scratch.iter().any(|s| *s == 1 || *s == 2) {
            let in_a: SmallVec<[usize; INLINED_EXPONENTS]> =
                (0..nvars).filter(|v| scratch[*v] & 1 != 0).collect();
            let in_b: SmallVec<[usize; INLINED_EXPONENTS]> =
                (0..nvars).filter(|v| scratch[*v] & 2 != 0).collect();

            debug!("Eliminating variables that occur in one polynomial: {:?}", scratch);
            let f = a
                .to_multivariate_polynomial_list(&in_b, true)
                .into_values()
                .chain(b.to_multivariate_polynomial_list(&in_a, true).into_values())
                .collect();

            return Ok(restore(Self::gcd_multiple(&a, f, config)?));
        }

        let ca = a.content();
        let cb = b.content();
        if !a.field.is_one(&ca) {
            a = a.div_coeff(&ca);
        }
        if !b.field.is_one(&cb) {
            b = b.div_coeff(&cb);
        }
        let restore = |g: Self| restore(g.mul_coeff(&coeff_gcd));

        let mut vars: SmallVec<[usize; INLINED_EXPONENTS]> =
            (0..nvars).filter(|v| scratch[*v] == 3).collect();

        if vars.len() == 1 {
            debug!("Univariate gcd in {}", a.variables[vars[0]]);
            return Ok(restore(R::gcd_univariate(&a, &b, vars[0])));
        }

        if a.nterms() >= b.nterms() && a.divides(&b).is_some() {
            debug!("Second polynomial divides the first");
            return Ok(restore(b));
        }
        if a.nterms() <= b.nterms() && b.divides(&a).is_some() {
            debug!("First polynomial divides the second");
            return Ok(restore(a));
        }

        let mut bounds: SmallVec<[E; INLINED_EXPONENTS]> =
            (0..nvars).map(|v| min(a.degree(v), b.degree(v))).collect();
        let mut tight_bounds = R::gcd_var_bounds(&a, &b, &vars, &bounds, config);

        // the variable with the highest estimated degree becomes the main variable
        vars.sort_by(|&i, &j| tight_bounds[j].cmp(&tight_bounds[i]));
        debug!("Variable order {:?} with tight bounds {:?}", vars, tight_bounds);

        // make the contents with respect to the main variable coprime
        let content = a.univariate_content_gcd(&b, vars[0], config)?;
        if !content.is_one() {
            debug!("GCD of the content in {}: {}", a.variables[vars[0]], content);
            a = &a / &content;
            b = &b / &content;
        }

        // move the variables of the gcd to the front, in order
        let mut order: SmallVec<[usize; INLINED_EXPONENTS]> = vars.clone();
        order.extend((0..nvars).filter(|v| !vars.contains(v)));
        let rearrange = order.iter().enumerate().any(|(i, v)| i != *v);
        if rearrange {
            debug!("Rearranging variables with map: {:?}", order);
            a = a.rearrange(&order, false);
            b = b.rearrange(&order, false);
            bounds = order.iter().map(|v| bounds[*v]).collect();
            tight_bounds = order.iter().map(|v| tight_bounds[*v]).collect();
        }

        let new_vars: SmallVec<[usize; INLINED_EXPONENTS]> = (0..vars.len()).collect();
        let shape = ProblemShape::new(
            new_vars.iter().map(|v| bounds[*v].to_u32()).collect(),
            a.field.prime(),
        );
        let strategy = GcdStrategy::select(&shape, config);
        debug!("Selected {:?} for {:?}", strategy, shape);

        let mut g = R::gcd_modular(&a, &b, &new_vars, &mut bounds, &mut tight_bounds, strategy, config)?;

        if rearrange {
            g = g.rearrange(&order, true);
        }

        Ok(restore(g * &content))
    }
}

impl<R: EuclideanDomain, E: Exponent> MultivariatePolynomial<R, E> {
    /// Compute the gcd with primitive pseudo-remainder sequences, recursively
    /// in every variable. This needs neither primes nor evaluation points, but
    /// its intermediate coefficients can grow quickly. The result is only
    /// defined up to a unit.
    pub fn gcd_prs(&self, other: &Self) -> Self {
        self.check_context(other);

        if self.is_zero() {
            return other.clone();
        }
        if other.is_zero() {
            return self.clone();
        }

        let Some(x) = (0..self.nvars()).find(|v| {
            !self.degree(*v).is_zero() || !other.degree(*v).is_zero()
        }) else {
            return self.constant(self.field.gcd(&self.lcoeff(), &other.lcoeff()));
        };

        let ca = self.content_prs(x);
        let cb = other.content_prs(x);
        let c = ca.gcd_prs(&cb);

        if self.degree(x).is_zero() {
            return self.gcd_prs(&cb);
        }
        if other.degree(x).is_zero() {
            return ca.gcd_prs(other);
        }

        let (mut p, mut q) = if self.degree(x) >= other.degree(x) {
            (self / &ca, other / &cb)
        } else {
            (other / &cb, self / &ca)
        };

        while !q.degree(x).is_zero() {
            let r = p.pseudo_rem(&q, x);
            if r.is_zero() {
                return q * &c;
            }

            p = q;
            q = &r / &r.content_prs(x);
        }

        // coprime up to the content
        c
    }

    /// The gcd of the coefficients with respect to `x`.
    fn content_prs(&self, x: usize) -> Self {
        let mut content = self.zero();
        for (c, _) in self.to_univariate_polynomial_list(x) {
            content = content.gcd_prs(&c);
            if content.is_constant() && R::one_is_gcd_unit() && self.field.is_one(&content.lcoeff())
            {
                break;
            }
        }
        content
    }

    /// The pseudo-remainder of `self` divided by `div`, viewed as polynomials in `x`.
    fn pseudo_rem(&self, div: &Self, x: usize) -> Self {
        let db = div.degree(x);
        let lc = div.univariate_lcoeff(x);

        let mut r = self.clone();
        while !r.is_zero() && r.degree(x) >= db {
            let mut shift = vec![E::zero(); self.nvars()];
            shift[x] = r.degree(x) - db;
            let lcr = r.univariate_lcoeff(x);
            r = &(&r * &lc) - &(&lcr * div).mul_exp(&shift);
        }
        r
    }
}

#[cfg(test)]
mod test {
    use crate::poly::polynomial::MultivariatePolynomial;
    use crate::poly::variables;
    use crate::rings::finite_field::Zp;
    use crate::rings::galois_field::GaloisField;
    use crate::rings::integer::IntegerRing;

    use super::{GcdConfig, GcdError, GcdStrategy, ProblemShape};

    fn parse(s: &str) -> MultivariatePolynomial<IntegerRing, u16> {
        MultivariatePolynomial::parse(s, &IntegerRing::new(), variables(&["x", "y", "z", "t"]))
            .unwrap()
    }

    #[test]
    fn strategy_selection() {
        let config = GcdConfig::default();

        let small = ProblemShape::new(vec![3, 2, 2], None);
        assert_eq!(GcdStrategy::select(&small, &config), GcdStrategy::Brown);

        let sparse = ProblemShape::new(vec![3, 2, 2, 2, 2], None);
        assert_eq!(sparse.kronecker_bound(), 625);
        assert_eq!(GcdStrategy::select(&sparse, &config), GcdStrategy::BerlekampMassey);

        let big = ProblemShape::new(vec![3, 10, 10, 10, 10], None);
        assert_eq!(GcdStrategy::select(&big, &config), GcdStrategy::Zippel);

        // the Kronecker points of Berlekamp-Massey do not fit in a small field
        let small_field = ProblemShape::new(vec![3, 2, 2, 2, 2], Some(101));
        assert_eq!(GcdStrategy::select(&small_field, &config), GcdStrategy::Zippel);
        let config = config.with_strategy(Some(GcdStrategy::BerlekampMassey));
        assert_eq!(GcdStrategy::select(&small_field, &config), GcdStrategy::Zippel);
    }

    #[test]
    fn zero_and_constants() {
        let zero = parse("0");
        let a = parse("-2*x*y+4");

        assert_eq!(zero.gcd(&zero).unwrap(), zero);
        assert_eq!(zero.gcd(&a).unwrap(), parse("2*x*y-4"));
        assert_eq!(a.gcd(&zero).unwrap(), parse("2*x*y-4"));
        assert_eq!(a.gcd(&parse("6")).unwrap(), parse("2"));
        assert_eq!(parse("-6").gcd(&parse("-9")).unwrap(), parse("3"));
    }

    #[test]
    fn univariate() {
        let a = parse("(x+1)*(x-2)");
        let b = parse("(x+1)*(x+3)");
        assert_eq!(a.gcd(&b).unwrap(), parse("x+1"));
    }

    #[test]
    fn monomial_content_and_strides() {
        let a = parse("x^3*y^2*(x^2*y^4+3)*(x^4+y^2)");
        let b = parse("-2*x*y^4*(x^2*y^4+3)*(x^2-y^6)");
        assert_eq!(a.gcd(&b).unwrap(), parse("x*y^2*(x^2*y^4+3)"));
    }

    #[test]
    fn monomial_cofactor() {
        let g = parse("3*x^2*y+z-5");
        let a = &g * &parse("6*x*y^2");
        let b = &g * &parse("-4*z^3");
        assert_eq!(a.gcd(&b).unwrap(), g.mul_coeff(&crate::rings::integer::Integer::new(2)));
    }

    #[test]
    fn variable_in_one_input() {
        let a = parse("(x+y)*(t^2+x*t+1)");
        let b = parse("(x+y)*(x-y+2)");
        assert_eq!(a.gcd(&b).unwrap(), parse("x+y"));
    }

    #[test]
    fn divisibility() {
        let a = parse("(x*y+z)*(x^2-y*z+t)");
        let b = parse("-(x*y+z)");
        assert_eq!(a.gcd(&b).unwrap(), parse("x*y+z"));
    }

    #[test]
    fn cofactors() {
        let g = parse("y+t^2+x^3+z^4");
        let a = &g * &parse("x*y*z*t+1");
        let b = &g * &parse("x^2+y^2+z^2-t");
        let (gg, ca, cb) = a.gcd_with_cofactors(&b).unwrap();
        assert_eq!(gg, g);
        assert_eq!(&ca * &gg, a);
        assert_eq!(&cb * &gg, b);
        assert!(ca.gcd(&cb).unwrap().is_one());
    }

    #[test]
    fn all_strategies() {
        let g = parse("3*x^2*y*z-y^3*t+7*z*t^2-11");
        let a = &g * &parse("x*y^2+z*t-3");
        let b = &g * &parse("x^3-t*y+z^2+1");

        for strategy in [GcdStrategy::Brown, GcdStrategy::Zippel, GcdStrategy::BerlekampMassey] {
            let config = GcdConfig::default().with_strategy(Some(strategy));
            assert_eq!(a.gcd_with_config(&b, &config).unwrap(), g, "{:?}", strategy);
        }
    }

    #[test]
    fn prs() {
        let g = parse("x*y-z^2+3");
        let a = &g * &parse("x^2+y");
        let b = &g * &parse("x-y*z+1");
        let r = a.gcd_prs(&b);
        assert!(r == g || r == -g);
    }

    #[test]
    fn small_prime_field() {
        let field = Zp::new(5);
        let vars = variables(&["x", "y"]);
        let g = MultivariatePolynomial::<_, u16>::parse("x^3*y+2*y^2+1", &field, vars.clone()).unwrap();
        let a = &g * &MultivariatePolynomial::parse("x^4+y^3+x", &field, vars.clone()).unwrap();
        let b = &g * &MultivariatePolynomial::parse("x*y^4+3", &field, vars).unwrap();

        assert_eq!(a.gcd(&b).unwrap(), g.clone().make_monic());

        let config = GcdConfig::default().with_small_field_fallback(false);
        assert_eq!(
            a.gcd_with_config(&b, &config),
            Err(GcdError::EvaluationPointsExhausted)
        );
    }

    #[test]
    fn small_galois_field() {
        let field = GaloisField::find(Zp::new(3), 2);
        let vars = variables(&["x", "y"]);
        let parse =
            |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();
        let a = parse("0").monomial(field.generator(), vec![0, 2]);

        let g = &parse("x^3*y+1") + &a;
        let ga = &g * &parse("x^4+y^3+x");
        let gb = &g * &(&parse("x*y^4") + &a);

        assert_eq!(ga.gcd(&gb).unwrap(), g.clone().make_monic());

        let config = GcdConfig::default().with_small_field_fallback(false);
        assert_eq!(
            ga.gcd_with_config(&gb, &config),
            Err(GcdError::EvaluationPointsExhausted)
        );
    }

    #[test]
    fn galois_field_skips_berlekamp_massey() {
        let field = GaloisField::find(Zp::new(1000003), 2);
        let vars = variables(&["x", "y", "z"]);
        let parse =
            |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();
        let a = field.generator();

        let g = (&parse("x^2*y+z-1") + &parse("0").monomial(a, vec![0, 1, 1])).make_monic();
        let ga = &g * &parse("x*z+y^2+3");
        let gb = &g * &parse("x^3-y*z+2");

        let config = GcdConfig::default().with_strategy(Some(GcdStrategy::BerlekampMassey));
        assert_eq!(ga.gcd_with_config(&gb, &config).unwrap(), g);
    }
}

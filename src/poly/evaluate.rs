//! Evaluation and interpolation over finite fields.
//!
//! Dense images are combined with Newton interpolation in a single variable.
//! Sparse images are reconstructed from a skeleton by evaluating at the
//! geometric progression `r, r^2, r^3, ...` and solving either a transposed
//! Vandermonde system (when some coefficient of the main variable is a single
//! monomial that fixes the scale) or one linear system that also solves for
//! the unknown scale of every image.

use std::cmp::Ordering;

use ahash::HashSet;
use rand::{thread_rng, Rng};
use smallvec::SmallVec;
use tracing::{debug, instrument};

use crate::rings::linear_system::{LinearSolverError, Matrix};
use crate::rings::{EvaluationField, Field, Ring};

use super::polynomial::MultivariatePolynomial;
use super::univariate::UnivariatePolynomial;
use super::{Exponent, INLINED_EXPONENTS};

/// The maximal value of a random evaluation point.
pub const MAX_RNG_PREFACTOR: u64 = 50000;
/// Powers above this size are not cached.
const POW_CACHE_SIZE: usize = 1000;

/// Signals that a modular image cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageError {
    /// The skeleton or degree bound that the image was built from is wrong.
    BadOriginalImage,
    /// The current prime or point is unlucky: try another one.
    BadCurrentImage,
}

/// The recursive view of a polynomial in the main variable, used as a skeleton
/// for sparse interpolation. Only the monomials of the coefficients matter.
pub(crate) type Skeleton<F, E> = [(MultivariatePolynomial<F, E>, E)];

/// The range of random evaluation point indices for `field`.
fn sample_range<F: EvaluationField>(field: &F) -> (u64, u64) {
    (1, field.size().min(MAX_RNG_PREFACTOR))
}

/// Draw a random nonzero evaluation point.
pub(crate) fn random_point<F: EvaluationField>(field: &F, rng: &mut impl Rng) -> F::Element {
    let (lo, hi) = sample_range(field);
    field.element_at(rng.gen_range(lo..hi))
}

/// Draws distinct random nonzero evaluation points.
pub(crate) struct PointSampler<F: EvaluationField> {
    field: F,
    range: (u64, u64),
    used: HashSet<u64>,
}

impl<F: EvaluationField> PointSampler<F> {
    pub fn new(field: &F) -> Self {
        Self {
            field: *field,
            range: sample_range(field),
            used: HashSet::default(),
        }
    }

    /// Draw a point that has not been drawn before and for which `accept` holds.
    /// Returns `None` when the range is exhausted or when `max_rejections`
    /// points in a row are not accepted.
    pub fn sample(
        &mut self,
        max_rejections: usize,
        accept: impl Fn(&F::Element) -> bool,
    ) -> Option<F::Element> {
        let mut rng = thread_rng();
        let mut rejections = 0;

        loop {
            if self.used.len() as u64 >= self.range.1 - self.range.0 {
                return None;
            }

            let n = rng.gen_range(self.range.0..self.range.1);
            if !self.used.insert(n) {
                continue;
            }

            let v = self.field.element_at(n);
            if accept(&v) {
                return Some(v);
            }

            rejections += 1;
            if rejections > max_rejections {
                return None;
            }
        }
    }
}

/// Incremental Newton interpolation in the variable `var`: after `k` points,
/// the interpolant has degree below `k` in `var` and agrees with every image.
pub(crate) struct NewtonInterpolator<F: Field, E: Exponent> {
    var: usize,
    /// `prod_i (x_var - v_i)` over all points so far
    basis: UnivariatePolynomial<F>,
    poly: MultivariatePolynomial<F, E>,
    npoints: usize,
}

impl<F: Field, E: Exponent> NewtonInterpolator<F, E> {
    pub fn new(template: &MultivariatePolynomial<F, E>, var: usize) -> Self {
        let basis = template.zero().to_univariate(var).one();
        Self {
            var,
            basis,
            poly: template.zero(),
            npoints: 0,
        }
    }

    /// Add the image `g` at `x_var = v`. Returns `false` if the interpolant
    /// already had the value `g` at `v`.
    pub fn add_point(&mut self, v: &F::Element, g: &MultivariatePolynomial<F, E>) -> bool {
        let field = self.poly.field;
        let diff = g - &self.poly.replace(self.var, v);
        let changed = !diff.is_zero();

        if changed {
            let scale = field.inv(&self.basis.evaluate(v));
            let b = self.poly.from_univariate(&self.basis, self.var);
            self.poly = &self.poly + &(diff.mul_coeff(&scale) * &b);
        }

        let x = self.basis.monomial(field.one(), 1);
        self.basis = &self.basis * &(&x - &self.basis.constant(v.clone()));
        self.npoints += 1;
        changed
    }

    pub fn npoints(&self) -> usize {
        self.npoints
    }

    pub fn poly(&self) -> &MultivariatePolynomial<F, E> {
        &self.poly
    }

    pub fn reset(&mut self) {
        self.basis = self.basis.one();
        self.poly = self.poly.zero();
        self.npoints = 0;
    }
}

/// Get `v^p`, extending the table of powers of `v` when it is small.
fn cached_pow<F: Ring>(field: &F, cache: &mut Vec<F::Element>, v: &F::Element, p: usize) -> F::Element {
    if p >= POW_CACHE_SIZE {
        return field.pow(v, p as u64);
    }

    if cache.is_empty() {
        cache.push(field.one());
    }
    while cache.len() <= p {
        let next = field.mul(&cache[cache.len() - 1], v);
        cache.push(next);
    }
    cache[p].clone()
}

/// Evaluate the monomials of `poly` at the point `r`, ignoring the coefficients
/// and the variables that are not in `r`.
pub(crate) fn evaluate_exponents<F: Ring, E: Exponent>(
    poly: &MultivariatePolynomial<F, E>,
    r: &[(usize, F::Element)],
    cache: &mut [Vec<F::Element>],
) -> Vec<F::Element> {
    poly.exponents_iter()
        .map(|e| {
            let mut c = poly.field.one();
            for (n, v) in r {
                let p = e[*n].to_u32() as usize;
                if p > 0 {
                    poly.field
                        .mul_assign(&mut c, &cached_pow(&poly.field, &mut cache[*n], v, p));
                }
            }
            c
        })
        .collect()
}

/// Build the univariate polynomial in `main_var` using the evaluated monomials
/// from [evaluate_exponents].
pub(crate) fn evaluate_using_exponents<F: Ring, E: Exponent>(
    poly: &MultivariatePolynomial<F, E>,
    exp_evals: &[F::Element],
    main_var: usize,
) -> UnivariatePolynomial<F> {
    let mut res = UnivariatePolynomial::new(&poly.field, None, poly.variables[main_var].clone());
    res.coefficients = vec![poly.field.zero(); poly.degree(main_var).to_u32() as usize + 1];

    for ((c, e), ev) in poly
        .coefficients
        .iter()
        .zip(poly.exponents_iter())
        .zip(exp_evals)
    {
        poly.field.add_mul_assign(
            &mut res.coefficients[e[main_var].to_u32() as usize],
            c,
            ev,
        );
    }

    res.truncate();
    res
}

/// Solve `sum_t c_t * nodes_t^i = rhs_i` for `i = 0..n` where the nodes are distinct.
///
/// Row `t` of the inverse of the transposed Vandermonde matrix is given by the
/// coefficients of the Lagrange polynomial of node `t`, which is obtained from
/// the master polynomial `prod_t (z - nodes_t)` by synthetic division.
pub(crate) fn solve_transposed_vandermonde<F: Field>(
    field: &F,
    nodes: &[F::Element],
    rhs: &[F::Element],
) -> Vec<F::Element> {
    let n = nodes.len();
    debug_assert!(rhs.len() >= n);

    let mut master = vec![field.zero(); n + 1];
    master[0] = field.one();
    for (k, s) in nodes.iter().enumerate() {
        for j in (1..=k + 1).rev() {
            let prev = master[j - 1].clone();
            field.sub_mul_assign(&mut master[j], &prev, s);
        }
    }
    // the loop builds the coefficients of the master polynomial from the highest degree down
    master.reverse();

    let mut q = vec![field.zero(); n];
    nodes
        .iter()
        .map(|s| {
            q[n - 1] = master[n].clone();
            for k in (1..n).rev() {
                q[k - 1] = field.add(&master[k], &field.mul(s, &q[k]));
            }

            let mut norm = field.zero();
            let mut num = field.zero();
            for k in (0..n).rev() {
                norm = field.add(&field.mul(&norm, s), &q[k]);
                field.add_mul_assign(&mut num, &q[k], &rhs[k]);
            }

            field.div(&num, &norm)
        })
        .collect()
}

/// Compare the degree of an image with the bound of the main variable.
/// A lower degree tightens the bound and invalidates the original image.
fn check_image_degree<F: Field, E: Exponent>(
    g: &UnivariatePolynomial<F>,
    bounds: &mut [E],
    main_var: usize,
) -> Result<(), ImageError> {
    let d = E::from_u32(g.degree() as u32);
    match d.cmp(&bounds[main_var]) {
        Ordering::Less => {
            debug!("Unlucky degree bound: {} vs {}", g, bounds[main_var]);
            bounds[main_var] = d;
            Err(ImageError::BadOriginalImage)
        }
        Ordering::Greater => Err(ImageError::BadCurrentImage),
        Ordering::Equal => Ok(()),
    }
}

/// Check that every term of the image appears in the skeleton.
fn check_image_shape<F: Field, E: Exponent>(
    g: &UnivariatePolynomial<F>,
    shape: &[(MultivariatePolynomial<F, E>, E)],
) -> Result<(), ImageError> {
    for (i, c) in g.coefficients.iter().enumerate() {
        if !F::is_zero(c) && shape.iter().all(|(_, d)| d.to_u32() as usize != i) {
            debug!("Bad shape: terms missing");
            return Err(ImageError::BadOriginalImage);
        }
    }
    Ok(())
}

fn image_coeff<F: Field, E: Exponent>(g: &UnivariatePolynomial<F>, d: E) -> F::Element {
    g.coefficients
        .get(d.to_u32() as usize)
        .cloned()
        .unwrap_or_else(|| g.field.zero())
}

/// Evaluate the monomials of every skeleton coefficient at `r`. Returns `None`
/// if two monomials of the same coefficient evaluate to the same value.
fn evaluate_shape<F: EvaluationField, E: Exponent>(
    shape: &Skeleton<F, E>,
    r: &[(usize, F::Element)],
    cache: &mut [Vec<F::Element>],
) -> Option<Vec<Vec<F::Element>>> {
    let mut rows = Vec::with_capacity(shape.len());
    for (c, _) in shape {
        let row = evaluate_exponents(c, r, cache);

        let mut seen = HashSet::default();
        if !row.iter().all(|v| seen.insert(v)) {
            debug!("Duplicate element: restarting");
            return None;
        }

        rows.push(row);
    }
    Some(rows)
}

/// Fill the skeleton with the solved coefficients, in skeleton order.
fn assemble<F: Field, E: Exponent>(
    template: &MultivariatePolynomial<F, E>,
    main_var: usize,
    shape: &[(MultivariatePolynomial<F, E>, E)],
    coeffs: &[F::Element],
) -> MultivariatePolynomial<F, E> {
    let mut terms = Vec::with_capacity(coeffs.len());
    let mut coeffs = coeffs.iter();
    for (c, d) in shape {
        for e in c.exponents_iter() {
            let mut ne: SmallVec<[E; INLINED_EXPONENTS]> = SmallVec::from_slice(e);
            ne[main_var] = *d;
            if let Some(cc) = coeffs.next() {
                if !F::is_zero(cc) {
                    terms.push((ne, cc.clone()));
                }
            }
        }
    }
    template.from_unsorted_terms(terms)
}


/// The univariate images of `a` and `b` in `main_var` at the powers `r, r^2, ...`
/// of a sample point.
struct PowerImages<'a, F: Field, E: Exponent> {
    a: &'a MultivariatePolynomial<F, E>,
    b: &'a MultivariatePolynomial<F, E>,
    main_var: usize,
    a_eval: Vec<F::Element>,
    b_eval: Vec<F::Element>,
    a_current: Vec<F::Element>,
    b_current: Vec<F::Element>,
    started: bool,
}

impl<'a, F: Field, E: Exponent> PowerImages<'a, F, E> {
    fn new(
        a: &'a MultivariatePolynomial<F, E>,
        b: &'a MultivariatePolynomial<F, E>,
        main_var: usize,
        r: &[(usize, F::Element)],
        cache: &mut [Vec<F::Element>],
    ) -> Self {
        let a_eval = evaluate_exponents(a, r, cache);
        let b_eval = evaluate_exponents(b, r, cache);
        Self {
            a,
            b,
            main_var,
            a_current: a_eval.clone(),
            b_current: b_eval.clone(),
            a_eval,
            b_eval,
            started: false,
        }
    }

    /// Move to the next power of the sample point and return the images.
    fn next_images(&mut self) -> (UnivariatePolynomial<F>, UnivariatePolynomial<F>) {
        let field = self.a.field;
        if self.started {
            for (c, e) in self.a_current.iter_mut().zip(&self.a_eval) {
                field.mul_assign(c, e);
            }
            for (c, e) in self.b_current.iter_mut().zip(&self.b_eval) {
                field.mul_assign(c, e);
            }
        }
        self.started = true;

        (
            evaluate_using_exponents(self.a, &self.a_current, self.main_var),
            evaluate_using_exponents(self.b, &self.b_current, self.main_var),
        )
    }
}

/// The outcome of evaluating a sparse image at one power of the sample point.
enum SampledImage<F: Field> {
    Image(UnivariatePolynomial<F>),
    /// The point is unlucky and a new one should be drawn.
    Retry,
}

/// Compute the univariate gcd at the next power and validate it against the
/// degree bound of the main variable and the skeleton.
fn next_sampled_image<F: Field, E: Exponent>(
    powers: &mut PowerImages<'_, F, E>,
    a_ldegree: E,
    b_ldegree: E,
    bounds: &mut [E],
    shape: &[(MultivariatePolynomial<F, E>, E)],
) -> Result<SampledImage<F>, ImageError> {
    let (a_poly, b_poly) = powers.next_images();
    if E::from_u32(a_poly.degree() as u32) != a_ldegree
        || E::from_u32(b_poly.degree() as u32) != b_ldegree
        || a_poly.is_zero()
        || b_poly.is_zero()
    {
        return Ok(SampledImage::Retry);
    }

    let g = a_poly.gcd(&b_poly);
    match check_image_degree(&g, bounds, powers.main_var) {
        Ok(()) => {}
        Err(ImageError::BadCurrentImage) => return Ok(SampledImage::Retry),
        Err(e) => return Err(e),
    }
    check_image_shape(&g, shape)?;

    Ok(SampledImage::Image(g))
}

/// Draw a random point for the variables `vars` such that the monomials of
/// every skeleton coefficient evaluate to distinct values.
fn sample_shape_point<F: EvaluationField, E: Exponent>(
    field: &F,
    vars: &[usize],
    shape: &Skeleton<F, E>,
    cache: &mut [Vec<F::Element>],
) -> Option<(
    SmallVec<[(usize, F::Element); INLINED_EXPONENTS]>,
    Vec<Vec<F::Element>>,
)> {
    let mut rng = thread_rng();

    for c in cache.iter_mut() {
        c.clear();
    }

    let r: SmallVec<[_; INLINED_EXPONENTS]> =
        vars.iter().map(|i| (*i, random_point(field, &mut rng))).collect();
    let rows = evaluate_shape(shape, &r, cache)?;
    Some((r, rows))
}

/// Reconstruct the gcd of `a` and `b` in the variables `main_var` and `vars`,
/// assuming it has the monomial structure of `shape`, whose part
/// `single_scale` consists of a single monomial. The coefficient of that
/// monomial is set to 1.
///
/// The univariate gcds at `r, r^2, ..., r^n` are scaled so that the
/// single-scale monomial takes its value at that point, after which every
/// coefficient of the main variable is found from a transposed Vandermonde system.
#[allow(clippy::too_many_arguments)]
#[instrument(level = "trace", skip_all, fields(%a, %b))]
pub(crate) fn construct_new_image_single_scale<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    a_ldegree: E,
    b_ldegree: E,
    bounds: &mut [E],
    single_scale: usize,
    vars: &[usize],
    main_var: usize,
    shape: &Skeleton<F, E>,
    max_failures: usize,
) -> Result<MultivariatePolynomial<F, E>, ImageError> {
    let field = a.field;

    if vars.is_empty() {
        let g = a.to_univariate(main_var).gcd(&b.to_univariate(main_var));
        check_image_degree(&g, bounds, main_var)?;
        check_image_shape(&g, shape)?;

        let c = image_coeff(&g, shape[single_scale].1);
        if F::is_zero(&c) {
            debug!("Bad original image: scaling term missing");
            return Err(ImageError::BadOriginalImage);
        }

        return Ok(a.from_univariate(&g.mul_coeff(&field.inv(&c)), main_var));
    }

    let samples_needed = shape.iter().map(|(c, _)| c.nterms()).max().unwrap_or(1);
    let mut cache = vec![vec![]; a.nvars()];
    let mut failure_count = 0;

    let (row_sample_values, samples) = 'find_root_sample: loop {
        if failure_count > max_failures {
            debug!("Too many unlucky points for the current image");
            return Err(ImageError::BadCurrentImage);
        }

        let Some((r, row_sample_values)) = sample_shape_point(&field, vars, shape, &mut cache)
        else {
            failure_count += 1;
            continue;
        };

        let mut powers = PowerImages::new(a, b, main_var, &r, &mut cache);
        let mut samples = vec![Vec::with_capacity(samples_needed); shape.len()];

        // the value of the single-scale monomial at the current power of r
        let scale_base = row_sample_values[single_scale][0].clone();
        let mut scale_current = scale_base.clone();

        for sample_index in 0..samples_needed {
            if sample_index > 0 {
                field.mul_assign(&mut scale_current, &scale_base);
            }

            let g = match next_sampled_image(&mut powers, a_ldegree, b_ldegree, bounds, shape)? {
                SampledImage::Image(g) => g,
                SampledImage::Retry => {
                    failure_count += 1;
                    continue 'find_root_sample;
                }
            };

            let c = image_coeff(&g, shape[single_scale].1);
            if F::is_zero(&c) {
                debug!("Bad original image: scaling term missing");
                return Err(ImageError::BadOriginalImage);
            }

            let scale = field.div(&scale_current, &c);
            for (rhs, (_, d)) in samples.iter_mut().zip(shape) {
                rhs.push(field.mul(&image_coeff(&g, *d), &scale));
            }
        }

        break (row_sample_values, samples);
    };

    // the powers start at r^1, so the Vandermonde solution is scaled by the node
    let mut coeffs = Vec::with_capacity(shape.iter().map(|(c, _)| c.nterms()).sum());
    for (nodes, rhs) in row_sample_values.iter().zip(&samples) {
        let sol = solve_transposed_vandermonde(&field, nodes, rhs);
        coeffs.extend(sol.iter().zip(nodes).map(|(c, n)| field.div(c, n)));
    }

    Ok(assemble(a, main_var, shape, &coeffs))
}

/// Reconstruct the gcd of `a` and `b` from the skeleton `shape` when no part
/// of the skeleton is a single monomial.
///
/// Every univariate gcd is monic, so it equals the gcd evaluated at the sample
/// point up to an unknown scale. The first scale is fixed to 1 and the others are
/// solved for together with all skeleton coefficients in a single linear
/// system, adding powers of the point until the system has a unique solution.
#[allow(clippy::too_many_arguments)]
#[instrument(level = "trace", skip_all, fields(%a, %b))]
pub(crate) fn construct_new_image_multiple_scales<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    a_ldegree: E,
    b_ldegree: E,
    bounds: &mut [E],
    vars: &[usize],
    main_var: usize,
    shape: &Skeleton<F, E>,
    max_failures: usize,
) -> Result<MultivariatePolynomial<F, E>, ImageError> {
    let field = a.field;
    let nparts = shape.len();
    let n_unknowns: usize = shape.iter().map(|(c, _)| c.nterms()).sum();

    if nparts < 2 {
        // a single part with several monomials cannot fix the scale of an image
        debug!("Skeleton has no scaling freedom: {} parts", nparts);
        return Err(ImageError::BadOriginalImage);
    }

    // every power adds one equation per part and one unknown scale
    let max_samples = n_unknowns + 1;
    let mut cache = vec![vec![]; a.nvars()];
    let mut failure_count = 0;

    'find_root_sample: loop {
        if failure_count > max_failures {
            debug!("Too many unlucky points for the current image");
            return Err(ImageError::BadCurrentImage);
        }

        let Some((r, row_sample_values)) = sample_shape_point(&field, vars, shape, &mut cache)
        else {
            failure_count += 1;
            continue;
        };

        let mut powers = PowerImages::new(a, b, main_var, &r, &mut cache);
        let mut images = Vec::with_capacity(max_samples);

        while images.len() < max_samples {
            match next_sampled_image(&mut powers, a_ldegree, b_ldegree, bounds, shape)? {
                SampledImage::Image(g) => images.push(g),
                SampledImage::Retry => {
                    failure_count += 1;
                    continue 'find_root_sample;
                }
            }

            let k = images.len();
            if k * nparts < n_unknowns + k - 1 {
                continue;
            }

            let nrows = k * nparts;
            let ncols = n_unknowns + k - 1;
            let mut m = Matrix::new(nrows as u32, ncols as u32, field);
            let mut rhs = vec![field.zero(); nrows];

            let mut col = 0;
            for (j, (c, d)) in shape.iter().enumerate() {
                for (i, g) in images.iter().enumerate() {
                    let row = (i * nparts + j) as u32;
                    for (t, node) in row_sample_values[j].iter().enumerate() {
                        m[(row, (col + t) as u32)] = field.pow(node, i as u64 + 1);
                    }

                    let gc = image_coeff(g, *d);
                    if i == 0 {
                        rhs[row as usize] = gc;
                    } else {
                        m[(row, (n_unknowns + i - 1) as u32)] = field.neg(&gc);
                    }
                }
                col += c.nterms();
            }

            match m.solve(&rhs) {
                Ok(x) => return Ok(assemble(a, main_var, shape, &x[..n_unknowns])),
                Err(LinearSolverError::Underdetermined { rank }) => {
                    debug!("Underdetermined system: rank {} of {}", rank, ncols);
                }
                Err(LinearSolverError::Inconsistent) => {
                    debug!("Inconsistent system: bad shape");
                    return Err(ImageError::BadOriginalImage);
                }
            }
        }

        debug!("Could not determine the scaling of the images");
        return Err(ImageError::BadCurrentImage);
    }
}

/// Reconstruct a sparse image of the gcd from the skeleton `shape`, choosing
/// the single-scale method when a part of the skeleton is a single monomial.
#[allow(clippy::too_many_arguments)]
pub(crate) fn construct_new_image<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    a_ldegree: E,
    b_ldegree: E,
    bounds: &mut [E],
    vars: &[usize],
    main_var: usize,
    shape: &Skeleton<F, E>,
    max_failures: usize,
) -> Result<MultivariatePolynomial<F, E>, ImageError> {
    match shape.iter().position(|(c, _)| c.nterms() == 1) {
        Some(single_scale) => construct_new_image_single_scale(
            a,
            b,
            a_ldegree,
            b_ldegree,
            bounds,
            single_scale,
            vars,
            main_var,
            shape,
            max_failures,
        ),
        None => construct_new_image_multiple_scales(
            a,
            b,
            a_ldegree,
            b_ldegree,
            bounds,
            vars,
            main_var,
            shape,
            max_failures,
        ),
    }
}

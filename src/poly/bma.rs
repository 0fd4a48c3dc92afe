//! Sparse interpolation of modular gcds with the Berlekamp-Massey algorithm.
//!
//! The non-main variables are evaluated at Kronecker-weighted powers of a
//! random `omega`, so that every monomial `m` of the gcd contributes a
//! geometric sequence `c_m * beta_m^i`, `i = 1, 2, ...`, to the coefficient of
//! each power of the main variable. Berlekamp-Massey finds the minimal
//! recurrence of every such coefficient sequence. The roots of its reversed connection polynomial are
//! the `beta_m`, from which the exponents follow by a discrete logarithm and
//! the coefficients by a transposed Vandermonde solve. No skeleton is needed.

use std::cmp::min;

use ahash::HashMap;
use rand::thread_rng;
use smallvec::{smallvec, SmallVec};
use tracing::{debug, instrument};

use crate::rings::finite_field::{FiniteField, FiniteFieldCore, FiniteFieldWorkspace};
use crate::rings::integer::IntegerRing;
use crate::rings::{Field, Ring};

use super::brown::{brown_modular, gcd_crt_loop};
use super::evaluate::{
    evaluate_exponents, evaluate_using_exponents, solve_transposed_vandermonde, ImageError,
};
use super::gcd::{GcdConfig, GcdError};
use super::polynomial::MultivariatePolynomial;
use super::univariate::UnivariatePolynomial;
use super::{Exponent, INLINED_EXPONENTS};

/// The incremental Berlekamp-Massey algorithm, which finds the shortest
/// linear recurrence that generates a sequence.
#[derive(Clone, Debug)]
pub struct BerlekampMassey<F: Field> {
    field: F,
    sequence: Vec<F::Element>,
    /// The connection polynomial `1 + c_1 z + ... + c_L z^L`, lowest degree first.
    connection: Vec<F::Element>,
    previous: Vec<F::Element>,
    previous_discrepancy: F::Element,
    length: usize,
    shift: usize,
}

impl<F: Field> BerlekampMassey<F> {
    pub fn new(field: &F) -> Self {
        Self {
            field: *field,
            sequence: vec![],
            connection: vec![field.one()],
            previous: vec![field.one()],
            previous_discrepancy: field.one(),
            length: 0,
            shift: 1,
        }
    }

    /// Add the next element of the sequence.
    pub fn push(&mut self, s: F::Element) {
        let n = self.sequence.len();
        self.sequence.push(s);

        let mut d = self.sequence[n].clone();
        for (c, s) in self
            .connection
            .iter()
            .skip(1)
            .take(self.length)
            .zip(self.sequence[..n].iter().rev())
        {
            self.field.add_mul_assign(&mut d, c, s);
        }

        if F::is_zero(&d) {
            self.shift += 1;
            return;
        }

        let scale = self.field.div(&d, &self.previous_discrepancy);
        let mut new_connection = self.connection.clone();
        if new_connection.len() < self.previous.len() + self.shift {
            new_connection.resize(self.previous.len() + self.shift, self.field.zero());
        }
        for (i, c) in self.previous.iter().enumerate() {
            self.field
                .sub_mul_assign(&mut new_connection[i + self.shift], &scale, c);
        }

        if 2 * self.length <= n {
            self.previous = std::mem::replace(&mut self.connection, new_connection);
            self.length = n + 1 - self.length;
            self.previous_discrepancy = d;
            self.shift = 1;
        } else {
            self.connection = new_connection;
            self.shift += 1;
        }
    }

    /// The length of the shortest recurrence found so far.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The number of elements pushed.
    pub fn points(&self) -> usize {
        self.sequence.len()
    }

    pub fn sequence(&self) -> &[F::Element] {
        &self.sequence
    }

    /// The recurrence is considered final when `extra` more elements than the
    /// `2 L` needed to determine it have been pushed.
    pub fn is_stable(&self, extra: usize) -> bool {
        self.sequence.len() >= 2 * self.length + extra
    }

    /// The reversed connection polynomial `z^L C(1/z)`, whose roots generate the sequence.
    pub fn reversed_connection(&self, template: &UnivariatePolynomial<F>) -> UnivariatePolynomial<F> {
        let mut res = template.zero();
        res.coefficients = (0..=self.length)
            .map(|j| {
                self.connection
                    .get(self.length - j)
                    .cloned()
                    .unwrap_or_else(|| self.field.zero())
            })
            .collect();
        res.truncate();
        res
    }
}

/// Discrete logarithms to the base `omega` of exponents below a bound,
/// with the baby-step giant-step algorithm.
pub struct DiscreteLog<UField: FiniteFieldWorkspace>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    field: FiniteField<UField>,
    baby_steps: HashMap<UField, u64>,
    giant_step: <FiniteField<UField> as Ring>::Element,
    step: u64,
    bound: u64,
}

impl<UField: FiniteFieldWorkspace> DiscreteLog<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    /// Prepare to find logarithms in `[0, bound)`. Returns `None` if the order
    /// of `omega` is detected to be too small.
    pub fn new(
        field: &FiniteField<UField>,
        omega: &<FiniteField<UField> as Ring>::Element,
        bound: u64,
    ) -> Option<Self> {
        let mut step = (bound as f64).sqrt() as u64;
        while step.saturating_mul(step) < bound {
            step += 1;
        }
        let step = step.max(1);

        let mut baby_steps = HashMap::default();
        let mut w = field.one();
        for j in 0..step {
            if baby_steps.insert(field.from_element(&w), j).is_some() {
                return None;
            }
            field.mul_assign(&mut w, omega);
        }

        Some(Self {
            field: *field,
            baby_steps,
            giant_step: field.inv(&w),
            step,
            bound,
        })
    }

    /// Find `e < bound` with `omega^e = target`.
    pub fn log(&self, target: &<FiniteField<UField> as Ring>::Element) -> Option<u64> {
        let mut gamma = target.clone();
        let mut i = 0;
        while i * self.step < self.bound {
            if let Some(j) = self.baby_steps.get(&self.field.from_element(&gamma)) {
                let e = i * self.step + j;
                return if e < self.bound { Some(e) } else { None };
            }
            self.field.mul_assign(&mut gamma, &self.giant_step);
            i += 1;
        }
        None
    }
}

/// Compute the gcd of the coefficients of the polynomials in the variables `vars`.
pub(crate) fn content_modular<UField: FiniteFieldWorkspace, E: Exponent>(
    polys: &[MultivariatePolynomial<FiniteField<UField>, E>],
    vars: &[usize],
    config: &GcdConfig,
) -> Result<MultivariatePolynomial<FiniteField<UField>, E>, ImageError>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    let mut polys = polys.iter().filter(|p| !p.is_zero());
    let Some(first) = polys.next() else {
        return Err(ImageError::BadCurrentImage);
    };

    let mut content = first.clone().make_monic();
    for p in polys {
        if content.is_constant() {
            break;
        }
        content = brown_modular(&content, p, vars, config)?;
    }
    Ok(content)
}

/// Compute the monic gcd of `a` and `b` in the variables `vars` over a prime
/// field with Berlekamp-Massey interpolation of the non-main variables.
///
/// The contents of `a` and `b` with respect to the main variable `vars[0]`
/// must be coprime.
#[instrument(level = "trace", skip_all, fields(%a, %b))]
pub(crate) fn bma_modular<UField: FiniteFieldWorkspace, E: Exponent>(
    a: &MultivariatePolynomial<FiniteField<UField>, E>,
    b: &MultivariatePolynomial<FiniteField<UField>, E>,
    vars: &[usize],
    config: &GcdConfig,
) -> Result<MultivariatePolynomial<FiniteField<UField>, E>, ImageError>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    let field = a.field;
    let main = vars[0];
    if vars.len() == 1 {
        let g = a.to_univariate(main).gcd(&b.to_univariate(main));
        return Ok(a.from_univariate(&g, main));
    }

    let others = &vars[1..];
    let gamma = brown_modular(
        &a.univariate_lcoeff(main),
        &b.univariate_lcoeff(main),
        others,
        config,
    )?;

    // degree bounds of the gcd scaled to have leading coefficient gamma
    let mut radices: SmallVec<[u64; INLINED_EXPONENTS]> = smallvec![];
    let mut kronecker_bound: u64 = 1;
    for v in others {
        let d = min(a.degree(*v), b.degree(*v)).to_u32() as u64 + gamma.degree(*v).to_u32() as u64;
        radices.push(d + 1);
        kronecker_bound = match kronecker_bound.checked_mul(d + 1) {
            Some(k) => k,
            None => return Err(ImageError::BadCurrentImage),
        };
    }

    let p = field.get_prime().to_u64();
    if kronecker_bound >= p - 1 {
        debug!("Kronecker bound {} too large for prime {}", kronecker_bound, p);
        return Err(ImageError::BadCurrentImage);
    }

    let mut weights: SmallVec<[u64; INLINED_EXPONENTS]> = smallvec![];
    let mut w = 1;
    for r in &radices {
        weights.push(w);
        w *= r;
    }

    let a_ldegree = a.degree(main).to_u32() as usize;
    let b_ldegree = b.degree(main).to_u32() as usize;
    let max_points = 2 * kronecker_bound as usize + config.bma_stable_terms + 1;

    let mut rng = thread_rng();
    let mut degree_bound = min(a_ldegree, b_ldegree);
    let mut cache = vec![vec![]; a.nvars()];

    'new_omega: for attempt in 0..=config.max_unlucky_points {
        let omega = field.sample(&mut rng, (2, p.min(i64::MAX as u64) as i64));
        let Some(dlog) = DiscreteLog::new(&field, &omega, kronecker_bound) else {
            debug!("Order of omega too small");
            continue;
        };

        // the point alpha_1, every later point is a power of it
        let base: SmallVec<[(usize, _); INLINED_EXPONENTS]> = others
            .iter()
            .zip(&weights)
            .map(|(v, w)| (*v, field.pow(&omega, *w)))
            .collect();

        for c in &mut cache {
            c.clear();
        }
        let a_base = evaluate_exponents(a, &base, &mut cache);
        let b_base = evaluate_exponents(b, &base, &mut cache);
        let gamma_base = evaluate_exponents(&gamma, &base, &mut cache);
        // the first point is alpha_1 itself
        let mut a_current = a_base.clone();
        let mut b_current = b_base.clone();
        let mut gamma_current = gamma_base.clone();

        let mut channels: Vec<BerlekampMassey<FiniteField<UField>>> = vec![];
        let mut image_degree = None;

        for i in 0..max_points {
            if i > 0 {
                for (c, e) in a_current.iter_mut().zip(&a_base) {
                    field.mul_assign(c, e);
                }
                for (c, e) in b_current.iter_mut().zip(&b_base) {
                    field.mul_assign(c, e);
                }
                for (c, e) in gamma_current.iter_mut().zip(&gamma_base) {
                    field.mul_assign(c, e);
                }
            }

            let a_poly = evaluate_using_exponents(a, &a_current, main);
            let b_poly = evaluate_using_exponents(b, &b_current, main);
            if a_poly.degree() != a_ldegree || b_poly.degree() != b_ldegree {
                debug!("Leading coefficient vanishes at point {}", i);
                continue 'new_omega;
            }

            let g = a_poly.gcd(&b_poly);
            if g.degree() < degree_bound {
                debug!("Unlucky degree bound: {} vs {}", g.degree(), degree_bound);
                degree_bound = g.degree();
                continue 'new_omega;
            }
            if g.degree() > degree_bound || image_degree.map(|d| d != g.degree()).unwrap_or(false) {
                debug!("Unlucky point {}: degree {}", i, g.degree());
                continue 'new_omega;
            }

            if g.is_constant() {
                return Ok(a.one());
            }

            if image_degree.is_none() {
                image_degree = Some(g.degree());
                channels = (0..=g.degree()).map(|_| BerlekampMassey::new(&field)).collect();
            }

            let scale = evaluate_using_exponents(&gamma, &gamma_current, main).lcoeff();
            let g = g.mul_coeff(&scale);
            for (ch, c) in channels.iter_mut().zip(&g.coefficients) {
                ch.push(c.clone());
            }

            if channels.iter().all(|ch| ch.is_stable(config.bma_stable_terms)) {
                debug!(
                    "Recurrences stable after {} points (attempt {})",
                    i + 1,
                    attempt
                );
                match reconstruct(a, main, others, &radices, &weights, &dlog, &channels) {
                    Some(h) => {
                        let content = content_modular(
                            &h.to_univariate_polynomial_list(main)
                                .into_iter()
                                .map(|(c, _)| c)
                                .collect::<Vec<_>>(),
                            others,
                            config,
                        )?;
                        let h = (&h / &content).make_monic();

                        if a.divides(&h).is_some() && b.divides(&h).is_some() {
                            return Ok(h);
                        }
                        debug!("Trial division failed");
                    }
                    None => debug!("Could not decode the recurrences"),
                }
                continue 'new_omega;
            }
        }

        debug!("Recurrences did not stabilize");
    }

    Err(ImageError::BadCurrentImage)
}

/// Recover the polynomial whose coefficient of `main^k` generates the sequence of channel `k`.
fn reconstruct<UField: FiniteFieldWorkspace, E: Exponent>(
    template: &MultivariatePolynomial<FiniteField<UField>, E>,
    main: usize,
    others: &[usize],
    radices: &[u64],
    weights: &[u64],
    dlog: &DiscreteLog<UField>,
    channels: &[BerlekampMassey<FiniteField<UField>>],
) -> Option<MultivariatePolynomial<FiniteField<UField>, E>>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    let field = template.field;
    let uni_template = template.zero().to_univariate(main);

    let mut terms = vec![];
    for (k, ch) in channels.iter().enumerate() {
        if ch.is_empty() {
            continue;
        }

        let roots = ch.reversed_connection(&uni_template).distinct_roots()?;
        if roots.len() != ch.len() {
            return None;
        }

        // the sequence starts at beta^1, so every solution carries one factor of its node
        let coeffs = solve_transposed_vandermonde(&field, &roots, &ch.sequence()[..roots.len()]);

        for (root, c) in roots.iter().zip(coeffs) {
            if FiniteField::<UField>::is_zero(root) {
                return None;
            }
            let c = field.div(&c, root);
            let mut e: SmallVec<[E; INLINED_EXPONENTS]> = smallvec![E::zero(); template.nvars()];
            e[main] = E::from_u32(k as u32);

            let log = dlog.log(root)?;
            for ((v, w), r) in others.iter().zip(weights).zip(radices) {
                e[*v] = E::from_u32(((log / w) % r) as u32);
            }

            if !FiniteField::<UField>::is_zero(&c) {
                terms.push((e, c));
            }
        }
    }

    Some(template.from_unsorted_terms(terms))
}

/// Compute the gcd of primitive integer polynomials with Berlekamp-Massey
/// interpolation of the modular images.
pub(crate) fn gcd_bma<E: Exponent>(
    a: &MultivariatePolynomial<IntegerRing, E>,
    b: &MultivariatePolynomial<IntegerRing, E>,
    vars: &[usize],
    config: &GcdConfig,
) -> Result<MultivariatePolynomial<IntegerRing, E>, GcdError> {
    gcd_crt_loop(a, b, vars, config, |ap, bp| bma_modular(ap, bp, vars, config))
}

#[cfg(test)]
mod test {
    use crate::poly::gcd::GcdConfig;
    use crate::poly::polynomial::MultivariatePolynomial;
    use crate::poly::variables;
    use crate::rings::finite_field::{next_prime, FiniteFieldCore, Zp, Zp64};
    use crate::rings::integer::IntegerRing;
    use crate::rings::Ring;

    use super::{bma_modular, gcd_bma, BerlekampMassey, DiscreteLog};

    #[test]
    fn recurrence() {
        let field = Zp::new(101);
        let mut bm = BerlekampMassey::new(&field);

        // 3 * 2^i + 5 * 7^i
        let (mut x, mut y) = (field.nth(3), field.nth(5));
        for _ in 0..6 {
            bm.push(field.add(&x, &y));
            x = field.mul(&x, &field.nth(2));
            y = field.mul(&y, &field.nth(7));
        }

        assert_eq!(bm.len(), 2);
        assert!(bm.is_stable(2));

        let template = MultivariatePolynomial::<_, u8>::new(&field, None, variables(&["z"]))
            .to_univariate(0);
        let mut roots: Vec<u32> = bm
            .reversed_connection(&template)
            .distinct_roots()
            .unwrap()
            .iter()
            .map(|r| field.from_element(r))
            .collect();
        roots.sort();
        assert_eq!(roots, [2, 7]);
    }

    #[test]
    fn zero_sequence() {
        let field = Zp::new(101);
        let mut bm = BerlekampMassey::new(&field);
        for _ in 0..4 {
            bm.push(field.zero());
        }
        assert!(bm.is_empty());
        assert!(bm.is_stable(4));
    }

    #[test]
    fn discrete_log() {
        // 2 is a primitive root modulo 101
        let field = Zp::new(101);
        let dlog = DiscreteLog::new(&field, &field.nth(2), 100).unwrap();
        assert_eq!(dlog.log(&field.pow(&field.nth(2), 37)), Some(37));
        assert_eq!(dlog.log(&field.one()), Some(0));

        // 10 has order 4
        assert!(DiscreteLog::new(&field, &field.nth(10), 100).is_none());
    }

    #[test]
    fn bma_modular_gcd() {
        let field = Zp64::new(next_prime(1 << 60).unwrap());
        let vars = variables(&["x", "y", "z", "w"]);
        let parse =
            |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

        let g = parse("x^3*y^5*w+17*x*z^7-y*w^2+3");
        let a = &g * &parse("x^2-y*z*w+1");
        let b = &g * &parse("x*y^4+z^3-w");

        let r = bma_modular(&a, &b, &[0, 1, 2, 3], &GcdConfig::default()).unwrap();
        assert_eq!(r, g.make_monic());
    }

    #[test]
    fn cofactors_agree_at_one() {
        // both cofactors are x-1 when y = z = w = 1
        let field = Zp64::new(next_prime(1 << 60).unwrap());
        let vars = variables(&["x", "y", "z", "w"]);
        let parse =
            |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

        let g = parse("x^5+y*z+w^2+3");
        let a = &g * &parse("x+y-z*w-1");
        let b = &g * &parse("x+z*w-y-1");

        let r = bma_modular(&a, &b, &[0, 1, 2, 3], &GcdConfig::default()).unwrap();
        assert_eq!(r, g);

        let vars = variables(&["x", "y", "z", "w"]);
        let parse = |s: &str| {
            MultivariatePolynomial::<_, u16>::parse(s, &IntegerRing::new(), vars.clone()).unwrap()
        };
        let g = parse("x^5+y*z+w^2+3");
        let a = &g * &parse("x+y-z*w-1");
        let b = &g * &parse("x+z*w-y-1");
        assert_eq!(a.gcd(&b).unwrap(), g);
        assert_eq!(gcd_bma(&a, &b, &[0, 1, 2, 3], &GcdConfig::default()).unwrap(), g);
    }

    #[test]
    fn bma_integer() {
        let vars = variables(&["x", "y", "z"]);
        let parse = |s: &str| {
            MultivariatePolynomial::<_, u16>::parse(s, &IntegerRing::new(), vars.clone()).unwrap()
        };

        let g = parse("5*x^4*y^2-3*x*z^3+y*z+2");
        let a = &g * &parse("x*y+z^2-1");
        let b = &g * &parse("x^2*z-y^3+7");

        let r = gcd_bma(&a, &b, &[0, 1, 2], &GcdConfig::default()).unwrap();
        assert_eq!(r, g);
    }
}

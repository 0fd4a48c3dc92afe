use std::sync::Arc;

use mpgcd::{
    poly::{
        gcd::{GcdConfig, GcdStrategy, PolynomialGCD},
        polynomial::MultivariatePolynomial,
        variables, Variable,
    },
    rings::{
        finite_field::{Zp, Zp64},
        galois_field::GaloisField,
        integer::{Integer, IntegerRing},
        EvaluationField, Ring,
    },
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const STRATEGIES: [GcdStrategy; 3] = [
    GcdStrategy::Brown,
    GcdStrategy::Zippel,
    GcdStrategy::BerlekampMassey,
];

fn int(s: &str, vars: &Arc<Vec<Variable>>) -> MultivariatePolynomial<IntegerRing, u16> {
    MultivariatePolynomial::parse(s, &IntegerRing::new(), vars.clone()).unwrap()
}

/// Check that the gcd of `a` and `b` is `g`, that it divides both inputs
/// and that the cofactors are coprime.
fn gcd_check<R: PolynomialGCD<u16>>(
    g: &MultivariatePolynomial<R, u16>,
    a: &MultivariatePolynomial<R, u16>,
    b: &MultivariatePolynomial<R, u16>,
    config: &GcdConfig,
    name: &str,
) {
    let r = a.gcd_with_config(b, config).unwrap();
    r.check_consistency();

    assert_eq!(&r, g, "{}: wrong gcd with {:?}", name, config.strategy);

    let ca = a.divides(&r).expect("gcd does not divide a");
    let cb = b.divides(&r).expect("gcd does not divide b");
    assert!(
        ca.gcd_with_config(&cb, config).unwrap().is_one(),
        "{}: cofactors are not coprime",
        name
    );
}

#[test]
fn univariate() {
    let vars = variables(&["x"]);
    let a = int("(x+1)*(x-2)", &vars);
    let b = int("(x+1)*(x+3)", &vars);
    gcd_check(&int("x+1", &vars), &a, &b, &GcdConfig::default(), "univariate");
}

#[test]
fn zero_handling() {
    let vars = variables(&["x", "y"]);
    let zero = int("0", &vars);
    let a = int("-3*x*y^2+6*x", &vars);

    assert!(zero.gcd(&zero).unwrap().is_zero());
    assert_eq!(zero.gcd(&a).unwrap(), int("3*x*y^2-6*x", &vars));
    assert_eq!(a.gcd(&zero).unwrap(), int("3*x*y^2-6*x", &vars));

    let (g, ca, cb) = a.gcd_with_cofactors(&zero).unwrap();
    assert_eq!(ca, int("-1", &vars));
    assert!(cb.is_zero());
    assert_eq!(&ca * &g, a);
}

#[test]
fn positive_leading_coefficient() {
    let vars = variables(&["x", "y", "z"]);
    let g = int("-2*x^2*y+z^3-y", &vars);
    let a = &g * &int("x*z-1", &vars);
    let b = &g * &int("-y^2+x+z", &vars);

    let r = a.gcd(&b).unwrap();
    assert!(!r.lcoeff().is_negative());
    assert_eq!(r, -g);
}

#[test]
fn scaling_invariance() {
    let vars = variables(&["x", "y", "z"]);
    let g = int("x^2*y-3*y*z^2+5*z-1", &vars);
    let a = &g * &int("x+y+z+1", &vars);
    let b = &g * &int("x*y*z-2", &vars);

    let r = a.gcd(&b).unwrap();
    let scaled = a
        .clone()
        .mul_coeff(&Integer::new(6))
        .gcd(&b.clone().mul_coeff(&Integer::new(-15)))
        .unwrap();
    assert_eq!(scaled, r.mul_coeff(&Integer::new(3)));
}

#[test]
fn sparse_gcd_with_cofactors() {
    let vars = variables(&["x", "y", "z", "t"]);
    let g = int("y + t^2 + x^3 + z^4", &vars);
    let a = &g * &int("y*t + 1 + (x - z^5)*(y + t)", &vars);
    let b = &g * &int("y*t + 1 + (x - z^5)*(y - t + x)", &vars);

    for strategy in STRATEGIES {
        let config = GcdConfig::default().with_strategy(Some(strategy));
        gcd_check(&g, &a, &b, &config, "unlucky kronecker substitution");
    }

    let (r, ca, cb) = a.gcd_with_cofactors(&b).unwrap();
    assert_eq!(r, g);
    assert_eq!(&ca * &r, a);
    assert_eq!(&cb * &r, b);
}

/// Examples that force unlucky primes, wrong shapes and vanishing leading
/// coefficients when the primes start just above 33856.
#[test]
fn restarts() {
    let vars = variables(&["x", "y", "z", "t"]);
    let cases = [
        (
            "y + 33857*t^2 + 35153*x^3 + 40433*z^4",
            "y^4 + t^3 + x^2 + 1",
            "y^3 + t^4 + x^2 + z",
            "shape mismatch",
        ),
        (
            "y + t + x^3 + z^3",
            "(x - z^4)*y + 1",
            "(x + z)*y + t",
            "leading coefficient vanishes",
        ),
        (
            "y + t + x^3 + z^3",
            "(x - z^4 + 33857*(x*z))*y + 1",
            "(x + z)*y + t",
            "leading coefficient vanishes mod p",
        ),
        (
            "(1 + x^10)*t*y + t + x + z",
            "(1 + x + t)*(x - 33857*x^2 + 35153*z^4)*y*t + z + x*y",
            "(2*x - t^2)*(x - 33857*x^2 + 35153*z^4)*y^2*t + t*z + y",
            "gcd of the leading coefficients vanishes mod p",
        ),
    ];

    for (g, a, b, name) in cases {
        let g = int(g, &vars);
        let a = &g * &int(a, &vars);
        let b = &g * &int(b, &vars);

        for strategy in STRATEGIES {
            let config = GcdConfig::default()
                .with_prime_start(33856)
                .with_strategy(Some(strategy));
            gcd_check(&g, &a, &b, &config, name);
        }
    }
}

#[test]
fn dense_finite_field_family() {
    let field = Zp::new(43051);

    for n in 3..=6 {
        let names: Vec<String> = (0..n).map(|i| format!("x{}", i)).collect();
        let vars = variables(&names.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        let product = |shift: &str| {
            names
                .iter()
                .map(|v| format!("({}{})", v, shift))
                .collect::<Vec<_>>()
                .join("*")
        };
        let parse = |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

        let g = parse(&format!("{}-2", product("+1")));
        let a = &g * &parse(&format!("{}+2", product("-2")));
        let b = &g * &parse(&format!("{}-2", product("+2")));

        gcd_check(&g, &a, &b, &GcdConfig::default(), "dense examples");

        if n == 4 {
            for strategy in STRATEGIES {
                let config = GcdConfig::default().with_strategy(Some(strategy));
                gcd_check(&g, &a, &b, &config, "dense examples");
            }
        }
    }
}

#[test]
fn large_coefficients() {
    let vars = variables(&["x", "y", "z"]);
    let g = int("123456789012345678901234567890*x^3*y+987654321987654321*z^2-1", &vars);
    let a = &g * &int("55555555555555555555*x*y*z+x^2-3", &vars);
    let b = &g * &int("x^4-77777777777777777777*y^2+z", &vars);

    for strategy in STRATEGIES {
        let config = GcdConfig::default().with_strategy(Some(strategy));
        gcd_check(&g, &a, &b, &config, "large coefficients");
    }
}

#[test]
fn threads_agree() {
    let vars = variables(&["x", "y", "z", "t", "u"]);
    let g = int("x^4*y*z^2-3*t^3*u+17*y^2*u^2-x*t+1234567891011", &vars);
    let a = &g * &int("x*y*z*t*u+x^2-u^3+7", &vars);
    let b = &g * &int("x^3*t-y*z^2+u*t-2", &vars);

    for threads in 1..=4 {
        for strategy in STRATEGIES {
            let config = GcdConfig::default()
                .with_threads(threads)
                .with_strategy(Some(strategy));
            gcd_check(&g, &a, &b, &config, "threads");
        }
    }
}

#[test]
fn prime_field_strategies() {
    let field = Zp64::new(18446744073709551557);
    let vars = variables(&["x", "y", "z", "t"]);
    let parse = |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

    let g = parse("x^3*y*t+5*z^2*t-y^2+11").make_monic();
    let a = &g * &parse("x*y+z*t^2-1");
    let b = &g * &parse("x^2*z-y*t+3");

    for strategy in STRATEGIES {
        let config = GcdConfig::default().with_strategy(Some(strategy));
        gcd_check(&g, &a, &b, &config, "prime field");
    }
}

#[test]
fn prs_agrees() {
    let vars = variables(&["x", "y", "z"]);
    let g = int("2*x^2*y-z^3+y*z-4", &vars);
    let a = &g * &int("x*y-z+3", &vars);
    let b = &g * &int("x^2+y^2-z", &vars);

    let r = a.gcd_prs(&b);
    assert!(r == g || r == -g);
}

fn random_polynomial<R: Ring>(
    field: &R,
    vars: &Arc<Vec<Variable>>,
    nterms: usize,
    max_degree: u16,
    rng: &mut StdRng,
    coeff: impl Fn(&mut StdRng) -> R::Element,
) -> MultivariatePolynomial<R, u16> {
    let mut p = MultivariatePolynomial::new(field, Some(nterms), vars.clone());
    for _ in 0..nterms {
        let e = (0..vars.len()).map(|_| rng.gen_range(0..=max_degree)).collect();
        p = &p + &p.monomial(coeff(rng), e);
    }
    p
}

#[test]
fn random_integer() {
    let mut rng = StdRng::seed_from_u64(42);
    let vars = variables(&["x", "y", "z", "t"]);
    let field = IntegerRing::new();
    let coeff = |rng: &mut StdRng| {
        let c = rng.gen_range(1..=1000);
        Integer::new(if rng.gen_bool(0.5) { c } else { -c })
    };

    for _ in 0..10 {
        let g = random_polynomial(&field, &vars, 6, 3, &mut rng, coeff);
        let a = &g * &random_polynomial(&field, &vars, 5, 3, &mut rng, coeff);
        let b = &g * &random_polynomial(&field, &vars, 5, 3, &mut rng, coeff);
        if g.is_zero() || a.is_zero() || b.is_zero() {
            continue;
        }

        let expected = a.gcd(&b).unwrap();
        assert!(expected.divides(&g).is_some(), "{} does not divide {}", g, expected);

        for strategy in STRATEGIES {
            let config = GcdConfig::default().with_strategy(Some(strategy));
            gcd_check(&expected, &a, &b, &config, "random integer");
        }
    }
}

#[test]
fn random_prime_field() {
    let mut rng = StdRng::seed_from_u64(7);
    let field = Zp::new(1000003);
    let vars = variables(&["x", "y", "z", "t", "u"]);
    let coeff = |rng: &mut StdRng| field.nth(rng.gen_range(1..1000003));

    for _ in 0..10 {
        let g = random_polynomial(&field, &vars, 8, 2, &mut rng, coeff);
        let a = &g * &random_polynomial(&field, &vars, 4, 2, &mut rng, coeff);
        let b = &g * &random_polynomial(&field, &vars, 4, 2, &mut rng, coeff);
        if g.is_zero() || a.is_zero() || b.is_zero() {
            continue;
        }

        let expected = a.gcd(&b).unwrap();
        assert!(expected.divides(&g).is_some(), "{} does not divide {}", g, expected);

        for strategy in STRATEGIES {
            let config = GcdConfig::default().with_strategy(Some(strategy));
            gcd_check(&expected, &a, &b, &config, "random prime field");
        }
    }
}

#[test]
fn galois_field_strategies() {
    let field = GaloisField::find(Zp::new(17), 3);
    let vars = variables(&["x", "y", "z"]);
    let parse = |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();
    let a = field.generator();
    let a1 = field.add(&a, &field.one());

    let template = parse("0");
    let g = &parse("x^3*y+z^2+2") + &template.monomial(a.clone(), vec![1, 1, 1]);
    let g = g.make_monic();
    let ca = &parse("x-z") + &template.monomial(a.clone(), vec![0, 2, 0]);
    let cb = &parse("x^2*z+3") + &template.monomial(a1, vec![0, 1, 0]);
    let ga = &g * &ca;
    let gb = &g * &cb;

    for strategy in STRATEGIES {
        let config = GcdConfig::default().with_strategy(Some(strategy));
        gcd_check(&g, &ga, &gb, &config, "galois field");
    }
}

#[test]
fn random_galois_field() {
    let mut rng = StdRng::seed_from_u64(11);
    let field = GaloisField::find(Zp::new(101), 2);
    let vars = variables(&["x", "y", "z", "t"]);
    let coeff = |rng: &mut StdRng| field.element_at(rng.gen_range(1..field.size()));

    for _ in 0..10 {
        let g = random_polynomial(&field, &vars, 6, 2, &mut rng, coeff);
        let a = &g * &random_polynomial(&field, &vars, 4, 2, &mut rng, coeff);
        let b = &g * &random_polynomial(&field, &vars, 4, 2, &mut rng, coeff);
        if g.is_zero() || a.is_zero() || b.is_zero() {
            continue;
        }

        let expected = a.gcd(&b).unwrap();
        assert!(expected.divides(&g).is_some(), "{} does not divide {}", g, expected);

        for strategy in STRATEGIES {
            let config = GcdConfig::default().with_strategy(Some(strategy));
            gcd_check(&expected, &a, &b, &config, "random galois field");
        }
    }
}

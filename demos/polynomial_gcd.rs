use mpgcd::{
    poly::{
        gcd::{GcdConfig, GcdStrategy},
        polynomial::MultivariatePolynomial,
        variables,
    },
    rings::{finite_field::Zp, galois_field::GaloisField, integer::IntegerRing},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn gcd_integer_poly() {
    let vars = variables(&["x", "y"]);
    let a = MultivariatePolynomial::<_, u8>::parse(
        "5 + 8*x + 3*x^2 - 5*y - 3*x*y",
        &IntegerRing::new(),
        vars.clone(),
    )
    .unwrap();

    let b = MultivariatePolynomial::<_, u8>::parse(
        "5 + 5*x - 2*y + 3*x*y - 3*y^2",
        &IntegerRing::new(),
        vars,
    )
    .unwrap();

    println!("> Polynomial gcd of {} and {} =", a, b);
    println!("\t{}", a.gcd(&b).unwrap());
}

fn gcd_sparse_poly() {
    let vars = variables(&["x", "y", "z", "t", "u"]);
    let parse = |s: &str| {
        MultivariatePolynomial::<_, u16>::parse(s, &IntegerRing::new(), vars.clone()).unwrap()
    };

    let g = parse("x^5*y*z^3+3*t^4*u-y^2*z*u^2+12345678901234567890");
    let a = &g * &parse("x*y*z*t*u+x^2-u^3+7");
    let b = &g * &parse("x^3*t-y*z^2+u*t-2");

    for strategy in [GcdStrategy::Brown, GcdStrategy::Zippel, GcdStrategy::BerlekampMassey] {
        let config = GcdConfig::default()
            .with_strategy(Some(strategy))
            .with_threads(4);
        println!("> {:?}: {}", strategy, a.gcd_with_config(&b, &config).unwrap());
    }
}

fn gcd_finite_field_poly() {
    let field = Zp::new(43051);
    let vars = variables(&["x", "y", "z"]);
    let a = MultivariatePolynomial::<_, u8>::parse("(x+1)*(y+1)*(z+1)-2", &field, vars.clone())
        .unwrap();
    let b = &a * &MultivariatePolynomial::parse("x*y-z", &field, vars.clone()).unwrap();
    let c = &a * &MultivariatePolynomial::parse("x+y^2+z^3", &field, vars).unwrap();

    let (g, cb, cc) = b.gcd_with_cofactors(&c).unwrap();
    println!("> gcd over {} = {}, cofactors {} and {}", field, g, cb, cc);
}

fn gcd_galois_field_poly() {
    let field = GaloisField::find(Zp::new(7), 3);
    let vars = variables(&["x", "y"]);
    let parse = |s: &str| MultivariatePolynomial::<_, u8>::parse(s, &field, vars.clone()).unwrap();

    let g = &parse("x^2+y") + &parse("0").monomial(field.generator(), vec![1, 1]);
    let a = &g * &parse("x-y^2+3");
    let b = &g * &parse("x*y+2");

    println!("> gcd over {} = {}", field, a.gcd(&b).unwrap());
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_env("MPGCD_LOG"))
        .init();

    gcd_integer_poly();
    gcd_sparse_poly();
    gcd_finite_field_poly();
    gcd_galois_field_poly();
}

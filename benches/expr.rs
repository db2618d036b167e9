use bastion_engine::currency::{self, ConversionEdge};
use bastion_engine::expr::{self, ErrorSink, ExprLimits, Vars};
use bastion_engine::rng::SmallRngSource;

criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .significance_level(0.01)
        .sample_size(20)
        .measurement_time(std::time::Duration::from_secs(1));
    targets =
        evaluating_arithmetic_expression,
        evaluating_dice_expression,
        evaluating_nested_comparison,
        building_currency_model,
}

fn evaluating_arithmetic_expression(c: &mut criterion::Criterion) {
    let limits = ExprLimits::default();
    let mut rng = SmallRngSource::seeded(1);
    let mut vars = Vars::new();
    vars.insert("stat".into(), 12.0);
    c.bench_function("evaluate a plain arithmetic expression", |b| {
        b.iter(|| {
            let mut errors = ErrorSink::new();
            expr::evaluate("(stat + 3) * 2 - 1", &vars, &limits, &mut rng, &mut errors)
        })
    });
}

fn evaluating_dice_expression(c: &mut criterion::Criterion) {
    let limits = ExprLimits::default();
    let mut rng = SmallRngSource::seeded(1);
    let vars = Vars::new();
    c.bench_function("evaluate a formula with dice macros", |b| {
        b.iter(|| {
            let mut errors = ErrorSink::new();
            expr::evaluate("2d6 + 1d20 - 3", &vars, &limits, &mut rng, &mut errors)
        })
    });
}

fn evaluating_nested_comparison(c: &mut criterion::Criterion) {
    let limits = ExprLimits::default();
    let mut rng = SmallRngSource::seeded(1);
    let mut vars = Vars::new();
    vars.insert("roll".into(), 14.0);
    vars.insert("dc".into(), 10.0);
    c.bench_function("evaluate a boolean comparison chain", |b| {
        b.iter(|| {
            let mut errors = ErrorSink::new();
            expr::evaluate_bool("roll >= dc && roll < 20", &vars, &limits, &mut rng, &mut errors)
        })
    });
}

fn building_currency_model(c: &mut criterion::Criterion) {
    let types: Vec<String> = ["copper", "silver", "electrum", "gold", "platinum"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let edges = vec![
        ConversionEdge { from: "silver".into(), to: "copper".into(), rate: 10 },
        ConversionEdge { from: "electrum".into(), to: "silver".into(), rate: 5 },
        ConversionEdge { from: "gold".into(), to: "electrum".into(), rate: 2 },
        ConversionEdge { from: "platinum".into(), to: "gold".into(), rate: 5 },
    ];
    c.bench_function("compile a 5-currency conversion graph", |b| {
        b.iter(|| currency::build(&types, &edges, Some("copper")))
    });
}

//! C2 — Currency Model. Compiles currency types and conversion edges into a
//! base-unit factor map, validating connectedness and surfacing contradictory
//! paths as config errors.

use crate::error::EngineError;
use std::collections::{HashMap, HashSet, VecDeque};

/// Small exact-rational type, mirroring the original implementation's use of
/// Python's `fractions.Fraction` for conversion factors (no third-party
/// rational-number crate is in the dependency table, so this is a minimal
/// hand-rolled equivalent — see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "rational denominator must not be zero");
        let sign = if den < 0 { -1 } else { 1 };
        let (num, den) = (num * sign, den * sign);
        let g = gcd(num.abs(), den).max(1);
        Rational {
            num: num / g,
            den: den / g,
        }
    }

    pub fn one() -> Self {
        Rational { num: 1, den: 1 }
    }

    pub fn mul(self, other: Self) -> Self {
        Rational::new(self.num * other.num, self.den * other.den)
    }

    pub fn is_integer(self) -> bool {
        self.den == 1
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

#[derive(Debug, Clone)]
pub struct ConversionEdge {
    pub from: String,
    pub to: String,
    pub rate: i64,
}

#[derive(Debug, Clone)]
pub struct CurrencyModel {
    pub types: Vec<String>,
    pub base: String,
    pub factor_to_base: HashMap<String, Rational>,
}

impl CurrencyModel {
    pub fn factor(&self, currency: &str) -> Option<Rational> {
        self.factor_to_base.get(currency).copied()
    }

    /// Round-half-away-from-zero conversion of `amount` units of `currency`
    /// into base units. Mirrors `facility_helpers.round_commercial` applied
    /// at the point of conversion.
    pub fn to_base_units(&self, currency: &str, amount: i64) -> Option<i64> {
        let factor = self.factor(currency)?;
        Some(round_commercial(amount as f64 * factor.to_f64()))
    }

    /// "Making change": decompose a base-unit scalar into a per-currency
    /// display wallet, largest denomination first. This is a projection —
    /// it is never written back into session state (SPEC_FULL.md §D.1).
    pub fn project_wallet(&self, treasury_base: i64) -> HashMap<String, i64> {
        let mut ordered: Vec<&String> = self.types.iter().collect();
        ordered.sort_by(|a, b| {
            self.factor_to_base[*b]
                .to_f64()
                .partial_cmp(&self.factor_to_base[*a].to_f64())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut remaining = treasury_base;
        let mut out = HashMap::new();
        let last_index = ordered.len().saturating_sub(1);
        for (i, currency) in ordered.iter().enumerate() {
            let factor = self.factor_to_base[*currency].to_f64();
            if i == last_index || factor <= 0.0 {
                out.insert((*currency).clone(), remaining);
                break;
            }
            let qty = (remaining as f64 / factor).floor() as i64;
            out.insert((*currency).clone(), qty);
            remaining -= round_commercial(qty as f64 * factor);
        }
        out
    }
}

pub fn round_commercial(value: f64) -> i64 {
    if value >= 0.0 {
        (value + 0.5).floor() as i64
    } else {
        (value - 0.5).ceil() as i64
    }
}

/// Build the currency model per spec §4.2. `base` pins the base currency
/// when the config declares one explicitly; otherwise the unique type that
/// never appears as the `to` side of any edge is chosen, falling back to
/// the first declared type on ambiguity.
pub fn build(
    types: &[String],
    edges: &[ConversionEdge],
    base: Option<&str>,
) -> Result<CurrencyModel, EngineError> {
    let mut seen = HashSet::new();
    let mut ordered_types = Vec::new();
    for t in types {
        if seen.insert(t.clone()) {
            ordered_types.push(t.clone());
        }
    }
    if ordered_types.is_empty() {
        return Err(EngineError::Config("currency config has no types".into()));
    }

    let mut edge_map: HashMap<(String, String), i64> = HashMap::new();
    for e in edges {
        if e.rate <= 0 {
            return Err(EngineError::Config(format!(
                "conversion rate for {}->{} must be positive",
                e.from, e.to
            )));
        }
        edge_map.insert((e.from.clone(), e.to.clone()), e.rate);
    }

    let mut adjacency: HashMap<String, Vec<(String, Rational)>> = HashMap::new();
    for ((from, to), rate) in &edge_map {
        adjacency
            .entry(from.clone())
            .or_default()
            .push((to.clone(), Rational::new(1, *rate)));
        adjacency
            .entry(to.clone())
            .or_default()
            .push((from.clone(), Rational::new(*rate, 1)));
    }

    let base = match base {
        Some(b) => b.to_string(),
        None => {
            let to_set: HashSet<&String> = edge_map.keys().map(|(_, to)| to).collect();
            let candidates: Vec<&String> = ordered_types
                .iter()
                .filter(|t| !to_set.contains(t))
                .collect();
            if candidates.len() == 1 {
                candidates[0].clone()
            } else {
                ordered_types[0].clone()
            }
        }
    };

    let mut factor: HashMap<String, Rational> = HashMap::new();
    factor.insert(base.clone(), Rational::one());
    let mut queue = VecDeque::new();
    queue.push_back(base.clone());
    while let Some(current) = queue.pop_front() {
        let current_factor = factor[&current];
        if let Some(neighbors) = adjacency.get(&current) {
            for (next, rate) in neighbors {
                let candidate = current_factor.mul(*rate);
                match factor.get(next) {
                    None => {
                        factor.insert(next.clone(), candidate);
                        queue.push_back(next.clone());
                    }
                    Some(existing) if *existing != candidate => {
                        return Err(EngineError::Config(format!(
                            "contradictory conversion path for currency '{next}'"
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let unreachable: Vec<&String> = ordered_types
        .iter()
        .filter(|t| !factor.contains_key(*t))
        .collect();
    if !unreachable.is_empty() {
        return Err(EngineError::Config(format!(
            "currency types unreachable from base '{base}': {unreachable:?}"
        )));
    }

    Ok(CurrencyModel {
        types: ordered_types,
        base,
        factor_to_base: factor,
    })
}

/// Same as [`build`], but on any fatal inconsistency falls back to a single
/// artificial base currency rather than failing the whole config load
/// (spec §4.2: "On fatal inconsistency fall back to a single artificial base").
pub fn build_or_fallback(
    types: &[String],
    edges: &[ConversionEdge],
    base: Option<&str>,
) -> CurrencyModel {
    match build(types, edges, base) {
        Ok(model) => model,
        Err(e) => {
            log::error!("currency model build failed, falling back to artificial base: {e}");
            let fallback = types.first().cloned().unwrap_or_else(|| "base".to_string());
            let mut factor_to_base = HashMap::new();
            factor_to_base.insert(fallback.clone(), Rational::one());
            CurrencyModel {
                types: vec![fallback.clone()],
                base: fallback,
                factor_to_base,
            }
        }
    }
}

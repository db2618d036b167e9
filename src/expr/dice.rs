use super::{ErrorSink, ExprLimits};
use crate::rng::Rng;
use regex::Regex;
use std::sync::OnceLock;

static DICE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern() -> &'static Regex {
    DICE_PATTERN.get_or_init(|| Regex::new(r"(?i)\b(\d*)d(\d+)\b").expect("valid dice regex"))
}

/// Pre-expand every `NdM` dice macro in `expr` to its summed random result
/// before parsing. `N` defaults to 1 when omitted; both `N` and `M` must be
/// positive and within the configured limits, otherwise the token is
/// replaced with `0` and an error is recorded.
pub fn expand_dice(
    expr: &str,
    limits: &ExprLimits,
    rng: &mut dyn Rng,
    errors: &mut ErrorSink,
) -> String {
    let re = pattern();
    let mut out = String::with_capacity(expr.len());
    let mut last = 0;
    for caps in re.captures_iter(expr) {
        let whole = caps.get(0).unwrap();
        out.push_str(&expr[last..whole.start()]);
        let count_str = &caps[1];
        let count: u32 = if count_str.is_empty() { 1 } else { count_str.parse().unwrap_or(0) };
        let sides: u32 = caps[2].parse().unwrap_or(0);
        if count == 0 || sides == 0 {
            out.push('0');
        } else if count > limits.dice_max_count || sides > limits.dice_max_sides {
            errors.push(format!(
                "dice roll '{}' exceeds configured limits ({} max count, {} max sides)",
                whole.as_str(),
                limits.dice_max_count,
                limits.dice_max_sides
            ));
            out.push('0');
        } else {
            let total: u32 = (0..count).map(|_| rng.roll_die(sides)).sum();
            out.push_str(&total.to_string());
        }
        last = whole.end();
    }
    out.push_str(&expr[last..]);
    out
}

//! Volatility regime buckets

use crate::models::signal::VolatilityRegime;

/// Map a volatility reading to its bucket.
///
/// `breakpoints` are the lower edges of NORMAL, HIGH and EXTREME; a value
/// sitting exactly on an edge belongs to the higher bucket.
pub fn classify_volatility(value: f64, breakpoints: &[f64; 3]) -> VolatilityRegime {
    let [normal, high, extreme] = *breakpoints;
    if value >= extreme {
        VolatilityRegime::Extreme
    } else if value >= high {
        VolatilityRegime::High
    } else if value >= normal {
        VolatilityRegime::Normal
    } else {
        VolatilityRegime::Low
    }
}

/// Lower edge of a bucket (0 for LOW).
fn regime_floor(regime: VolatilityRegime, breakpoints: &[f64; 3]) -> f64 {
    match regime {
        VolatilityRegime::Low => 0.0,
        VolatilityRegime::Normal => breakpoints[0],
        VolatilityRegime::High => breakpoints[1],
        VolatilityRegime::Extreme => breakpoints[2],
    }
}

/// The breakpoint crossed when moving between two buckets.
pub fn boundary_between(
    from: VolatilityRegime,
    to: VolatilityRegime,
    breakpoints: &[f64; 3],
) -> f64 {
    regime_floor(from.max(to), breakpoints)
}

use crate::catalog::LabelCatalog;
use crate::types::PredictionResult;

const PROBABILITY_DECIMALS: i32 = 4;

/// Picks the most likely class and names it.
///
/// Ties go to the lowest index. A class id missing from the catalog is
/// reported as `class_<id>` rather than failing.
pub fn resolve(probabilities: &[f32], catalog: &LabelCatalog) -> PredictionResult {
    let (index, score) = argmax(probabilities);
    let class_id = index as u32 + catalog.base().offset();

    let class_name = catalog
        .name(class_id)
        .map(str::to_string)
        .unwrap_or_else(|| placeholder_name(class_id));
    let display_name = catalog.display_name(&class_name);

    PredictionResult {
        class_id,
        class_name,
        display_name,
        probability: round_probability(score),
    }
}

/// First-max scan. NaN scores never win; an empty or all-NaN vector yields `(0, 0.0)`.
fn argmax(probabilities: &[f32]) -> (usize, f32) {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in probabilities.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best.unwrap_or((0, 0.0))
}

fn placeholder_name(class_id: u32) -> String {
    format!("class_{class_id:03}")
}

fn round_probability(score: f32) -> f64 {
    let factor = 10f64.powi(PROBABILITY_DECIMALS);
    (f64::from(score).clamp(0.0, 1.0) * factor).round() / factor
}

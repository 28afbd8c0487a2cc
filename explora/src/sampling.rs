// src/sampling.rs
//
// Exploration sampling: turn a probability density over action indices
// into a sampled action plus a reordered action list with the sample
// first. Deterministic in (seed, pdf) via inverse-CDF over a seeded
// uniform draw.

use crate::hashing::uniform_unit;
use crate::responses::{ActionProb, RankingResponse};
use crate::status::{ApiError, ApiResult};

/// Allowed drift of `Σp` away from 1.
pub const PDF_NORMALIZATION_TOLERANCE: f32 = 1e-5;

/// Validate a pdf: no negative mass, not all zero, normalized within
/// tolerance.
pub fn validate_pdf(pdf: &[f32]) -> ApiResult<()> {
    if pdf.is_empty() {
        return Err(ApiError::invalid_pdf("pdf is empty"));
    }
    // Accumulate in f64 so the check reflects the mass itself rather
    // than f32 summation error.
    let mut sum = 0.0f64;
    for (i, &p) in pdf.iter().enumerate() {
        if !p.is_finite() || p < 0.0 {
            return Err(ApiError::invalid_pdf(format!(
                "pdf[{i}] = {p} is negative or non-finite"
            )));
        }
        sum += p as f64;
    }
    if sum == 0.0 {
        return Err(ApiError::invalid_pdf("pdf has zero total mass"));
    }
    if (sum - 1.0).abs() > PDF_NORMALIZATION_TOLERANCE as f64 {
        return Err(ApiError::invalid_pdf(format!(
            "pdf sums to {sum}, outside normalization tolerance"
        )));
    }
    Ok(())
}

/// Inverse-CDF sample: the smallest index whose cumulative mass reaches
/// the seeded uniform draw.
pub fn sample_index(seed: u64, pdf: &[f32]) -> ApiResult<usize> {
    validate_pdf(pdf)?;
    let u = uniform_unit(seed);
    let mut cumulative = 0.0f64;
    for (i, &p) in pdf.iter().enumerate() {
        cumulative += p as f64;
        if cumulative >= u {
            return Ok(i);
        }
    }
    // The draw exceeded the (tolerance-short) total mass; the last
    // index owns the remainder.
    Ok(pdf.len() - 1)
}

/// Sample an action and reorder `(action_ids, pdf)` so the sampled
/// element is first, with the relative order of the rest preserved.
///
/// Returns the reordered pairs; the chosen action id and probability are
/// the first element.
pub fn sample_and_reorder(
    seed: u64,
    action_ids: &[u32],
    pdf: &[f32],
) -> ApiResult<Vec<ActionProb>> {
    if action_ids.len() != pdf.len() {
        return Err(ApiError::invalid_pdf(format!(
            "pdf length {} does not match action count {}",
            pdf.len(),
            action_ids.len()
        )));
    }
    let chosen = sample_index(seed, pdf)?;
    let mut reordered = Vec::with_capacity(pdf.len());
    reordered.push(ActionProb {
        action_id: action_ids[chosen],
        probability: pdf[chosen],
    });
    for i in 0..pdf.len() {
        if i != chosen {
            reordered.push(ActionProb {
                action_id: action_ids[i],
                probability: pdf[i],
            });
        }
    }
    Ok(reordered)
}

/// Sort a ranking ascending by action id; the chosen action becomes the
/// first element and every probability travels with its action.
///
/// Idempotent. Used to reduce a sampled response to the baseline order
/// in apprentice / logging-only modes.
pub fn reset_action_order(response: &mut RankingResponse) {
    response.ranking.sort_by_key(|a| a.action_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_response(pairs: &[(u32, f32)]) -> RankingResponse {
        RankingResponse {
            event_id: "evt".to_string(),
            model_version: "m1".to_string(),
            ranking: pairs
                .iter()
                .map(|&(action_id, probability)| ActionProb {
                    action_id,
                    probability,
                })
                .collect(),
        }
    }

    #[test]
    fn sampling_is_deterministic_and_consistent() {
        let ids = [0u32, 1, 2, 3];
        let pdf = [0.1f32, 0.2, 0.3, 0.4];
        for seed in 0..500u64 {
            let a = sample_and_reorder(seed, &ids, &pdf).unwrap();
            let b = sample_and_reorder(seed, &ids, &pdf).unwrap();
            assert_eq!(a, b);
            let chosen = sample_index(seed, &pdf).unwrap();
            assert_eq!(a[0].action_id, ids[chosen]);
            assert_eq!(a[0].probability, pdf[chosen]);
        }
    }

    #[test]
    fn reorder_preserves_mass_and_ids() {
        let ids = [5u32, 9, 2];
        let pdf = [0.5f32, 0.25, 0.25];
        for seed in 0..200u64 {
            let reordered = sample_and_reorder(seed, &ids, &pdf).unwrap();
            let total: f32 = reordered.iter().map(|a| a.probability).sum();
            assert!((total - pdf.iter().sum::<f32>()).abs() <= PDF_NORMALIZATION_TOLERANCE);
            let mut seen: Vec<u32> = reordered.iter().map(|a| a.action_id).collect();
            seen.sort_unstable();
            assert_eq!(seen, vec![2, 5, 9]);
        }
    }

    #[test]
    fn relative_order_of_unsampled_actions_is_preserved() {
        let ids = [10u32, 20, 30, 40];
        let pdf = [0.25f32; 4];
        for seed in 0..100u64 {
            let reordered = sample_and_reorder(seed, &ids, &pdf).unwrap();
            let rest: Vec<u32> = reordered[1..].iter().map(|a| a.action_id).collect();
            let expected: Vec<u32> = ids
                .iter()
                .copied()
                .filter(|id| *id != reordered[0].action_id)
                .collect();
            assert_eq!(rest, expected);
        }
    }

    #[test]
    fn invalid_pdfs_are_rejected() {
        assert!(validate_pdf(&[]).is_err());
        assert!(validate_pdf(&[0.5, -0.1, 0.6]).is_err());
        assert!(validate_pdf(&[0.0, 0.0]).is_err());
        assert!(validate_pdf(&[0.7, 0.7]).is_err());
        assert!(validate_pdf(&[0.5, 0.5]).is_ok());
        // Drift inside the tolerance is accepted.
        assert!(validate_pdf(&[0.5, 0.499_999]).is_ok());
    }

    #[test]
    fn reset_action_order_is_idempotent() {
        let mut response = mk_response(&[(3, 0.6), (1, 0.2), (2, 0.2)]);
        reset_action_order(&mut response);
        let once = response.clone();
        reset_action_order(&mut response);
        assert_eq!(response, once);
        assert_eq!(response.chosen_action_id(), Some(1));
        // Probabilities travel with their action.
        assert_eq!(response.chosen_probability(), Some(0.2));
    }
}

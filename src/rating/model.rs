//! Team strength and draw prediction
//!
//! Draw probability follows the OpenSkill Plackett-Luce formulation: team
//! performance is Gaussian with mean Σμ and variance n·β² + Σσ², and a draw
//! is the event that the performance difference falls within a margin derived
//! from the total player count. The skillratings crate supplies the rating
//! type and β but no team draw probability, so the formula lives here.

use skillratings::weng_lin::{WengLinConfig, WengLinRating};

/// Default rating for players without stored rating data
pub fn default_rating() -> WengLinRating {
    WengLinRating {
        rating: 25.0,
        uncertainty: 25.0 / 3.0,
    }
}

/// Team strength is the sum of rating means.
pub fn team_strength(team: &[WengLinRating]) -> f64 {
    team.iter().map(|r| r.rating).sum()
}

/// Predicted probability that the two teams draw, in [0, 1].
///
/// Symmetric in its arguments; approaches 1 as team strengths converge with
/// small uncertainties. Stable for team sizes 1..8.
pub fn predict_draw(
    team_a: &[WengLinRating],
    team_b: &[WengLinRating],
    config: &WengLinConfig,
) -> f64 {
    if team_a.is_empty() || team_b.is_empty() {
        return 0.0;
    }

    let player_count = (team_a.len() + team_b.len()) as f64;
    let beta = config.beta;

    let draw_probability = 1.0 / player_count;
    let draw_margin = player_count.sqrt() * beta * phi_major_inverse((1.0 + draw_probability) / 2.0);

    let (mu_a, sigma_sq_a) = team_summary(team_a);
    let (mu_b, sigma_sq_b) = team_summary(team_b);

    // Two teams: performance-difference variance is 2β² plus both teams' σ².
    let sigma_bar = (2.0 * beta * beta + sigma_sq_a + sigma_sq_b).sqrt();

    let forward = phi_major((draw_margin - mu_a + mu_b) / sigma_bar)
        - phi_major((mu_b - mu_a - draw_margin) / sigma_bar);
    let reverse = phi_major((draw_margin - mu_b + mu_a) / sigma_bar)
        - phi_major((mu_a - mu_b - draw_margin) / sigma_bar);

    (((forward + reverse) / 2.0).abs()).clamp(0.0, 1.0)
}

fn team_summary(team: &[WengLinRating]) -> (f64, f64) {
    team.iter().fold((0.0, 0.0), |(mu, sigma_sq), r| {
        (mu + r.rating, sigma_sq + r.uncertainty * r.uncertainty)
    })
}

/// Standard normal CDF
fn phi_major(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Error function, Abramowitz & Stegun 7.1.26 (max error ~1.5e-7)
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();

    sign * y
}

/// Standard normal quantile, Acklam's rational approximation
fn phi_major_inverse(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0);

    const A: [f64; 6] = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(mu: f64, sigma: f64) -> WengLinRating {
        WengLinRating {
            rating: mu,
            uncertainty: sigma,
        }
    }

    fn team(mus: &[f64]) -> Vec<WengLinRating> {
        mus.iter().map(|&mu| rating(mu, 25.0 / 3.0)).collect()
    }

    #[test]
    fn test_team_strength_sums_means() {
        let t = team(&[25.0, 30.0, 20.0]);
        assert_eq!(team_strength(&t), 75.0);
        assert_eq!(team_strength(&[]), 0.0);
    }

    #[test]
    fn test_phi_major_known_values() {
        assert!((phi_major(0.0) - 0.5).abs() < 1e-7);
        assert!((phi_major(1.96) - 0.975).abs() < 1e-3);
        assert!((phi_major(-1.96) - 0.025).abs() < 1e-3);
    }

    #[test]
    fn test_phi_major_inverse_round_trips() {
        for p in [0.01, 0.1, 0.25, 0.5, 0.75, 0.9, 0.99] {
            let x = phi_major_inverse(p);
            assert!(
                (phi_major(x) - p).abs() < 1e-4,
                "round trip failed at p={}",
                p
            );
        }
    }

    #[test]
    fn test_predict_draw_symmetric() {
        let config = WengLinConfig::default();
        let a = team(&[27.0, 24.0, 22.0, 29.0]);
        let b = team(&[25.0, 25.0, 26.0, 23.0]);

        let ab = predict_draw(&a, &b, &config);
        let ba = predict_draw(&b, &a, &config);
        assert!((ab - ba).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn test_identical_teams_with_small_sigma_draw_near_one() {
        let config = WengLinConfig::default();
        let a: Vec<_> = (0..4).map(|_| rating(25.0, 0.1)).collect();
        let b = a.clone();

        let draw = predict_draw(&a, &b, &config);
        assert!(draw > 0.9, "expected near-certain draw, got {}", draw);
    }

    #[test]
    fn test_draw_increases_as_strengths_converge() {
        let config = WengLinConfig::default();
        let base = team(&[25.0, 25.0]);

        let mut previous = 0.0;
        for offset in [20.0, 10.0, 5.0, 1.0, 0.0] {
            let opponents = team(&[25.0 + offset, 25.0 + offset]);
            let draw = predict_draw(&base, &opponents, &config);
            assert!(
                draw >= previous,
                "draw should rise as strengths converge (offset {})",
                offset
            );
            previous = draw;
        }
    }

    #[test]
    fn test_stable_for_supported_team_sizes() {
        let config = WengLinConfig::default();
        for size in 1..=8 {
            let a: Vec<_> = (0..size).map(|i| rating(20.0 + i as f64, 8.0)).collect();
            let b: Vec<_> = (0..size).map(|i| rating(28.0 - i as f64, 8.0)).collect();
            let draw = predict_draw(&a, &b, &config);
            assert!(
                draw.is_finite() && (0.0..=1.0).contains(&draw),
                "unstable at size {}: {}",
                size,
                draw
            );
        }
    }

    #[test]
    fn test_empty_team_has_no_draw() {
        let config = WengLinConfig::default();
        assert_eq!(predict_draw(&[], &team(&[25.0]), &config), 0.0);
    }
}

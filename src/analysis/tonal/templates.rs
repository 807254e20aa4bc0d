//! Krumhansl-Kessler key profiles and template matching
//!
//! # Reference
//!
//! Krumhansl, C. L., & Kessler, E. J. (1982). Tracing the Dynamic Changes in Perceived
//! Tonal Organization in a Spatial Representation of Musical Keys. *Psychological Review*,
//! 89(4), 334-368.

use crate::types::{PitchClass, Scale};

/// Major profile with the tonic at index 0
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Minor profile with the tonic at index 0
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// One of the 24 key templates
#[derive(Debug, Clone, PartialEq)]
pub struct KeyTemplate {
    pub tonic: PitchClass,
    pub scale: Scale,
    pub profile: [f64; 12],
}

/// Profile of `scale` rotated so its tonic sits on `tonic`
pub fn rotated_profile(tonic: PitchClass, scale: Scale) -> [f64; 12] {
    let base = match scale {
        Scale::Major => &MAJOR_PROFILE,
        Scale::Minor => &MINOR_PROFILE,
    };
    let t = tonic.to_index();
    let mut out = [0.0; 12];
    for (pc, slot) in out.iter_mut().enumerate() {
        *slot = base[(pc + 12 - t) % 12];
    }
    out
}

/// All 24 templates: C major through B major, then C minor through B minor
pub fn all_templates() -> Vec<KeyTemplate> {
    [Scale::Major, Scale::Minor]
        .iter()
        .flat_map(|&scale| {
            PitchClass::ALL.iter().map(move |&tonic| KeyTemplate {
                tonic,
                scale,
                profile: rotated_profile(tonic, scale),
            })
        })
        .collect()
}

/// Pearson correlation of two 12-bin profiles; 0 when either is constant
pub fn pearson(a: &[f64; 12], b: &[f64; 12]) -> f64 {
    let mean_a = a.iter().sum::<f64>() / 12.0;
    let mean_b = b.iter().sum::<f64>() / 12.0;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= 1e-12 {
        0.0
    } else {
        (cov / denom).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_order() {
        let templates = all_templates();
        assert_eq!(templates.len(), 24);
        assert_eq!(templates[0].tonic, PitchClass::C);
        assert_eq!(templates[0].scale, Scale::Major);
        assert_eq!(templates[12].tonic, PitchClass::C);
        assert_eq!(templates[12].scale, Scale::Minor);
        assert_eq!(templates[23].tonic, PitchClass::B);
    }

    #[test]
    fn test_rotation_moves_tonic() {
        let g_major = rotated_profile(PitchClass::G, Scale::Major);
        assert_eq!(g_major[7], MAJOR_PROFILE[0]);
        assert_eq!(g_major[2], MAJOR_PROFILE[7]);
    }

    #[test]
    fn test_pearson_identity_and_constant() {
        assert!((pearson(&MAJOR_PROFILE, &MAJOR_PROFILE) - 1.0).abs() < 1e-12);
        assert_eq!(pearson(&[0.0; 12], &MAJOR_PROFILE), 0.0);
        assert_eq!(pearson(&[3.0; 12], &MINOR_PROFILE), 0.0);
    }

    #[test]
    fn test_relative_keys_correlate_but_not_perfectly() {
        let c_major = rotated_profile(PitchClass::C, Scale::Major);
        let a_minor = rotated_profile(PitchClass::A, Scale::Minor);
        let r = pearson(&c_major, &a_minor);
        assert!(r > 0.5 && r < 1.0, "r = {}", r);
    }
}

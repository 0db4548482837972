//! Whole-pipeline checks against synthetic arrays with known dispersion.

use microtremor::{
    config::AnalysisConfig,
    fk::SlownessRange,
    sim::{circular_array, plane_wave_noise, simulate_diffuse_field, SimConfig},
    Analyzer, ArrayDataset, FrequencyBand, SearchBounds,
};

fn true_velocity(f: f64) -> f64 {
    150.0 + 350.0 * (-f / 8.0).exp()
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values[values.len() / 2]
}

fn spac_config() -> anyhow::Result<AnalysisConfig> {
    let mut config = AnalysisConfig::default();
    config.spectral.segment_length = Some(256);
    config.spac.search_bounds = SearchBounds::new(150.0, 600.0)?;
    Ok(config)
}

#[test]
fn ring_spac_recovers_dispersion() -> anyhow::Result<()> {
    let sim = SimConfig {
        n_samples: 16_384,
        ..Default::default()
    };
    let dataset = simulate_diffuse_field(&sim, circular_array(6, 10.0, true), true_velocity)?;
    let analyzer = Analyzer::new(spac_config()?)?;
    let prepared = analyzer.prepare(&dataset)?;

    let ring = analyzer.analyze_ring(&prepared, 0, &[1, 2, 3, 4, 5, 6])?;
    assert_eq!(ring.pairs.len(), 6);
    assert!((ring.distance - 10.0).abs() < 1e-9);
    assert!((0.0..=1.0).contains(&ring.quality.score));

    let band = FrequencyBand::new(6.0, 10.0);
    let errors: Vec<f64> = ring
        .curve
        .defined()
        .filter(|&(f, _)| band.contains(f))
        .map(|(f, c)| (c - true_velocity(f)).abs() / true_velocity(f))
        .collect();
    assert!(errors.len() >= 5, "only {} defined bins in band", errors.len());
    let med = median(errors);
    assert!(med < 0.2, "median relative error {med}");
    Ok(())
}

#[test]
fn pair_curves_combine_in_frequency_order() -> anyhow::Result<()> {
    let sim = SimConfig {
        n_samples: 8192,
        n_waves: 24,
        ..Default::default()
    };
    let dataset = simulate_diffuse_field(&sim, circular_array(4, 8.0, true), true_velocity)?;
    let analyzer = Analyzer::new(spac_config()?)?;
    let pairs = analyzer.analyze_all_pairs(&dataset)?;
    assert_eq!(pairs.len(), 10);

    let bands = vec![FrequencyBand::new(5.0, 12.0); pairs.len()];
    let combined = analyzer.combine(&pairs, Some(&bands))?;
    assert_eq!(combined.undefined_count(), 0);
    assert!(combined.frequencies().windows(2).all(|w| w[0] <= w[1]));
    assert!(combined.frequencies().iter().all(|&f| bands[0].contains(f)));
    assert!(combined
        .velocities()
        .iter()
        .all(|&c| (150.0..=600.0).contains(&c)));
    Ok(())
}

#[test]
fn fk_recovers_plane_wave_velocity() -> anyhow::Result<()> {
    let coords = circular_array(6, 15.0, true);
    // Both components lie on the 0.0002 s/m grid, so the peak is exact.
    let s0 = [0.0024, 0.0018];
    let data = plane_wave_noise(&coords, s0, 100.0, 2048, 21)?;
    let dataset = ArrayDataset::new(data, 100.0, coords)?;

    let mut config = AnalysisConfig::default();
    config.fk.frequency_range = FrequencyBand::new(2.0, 5.0);
    config.fk.slowness_range = SlownessRange::new(0.0, 0.006);
    config.fk.grid_size = 61;
    let curve = Analyzer::new(config)?.analyze_fk(&dataset)?;

    assert!(!curve.is_empty());
    assert_eq!(curve.undefined_count(), 0);
    let expected = 1.0 / s0[0].hypot(s0[1]);
    for (f, c) in curve.iter() {
        assert!((c - expected).abs() / expected < 1e-3, "f={f} c={c}");
    }
    Ok(())
}

#[test]
fn config_file_drives_analysis() -> anyhow::Result<()> {
    let config = AnalysisConfig::from_toml_str(
        r#"
        [spectral]
        segment_length = 128

        [quality]
        min_coherence = 0.5
        mask_curves = true
        "#,
    )?;
    let sim = SimConfig {
        n_samples: 4096,
        n_waves: 12,
        noise_sigma: 0.1,
        ..Default::default()
    };
    let dataset = simulate_diffuse_field(&sim, circular_array(3, 5.0, true), |_| 250.0)?;
    let analysis = Analyzer::new(config)?.analyze_pair(&dataset, 0, 1)?;
    assert_eq!(analysis.coefficients.frequencies.len(), 65);
    assert_eq!(analysis.curve.len(), analysis.quality.usable_count());
    Ok(())
}

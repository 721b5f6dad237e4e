//! Schema defaults, TOML round-trips, and validation ranges.

use bartrack_config::{
    ConstraintCfg, EkfParams, LateralAxis, MountPreset, UserParams, ZuptParams, from_blob,
    load_toml, to_blob,
};
use rstest::rstest;

#[test]
fn empty_document_is_all_defaults() {
    let params = load_toml("").unwrap();
    assert_eq!(params, UserParams::default());
    assert_eq!(params.ekf, EkfParams { qv: 5e-4, qba: 1e-6, rv: 2e-4, ry: 5e-3 });
    assert_eq!(
        params.zupt,
        ZuptParams {
            accel_thresh: 0.5,
            gyro_thresh: 0.4,
            min_hold_ms: 200
        }
    );
    assert_eq!(params.constraint, ConstraintCfg::None);
    assert_eq!(params.bar.mount, MountPreset::EndCap);
}

#[test]
fn missing_fields_inside_a_section_fall_back() {
    let params = load_toml("[ekf]\nqv = 1e-3\n").unwrap();
    assert_eq!(params.ekf.qv, 1e-3);
    assert_eq!(params.ekf.rv, EkfParams::default().rv);
}

#[test]
fn constraint_variants_round_trip() {
    for constraint in [
        ConstraintCfg::None,
        ConstraintCfg::VerticalPlane {
            axis: LateralAxis::X,
        },
        ConstraintCfg::VerticalPlane {
            axis: LateralAxis::Y,
        },
        ConstraintCfg::LineVertical,
    ] {
        let mut params = UserParams::default();
        params.constraint = constraint;
        let blob = to_blob(&params).unwrap();
        let back = from_blob(&blob).unwrap();
        assert_eq!(back.constraint, constraint);
    }
}

#[test]
fn full_bundle_round_trips_bit_exact() {
    let mut params = UserParams::default();
    params.accel_cutoff_mps2 = 25.0;
    params.zupt.min_hold_ms = 321;
    params.rep.descent_velocity_cms = -4.5;
    params.device.sample_rate_hz = 50;
    params.bar.calibrationless = true;
    let back = from_blob(&to_blob(&params).unwrap()).unwrap();
    assert_eq!(back, params);
}

#[test]
fn tagged_constraint_parses_from_hand_written_toml() {
    let params = load_toml(
        "[constraint]\nmode = \"vertical_plane\"\naxis = \"y\"\n",
    )
    .unwrap();
    assert_eq!(
        params.constraint,
        ConstraintCfg::VerticalPlane {
            axis: LateralAxis::Y
        }
    );
}

#[test]
fn default_bundle_validates() {
    UserParams::default().validate().unwrap();
}

#[rstest]
#[case::negative_qv("[ekf]\nqv = -1.0")]
#[case::nan_rv("[ekf]\nrv = nan")]
#[case::zero_gyro_thresh("[zupt]\ngyro_thresh = 0.0")]
#[case::huge_hold("[zupt]\nmin_hold_ms = 60000")]
#[case::positive_descent("[rep]\ndescent_velocity_cms = 2.0")]
#[case::negative_ascent("[rep]\nascent_velocity_cms = -2.0")]
#[case::zero_rom("[rep]\nmin_rom_cm = 0.0")]
#[case::zero_rate("[device]\nsample_rate_hz = 0")]
#[case::negative_cutoff("accel_cutoff_mps2 = -3.0")]
fn out_of_range_values_fail_validation(#[case] doc: &str) {
    let params = load_toml(doc).unwrap();
    assert!(params.validate().is_err(), "{doc:?} should be rejected");
}

#[test]
fn garbage_blob_is_an_error_not_a_panic() {
    assert!(from_blob(b"\xFF\xFE\x00").is_err());
    assert!(from_blob(b"not = [valid").is_err());
}

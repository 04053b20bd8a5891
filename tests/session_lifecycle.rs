//! Session lifecycle without a running training loop.

use nalgebra::Vector2;
use splat2d_rs::core::covariance::COVARIANCE_EPS;
use splat2d_rs::io::{parse_records, records_to_json};
use splat2d_rs::{
    FitError, GaussianRecord, Session, SessionConfig, TargetImage, TrainStatus,
};

fn checkerboard(width: u32, height: u32) -> TargetImage {
    TargetImage::from_fn(width, height, |x, y| if (x + y) % 2 == 0 { 1.0 } else { 0.2 }).unwrap()
}

#[test]
fn test_initialize_with_zero_gaussians_fails() {
    let session = Session::default();
    let result = session.initialize(checkerboard(4, 4), 0);
    assert!(matches!(result, Err(FitError::InvalidConfiguration(_))));
    assert!(!session.is_initialized());
    assert_eq!(session.status(), TrainStatus::Idle);
}

#[test]
fn test_invalid_session_config_rejected() {
    let config = SessionConfig {
        init_sigma: -1.0,
        ..SessionConfig::default()
    };
    assert!(matches!(
        Session::new(config),
        Err(FitError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_reinitialize_requires_image() {
    let session = Session::default();
    assert!(matches!(session.reinitialize(4), Err(FitError::NoImageLoaded)));
}

#[test]
fn test_reinitialize_reproduces_initialize() {
    let config = SessionConfig {
        seed: 42,
        ..SessionConfig::default()
    };
    let fresh = Session::new(config.clone()).unwrap();
    let first = fresh.initialize(checkerboard(16, 12), 10).unwrap();

    let reused = Session::new(config).unwrap();
    reused.initialize(checkerboard(16, 12), 3).unwrap();
    let second = reused.reinitialize(10).unwrap();

    assert_eq!(fresh.field().unwrap(), reused.field().unwrap());
    assert_eq!(first.predicted, second.predicted);
    assert_eq!(first.means, second.means);
}

#[test]
fn test_different_seeds_draw_different_fields() {
    let a = Session::new(SessionConfig { seed: 1, ..SessionConfig::default() }).unwrap();
    let b = Session::new(SessionConfig { seed: 2, ..SessionConfig::default() }).unwrap();
    a.initialize(checkerboard(16, 16), 4).unwrap();
    b.initialize(checkerboard(16, 16), 4).unwrap();
    assert_ne!(a.field().unwrap().means(), b.field().unwrap().means());
}

#[test]
fn test_out_of_range_cross_term_is_clamped() {
    let session = Session::default();
    session.initialize(checkerboard(8, 8), 1).unwrap();
    session
        .load_explicit_parameters(&[GaussianRecord {
            index: 0,
            mean_x: 4.0,
            mean_y: 4.0,
            sigma_x: 0.2,
            sigma_y: 0.3,
            sigma_xy: Some(1000.0),
            weight: 1.0,
        }])
        .unwrap();

    let cov = session.field().unwrap().projected(0);
    assert!(cov.determinant() > 0.0);
    assert!(cov.xy <= (cov.xx * cov.yy).sqrt() - COVARIANCE_EPS + 1e-7);

    let snapshot = session.snapshot().unwrap();
    assert!(snapshot.predicted.data().iter().all(|v| v.is_finite()));
}

#[test]
fn test_bad_record_leaves_field_untouched() {
    let session = Session::default();
    session.initialize(checkerboard(8, 8), 2).unwrap();
    let before = session.field().unwrap();

    let records = vec![
        GaussianRecord {
            index: 0,
            mean_x: 1.0,
            mean_y: 1.0,
            sigma_x: 1.0,
            sigma_y: 1.0,
            sigma_xy: None,
            weight: 1.0,
        },
        GaussianRecord {
            index: 5,
            mean_x: 1.0,
            mean_y: 1.0,
            sigma_x: 1.0,
            sigma_y: 1.0,
            sigma_xy: None,
            weight: 1.0,
        },
    ];
    assert!(matches!(
        session.load_explicit_parameters(&records),
        Err(FitError::InvalidConfiguration(_))
    ));
    assert_eq!(session.field().unwrap(), before);
}

#[test]
fn test_records_survive_json_exchange() {
    let source = Session::default();
    source.initialize(checkerboard(10, 10), 3).unwrap();
    let json = records_to_json(&source.records().unwrap()).unwrap();

    let dest = Session::new(SessionConfig { seed: 9, ..SessionConfig::default() }).unwrap();
    dest.initialize(checkerboard(10, 10), 3).unwrap();
    dest.load_explicit_parameters(&parse_records(&json).unwrap()).unwrap();

    let a = source.snapshot().unwrap().predicted;
    let b = dest.snapshot().unwrap().predicted;
    for (x, y) in a.data().iter().zip(b.data()) {
        assert!((x - y).abs() < 1e-5, "{x} vs {y}");
    }
}

#[test]
fn test_snapshot_does_not_change_state() {
    let session = Session::default();
    session.initialize(checkerboard(6, 6), 2).unwrap();
    let before = session.field().unwrap();
    let first = session.snapshot().unwrap();
    let second = session.snapshot().unwrap();
    assert_eq!(session.field().unwrap(), before);
    assert_eq!(first.predicted, second.predicted);
    assert_eq!(first.overlay, second.overlay);
    assert_eq!(
        first.means,
        before.means().iter().copied().collect::<Vec<Vector2<f32>>>()
    );
}

#[test]
fn test_stop_before_start_leaves_idle() {
    let session = Session::default();
    session.initialize(checkerboard(4, 4), 1).unwrap();
    session.request_stop();
    assert_eq!(session.status(), TrainStatus::Idle);
    assert_eq!(session.current_step(), 0);
}

#[test]
fn test_device_info_reports_cpu() {
    let info = Session::default().device_info();
    assert!(!info.is_accelerated);
    assert!(info.name.contains("threads"));
}

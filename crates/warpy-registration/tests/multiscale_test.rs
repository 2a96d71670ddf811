use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use warpy_core::transform::{AffineTransform2D, InvertibleTransform};
use warpy_core::{Image2D, Point2, Point3, Rect, Transform2D, Vector2, Vector3};
use warpy_registration::{
    BlockRequest, MultiscaleConfig, MultiscaleRegistration, RegionPolicy, RegistrationError,
    RegistrationInput, RunStatus, TaskHandle, TaskSink,
};

/// Square slide of `size` unit pixels whose extent starts at `start`.
fn slide(start: f64, size: usize) -> Image2D {
    Image2D::from_fn(
        size,
        size,
        Point2::new(start + 0.5, start + 0.5),
        Vector2::new(1.0, 1.0),
        |x, y| ((x * 31 + y * 17) % 23) as f32,
    )
}

/// Registrator that knows the true fixed → moving mapping and reports the
/// residual between it and the seed, as an exact block registration would.
fn exact<W>(warp: W) -> impl Fn(&BlockRequest<'_>) -> Option<AffineTransform2D> + Send + Sync
where
    W: Fn(Point2) -> Point2 + Send + Sync,
{
    move |request: &BlockRequest<'_>| {
        let residual = request.moving_center - warp(request.block.center);
        Some(AffineTransform2D::translation(residual.x, residual.y))
    }
}

fn shift_by_five(p: Point2) -> Point2 {
    p - Vector2::new(5.0, 5.0)
}

fn smooth_warp(p: Point2) -> Point2 {
    Point2::new(
        p.x + 2.0 * (p.y / 30.0).sin(),
        p.y + 1.5 * (p.x / 40.0).cos(),
    )
}

#[test]
fn test_shift_scenario() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);

    for config in [
        MultiscaleConfig::default().with_scales(2).serial(),
        MultiscaleConfig::default().with_scales(2),
    ] {
        let registration = MultiscaleRegistration::new(exact(shift_by_five), config);
        let outcome = registration
            .register(&RegistrationInput::new(&fixed, &moving), None)
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.completed_scales(), 2);
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(12.5, 80.0, 0.0),
            Point3::new(50.0, 50.0, 0.0),
            Point3::new(99.0, 3.0, 0.0),
        ] {
            let q = outcome.transform.apply(&p);
            assert!(
                (q - (p + Vector3::new(5.0, 5.0, 0.0))).norm() < 1e-6,
                "{:?} mapped to {:?}",
                p,
                q
            );
        }
    }
}

#[test]
fn test_single_failed_block_completes() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);
    let good = exact(shift_by_five);
    let center = Point2::new(50.0, 50.0);
    let registrator = move |request: &BlockRequest<'_>| {
        if request.block.center == center && request.block.half_width == 25.0 {
            None
        } else {
            good(request)
        }
    };

    let registration = MultiscaleRegistration::new(
        registrator,
        MultiscaleConfig::default().with_scales(2).serial(),
    );
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &moving), None)
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let first = &outcome.scales[0];
    assert_eq!(first.failed_blocks, 1);
    assert_eq!(first.correspondences.len(), first.landmarks);
    let outlier = first
        .correspondences
        .iter()
        .find(|pair| pair.fixed == center)
        .unwrap();
    assert_eq!(outlier.displacement(), Vector2::zeros());
    assert_eq!(outcome.scales[1].failed_blocks, 0);
}

#[test]
fn test_zero_area_region_fails_before_registration() {
    let fixed = slide(0.0, 100);
    let calls = AtomicUsize::new(0);
    let registrator = |_: &BlockRequest<'_>| {
        calls.fetch_add(1, Ordering::SeqCst);
        Some(AffineTransform2D::identity())
    };
    let registration = MultiscaleRegistration::new(registrator, MultiscaleConfig::default());

    let point = Point2::new(40.0, 40.0);
    let input = RegistrationInput::new(&fixed, &fixed).with_region(Rect::new(point, point));
    let result = registration.register(&input, None);

    assert!(matches!(result, Err(RegistrationError::Planning(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_disjoint_slides_fail_planning() {
    let fixed = slide(0.0, 50);
    let moving = slide(200.0, 50);
    let registration = MultiscaleRegistration::new(
        |_: &BlockRequest<'_>| Some(AffineTransform2D::identity()),
        MultiscaleConfig::default(),
    );
    let result = registration.register(&RegistrationInput::new(&fixed, &moving), None);
    assert!(matches!(result, Err(RegistrationError::Planning(_))));
}

#[test]
fn test_unreachable_scale_count_fails_planning() {
    let fixed = slide(0.0, 100);
    let calls = AtomicUsize::new(0);
    let registrator = |_: &BlockRequest<'_>| {
        calls.fetch_add(1, Ordering::SeqCst);
        Some(AffineTransform2D::identity())
    };
    let registration =
        MultiscaleRegistration::new(registrator, MultiscaleConfig::default().with_scales(14));

    let result = registration.register(&RegistrationInput::new(&fixed, &fixed), None);

    assert!(matches!(result, Err(RegistrationError::Planning(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_blocks_outside_moving_slide_still_registered() {
    let fixed = slide(0.0, 100);
    let moving = slide(0.0, 10);
    let calls = AtomicUsize::new(0);
    let registrator = |_: &BlockRequest<'_>| {
        calls.fetch_add(1, Ordering::SeqCst);
        Some(AffineTransform2D::identity())
    };
    let registration = MultiscaleRegistration::new(
        registrator,
        MultiscaleConfig::default()
            .with_region_policy(RegionPolicy::Union)
            .serial(),
    );
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &moving), None)
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let first = &outcome.scales[0];
    assert_eq!(first.landmarks, 9);
    assert_eq!(first.correspondences.len(), 9);
    let landmarks: usize = outcome.scales.iter().map(|s| s.landmarks).sum();
    assert_eq!(calls.load(Ordering::SeqCst), landmarks);
}

#[test]
fn test_failed_blocks_outside_moving_slide_keep_seed() {
    let fixed = slide(0.0, 100);
    let moving = slide(0.0, 10);
    let registration = MultiscaleRegistration::new(
        |request: &BlockRequest<'_>| {
            let inside = request.moving_center.x < 10.0 && request.moving_center.y < 10.0;
            inside.then(AffineTransform2D::identity)
        },
        MultiscaleConfig::default()
            .with_region_policy(RegionPolicy::Union)
            .serial(),
    );
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &moving), None)
        .unwrap();

    let first = &outcome.scales[0];
    assert_eq!(first.failed_blocks, 8);
    assert!(first
        .correspondences
        .iter()
        .all(|pair| pair.displacement() == Vector2::zeros()));
    let p = Point2::new(70.0, 20.0);
    assert!((outcome.transform.xy.apply(&p) - p).norm() < 1e-9);
}

#[test]
fn test_centring_is_undone_in_result() {
    let fixed = slide(0.0, 100);
    let moving = slide(200.0, 100);
    let to_moving = |p: Point2| p + Vector2::new(200.0, 200.0);

    let uncentred = MultiscaleRegistration::new(exact(to_moving), MultiscaleConfig::default());
    let result = uncentred.register(&RegistrationInput::new(&fixed, &moving), None);
    assert!(matches!(result, Err(RegistrationError::Planning(_))));

    let registration = MultiscaleRegistration::new(
        exact(to_moving),
        MultiscaleConfig::default().with_centering(true).serial(),
    );
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &moving), None)
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let q = outcome.transform.xy.apply(&Point2::new(250.0, 230.0));
    assert!((q - Point2::new(50.0, 30.0)).norm() < 1e-6, "mapped to {:?}", q);
    let back = outcome.transform.xy.apply_inverse(&Point2::new(10.0, 90.0));
    assert!((back - Point2::new(210.0, 290.0)).norm() < 1e-6);
}

#[test]
fn test_initial_transform_overrides_centring() {
    let fixed = slide(0.0, 100);
    let moving = slide(200.0, 100);
    // Every block fails, so the result is whatever seeded scale 0.
    let registration = MultiscaleRegistration::new(
        |_: &BlockRequest<'_>| None,
        MultiscaleConfig::default().with_centering(true).serial(),
    );
    let input = RegistrationInput::new(&fixed, &moving)
        .with_initial(Transform2D::translation(-195.0, -195.0));
    let outcome = registration.register(&input, None).unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    let q = outcome.transform.xy.apply(&Point2::new(250.0, 230.0));
    assert!((q - Point2::new(55.0, 35.0)).norm() < 1e-6, "mapped to {:?}", q);
}

#[test]
fn test_cancellation_mid_scale() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);
    let task = Arc::new(TaskHandle::new());
    let good = exact(shift_by_five);
    let handle = Arc::clone(&task);
    let registrator = move |request: &BlockRequest<'_>| {
        handle.cancel();
        good(request)
    };

    let registration = MultiscaleRegistration::new(
        registrator,
        MultiscaleConfig::default().with_scales(3).serial(),
    );
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &moving), Some(task.clone()))
        .unwrap();

    // The scale in flight completes and reports; the next one is skipped.
    assert_eq!(outcome.status, RunStatus::Cancelled { completed_scales: 1 });
    assert_eq!(outcome.scales.len(), 1);
    assert_eq!(task.progress(), 9);
    assert_eq!(task.outcome(), None);

    let p = Point2::new(30.0, 60.0);
    let q = outcome.transform.xy.apply(&p);
    assert!((q - Point2::new(35.0, 65.0)).norm() < 1e-6);
}

#[test]
fn test_cancelled_before_first_scale() {
    let fixed = slide(0.0, 100);
    let calls = AtomicUsize::new(0);
    let registrator = |_: &BlockRequest<'_>| {
        calls.fetch_add(1, Ordering::SeqCst);
        Some(AffineTransform2D::identity())
    };
    let task = Arc::new(TaskHandle::new());
    task.cancel();

    let registration = MultiscaleRegistration::new(registrator, MultiscaleConfig::default());
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &fixed), Some(task.clone()))
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled { completed_scales: 0 });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    let p = Point2::new(10.0, 20.0);
    assert_eq!(outcome.transform.xy.apply(&p), p);
}

#[test]
fn test_serial_runs_are_identical() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);
    let registration = MultiscaleRegistration::new(
        exact(smooth_warp),
        MultiscaleConfig::default().with_scales(3).serial(),
    );
    let input = RegistrationInput::new(&fixed, &moving);

    let first = registration.register(&input, None).unwrap();
    let second = registration.register(&input, None).unwrap();

    assert_eq!(
        serde_json::to_string(&first.transform).unwrap(),
        serde_json::to_string(&second.transform).unwrap()
    );
    let p = Point3::new(33.3, 66.6, 0.0);
    assert_eq!(first.transform.apply(&p), second.transform.apply(&p));
}

#[test]
fn test_parallel_matches_serial() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);
    let input = RegistrationInput::new(&fixed, &moving);

    let serial = MultiscaleRegistration::new(
        exact(smooth_warp),
        MultiscaleConfig::default().with_scales(3).serial(),
    )
    .register(&input, None)
    .unwrap();
    let parallel =
        MultiscaleRegistration::new(exact(smooth_warp), MultiscaleConfig::default().with_scales(3))
            .register(&input, None)
            .unwrap();

    assert_eq!(serial.transform, parallel.transform);
}

#[test]
fn test_forward_inverse_roundtrip() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);
    let registration = MultiscaleRegistration::new(
        exact(smooth_warp),
        MultiscaleConfig::default().with_scales(3),
    );
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &moving), None)
        .unwrap();

    for j in 0..5 {
        for i in 0..5 {
            let p = Point3::new(5.0 + 22.5 * i as f64, 3.0 + 23.0 * j as f64, 0.0);
            let back = outcome.transform.apply_inverse(&outcome.transform.apply(&p));
            assert!((back - p).norm() < 1e-6, "{:?} came back as {:?}", p, back);
        }
    }
}

#[test]
fn test_recovers_smooth_warp_at_landmarks() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);
    let registration = MultiscaleRegistration::new(
        exact(smooth_warp),
        MultiscaleConfig::default().with_scales(3).serial(),
    );
    let outcome = registration
        .register(&RegistrationInput::new(&fixed, &moving), None)
        .unwrap();

    // The last scale's landmarks are interpolated exactly.
    let last = outcome.scales.last().unwrap();
    for pair in last.correspondences.iter() {
        let back = outcome.transform.xy.apply(&pair.moving);
        assert!((back - pair.fixed).norm() < 1e-6);
        assert!((pair.moving - smooth_warp(pair.fixed)).norm() < 1e-9);
    }
}

#[test]
fn test_z_offset_restored() {
    let fixed = slide(0.0, 100).with_z(2.0);
    let moving = slide(-10.0, 120).with_z(0.5);
    let input = RegistrationInput::new(&fixed, &moving);

    let with_offset =
        MultiscaleRegistration::new(exact(shift_by_five), MultiscaleConfig::default().serial())
            .register(&input, None)
            .unwrap();
    assert_eq!(with_offset.transform.z_shift, 1.5);

    let mut config = MultiscaleConfig::default().serial();
    config.remove_z_offset = false;
    let without = MultiscaleRegistration::new(exact(shift_by_five), config)
        .register(&input, None)
        .unwrap();
    assert_eq!(without.transform.z_shift, 0.0);
}

#[test]
fn test_progress_totals() {
    let fixed = slide(0.0, 100);
    let moving = slide(-10.0, 120);
    let task = Arc::new(TaskHandle::new());
    let registration = MultiscaleRegistration::new(
        exact(shift_by_five),
        MultiscaleConfig::default().with_scales(3),
    );
    let outcome = registration
        .register(
            &RegistrationInput::new(&fixed, &moving),
            Some(task.clone() as Arc<dyn TaskSink>),
        )
        .unwrap();

    let blocks: usize = outcome.scales.iter().map(|s| s.landmarks).sum();
    assert_eq!(blocks, 9 + 15 + 25);
    assert_eq!(task.progress(), blocks);
    assert_eq!(task.total(), blocks);
    assert_eq!(task.fraction(), Some(1.0));
}

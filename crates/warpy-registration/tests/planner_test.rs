use proptest::prelude::*;
use warpy_core::Rect;
use warpy_registration::{BlockPlanner, LandmarkPair, PointSet};

proptest! {
    #[test]
    fn test_plan_counts_strictly_increase(
        x0 in -500.0f64..500.0, y0 in -500.0f64..500.0,
        w in 0.5f64..2000.0, aspect in 0.2f64..5.0,
        n_scales in 2usize..8
    ) {
        let h = w * aspect;
        let region = Rect::from_bounds(x0, y0, x0 + w, y0 + h);
        let plans = BlockPlanner::new().plan(&region, n_scales);

        prop_assert!(!plans.is_empty());
        prop_assert!(plans.len() <= n_scales);
        for (k, plan) in plans.iter().enumerate() {
            prop_assert_eq!(plan.scale, k);
            prop_assert!(plan.len() >= 4);
            prop_assert_eq!(plan.len(), plan.columns * plan.rows);
            prop_assert!(plan.landmarks.contains(&region.center()));
        }
        for pair in plans.windows(2) {
            prop_assert!(pair[1].len() > pair[0].len());
            prop_assert!(pair[1].block_half_width * pair[1].block_half_height
                < pair[0].block_half_width * pair[0].block_half_height);
        }
    }

    #[test]
    fn test_point_set_arrays_stay_aligned(
        coords in proptest::collection::vec(
            (-1e3f64..1e3, -1e3f64..1e3, -1e3f64..1e3, -1e3f64..1e3),
            0..64,
        )
    ) {
        let set: PointSet = coords
            .iter()
            .map(|&(a, b, c, d)| LandmarkPair::new([a, b].into(), [c, d].into()))
            .collect();
        let (sources, targets) = set.as_arrays();

        prop_assert_eq!(sources[0].len(), set.len());
        prop_assert_eq!(targets[1].len(), set.len());
        for (i, &(a, b, c, d)) in coords.iter().enumerate() {
            prop_assert_eq!((sources[0][i], sources[1][i]), (a, b));
            prop_assert_eq!((targets[0][i], targets[1][i]), (c, d));
        }
    }
}

#[test]
fn test_requested_scales_are_met_for_square_region() {
    let plans = BlockPlanner::new().plan(&Rect::from_bounds(0.0, 0.0, 100.0, 100.0), 4);
    let counts: Vec<usize> = plans.iter().map(|p| p.len()).collect();
    assert_eq!(counts, vec![9, 15, 25, 45]);
}

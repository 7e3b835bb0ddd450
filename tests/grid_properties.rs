use proptest::prelude::*;

use tomoatt_prep::grid::GridSpec;

fn strictly_monotonic(v: &[f64], ascending: bool) -> bool {
    v.windows(2).all(|w| if ascending { w[1] > w[0] } else { w[1] < w[0] })
}

proptest! {
    #[test]
    fn axes_have_requested_length_and_order(
        dep0 in -10.0f64..50.0,
        dep_span in 1.0f64..500.0,
        lat0 in -80.0f64..70.0,
        lat_span in 0.5f64..10.0,
        lon0 in -180.0f64..170.0,
        lon_span in 0.5f64..20.0,
        n in (2usize..40, 2usize..40, 2usize..40),
    ) {
        let grid = GridSpec::new(
            (dep0, dep0 + dep_span),
            (lat0, lat0 + lat_span),
            (lon0, lon0 + lon_span),
            n,
        ).unwrap();

        prop_assert_eq!(grid.dep().len(), n.0);
        prop_assert_eq!(grid.lat().len(), n.1);
        prop_assert_eq!(grid.lon().len(), n.2);
        prop_assert!(strictly_monotonic(grid.dep(), false));
        prop_assert!(strictly_monotonic(grid.lat(), true));
        prop_assert!(strictly_monotonic(grid.lon(), true));
        prop_assert_eq!(grid.dep()[n.0 - 1], dep0);
        prop_assert_eq!(grid.lat()[0], lat0);
        prop_assert_eq!(grid.n_nodes(), n.0 * n.1 * n.2);
    }

    #[test]
    fn in_domain_points_land_in_real_cells(
        fr in 0.0f64..=1.0,
        ft in 0.0f64..=1.0,
        fp in 0.0f64..=1.0,
        n in (2usize..30, 2usize..30, 2usize..30),
    ) {
        let grid = GridSpec::new((0.0, 40.0), (30.0, 32.0), (100.0, 103.0), n).unwrap();
        let (r, t, p) = grid.cell_of(40.0 * fr, 30.0 + 2.0 * ft, 100.0 + 3.0 * fp);
        prop_assert!((0..=n.0 as i64 - 2).contains(&r));
        prop_assert!((0..=n.1 as i64 - 2).contains(&t));
        prop_assert!((0..=n.2 as i64 - 2).contains(&p));
    }

    #[test]
    fn same_domain_gives_identical_axes(n in 2usize..100) {
        let a = GridSpec::new((0.0, 40.0), (30.0, 32.0), (100.0, 103.0), (n, n, n)).unwrap();
        let b = GridSpec::new((0.0, 40.0), (30.0, 32.0), (100.0, 103.0), (n, n, n)).unwrap();
        prop_assert_eq!(a, b);
    }
}

#[test]
fn invalid_domains_are_config_errors() {
    use tomoatt_prep::error::ErrorKind;

    for (dep, lat, lon, n) in [
        ((10.0, 0.0), (0.0, 1.0), (0.0, 1.0), (3, 3, 3)),
        ((0.0, 10.0), (0.0, 1.0), (0.0, 1.0), (1, 3, 3)),
        ((0.0, 10.0), (f64::NAN, 1.0), (0.0, 1.0), (3, 3, 3)),
        ((0.0, 10.0), (80.0, 95.0), (0.0, 1.0), (3, 3, 3)),
    ] {
        let err = GridSpec::new(dep, lat, lon, n).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}

use std::collections::BTreeSet;
use std::fs;

use tomoatt_prep::app::pipeline::{CatalogRequest, run_catalog};
use tomoatt_prep::catalog::{
    DifferentialKind, DifferentialOptions, DuplicateTolerance, ObservationKind, TravelTimeCatalog,
};
use tomoatt_prep::error::ErrorKind;
use tomoatt_prep::io::{CatalogReadOptions, CatalogWriteOptions, parse_catalog, read_catalog, write_catalog};

// ev0 and ev1 are the same event reported twice (0.005 deg, 0.05 s apart).
const CATALOG: &str = "\
0 2020 01 01 00 00 00.000000 30.0000 100.0000 10.0000 3.0000 2 ev0 1.0000
   0 0 STA 30.5000 100.5000 0.0000 P 5.0000 1.0000
   0 1 STB 31.0000 101.0000 0.0000 P 7.0000 1.0000
1 2020 01 01 00 00 00.050000 30.0050 100.0050 10.0000 2.5000 1 ev1 1.0000
   1 0 STA 30.5000 100.5000 0.0000 P 5.1000 1.0000
2 2020 02 01 00 00 00.000000 32.0000 102.0000 40.0000 4.0000 1 ev2 1.0000
   2 0 STB 31.0000 101.0000 0.0000 S 9.0000 1.0000
";

fn catalog() -> TravelTimeCatalog {
    parse_catalog(CATALOG, CatalogReadOptions::default()).unwrap()
}

fn assert_consistent(cat: &TravelTimeCatalog) {
    let ids: BTreeSet<usize> = cat.sources().iter().map(|s| s.id).collect();
    for o in cat.observations() {
        assert!(o.source_ids().all(|id| ids.contains(&id)), "dangling source in {o:?}");
    }
    for s in cat.sources() {
        let n = cat.observations().iter().filter(|o| o.src_id == s.id).count();
        assert_eq!(s.num_rec, n);
        assert!(n > 0, "orphaned source {}", s.id);
    }
}

#[test]
fn filters_are_idempotent_and_leave_no_dangling_references() {
    let cat = catalog();

    let shallow = cat.select_by_depth((0.0, 20.0)).unwrap();
    assert_eq!(shallow.sources().len(), 2);
    assert_eq!(shallow.select_by_depth((0.0, 20.0)).unwrap(), shallow);
    assert_consistent(&shallow);

    let boxed = cat.select_by_box_region((99.0, 101.5), (29.0, 31.5)).unwrap();
    assert_eq!(boxed.select_by_box_region((99.0, 101.5), (29.0, 31.5)).unwrap(), boxed);
    assert_consistent(&boxed);

    let p_only = cat.select_by_phase(&["P"]);
    assert_eq!(p_only.select_by_phase(&["P"]), p_only);
    assert_consistent(&p_only);
}

#[test]
fn sources_left_without_records_are_dropped() {
    let s_only = catalog().select_by_phase(&["S"]);
    assert_eq!(s_only.sources().len(), 1);
    assert_eq!(s_only.sources()[0].event_name, "ev2");
    assert_consistent(&s_only);
}

#[test]
fn source_only_catalog_keeps_announced_counts() {
    let opts = CatalogReadOptions {
        src_only: true,
        ..CatalogReadOptions::default()
    };
    let cat = parse_catalog(CATALOG, opts).unwrap();
    assert!(cat.is_source_only());
    assert!(cat.observations().is_empty());
    assert_eq!(cat.sources().iter().map(|s| s.num_rec).collect::<Vec<_>>(), vec![2, 1, 1]);

    let shallow = cat.select_by_depth((0.0, 20.0)).unwrap();
    assert_eq!(shallow.sources().len(), 2);
}

#[test]
fn common_source_difference_is_first_minus_second() {
    let dd = catalog()
        .generate_double_difference(DifferentialKind::CommonSource, DifferentialOptions::default())
        .unwrap();
    let cs: Vec<_> = dd
        .observations()
        .iter()
        .filter(|o| matches!(o.kind, ObservationKind::CommonSource { .. }))
        .collect();
    assert_eq!(cs.len(), 1);
    assert_eq!(cs[0].tt, -2.0);
    assert_eq!(cs[0].station.name, "STA");
    assert_eq!(cs[0].weight, 1.0);
    assert_eq!(dd.source(0).unwrap().num_rec, 3);
    assert_consistent(&dd);
}

#[test]
fn pair_distance_limit_rejecting_every_pair_is_a_value_error() {
    // STA and STB of ev0 are about 0.7 deg apart
    let err = catalog()
        .generate_double_difference(
            DifferentialKind::CommonSource,
            DifferentialOptions {
                max_pair_distance_deg: Some(0.1),
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);

    let dd = catalog()
        .generate_double_difference(
            DifferentialKind::CommonSource,
            DifferentialOptions {
                max_pair_distance_deg: Some(1.0),
            },
        )
        .unwrap();
    assert_eq!(dd.observations().iter().filter(|o| !o.is_absolute()).count(), 1);
}

#[test]
fn single_record_cannot_form_pairs() {
    let text = "\
0 2020 01 01 00 00 00.000000 30.0000 100.0000 10.0000 3.0000 1 ev0
   0 0 STA 30.5000 100.5000 0.0000 P 5.0000
";
    let cat = parse_catalog(text, CatalogReadOptions::default()).unwrap();
    for kind in [DifferentialKind::CommonSource, DifferentialKind::CommonReceiver] {
        let err = cat
            .generate_double_difference(kind, DifferentialOptions::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Value);
    }
}

#[test]
fn duplicates_merge_only_within_tolerance() {
    let loose = DuplicateTolerance {
        deg: 0.01,
        depth_km: None,
        time_s: 0.1,
    };
    let merged = catalog().erase_duplicate_events(loose).unwrap();
    assert_eq!(merged.sources().len(), 2);
    let survivor = merged.source(0).unwrap();
    assert_eq!(survivor.event_name, "ev0");
    // ev1's only record repeats ev0's STA P and is dropped
    assert_eq!(survivor.num_rec, 2);
    assert_eq!(merged.observations().len(), 3);
    assert_consistent(&merged);

    for tight in [
        DuplicateTolerance { deg: 0.001, ..loose },
        DuplicateTolerance { time_s: 0.01, ..loose },
    ] {
        assert_eq!(catalog().erase_duplicate_events(tight).unwrap().sources().len(), 3);
    }
}

#[test]
fn catalog_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("src_rec.dat");
    let cat = catalog()
        .generate_double_difference(DifferentialKind::CommonSource, DifferentialOptions::default())
        .unwrap();

    write_catalog(&path, &cat, CatalogWriteOptions::default()).unwrap();
    let back = read_catalog(&path, CatalogReadOptions::default()).unwrap();
    assert_eq!(back, cat);
}

#[test]
fn truncated_file_is_a_format_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.dat");
    let truncated: String = CATALOG.lines().take(2).map(|l| format!("{l}\n")).collect();
    fs::write(&path, truncated).unwrap();

    let err = read_catalog(&path, CatalogReadOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert!(err.message().contains("broken.dat"));
}

#[test]
fn run_catalog_chains_steps_and_writes_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.dat");
    let output = dir.path().join("out.dat");
    fs::write(&input, CATALOG).unwrap();

    let req = CatalogRequest {
        input,
        output: output.clone(),
        write: CatalogWriteOptions { dist_in_data: true },
        depth: Some((0.0, 20.0)),
        dedup: Some(DuplicateTolerance {
            deg: 0.01,
            depth_km: Some(1.0),
            time_s: 0.1,
        }),
        reset_index: true,
        ..CatalogRequest::default()
    };
    let cat = run_catalog(&req).unwrap();
    assert_eq!(cat.sources().len(), 1);
    assert_eq!(cat.observations().len(), 2);
    assert!(cat.observations().iter().all(|o| o.dist_deg.is_some()));

    let written = read_catalog(
        &output,
        CatalogReadOptions {
            dist_in_data: true,
            ..CatalogReadOptions::default()
        },
    )
    .unwrap();
    assert_eq!(written.sources().len(), 1);
    assert_eq!(written.sources()[0].id, 0);
    assert_eq!(written.sources()[0].num_rec, 2);
}

#[test]
fn noise_is_reproducible_for_a_seed() {
    let mut a = catalog();
    let mut b = catalog();
    a.add_noise_seeded(0.1, 7).unwrap();
    b.add_noise_seeded(0.1, 7).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, catalog());

    let err = catalog().add_noise_seeded(-1.0, 7).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn residuals_match_records_by_event_station_and_phase() {
    let synthetic = parse_catalog(&CATALOG.replace("P 5.0000", "P 4.5000"), CatalogReadOptions::default()).unwrap();
    let with_res = catalog().with_residuals(&synthetic);
    let residuals: Vec<Option<f64>> = with_res.observations().iter().map(|o| o.residual).collect();
    assert_eq!(residuals, vec![Some(0.5), Some(0.0), Some(0.0), Some(0.0)]);
}

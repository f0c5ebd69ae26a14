mod common;

use chrono::NaiveDate;
use common::{init_logging, scene_name, FakeArchive};
use sarstack::config::{DateWindow, StackConfig};
use sarstack::io::manifest::{read_manifest, write_manifest};
use sarstack::{CatalogResolver, FlightDirection, PairManifestBuilder, StackError};
use tempfile::TempDir;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y%m%d").unwrap()
}

fn ascending_79() -> StackConfig {
    StackConfig::edgecumbe(FlightDirection::Ascending, 79, 0..2)
}

#[test]
fn test_two_pairs_resolve_to_three_scenes() {
    init_logging();

    let tokens = ["20180101_20180206", "20180206_20180312"];
    let archive = FakeArchive::for_dates(&["20180101", "20180206", "20180312"]);
    let stack = ascending_79();

    let builder = PairManifestBuilder::from_tokens(&tokens).expect("tokens parse");
    let dates = builder.distinct_dates();
    assert_eq!(dates.len(), 3);

    let scenes = CatalogResolver::new(&archive)
        .resolve(&stack, &dates)
        .expect("every date resolves");
    assert_eq!(scenes.len(), 3);
    assert_eq!(scenes[&date("20180206")], scene_name("20180206"));

    let window = DateWindow::new(date("20171231"), date("20200101"));
    let pairs = builder.build_filtered(&scenes, &window).expect("manifest builds");
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs, builder.build(&scenes).unwrap());
    assert_eq!(pairs[0].date1, date("20180101"));
    assert_eq!(pairs[0].scene2, scene_name("20180206"));
    assert_eq!(pairs[1].date2, date("20180312"));

    // Search is padded by one day around the date extrema
    let queries = archive.queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].start, date("20171231"));
    assert_eq!(queries[0].end, date("20180313"));
    assert_eq!(queries[0].relative_orbit, 79);
    assert_eq!(queries[0].flight_direction, FlightDirection::Ascending);
}

#[test]
fn test_two_scenes_for_one_date_fail_resolution() {
    init_logging();

    let mut scenes = vec![
        scene_name("20180101"),
        scene_name("20180206"),
        scene_name("20180312"),
    ];
    // Second slice of the same acquisition
    scenes.push("S1A_IW_SLC__1SDV_20180206T152537_20180206T152604_019969_022026_9F3C".to_string());
    let archive = FakeArchive::new(scenes);

    let builder = PairManifestBuilder::from_tokens(&["20180101_20180206", "20180206_20180312"]).unwrap();
    let result = CatalogResolver::new(&archive).resolve(&ascending_79(), &builder.distinct_dates());

    match result {
        Err(StackError::Cardinality { date: d, count }) => {
            assert_eq!(d, date("20180206"));
            assert_eq!(count, 2);
        }
        other => panic!("expected a cardinality error, got {:?}", other),
    }
}

#[test]
fn test_missing_scene_fails_resolution() {
    init_logging();

    let archive = FakeArchive::for_dates(&["20180101", "20180312"]);
    let builder = PairManifestBuilder::from_tokens(&["20180101_20180206"]).unwrap();
    let result = CatalogResolver::new(&archive).resolve(&ascending_79(), &builder.distinct_dates());

    assert!(matches!(
        result,
        Err(StackError::Cardinality { count: 0, .. })
    ));
}

#[test]
fn test_duplicate_listing_of_one_scene_is_not_ambiguous() {
    let archive = FakeArchive::new(vec![
        scene_name("20180101"),
        scene_name("20180101"),
        scene_name("20180206"),
    ]);
    let builder = PairManifestBuilder::from_tokens(&["20180101_20180206"]).unwrap();
    let scenes = CatalogResolver::new(&archive)
        .resolve(&ascending_79(), &builder.distinct_dates())
        .expect("repeated listing of the same name resolves");
    assert_eq!(scenes.len(), 2);
}

#[test]
fn test_archive_failure_propagates() {
    let mut archive = FakeArchive::for_dates(&["20180101", "20180206"]);
    archive.unavailable = true;
    let builder = PairManifestBuilder::from_tokens(&["20180101_20180206"]).unwrap();
    let result = CatalogResolver::new(&archive).resolve(&ascending_79(), &builder.distinct_dates());
    assert!(matches!(result, Err(StackError::Remote(_))));
}

#[test]
fn test_pair_starting_on_window_start_is_dropped() {
    let archive = FakeArchive::for_dates(&["20180101", "20180206", "20180312"]);
    let stack = ascending_79();
    let builder = PairManifestBuilder::from_tokens(&["20180101_20180206", "20180206_20180312"]).unwrap();
    let scenes = CatalogResolver::new(&archive)
        .resolve(&stack, &builder.distinct_dates())
        .unwrap();

    // Default window starts on 2018-01-01
    let pairs = builder.build_filtered(&scenes, &stack.date_window).unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].date1, date("20180206"));
}

#[test]
fn test_window_drops_pairs_and_manifest_round_trips() {
    init_logging();

    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let tokens = [
        "20190912_20191018",
        "20171220_20180101",
        "20180101_20180206",
        "20191211_20200104",
    ];
    let archive = FakeArchive::for_dates(&["20171220", "20180101", "20180206", "20190912", "20191018", "20191211", "20200104"]);
    let mut stack = ascending_79();
    stack.date_window = DateWindow::new(date("20171231"), date("20200101"));

    let builder = PairManifestBuilder::from_tokens(&tokens).unwrap();
    let scenes = CatalogResolver::new(&archive)
        .resolve(&stack, &builder.distinct_dates())
        .unwrap();
    let pairs = builder.build_filtered(&scenes, &stack.date_window).unwrap();

    // Both window edges are exclusive
    let kept: Vec<(NaiveDate, NaiveDate)> = pairs.iter().map(|p| (p.date1, p.date2)).collect();
    assert_eq!(
        kept,
        vec![
            (date("20180101"), date("20180206")),
            (date("20190912"), date("20191018")),
        ]
    );

    let path = temp_dir.path().join("ascending_79").join("ascending_79_pairs.csv");
    write_manifest(&path, &pairs).expect("manifest written");

    let text = std::fs::read_to_string(&path).unwrap();
    println!("{}", text);
    assert!(text.starts_with("date1,date2,scene1,scene2"));
    assert!(text.contains("2018-01-01,2018-02-06,"));

    let read_back = read_manifest(&path).expect("manifest read");
    assert_eq!(read_back, pairs);
}

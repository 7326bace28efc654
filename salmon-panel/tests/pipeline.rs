//! Tests d'intégration: des fichiers d'entrée jusqu'aux sorties

use std::path::{Path, PathBuf};

use salmon_panel::config::Config;
use salmon_panel::pipeline::{write_outputs, Inputs, Pipeline, Stage};
use salmon_panel::regression::WithinOls;
use salmon_panel::report::RunStatus;
use watershed_coverage::PanelUnit;

const WATERSHEDS: &str = r#"{
  "type": "FeatureCollection",
  "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::3310"}},
  "features": [
    {"type": "Feature", "properties": {"GEO_ID_POLY": "A", "Watershed": "Alder Creek"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[100,0],[100,10],[0,10],[0,0]]]}},
    {"type": "Feature", "properties": {"GEO_ID_POLY": "B"},
     "geometry": {"type": "Polygon", "coordinates": [[[0,100],[100,100],[100,110],[0,110],[0,100]]]}},
    {"type": "Feature", "properties": {"GEO_ID_POLY": "C"},
     "geometry": {"type": "Polygon", "coordinates": [[[200,0],[210,0],[210,10],[200,10],[200,0]]]}},
    {"type": "Feature", "properties": {"GEO_ID_POLY": "D"},
     "geometry": {"type": "Polygon", "coordinates": [[[300,0],[310,0],[310,10],[300,10],[300,0]]]}},
    {"type": "Feature", "properties": {"GEO_ID_POLY": "D"},
     "geometry": {"type": "Polygon", "coordinates": [[[310,0],[320,0],[320,10],[310,10],[310,0]]]}},
    {"type": "Feature", "properties": {"GEO_ID_POLY": "E"},
     "geometry": {"type": "Polygon", "coordinates": [[[400,0],[410,10],[410,0],[400,10],[400,0]]]}},
    {"type": "Feature", "properties": {"GEO_ID_POLY": "G"},
     "geometry": {"type": "Point", "coordinates": [500, 0]}}
  ]
}"#;

const PROTECTED: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"UNIT_NAME": "West reserve", "YR_EST": 1970},
     "geometry": {"type": "Polygon", "coordinates": [[[0,0],[30,0],[30,10],[0,10],[0,0]]]}},
    {"type": "Feature", "properties": {"UNIT_NAME": "Central easement", "YR_EST": "NA"},
     "geometry": {"type": "Polygon", "coordinates": [[[20,0],[60,0],[60,10],[20,10],[20,0]]]}},
    {"type": "Feature", "properties": {"UNIT_NAME": "Whole C", "YR_EST": "1950"},
     "geometry": {"type": "Polygon", "coordinates": [[[200,0],[210,0],[210,10],[200,10],[200,0]]]}},
    {"type": "Feature", "properties": {"UNIT_NAME": "Recent D", "YR_EST": 1995},
     "geometry": {"type": "Polygon", "coordinates": [[[300,0],[320,0],[320,10],[300,10],[300,0]]]}},
    {"type": "Feature", "properties": {"UNIT_NAME": "Half E", "YR_EST": 0},
     "geometry": {"type": "Polygon", "coordinates": [[[400,0],[405,0],[405,10],[400,10],[400,0]]]}}
  ]
}"#;

const HEADER: &str =
    "Population,Watershed,Species,Life Stage,Brood Year,GEO_ID_POLY,Value,Metric,Estimation method";

fn population_csv() -> String {
    let mut lines = vec![HEADER.to_string()];
    let series: [(&str, &str, [f64; 5]); 4] = [
        ("Alder upper", "A", [10.0, 12.0, 15.0, 13.0, 18.0]),
        ("Cedar main", "C", [0.0, 0.0, 0.0, 0.0, 0.0]),
        ("Dry main", "D", [3.0, 4.0, 2.0, 5.0, 6.0]),
        ("Elk main", "E", [8.0, 7.0, 9.0, 11.0, 10.0]),
    ];
    for (population, geo_id, values) in series {
        for (i, value) in values.iter().enumerate() {
            lines.push(format!(
                "{population},{geo_id} basin,Coho salmon,Adult,{},{geo_id},{value},Spawner abundance,Redd expansion",
                1982 + i
            ));
        }
    }
    // Deuxième méthode pour A en 1982: moyenne avec 10
    lines.push(
        "Alder upper,A basin,Coho salmon,Adult,1982,A,14,Spawner abundance,Weir count".to_string(),
    );
    // Stade juvénile et clé manquante: écartés du panel
    lines.push("Alder upper,A basin,Coho salmon,Juvenile,1982,A,500,Smolts,Trap".to_string());
    lines.push("Lost creek,,Coho salmon,Adult,1982,NA,3,Spawner abundance,Survey".to_string());
    // Valeur négative: ligne rejetée au chargement
    lines.push("Dry main,D basin,Coho salmon,Adult,1990,D,-4,Spawner abundance,Survey".to_string());
    lines.join("\n") + "\n"
}

fn write_inputs(name: &str, population: &str) -> (Inputs, PathBuf) {
    let dir = std::env::temp_dir().join(format!("salmon_panel_it_{name}"));
    std::fs::create_dir_all(&dir).unwrap();

    let inputs = Inputs {
        watersheds: dir.join("watersheds.geojson"),
        protected: dir.join("protected.geojson"),
        population: dir.join("population.csv"),
    };
    std::fs::write(&inputs.watersheds, WATERSHEDS).unwrap();
    std::fs::write(&inputs.protected, PROTECTED).unwrap();
    std::fs::write(&inputs.population, population).unwrap();

    (inputs, dir.join("output"))
}

fn cleanup(output: &Path) {
    if let Some(dir) = output.parent() {
        std::fs::remove_dir_all(dir).ok();
    }
}

#[test]
fn test_fit_run_end_to_end() {
    let (inputs, output_dir) = write_inputs("fit", &population_csv());
    let config = Config::default();

    let mut pipeline = Pipeline::new(&config, "fit");
    let loaded = pipeline.load(&inputs).unwrap();
    let output = pipeline.execute(loaded, Stage::Fit, &WithinOls).unwrap();
    write_outputs(&output, &config, &output_dir).unwrap();
    pipeline.finish(&output_dir).unwrap();

    let report = &pipeline.report;
    assert_eq!(report.checksums.len(), 3);
    assert_eq!(report.watersheds_loaded, 6);
    assert_eq!(report.watersheds_skipped, 1);
    assert_eq!(report.watersheds_repaired, 1);
    assert_eq!(report.watersheds_dropped, 1);
    assert_eq!(report.protected_excluded, 1);
    assert_eq!(report.observations_rejected, 1);
    assert_eq!(report.coverage_records, 4);
    assert_eq!(report.zero_match, 1);
    // Point G et valeur négative écartés, sorties produites
    assert_eq!(report.status, RunStatus::PartialSuccess);

    let coverage = &output.coverage.coverage;
    assert_eq!(coverage.get("A").unwrap().percent_protected, 60.0);
    assert_eq!(coverage.get("C").unwrap().percent_protected, 100.0);
    assert_eq!(coverage.get("D").unwrap().percent_protected, 0.0);
    assert_eq!(coverage.get("E").unwrap().percent_protected, 50.0);

    let panel = output.panel.as_ref().unwrap();
    // C toujours nul: exclu
    assert_eq!(panel.rows.len(), 15);
    assert!(panel.rows.iter().all(|r| r.unit_id != "C"));
    assert_eq!(panel.rows[0].unit_id, "A");
    assert_eq!(panel.rows[0].value, 12.0);
    assert_eq!(panel.rows[0].year_offset, 1);
    assert_eq!(panel.stats.missing_geo_id, 1);

    assert_eq!(output.models.len(), 2);
    let trend = &output.models[0];
    assert_eq!(trend.groups, Some(3));
    assert_eq!(trend.clusters, Some(3));
    assert_eq!(trend.absorbed, vec!["percent_protected".to_string()]);
    assert!(trend.coefficient("year_offset").is_some());
    assert!(trend
        .coefficients
        .iter()
        .all(|c| c.estimate.is_finite() && c.ci_low <= c.ci_high));
    assert!(output.models[1].absorbed.contains(&"area".to_string()));

    for file in [
        "coverage.csv",
        "panel.csv",
        "coverage.geojson",
        "protected_union.geojson",
        "models.json",
        "report.json",
    ] {
        assert!(output_dir.join(file).exists(), "{file} should be written");
    }

    let coverage_csv = std::fs::read_to_string(output_dir.join("coverage.csv")).unwrap();
    assert!(coverage_csv.contains("A,1000.0,600.0,60.0"));

    cleanup(&output_dir);
}

#[test]
fn test_coverage_stage_stops_before_panel() {
    let (inputs, output_dir) = write_inputs("coverage", &population_csv());
    let config = Config::default();

    let mut pipeline = Pipeline::new(&config, "coverage");
    let loaded = pipeline.load(&inputs).unwrap();
    let output = pipeline.execute(loaded, Stage::Coverage, &WithinOls).unwrap();
    write_outputs(&output, &config, &output_dir).unwrap();

    assert!(output.panel.is_none());
    assert!(output.models.is_empty());
    assert!(output_dir.join("coverage.csv").exists());
    assert!(!output_dir.join("panel.csv").exists());

    cleanup(&output_dir);
}

#[test]
fn test_population_unit_keeps_parent_percent() {
    let (inputs, output_dir) = write_inputs("population", &population_csv());
    let config = Config::from_preset("population").unwrap();
    assert_eq!(config.panel.unit, PanelUnit::Population);

    let mut pipeline = Pipeline::new(&config, "panel");
    let loaded = pipeline.load(&inputs).unwrap();
    let output = pipeline.execute(loaded, Stage::Panel, &WithinOls).unwrap();

    let panel = output.panel.unwrap();
    assert!(panel
        .rows
        .iter()
        .filter(|r| r.watershed_id == "A")
        .all(|r| r.unit_id == "Alder upper" && r.percent_protected == 60.0));

    cleanup(&output_dir);
}

#[test]
fn test_population_fan_out_fails_the_run() {
    let mut csv = population_csv();
    csv.push_str("Alder upper,Elk basin,Coho salmon,Adult,1984,E,2,Spawner abundance,Survey\n");
    let (inputs, output_dir) = write_inputs("fan_out", &csv);
    let config = Config::from_preset("population").unwrap();

    let mut pipeline = Pipeline::new(&config, "panel");
    let loaded = pipeline.load(&inputs).unwrap();
    let result = pipeline.execute(loaded, Stage::Panel, &WithinOls);
    assert!(result.is_err());

    pipeline.finish(&output_dir).unwrap();
    assert!(pipeline.report.has_fatal());
    assert_eq!(pipeline.report.status, RunStatus::Failed);

    let saved = std::fs::read_to_string(output_dir.join("report.json")).unwrap();
    assert!(saved.contains("Failed"));

    cleanup(&output_dir);
}

#[cfg(not(feature = "reproject"))]
#[test]
fn test_geographic_layer_needs_reprojection() {
    let (inputs, output_dir) = write_inputs("wgs84", &population_csv());
    let geographic = WATERSHEDS.replace("EPSG::3310", "EPSG::4326");
    std::fs::write(&inputs.watersheds, geographic).unwrap();

    let config = Config::default();
    let mut pipeline = Pipeline::new(&config, "coverage");
    let err = pipeline.load(&inputs).unwrap_err();
    assert!(format!("{err:#}").contains("EPSG:4326"));

    cleanup(&output_dir);
}

#[cfg(not(feature = "reproject"))]
#[test]
fn test_undeclared_lon_lat_layer_is_rejected() {
    let (inputs, output_dir) = write_inputs("lonlat", &population_csv());
    let lon_lat = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"UNIT_NAME": "Point Reyes", "YR_EST": 1962},
     "geometry": {"type": "Polygon", "coordinates": [[[-123.0,38.0],[-122.9,38.0],[-122.9,38.1],[-123.0,38.1],[-123.0,38.0]]]}}
  ]
}"#;
    std::fs::write(&inputs.protected, lon_lat).unwrap();

    let config = Config::default();
    let mut pipeline = Pipeline::new(&config, "coverage");
    let err = pipeline.load(&inputs).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("protected"));
    assert!(message.contains("EPSG:4326"));

    cleanup(&output_dir);
}

use crate::helpers::{
    cape_town, durban, forecast_body, fresh_forecast, johannesburg, spawn_app,
    spawn_app_with_warehouse, test_logger, MockSource, LAST_HOUR, NOW,
};
use duckdb::Connection;
use serde_json::json;
use std::fs;
use time::Duration;
use weather_etl::{extract, ErrorKind, LocationResult, RunStatus, Warehouse};

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[tokio::test]
async fn loads_johannesburg_end_to_end() {
    let mut source = MockSource::new();
    source
        .expect_fetch_forecast()
        .times(1)
        .returning(|location| Ok(fresh_forecast(location)));
    let mut app = spawn_app(source, false);

    let report = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW)
        .await;

    assert_eq!(report.status, RunStatus::Succeeded);
    assert!(report.error.is_none());
    assert_eq!(report.rows_inserted(), 168);
    assert_eq!(
        report.outcome("Johannesburg"),
        Some(&LocationResult::Loaded {
            rows_received: 168,
            rows_inserted: 168,
            archive_path: app
                .dir
                .path()
                .join("processed")
                .join("weather_johannesburg_2024-08-18.parquet"),
        })
    );

    assert_eq!(
        file_names(&app.dir.path().join("processed")),
        vec!["weather_johannesburg_2024-08-18.parquet"]
    );
    let raw = file_names(&app.dir.path().join("raw"));
    assert_eq!(raw.len(), 1);
    assert!(raw[0].starts_with("weather_raw_johannesburg_"));

    let rows = app.warehouse.rows_for_location("Johannesburg").unwrap();
    assert_eq!(rows.len(), 168);
    assert_eq!(rows[167].timestamp, LAST_HOUR);
    assert_eq!(rows[0].timestamp, LAST_HOUR - Duration::hours(167));

    let runs = app.warehouse.runs().unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].run_id, report.run_id.to_string());
    assert_eq!(runs[0].status, "succeeded");
    assert_eq!(runs[0].rows_inserted, 168);
    assert_eq!(runs[0].locations_loaded, 1);
}

#[tokio::test]
async fn rerunning_the_same_window_inserts_nothing() {
    let mut source = MockSource::new();
    source
        .expect_fetch_forecast()
        .times(2)
        .returning(|location| Ok(fresh_forecast(location)));
    let mut app = spawn_app(source, false);

    let first = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW)
        .await;
    let second = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW)
        .await;

    assert_eq!(first.rows_inserted(), 168);
    assert_eq!(second.rows_inserted(), 0);
    assert!(second.is_success());
    assert_eq!(app.warehouse.row_count().unwrap(), 168);
    assert_eq!(app.warehouse.runs().unwrap().len(), 2);
    assert_eq!(
        file_names(&app.dir.path().join("processed")).len(),
        1,
        "same location and load date share one archive file"
    );
}

#[tokio::test]
async fn later_window_adds_only_new_hours() {
    let mut source = MockSource::new();
    let mut calls = 0;
    source
        .expect_fetch_forecast()
        .times(2)
        .returning(move |location| {
            calls += 1;
            let last_hour = if calls == 1 {
                LAST_HOUR - Duration::hours(144)
            } else {
                LAST_HOUR
            };
            Ok(forecast_body(location, last_hour, 168).to_string())
        });
    let mut app = spawn_app(source, false);

    let first = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW - Duration::hours(144))
        .await;
    let second = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW)
        .await;

    assert_eq!(first.rows_inserted(), 168);
    assert_eq!(second.rows_inserted(), 144);
    assert_eq!(app.warehouse.row_count().unwrap(), 312);
}

#[tokio::test]
async fn first_failure_aborts_remaining_locations() {
    let mut source = MockSource::new();
    source
        .expect_fetch_forecast()
        .times(2)
        .returning(|location| match location.name.as_str() {
            "Cape Town" => Ok(forecast_body(location, LAST_HOUR, 167).to_string()),
            _ => Ok(fresh_forecast(location)),
        });
    let mut app = spawn_app(source, false);

    let report = app
        .pipeline
        .run_at(
            &mut app.warehouse,
            &[johannesburg(), cape_town(), durban()],
            NOW,
        )
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert!(matches!(
        report.outcome("Johannesburg"),
        Some(LocationResult::Loaded { rows_inserted: 168, .. })
    ));
    match report.outcome("Cape Town") {
        Some(LocationResult::Failed { kind, reason }) => {
            assert_eq!(*kind, ErrorKind::Completeness);
            assert!(reason.contains("167"), "{reason}");
            assert!(reason.contains("168"), "{reason}");
        }
        other => panic!("expected completeness failure, got {:?}", other),
    }
    assert_eq!(report.outcome("Durban"), Some(&LocationResult::Skipped));
    assert!(report.error.as_deref().unwrap().starts_with("Cape Town"));

    assert_eq!(app.warehouse.row_count().unwrap(), 168);
    let runs = app.warehouse.runs().unwrap();
    assert_eq!(runs[0].status, "failed");
    assert_eq!(runs[0].locations_failed, 1);
    assert!(runs[0].error.is_some());
}

fn warehouse_with_legacy_row() -> Warehouse {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE weather_hourly (
            timestamp TIMESTAMP,
            temperature_2m DOUBLE,
            relativehumidity_2m DOUBLE,
            precipitation DOUBLE,
            latitude DOUBLE,
            longitude DOUBLE,
            load_date DATE
        );
        INSERT INTO weather_hourly VALUES
            ('2024-07-01 00:00:00', 14.0, 45.0, 0.0, -29.8587, 31.0218, '2024-07-01');",
    )
    .unwrap();
    Warehouse::with_connection(conn, test_logger()).unwrap()
}

#[tokio::test]
async fn aborted_run_skips_backfill() {
    let mut source = MockSource::new();
    source
        .expect_fetch_forecast()
        .times(1)
        .returning(|location| Ok(forecast_body(location, LAST_HOUR, 169).to_string()));
    let mut app = spawn_app_with_warehouse(source, false, warehouse_with_legacy_row());

    let report = app
        .pipeline
        .run_at(&mut app.warehouse, &[cape_town(), durban()], NOW)
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.rows_backfilled, 0);
    assert_eq!(app.warehouse.unnamed_row_count().unwrap(), 1);
}

#[tokio::test]
async fn isolated_failures_continue_and_backfill() {
    let mut source = MockSource::new();
    source
        .expect_fetch_forecast()
        .times(3)
        .returning(|location| match location.name.as_str() {
            "Cape Town" => {
                let mut body = forecast_body(location, LAST_HOUR, 168);
                body["hourly"]["temperature_2m"][10] = json!(65.0);
                Ok(body.to_string())
            }
            _ => Ok(fresh_forecast(location)),
        });
    let mut app = spawn_app_with_warehouse(source, true, warehouse_with_legacy_row());

    let report = app
        .pipeline
        .run_at(
            &mut app.warehouse,
            &[johannesburg(), cape_town(), durban()],
            NOW,
        )
        .await;

    assert_eq!(report.status, RunStatus::CompletedWithFailures);
    assert_eq!(report.locations_loaded(), 2);
    assert_eq!(report.locations_failed(), 1);
    assert!(matches!(
        report.outcome("Cape Town"),
        Some(LocationResult::Failed {
            kind: ErrorKind::Range,
            ..
        })
    ));
    assert_eq!(report.rows_inserted(), 336);
    assert_eq!(report.rows_backfilled, 1);
    assert_eq!(app.warehouse.unnamed_row_count().unwrap(), 0);
    assert_eq!(app.warehouse.rows_for_location("Durban").unwrap().len(), 169);
    assert_eq!(
        file_names(&app.dir.path().join("processed")),
        vec![
            "weather_durban_2024-08-18.parquet",
            "weather_johannesburg_2024-08-18.parquet"
        ]
    );
    assert_eq!(app.warehouse.runs().unwrap()[0].status, "completed_with_failures");
}

#[tokio::test]
async fn stale_batch_is_rejected_for_freshness() {
    let mut source = MockSource::new();
    source
        .expect_fetch_forecast()
        .times(1)
        .returning(|location| {
            Ok(forecast_body(location, LAST_HOUR - Duration::hours(7), 168).to_string())
        });
    let mut app = spawn_app(source, false);

    let report = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW)
        .await;

    assert!(matches!(
        report.outcome("Johannesburg"),
        Some(LocationResult::Failed {
            kind: ErrorKind::Freshness,
            ..
        })
    ));
    assert_eq!(app.warehouse.row_count().unwrap(), 0);
    assert!(file_names(&app.dir.path().join("processed")).is_empty());
}

#[tokio::test]
async fn http_errors_are_reported_as_retryable_extract_failures() {
    let mut source = MockSource::new();
    source.expect_fetch_forecast().times(1).returning(|_| {
        Err(extract::Error::Status {
            status: 503,
            body: String::from("service unavailable"),
        })
    });
    let mut app = spawn_app(source, false);

    let report = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW)
        .await;

    match report.outcome("Johannesburg") {
        Some(LocationResult::Failed { kind, reason }) => {
            assert_eq!(*kind, ErrorKind::Extract);
            assert!(kind.is_retryable());
            assert!(reason.contains("503"), "{reason}");
        }
        other => panic!("expected extract failure, got {:?}", other),
    }
    assert!(file_names(&app.dir.path().join("raw")).is_empty());
}

#[tokio::test]
async fn unparseable_payload_is_a_structural_rejection() {
    let mut source = MockSource::new();
    source
        .expect_fetch_forecast()
        .times(1)
        .returning(|_| Ok(String::from("<html>rate limited</html>")));
    let mut app = spawn_app(source, false);

    let report = app
        .pipeline
        .run_at(&mut app.warehouse, &[johannesburg()], NOW)
        .await;

    assert!(matches!(
        report.outcome("Johannesburg"),
        Some(LocationResult::Failed {
            kind: ErrorKind::Structural,
            ..
        })
    ));
    let raw = file_names(&app.dir.path().join("raw"));
    assert_eq!(raw.len(), 1);
    let saved = fs::read_to_string(app.dir.path().join("raw").join(&raw[0])).unwrap();
    assert_eq!(saved, "<html>rate limited</html>");
}

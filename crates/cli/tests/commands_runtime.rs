use std::env;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{TimeZone, Utc};
use sitespend_cli::commands::{config, doctor, migrate, report, seed};
use sitespend_core::clock::{Clock, ManualClock};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&memory_db(), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("SITESPEND_DATABASE_URL", "postgres://localhost/sitespend")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_demo_sites_and_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("seed.db").display());

    with_env(&[("SITESPEND_DATABASE_URL", url.as_str())], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success: {}", first.output);
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["command"], "seed");
        let message = first_payload["message"].as_str().unwrap_or("");
        assert!(message.contains("Site A, Site B"), "unexpected message: {message}");
        assert!(message.contains("finance@sitespend.local"));

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        assert_eq!(first_payload["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn report_prints_daily_spending_object() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_db(&dir, "report.db");

    with_env(&[("SITESPEND_DATABASE_URL", url.as_str())], || {
        assert_eq!(migrate::run().exit_code, 0);

        let result = report::daily_spending(Some("2026-03-02"));
        assert_eq!(result.exit_code, 0, "expected report success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "report");
        assert_eq!(payload["message"]["date"], "2026-03-02");
        assert_eq!(payload["message"]["total_transactions"], 0);
        assert_eq!(payload["message"]["site_breakdown"], serde_json::json!({}));
    });
}

#[test]
fn report_does_not_migrate_the_schema() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_db(&dir, "unmigrated.db");

    with_env(&[("SITESPEND_DATABASE_URL", url.as_str())], || {
        let result = report::daily_spending(Some("2026-03-02"));
        assert_eq!(result.exit_code, 5, "report output: {}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "report_execution");

        let doctor = doctor::run(true);
        assert_eq!(doctor.exit_code, 6, "schema should still be unapplied: {}", doctor.output);
    });
}

#[test]
fn report_defaults_to_today_in_configured_zone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = file_db(&dir, "zoned.db");

    with_env(
        &[("SITESPEND_DATABASE_URL", url.as_str()), ("SITESPEND_REPORTING_TIMEZONE", "Africa/Nairobi")],
        || {
            assert_eq!(migrate::run().exit_code, 0);

            // 22:30 UTC is already the next day in Nairobi (UTC+3).
            let clock: Arc<dyn Clock> =
                Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 22, 30, 0).unwrap()));
            let result = report::daily_spending_with_clock(None, clock);
            assert_eq!(result.exit_code, 0, "expected report success: {}", result.output);

            let payload = parse_payload(&result.output);
            assert_eq!(payload["message"]["date"], "2026-03-03");
        },
    );
}

#[test]
fn report_rejects_malformed_date() {
    with_env(&memory_db(), || {
        let result = report::daily_spending(Some("02/03/2026"));
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_input");
    });
}

#[test]
fn doctor_passes_after_migrate_on_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("doctor.db").display());

    with_env(&[("SITESPEND_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(true);
        assert_eq!(before.exit_code, 6, "fresh database should fail schema check");
        let before_payload = parse_payload(&before.output);
        assert_eq!(before_payload["overall_status"], "fail");

        assert_eq!(migrate::run().exit_code, 0);

        let after = doctor::run(true);
        assert_eq!(after.exit_code, 0, "doctor output: {}", after.output);
        let payload = parse_payload(&after.output);
        assert_eq!(payload["overall_status"], "pass");
        let names = payload["checks"]
            .as_array()
            .expect("checks")
            .iter()
            .map(|check| check["name"].as_str().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "config_validation",
                "reporting_timezone",
                "database_connectivity",
                "schema_migrations"
            ]
        );
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("SITESPEND_DATABASE_URL", "mysql://nope")], || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 6);
        assert!(result.output.contains("- [fail] config_validation"));
        assert!(result.output.contains("- [skip] database_connectivity"));
    });
}

#[test]
fn config_attributes_values_to_env() {
    let mut vars = memory_db();
    vars.push(("SITESPEND_LOG_LEVEL", "debug"));

    with_env(&vars, || {
        let output = config::run();
        assert!(output
            .contains("- database.url = sqlite::memory: (source: env (SITESPEND_DATABASE_URL))"));
        assert!(output.contains("- logging.level = debug (source: env (SITESPEND_LOG_LEVEL))"));
        assert!(output.contains("- reporting.timezone = UTC (source: default)"));
    });
}

fn memory_db() -> Vec<(&'static str, &'static str)> {
    vec![("SITESPEND_DATABASE_URL", "sqlite::memory:"), ("SITESPEND_DATABASE_MAX_CONNECTIONS", "1")]
}

fn file_db(dir: &tempfile::TempDir, name: &str) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join(name).display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|p| p.into_inner());

    let keys = [
        "SITESPEND_DATABASE_URL",
        "SITESPEND_DATABASE_MAX_CONNECTIONS",
        "SITESPEND_DATABASE_TIMEOUT_SECS",
        "SITESPEND_SERVER_BIND_ADDRESS",
        "SITESPEND_SERVER_PORT",
        "SITESPEND_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "SITESPEND_REPORTING_TIMEZONE",
        "SITESPEND_LOGGING_LEVEL",
        "SITESPEND_LOGGING_FORMAT",
        "SITESPEND_LOG_LEVEL",
        "SITESPEND_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}

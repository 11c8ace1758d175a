//! CLI argument parsing tests

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;

/// Get the axbridge binary command
fn axbridge() -> Command {
    Command::cargo_bin("axbridge").unwrap()
}

/// Isolated HOME and XDG dirs with a config file naming `default_profile`
fn setup_config(default_profile: &str) -> (tempfile::TempDir, String, String, String) {
    use std::fs;

    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path().join("home");
    let config_home = tmp.path().join("config");
    let data_home = tmp.path().join("data");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(&config_home).unwrap();
    fs::create_dir_all(&data_home).unwrap();

    let config_path_output = axbridge()
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", &config_home)
        .env("XDG_DATA_HOME", &data_home)
        .args(["config", "path"])
        .output()
        .unwrap();
    assert!(
        config_path_output.status.success(),
        "failed to resolve config path: {}",
        String::from_utf8_lossy(&config_path_output.stderr)
    );
    let config_file = std::path::PathBuf::from(
        String::from_utf8_lossy(&config_path_output.stdout).trim(),
    );
    fs::create_dir_all(config_file.parent().unwrap()).unwrap();

    let config = format!(
        r#"[browser]
headless = false
default_profile = "{}"

[snapshot]
fallback = "strict"
"#,
        default_profile
    );
    fs::write(config_file, config).unwrap();

    (
        tmp,
        home.to_string_lossy().to_string(),
        config_home.to_string_lossy().to_string(),
        data_home.to_string_lossy().to_string(),
    )
}

mod help {
    use super::*;

    #[test]
    fn shows_help() {
        axbridge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("axbridge"))
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("snapshot"));
    }

    #[test]
    fn shows_version() {
        axbridge()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("axbridge"));
    }

    #[test]
    fn requires_subcommand() {
        axbridge().assert().failure();
    }

    #[test]
    fn global_flags_are_listed() {
        axbridge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--cdp"))
            .stdout(predicate::str::contains("--profile"))
            .stdout(predicate::str::contains("--cloud"))
            .stdout(predicate::str::contains("--json"));
    }
}

mod browser_commands {
    use super::*;

    #[test]
    fn goto_requires_url() {
        axbridge()
            .arg("goto")
            .assert()
            .failure()
            .stderr(predicate::str::contains("URL"));
    }

    #[test]
    fn snapshot_help_shows_full_flag() {
        axbridge()
            .args(["snapshot", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--full"));
    }

    #[test]
    fn screenshot_has_default_path() {
        axbridge()
            .args(["screenshot", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("screenshot.png"))
            .stdout(predicate::str::contains("--full-page"));
    }

    #[test]
    fn connect_requires_endpoint() {
        axbridge()
            .arg("connect")
            .assert()
            .failure()
            .stderr(predicate::str::contains("ENDPOINT"));
    }

    #[test]
    fn connect_invalid_endpoint_fails() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .args(["connect", "not-a-port"])
            .timeout(std::time::Duration::from_secs(5))
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid endpoint"));
    }

    #[test]
    fn connect_uses_config_default_profile() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .env_remove("AXBRIDGE_PROFILE")
            .args(["--json", "connect", "ws://127.0.0.1:9222/devtools/browser/test"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"profile\":\"team\""))
            .stdout(predicate::str::contains("\"cdp_port\":9222"));
    }

    #[test]
    fn connect_cli_profile_overrides_env_and_config() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .env("AXBRIDGE_PROFILE", "env-profile")
            .args([
                "--json",
                "--profile",
                "cli-profile",
                "connect",
                "wss://browsers.example.com/session/abc",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"profile\":\"cli-profile\""))
            .stdout(predicate::str::contains("\"cdp_port\":null"));
    }

    #[test]
    fn close_without_session_reports_nothing_running() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .env_remove("AXBRIDGE_CDP")
            .args(["--json", "close"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"closed\":false"));
    }
}

mod config_command {
    use super::*;

    #[test]
    fn config_requires_subcommand() {
        axbridge()
            .arg("config")
            .assert()
            .failure()
            .stderr(predicate::str::contains("subcommand"));
    }

    #[test]
    fn get_reads_file_layer() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .args(["config", "get", "snapshot.fallback"])
            .assert()
            .success()
            .stdout(predicate::str::contains("strict"));
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .args(["config", "set", "snapshot.action_timeout_ms", "1500"])
            .assert()
            .success();

        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .args(["--json", "config", "get", "snapshot.action_timeout_ms"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"value\":\"1500\""));
    }

    #[test]
    fn unknown_key_fails() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .args(["config", "get", "browser.colour"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn invalid_fallback_is_rejected() {
        let (_tmp, home, config_home, data_home) = setup_config("team");
        axbridge()
            .env("HOME", &home)
            .env("XDG_CONFIG_HOME", &config_home)
            .env("XDG_DATA_HOME", &data_home)
            .args(["config", "set", "snapshot.fallback", "closest"])
            .assert()
            .failure();
    }
}

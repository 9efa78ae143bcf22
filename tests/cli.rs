use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONFIG: &str = r#"
output:
  root: raw
collections:
  video:
    - key: CSJ01
      name: Season 1
      url: https://www.youtube.com/playlist?list=PL1
  blog: []
"#;

fn harvester() -> Command {
    let mut cmd = Command::cargo_bin("harvester").unwrap();
    cmd.env_remove("HARVESTER_CONFIG").env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, CONFIG).unwrap();
    path
}

#[test]
fn help_lists_subcommands() {
    harvester()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("sources"));
}

#[test]
fn sources_lists_configured_collections() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    harvester()
        .current_dir(dir.path())
        .args(["sources", "--source", "video", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("CSJ01"))
        .stdout(predicate::str::contains("Season 1"))
        .stdout(predicate::str::contains("youtube.com"));
}

#[test]
fn missing_config_file_is_an_error() {
    let dir = TempDir::new().unwrap();

    harvester()
        .current_dir(dir.path())
        .args(["config", "--config", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, "dedup: store\n").unwrap();

    harvester()
        .current_dir(dir.path())
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("store backend"));
}

#[test]
fn plan_with_no_collections_does_nothing() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    harvester()
        .current_dir(dir.path())
        .args(["plan", "--source", "blog", "--quiet", "--config"])
        .arg(&config)
        .assert()
        .success();
}

#[cfg(target_os = "linux")]
#[test]
fn first_run_announces_default_config() {
    let dir = TempDir::new().unwrap();
    let home = dir.path().join("home");

    harvester()
        .current_dir(dir.path())
        .env("HOME", &home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .arg("config")
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote default configuration"));

    assert!(home.join(".config/transcript-harvester/config.yaml").exists());
}

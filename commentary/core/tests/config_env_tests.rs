//! Environment Override Tests
//!
//! Environment variables are process-wide, so these run in their own test
//! binary and inside a single test function.

use std::io::Write;
use std::time::Duration;

use commentary_core::{load_config_from_path, ConfigSource};
use tempfile::NamedTempFile;

#[test]
fn test_env_overrides_toml() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[connection]
host = "toml.example"
retry_delay_ms = 250

[display]
lane_count = 8
"#
    )
    .unwrap();
    let path = Some(file.path().to_path_buf());

    let from_file = load_config_from_path(path.clone()).unwrap();
    assert_eq!(from_file.display.lane_count, 8);
    assert_eq!(from_file.source(), ConfigSource::File);

    std::env::set_var("COMMENTARY_LANES", "4");
    std::env::set_var("COMMENTARY_HOST", "env.example");
    let config = load_config_from_path(path.clone());
    std::env::remove_var("COMMENTARY_LANES");
    std::env::remove_var("COMMENTARY_HOST");

    let config = config.unwrap();
    assert_eq!(config.display.lane_count, 4);
    assert_eq!(config.connection.host, "env.example");
    // Values the environment does not name keep their TOML setting
    assert_eq!(config.connection.retry_delay, Duration::from_millis(250));
    assert_eq!(config.source(), ConfigSource::Env);

    // Unparseable values are ignored
    std::env::set_var("COMMENTARY_LANES", "many");
    let config = load_config_from_path(path);
    std::env::remove_var("COMMENTARY_LANES");
    assert_eq!(config.unwrap().display.lane_count, 8);
}

use super::*;
use tempfile::TempDir;

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
    fs::write(path, contents.as_bytes()).expect("write file");
}

#[test]
fn missing_implicit_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config(Some(&dir.path().join("config.json")), false).unwrap();
    assert_eq!(config, PipelineConfig::default());
    assert_eq!(load_config(None, false).unwrap(), PipelineConfig::default());
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = load_config(Some(&dir.path().join("nope.json")), true).unwrap_err();
    assert!(err.to_string().contains("config not found"));
}

#[test]
fn partial_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    write_file(
        &path,
        r#"{"schema_version": 1, "model": "other-model", "default_depth": "deep"}"#,
    );
    let config = load_config(Some(&path), true).unwrap();
    assert_eq!(config.model, "other-model");
    assert_eq!(config.default_depth, Depth::Deep);
    assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    assert_eq!(config.export_file, DEFAULT_EXPORT_FILE);
}

#[test]
fn unknown_fields_and_bad_values_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    write_file(&path, r#"{"schema_version": 1, "temperature": 0.2}"#);
    assert!(load_config(Some(&path), true).is_err());

    write_file(&path, r#"{"schema_version": 9}"#);
    let err = load_config(Some(&path), true).unwrap_err();
    assert!(err.to_string().contains("schema_version 9"), "{err}");

    write_file(&path, r#"{"schema_version": 1, "max_tokens": 0}"#);
    assert!(load_config(Some(&path), true).is_err());

    write_file(&path, r#"{"schema_version": 1, "lm_command": "  "}"#);
    assert!(load_config(Some(&path), true).is_err());
}

#[test]
fn written_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.json");
    let config = PipelineConfig {
        lm_command: Some("./mock-lm.sh".to_string()),
        default_depth: Depth::Shallow,
        ..PipelineConfig::default()
    };
    write_config(&path, &config).unwrap();
    assert_eq!(load_config(Some(&path), true).unwrap(), config);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"schema_version\": 1"));
}

#[test]
fn explicit_lm_command_wins() {
    let config = PipelineConfig {
        lm_command: Some("from-config".to_string()),
        ..PipelineConfig::default()
    };
    assert_eq!(
        resolve_lm_command(Some("from-flag"), &config).as_deref(),
        Some("from-flag")
    );
}

#[test]
fn explicit_path_beats_environment() {
    let path = PathBuf::from("/tmp/explicit.json");
    assert_eq!(config_path(Some(&path)), Some(path));
}

use sg_domain::config::{Config, ConfigSeverity};

#[test]
fn default_base_root_is_relative_data_dir() {
    let config = Config::default();
    assert_eq!(config.workspace.base_root.to_str().unwrap(), "./data");
}

#[test]
fn explicit_base_root_parses_from_toml() {
    let toml_str = r#"
[workspace]
base_root = "/srv/gateway"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.workspace.base_root.to_str().unwrap(), "/srv/gateway");
    assert_eq!(
        config.workspace.store_path().to_str().unwrap(),
        "/srv/gateway/gateway.sqlite3"
    );
}

#[test]
fn missing_admin_identity_is_a_warning_not_an_error() {
    let config = Config::default();
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.severity == ConfigSeverity::Warning && e.field == "env.admin_user_id"));
}

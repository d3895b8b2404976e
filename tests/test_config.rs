use stremmer::config::{Config, INTERNAL_BASE_ENV, LISTEN_ENV};

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.storage.internal_base, "http://minio-old:9000");
    assert_eq!(cfg.storage.public_hosts, vec!["localhost", "127.0.0.1"]);
    assert_eq!(cfg.storage.public_ports, vec![9100, 9000]);
    assert_eq!(cfg.upstream.connect_timeout_secs, 5);
    assert!(cfg.validate().is_ok());
}

// Only test in this binary that touches the process environment.
#[test]
fn test_config_env_overrides() {
    unsafe {
        std::env::set_var(LISTEN_ENV, "0.0.0.0:3000");
        std::env::set_var(INTERNAL_BASE_ENV, "http://minio:9000");
    }

    let cfg = Config::load().unwrap();

    unsafe {
        std::env::remove_var(LISTEN_ENV);
        std::env::remove_var(INTERNAL_BASE_ENV);
    }

    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    assert_eq!(cfg.storage.internal_base, "http://minio:9000");
}

#[test]
fn test_config_from_yaml_partial() {
    let cfg = Config::from_yaml(
        r#"
storage:
  internal_base: "http://storage.internal:9000"
  public_ports: [9100]
upstream:
  idle_timeout_secs: 10
"#,
    )
    .unwrap();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert_eq!(cfg.storage.internal_base, "http://storage.internal:9000");
    assert_eq!(cfg.storage.public_hosts, vec!["localhost", "127.0.0.1"]);
    assert_eq!(cfg.storage.public_ports, vec![9100]);
    assert_eq!(cfg.upstream.idle_timeout_secs, 10);
    assert_eq!(cfg.upstream.response_timeout_secs, 30);
}

#[test]
fn test_config_from_yaml_rejects_garbage() {
    assert!(Config::from_yaml("storage: [").is_err());
}

#[test]
fn test_config_rejects_non_http_base() {
    let mut cfg = Config::default();
    cfg.storage.internal_base = "https://minio:9000".to_string();
    assert!(cfg.validate().is_err());

    cfg.storage.internal_base = "not a url".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_rejects_zero_timeout() {
    let mut cfg = Config::default();
    cfg.upstream.connect_timeout_secs = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_config_builds_rewrite_rule() {
    let cfg = Config::default();
    let rule = cfg.storage.rewrite_rule().unwrap();

    assert_eq!(rule.internal_base().as_str(), "http://minio-old:9000/");
}

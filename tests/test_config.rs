use std::io::Write;
use std::sync::Mutex;

use bweb::config::Config;
use bweb::middleware::BodyKind;

// LISTEN is process-global; tests that touch it take this lock.
static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn test_config_default_address() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        std::env::remove_var("LISTEN");
    }
    let cfg = Config::load();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:8080");
    assert!(cfg.server.keep_alive);
    assert!(cfg.server.request_timeout().is_none());
    assert!(cfg.jsonrpc.enabled);
    assert!(!cfg.jsonrpc.options.wallet);
}

#[test]
fn test_config_custom_address_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        std::env::set_var("LISTEN", "0.0.0.0:3000");
    }
    let cfg = Config::load();
    assert_eq!(cfg.server.listen_addr, "0.0.0.0:3000");
    unsafe {
        std::env::remove_var("LISTEN");
    }
}

#[test]
fn test_config_from_yaml() {
    let cfg = Config::from_yaml(
        r#"
server:
  listen_addr: "127.0.0.1:9009"
  request_timeout_ms: 250
  keep_alive: false
  max_body_size: 4096
body_parser:
  kind: json
  max_body_size: 2048
jsonrpc:
  wallet: true
log:
  level: debug
"#,
    )
    .unwrap();

    assert_eq!(cfg.server.listen_addr, "127.0.0.1:9009");
    assert_eq!(cfg.server.request_timeout().unwrap().as_millis(), 250);
    assert!(!cfg.server.keep_alive);
    assert_eq!(cfg.server.max_body_size, 4096);
    assert_eq!(cfg.body_parser.kind, BodyKind::Json);
    assert_eq!(cfg.body_parser.max_body_size, 2048);
    assert!(cfg.jsonrpc.enabled);
    assert!(cfg.jsonrpc.options.wallet);
    assert_eq!(cfg.log.level, "debug");
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_config_empty_yaml_is_defaults() {
    let cfg = Config::from_yaml("").unwrap();
    assert_eq!(cfg.body_parser.kind, BodyKind::Auto);
    assert_eq!(cfg.body_parser.max_body_size, 1024 * 1024);
}

#[test]
fn test_config_rejects_unknown_body_kind() {
    assert!(Config::from_yaml("body_parser:\n  kind: xml\n").is_err());
}

#[test]
fn test_config_validation() {
    let mut cfg = Config::default();
    cfg.body_parser.max_body_size = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.server.max_body_size = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.server.request_timeout_ms = Some(0);
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.server.listen_addr = "  ".into();
    assert!(matches!(cfg.validate(), Err(bweb::Error::Config(_))));
}

#[test]
fn test_config_from_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    unsafe {
        std::env::remove_var("LISTEN");
    }

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "server:\n  listen_addr: \"127.0.0.1:7000\"").unwrap();

    let cfg = Config::from_file(file.path()).unwrap();
    assert_eq!(cfg.server.listen_addr, "127.0.0.1:7000");
}

#[test]
fn test_config_missing_file() {
    assert!(Config::from_file("/nonexistent/bweb.yaml").is_err());
}

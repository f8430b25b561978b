use std::io::Write;

use gembridge::{ConnectionConfig, DEFAULT_RELEASE_BATCH_SIZE, GemError, Session, TransportKind};

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn connection_files_load_with_defaults() {
    let file = write_config(
        r#"{
            "transport": "linked",
            "library": "/opt/gemstone/lib/libgcilnk-3.7.0-64.so",
            "login": { "username": "DataCurator", "password": "swordfish" },
            "session": { "fetch_chunk_size": 4096 }
        }"#,
    );
    let config = ConnectionConfig::load(file.path()).unwrap();

    assert_eq!(config.transport, TransportKind::Linked);
    assert_eq!(config.login.username, "DataCurator");
    assert_eq!(config.login.stone_name, "gs64stone");
    assert_eq!(config.login.netldi_task, "gemnetobject");
    assert_eq!(config.login.host_username, None);
    assert_eq!(config.session.fetch_chunk_size, 4096);
    assert_eq!(config.session.release_batch_size, DEFAULT_RELEASE_BATCH_SIZE);
}

#[test]
fn connection_files_survive_a_round_trip() {
    let config = ConnectionConfig::from_json(
        r#"{
            "transport": "rpc",
            "library": "libgcits.so",
            "login": {
                "username": "SystemUser",
                "password": "swordfish",
                "stone_name": "devstone",
                "host_username": "gemstone",
                "host_password": "secret"
            }
        }"#,
    )
    .unwrap();
    let file = write_config(&serde_json::to_string_pretty(&config).unwrap());
    assert_eq!(ConnectionConfig::load(file.path()).unwrap(), config);
}

#[test]
fn missing_files_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConnectionConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(&err, GemError::Config(msg) if msg.contains("absent.json")), "{err}");
}

#[test]
fn malformed_files_are_config_errors() {
    for text in [
        "not json",
        r#"{ "transport": "carrier-pigeon", "library": "x", "login": { "username": "a", "password": "b" } }"#,
        r#"{ "transport": "rpc", "library": "x" }"#,
    ] {
        let file = write_config(text);
        let err = ConnectionConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, GemError::Config(_)), "{text}: {err}");
    }
}

#[test]
fn connecting_without_a_library_fails_before_login() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_config(&format!(
        r#"{{
            "transport": "rpc",
            "library": {:?},
            "login": {{ "username": "DataCurator", "password": "swordfish" }}
        }}"#,
        dir.path().join("libgcits-missing.so").display().to_string()
    ));
    let config = ConnectionConfig::load(file.path()).unwrap();

    let err = Session::builder().connect(&config).unwrap_err();
    assert!(matches!(err, GemError::Library(_)), "{err}");
}

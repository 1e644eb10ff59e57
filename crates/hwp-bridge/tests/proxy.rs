//! `Hwp` against a real host loop serving the in-memory `memo` target.

mod common;

use hwp_bridge::{BridgeConfig, BridgeError, Hwp, Kwargs, Value, SECURITY_MODULE_TYPE};
use pretty_assertions::assert_eq;

use common::{quick_config, start_host};

#[test]
fn test_insert_text_scenario() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();

    hwp.create(vec![true.into(), true.into()], Kwargs::new()).unwrap();
    assert_eq!(hwp.insert_text("hello").unwrap(), Value::Bool(true));
    assert_eq!(hwp.get_text().unwrap(), Value::from("hello"));
    assert_eq!(hwp.is_empty().unwrap(), Value::Bool(false));

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_unknown_operation_carries_remote_message() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    let err = hwp.call("nonexistent_op", vec![]).unwrap_err();
    match &err {
        BridgeError::UnknownOperation { method, message } => {
            assert_eq!(method, "nonexistent_op");
            assert_eq!(message, "Unknown method: nonexistent_op");
        }
        other => panic!("expected UnknownOperation, got {other:?}"),
    }
    assert_eq!(err.remote_message(), Some("Unknown method: nonexistent_op"));

    // The session is still usable.
    assert_eq!(hwp.is_initialized().unwrap(), Value::Bool(true));
    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_remote_failure_is_reported() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    let err = hwp.call("insert_text", vec![42.into()]).unwrap_err();
    assert!(matches!(err, BridgeError::Remote { ref method, .. } if method == "insert_text"));

    let err = hwp.set_property("page_count", 3).unwrap_err();
    assert_eq!(err.remote_message(), Some("Property 'page_count' is read-only"));

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_properties() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    assert_eq!(hwp.edit_mode().unwrap(), Value::Int(1));
    hwp.set_edit_mode(0).unwrap();
    assert_eq!(hwp.edit_mode().unwrap(), Value::Int(0));
    assert_eq!(hwp.page_count().unwrap(), Value::Int(1));
    assert!(hwp.version().unwrap().as_str().unwrap().starts_with("memo"));

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_calls_fail_fast_without_create() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();

    assert!(matches!(hwp.get_text(), Err(BridgeError::NotCreated)));

    hwp.create(vec![], Kwargs::new()).unwrap();
    hwp.insert_text("x").unwrap();
    hwp.destroy().unwrap();
    assert!(!hwp.is_created());
    assert!(matches!(hwp.insert_text("y"), Err(BridgeError::NotCreated)));

    // A new create starts from a fresh object.
    hwp.create(vec![], Kwargs::new()).unwrap();
    assert_eq!(hwp.get_text().unwrap(), Value::from(""));

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_failed_recreate_leaves_nothing_created() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();
    hwp.insert_text("kept?").unwrap();

    let err = hwp.create(vec!["yes".into()], Kwargs::new()).unwrap_err();
    assert!(matches!(err, BridgeError::Remote { .. }));
    assert!(!hwp.is_created());
    assert!(matches!(hwp.get_text(), Err(BridgeError::NotCreated)));
    assert!(hwp.session().is_open());

    hwp.create(vec![], Kwargs::new()).unwrap();
    assert_eq!(hwp.get_text().unwrap(), Value::from(""));

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_reserved_names_are_refused_locally() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    assert!(matches!(
        hwp.call("shutdown", vec![]),
        Err(BridgeError::ReservedName(name)) if name == "shutdown"
    ));
    assert!(hwp.session().is_open());

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_save_as_writes_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");

    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![false.into()], Kwargs::new()).unwrap();
    hwp.insert_text("saved").unwrap();
    assert_eq!(hwp.is_modified().unwrap(), Value::Bool(true));
    hwp.save_as(&path, "HWP", "").unwrap();
    assert_eq!(hwp.is_modified().unwrap(), Value::Bool(false));

    hwp.shutdown();
    host.join().unwrap().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved");
}

#[test]
fn test_register_module_by_key_name_is_forwarded() {
    let (addr, host) = start_host(None);
    let hwp = Hwp::attach(addr, quick_config()).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    assert_eq!(
        hwp.register_module("FilePathCheckDLL", Some("FilePathCheckerModule"))
            .unwrap(),
        Value::Bool(true)
    );
    // A path that does not exist is refused before anything is sent.
    assert_eq!(
        hwp.register_module("FilePathCheckDLL", Some("/no/such/Checker.dll"))
            .unwrap(),
        Value::Bool(false)
    );

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_auto_register_announces_module_key() {
    let dir = tempfile::tempdir().unwrap();
    let module = dir.path().join("Checker.dll");
    std::fs::write(&module, b"MZ").unwrap();

    let (addr, host) = start_host(None);
    let config = BridgeConfig {
        security_module: Some(module),
        module_key: "Checker".to_string(),
        ..quick_config()
    };
    let hwp = Hwp::attach(addr, config).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    assert!(hwp.auto_register_module());
    assert_eq!(
        hwp.get_property("registered_modules").unwrap(),
        Value::List(vec![format!("{SECURITY_MODULE_TYPE}:Checker").into()])
    );

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_auto_register_without_module_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, host) = start_host(None);
    let config = BridgeConfig {
        security_module: Some(dir.path().join("missing.dll")),
        host_exe: Some(dir.path().join("hwp-bridge-host")),
        module_key: "NoSuchModuleForTests".to_string(),
        ..quick_config()
    };
    let hwp = Hwp::attach(addr, config).unwrap();
    hwp.create(vec![], Kwargs::new()).unwrap();

    assert!(!hwp.auto_register_module());
    assert_eq!(
        hwp.get_property("registered_modules").unwrap(),
        Value::List(vec![])
    );

    hwp.shutdown();
    host.join().unwrap().unwrap();
}

#[test]
fn test_drop_shuts_the_host_down() {
    let (addr, host) = start_host(None);
    {
        let hwp = Hwp::attach(addr, quick_config()).unwrap();
        hwp.create(vec![], Kwargs::new()).unwrap();
    }
    host.join().unwrap().unwrap();
}

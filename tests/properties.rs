//! Behavior checks against the real `PATH` and shell of the test machine.

use path_commands::ident::is_identifier;
use path_commands::{Command, Error, Registry, Runner};
use std::collections::HashSet;

#[test]
fn discovered_identifiers_are_valid_and_unique() {
    let registry = Registry::discover();
    let ids: Vec<&str> = registry.iter().collect();
    let unique: HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
    for id in &ids {
        assert!(is_identifier(id), "{id:?} is not an identifier");
    }
}

#[test]
fn length_and_iteration_are_stable() {
    let registry = Registry::discover();
    let first: Vec<String> = registry.iter().map(str::to_string).collect();
    let second: Vec<String> = registry.iter().map(str::to_string).collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), registry.len());
    assert_eq!(registry.materialized(), 0);
}

#[test]
fn containment_checks_do_not_construct_commands() {
    let registry = Registry::discover();
    let ids: Vec<String> = registry.iter().map(str::to_string).collect();
    for id in &ids {
        assert!(registry.contains(id));
    }
    assert!(!registry.contains("definitely_not_a_command_4c1d9a"));
    assert_eq!(registry.materialized(), 0);
}

#[cfg(unix)]
#[test]
fn discovered_sh_runs() {
    let registry = Registry::discover();
    if let Some(sh) = registry.get("sh") {
        let out = sh.call(["-c", "'echo from sh'"]).unwrap();
        assert_eq!(out, b"from sh");
        assert_eq!(registry.materialized(), 1);
    }
}

#[cfg(unix)]
#[test]
fn joined_and_split_arguments_match() {
    let run = Runner::new();
    assert_eq!(
        run.run("echo hello world").unwrap(),
        run.run(["echo", "hello", "world"]).unwrap()
    );
}

#[cfg(unix)]
#[test]
fn default_output_has_no_surrounding_newlines() {
    let out = Runner::new().run("printf '\\n\\nline one\\nline two\\n\\n'").unwrap();
    assert_eq!(out, b"line one\nline two");
}

#[cfg(unix)]
#[test]
fn exit_status_one_under_both_policies() {
    let failing = "echo before; exit 1";
    match Runner::new().run(failing) {
        Err(Error::Process { code, .. }) => assert_eq!(code, 1),
        other => panic!("expected a process error, got {other:?}"),
    }
    assert_eq!(Runner::new().ignore_errors().run(failing).unwrap(), b"before");
}

#[cfg(unix)]
#[test]
fn nonexistent_executable_is_not_found() {
    let err = Command::new("no-such-program-e81f")
        .call("--version")
        .unwrap_err();
    assert!(matches!(err, Error::CommandNotFound { .. }), "{err:?}");
}

#[cfg(unix)]
#[test]
fn explicit_registry_round_trip() {
    let registry = Registry::from_lines([("x", "echo hi")]).unwrap();
    assert_eq!(registry["x"].call(()).unwrap(), Runner::new().run("echo hi").unwrap());
}

#[test]
fn missing_docs_degrade_to_placeholder() {
    let cmd = Command::new("no-such-program-e81f");
    let help = cmd.help_str();
    assert!(!help.is_empty());
    assert!(help.contains("No documentation available"), "{help}");
    assert_eq!(cmd.doc(), help);
}

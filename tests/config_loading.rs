mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::fs;

use tempfile::tempdir;

use taskforge::config::{load_config, resolve_agent, validate, ForgeConfig};

type TestResult = Result<(), Box<dyn Error>>;

const SAMPLE_CONFIG: &str = r#"
[backend]
program = "claude"

[scheduler]
max_concurrent = 2

[[agent]]
id = "reviewer"
name = "Code Reviewer"
role = "Review code and point out defects."
permissions = { read = true, write = false, delete = false }

[[agent]]
id = "builder"
name = "Feature Builder"
role = "Implement features end to end."
permissions = { read = true, write = true, delete = true }
"#;

#[test]
fn sample_config_parses_with_sections_and_agents() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("taskforge.toml");
    fs::write(&path, SAMPLE_CONFIG)?;

    let cfg = load_config(Some(path.as_path()))?;
    assert_eq!(cfg.backend.program, "claude");
    // Backend args keep their defaults when the file doesn't override them.
    assert_eq!(cfg.backend.args, vec!["--print", "--dangerously-skip-permissions"]);
    assert_eq!(cfg.scheduler.max_concurrent, 2);
    assert_eq!(cfg.agents.len(), 2);

    let reviewer = resolve_agent(&cfg, Some("reviewer"))?;
    assert_eq!(reviewer.name, "Code Reviewer");
    assert!(!reviewer.permissions.write);

    // Lookup works by display name too.
    let builder = resolve_agent(&cfg, Some("Feature Builder"))?;
    assert!(builder.permissions.delete);

    // No selector: the first configured profile wins.
    let default = resolve_agent(&cfg, None)?;
    assert_eq!(default.id, "reviewer");

    assert!(resolve_agent(&cfg, Some("nobody")).is_err());

    Ok(())
}

#[test]
fn defaults_apply_without_a_config_file() -> TestResult {
    init_tracing();

    let cfg = ForgeConfig::default();
    assert_eq!(cfg.backend.program, "claude");
    assert_eq!(cfg.scheduler.max_concurrent, 3);
    assert!(cfg.agents.is_empty());

    // Without configured agents, the built-in profile is used.
    let agent = resolve_agent(&cfg, None)?;
    assert_eq!(agent.id, "default");
    assert!(agent.permissions.read);
    assert!(agent.permissions.write);
    assert!(!agent.permissions.delete);

    Ok(())
}

#[test]
fn explicit_missing_config_file_is_an_error() {
    init_tracing();

    let err = load_config(Some(std::path::Path::new("/definitely/not/here.toml")));
    assert!(err.is_err());
}

#[test]
fn nonsense_configs_are_rejected() -> TestResult {
    init_tracing();

    let mut cfg = ForgeConfig::default();
    cfg.scheduler.max_concurrent = 0;
    assert!(validate(&cfg).is_err());

    let mut cfg = ForgeConfig::default();
    cfg.backend.program = "  ".to_string();
    assert!(validate(&cfg).is_err());

    let dir = tempdir()?;
    let path = dir.path().join("taskforge.toml");
    fs::write(
        &path,
        r#"
[[agent]]
id = "dup"
name = "One"
role = "r"

[[agent]]
id = "dup"
name = "Two"
role = "r"
"#,
    )?;
    assert!(load_config(Some(path.as_path())).is_err());

    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn mcp_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("milvus-mcp");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("gateway.toml");
    fs::write(
        &config_path,
        r#"[store]
backend = "memory"

[logging]
level = "warn"
"#,
    )
    .unwrap();
    (tmp, config_path)
}

fn run(config: &Path, args: &[&str]) -> std::process::Output {
    Command::new(mcp_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("MILVUS_URI")
        .env_remove("MILVUS_DB")
        .output()
        .expect("failed to run milvus-mcp")
}

#[test]
fn test_tools_lists_catalogue() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["tools"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("milvus-list-collections (read)"));
    assert!(stdout.contains("milvus-hybrid-search (read)"));
    assert!(stdout.contains("milvus-bulk-insert (write)"));
    assert!(stdout.contains("milvus-use-database (write)"));
}

#[test]
fn test_tools_json_has_all_operations() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["tools", "--json"]);
    assert!(output.status.success());

    let tools: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tools = tools.as_array().unwrap();
    assert_eq!(tools.len(), 23);
    assert!(tools
        .iter()
        .all(|t| t["parameters"]["type"] == "object"));
}

#[test]
fn test_call_list_collections_on_memory_backend() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["call", "milvus-list-collections"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "Collections in database:");
}

#[test]
fn test_call_create_collection_succeeds() {
    let (_tmp, config) = setup_test_env();
    let output = run(
        &config,
        &[
            "call",
            "milvus-create-collection",
            "--args",
            r#"{"collection_name": "docs", "schema": {"dimension": 4}}"#,
        ],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Collection 'docs' created successfully"));
}

#[test]
fn test_call_failure_exits_nonzero() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["call", "milvus-query", "--args", "{}"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("milvus-query failed: invalid argument 'collection_name'"));
}

#[test]
fn test_unknown_operation_exits_nonzero() {
    let (_tmp, config) = setup_test_env();
    let output = run(&config, &["call", "milvus-drop-everything"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown operation: milvus-drop-everything"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[milvus]\nuri = \"localhost:19530\"\n").unwrap();

    let output = run(&config, &["call", "milvus-list-collections"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("http:// or https://"));
}

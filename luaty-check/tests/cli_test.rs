//! Runs the built binary against Lua files on disk

use std::process::Command;

fn run(dir: &std::path::Path, args: &[&str]) -> (bool, serde_json::Value) {
    let output = Command::new(env!("CARGO_BIN_EXE_luaty-check"))
        .args(args)
        .arg("--format")
        .arg("json")
        .arg(dir)
        .output()
        .expect("binary runs");
    let json = serde_json::from_slice(&output.stdout).expect("json output");
    (output.status.success(), json)
}

#[test]
fn test_clean_project_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("point.lua"),
        "---@class Point\n---@field x number\nlocal Point = {}\nreturn Point\n",
    )
    .unwrap();

    let (ok, json) = run(dir.path(), &[]);
    assert!(ok);
    assert_eq!(json["files"], 1);
    assert_eq!(json["error_count"], 0);
}

#[test]
fn test_errors_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("animal.lua"),
        "---@class Animal\n---@field name string\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("dog.lua"),
        "---@class Dog : Animal\n---@field name number\n",
    )
    .unwrap();

    let (ok, json) = run(dir.path(), &[]);
    assert!(!ok);
    assert_eq!(json["files"], 2);
    assert_eq!(json["error_count"], 1);
    assert_eq!(json["diagnostics"][0]["code"], "illegal-override");
}

#[test]
fn test_types_dump() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("main.lua"),
        "local function f(a)\n  return a\nend\nf(1)\nf('s')\n",
    )
    .unwrap();

    let (ok, json) = run(dir.path(), &["--types"]);
    assert!(ok);
    let types = json["types"].as_array().unwrap();
    let param = types.iter().find(|t| t["name"] == "a").unwrap();
    assert_eq!(param["type"], "number|string");
}

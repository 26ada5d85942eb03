//! Integration tests for CLI wiring.
//!
//! These tests run the codeweave binary and check its JSON output and
//! exit codes.

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use std::path::PathBuf;
    use std::process::Command;
    use tempfile::TempDir;

    /// Get the path to the codeweave binary.
    fn get_codeweave_binary() -> PathBuf {
        // This test binary is in target/debug/deps/
        // The codeweave binary is in target/debug/
        let mut path = std::env::current_exe().unwrap();
        path.pop(); // deps
        path.pop(); // debug
        path.push("codeweave");
        path
    }

    fn repo() -> TempDir {
        let workspace_dir = TempDir::new().expect("Failed to create temp workspace");
        let src = workspace_dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join("main.rs"),
            "use std::fs;\nuse serde::Serialize;\n\nfn main() {\n    run();\n}\n\nfn run() {}\n",
        )
        .unwrap();
        std::fs::write(
            workspace_dir.path().join("Cargo.toml"),
            "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[dependencies]\nserde = \"1\"\n",
        )
        .unwrap();
        workspace_dir
    }

    #[test]
    fn test_cli_scan_prints_report() {
        let workspace_dir = repo();
        let output = Command::new(get_codeweave_binary())
            .args(["scan", "--root"])
            .arg(workspace_dir.path())
            .output()
            .expect("Failed to run codeweave");

        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        let json: Value = serde_json::from_slice(&output.stdout).expect("stdout is JSON");
        assert_eq!(json["status"], "ok");
        assert_eq!(json["data"]["files_seen"], 1);
        assert_eq!(json["data"]["new_files"], 1);
        assert!(workspace_dir.path().join(".codeweave/graph.db").exists());
    }

    #[test]
    fn test_cli_stats_after_scan() {
        let workspace_dir = repo();
        let scan = Command::new(get_codeweave_binary())
            .args(["scan", "--root"])
            .arg(workspace_dir.path())
            .output()
            .expect("Failed to run codeweave");
        assert!(scan.status.success());

        let output = Command::new(get_codeweave_binary())
            .args(["stats", "--root"])
            .arg(workspace_dir.path())
            .output()
            .expect("Failed to run codeweave");
        assert!(output.status.success());
        let json: Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(json["data"]["nodes_by_kind"]["file"], 1);
        assert_eq!(json["data"]["nodes_by_kind"]["workspace"], 1);
        assert!(json["data"]["edges_by_type"]["imports"].as_u64().unwrap() >= 2);
    }

    #[test]
    fn test_cli_unknown_center_exits_nonzero() {
        let workspace_dir = repo();
        let output = Command::new(get_codeweave_binary())
            .args(["neighborhood", "--memory", "--center", "file:missing.rs", "--root"])
            .arg(workspace_dir.path())
            .output()
            .expect("Failed to run codeweave");

        assert_eq!(output.status.code(), Some(1));
        let json: Value = serde_json::from_slice(&output.stderr).expect("stderr is JSON");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"]["kind"], "NodeNotFound");
    }

    #[test]
    fn test_cli_rejects_zero_depth() {
        let workspace_dir = repo();
        let output = Command::new(get_codeweave_binary())
            .args(["neighborhood", "--memory", "--center", "file:src/main.rs", "--depth", "0", "--root"])
            .arg(workspace_dir.path())
            .output()
            .expect("Failed to run codeweave");

        assert_eq!(output.status.code(), Some(1));
        let json: Value = serde_json::from_slice(&output.stderr).unwrap();
        assert_eq!(json["error"]["kind"], "InvalidArgument");
    }
}

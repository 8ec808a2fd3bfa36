//! Integration tests for the s3kv CLI
//!
//! These tests require a running S3-compatible server and an existing
//! bucket the credentials can write to.
//!
//! Run with:
//! ```bash
//! docker run -d --name minio -p 9000:9000 minio/minio server /data
//!
//! TEST_S3_ENDPOINT=http://localhost:9000 \
//! TEST_S3_ACCESS_KEY=minioadmin TEST_S3_SECRET_KEY=minioadmin \
//! TEST_S3_BUCKET=s3kv-test \
//! cargo test --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Run s3kv with an isolated config directory
fn run_s3kv(args: &[&str], config_dir: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_s3kv"))
        .args(args)
        .env("S3KV_CONFIG_DIR", config_dir)
        .env_remove("S3KV_PROFILE")
        .output()
        .expect("Failed to execute s3kv command")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Configured server, or `None` to skip
struct TestEnv {
    config_dir: TempDir,
    bucket: String,
    prefix: String,
}

impl TestEnv {
    fn setup(name: &str) -> Option<Self> {
        let endpoint = std::env::var("TEST_S3_ENDPOINT").ok()?;
        let access_key = std::env::var("TEST_S3_ACCESS_KEY").ok()?;
        let secret_key = std::env::var("TEST_S3_SECRET_KEY").ok()?;
        let bucket = std::env::var("TEST_S3_BUCKET").ok()?;
        let config_dir = tempfile::tempdir().ok()?;

        let output = run_s3kv(
            &[
                "profile",
                "set",
                "test",
                "--endpoint",
                &endpoint,
                "--access-key",
                &access_key,
                "--secret-key",
                &secret_key,
                "--path-style",
                "--bucket",
                &bucket,
                "--default",
            ],
            config_dir.path(),
        );
        if !output.status.success() {
            eprintln!(
                "Failed to set profile: {}",
                String::from_utf8_lossy(&output.stderr)
            );
            return None;
        }

        Some(Self {
            config_dir,
            bucket,
            prefix: format!("it-{name}-{}", unique_suffix()),
        })
    }

    fn run(&self, args: &[&str]) -> Output {
        run_s3kv(args, self.config_dir.path())
    }

    /// `s3://bucket/prefix/rel`
    fn url(&self, rel: &str) -> String {
        format!("s3://{}/{}/{rel}", self.bucket, self.prefix)
    }
}

impl Drop for TestEnv {
    fn drop(&mut self) {
        let _ = self.run(&["rm", "-r", &self.url("")]);
    }
}

fn unique_suffix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:x}", duration.as_nanos() % 0xFFFF_FFFF)
}

mod records {
    use super::*;

    #[test]
    fn test_put_get_update() {
        let Some(env) = TestEnv::setup("records") else {
            eprintln!("Skipping: TEST_S3_* not set");
            return;
        };
        let key = env.url("user.json");

        assert_success(&env.run(&["put", &key, r#"{"name":"ada","tags":["x"]}"#]));

        let output = env.run(&["get", &key, "--path", "name"]);
        assert_success(&output);
        assert_eq!(stdout(&output).trim(), "\"ada\"");

        assert_success(&env.run(&["update", &key, "address.city=Paris", "--delete", "tags"]));
        let output = env.run(&["get", &key]);
        assert_success(&output);
        let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(value["address"]["city"], "Paris");
        assert!(value.get("tags").is_none());
    }

    #[test]
    fn test_get_missing_record_exits_not_found() {
        let Some(env) = TestEnv::setup("missing") else {
            eprintln!("Skipping: TEST_S3_* not set");
            return;
        };
        let output = env.run(&["get", &env.url("nope.json")]);
        assert_eq!(output.status.code(), Some(5));
    }
}

mod transfers {
    use super::*;

    #[test]
    fn test_upload_download_tree() {
        let Some(env) = TestEnv::setup("tree") else {
            eprintln!("Skipping: TEST_S3_* not set");
            return;
        };
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("sub")).unwrap();
        std::fs::write(src.path().join("a.txt"), "alpha\n").unwrap();
        std::fs::write(src.path().join("sub/b.txt"), "beta\n").unwrap();

        let src_path = src.path().to_string_lossy().into_owned();
        assert_success(&env.run(&["cp", "-r", &src_path, &env.url("tree/")]));

        let output = env.run(&["ls", &env.url("tree/"), "--json"]);
        assert_success(&output);
        let listing: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(listing["total_objects"], 2);

        let dest = tempfile::tempdir().unwrap();
        let dest_path = dest.path().to_string_lossy().into_owned();
        assert_success(&env.run(&["cp", "-r", &env.url("tree/"), &dest_path]));
        assert_eq!(
            std::fs::read_to_string(dest.path().join("sub/b.txt")).unwrap(),
            "beta\n"
        );
    }

    #[test]
    fn test_pipe_compressed_then_cat_and_grep() {
        let Some(env) = TestEnv::setup("gz") else {
            eprintln!("Skipping: TEST_S3_* not set");
            return;
        };
        let key = env.url("logs/app.log.gz");

        let mut child = Command::new(env!("CARGO_BIN_EXE_s3kv"))
            .args(["pipe", "--compress", &key])
            .env("S3KV_CONFIG_DIR", env.config_dir.path())
            .stdin(std::process::Stdio::piped())
            .spawn()
            .unwrap();
        {
            use std::io::Write;
            let mut stdin = child.stdin.take().unwrap();
            stdin.write_all(b"ok\nERROR disk\nok\n").unwrap();
        }
        assert!(child.wait().unwrap().success());

        let output = env.run(&["cat", &key]);
        assert_success(&output);
        assert_eq!(stdout(&output), "ok\nERROR disk\nok\n");

        let output = env.run(&["grep", "ERROR", &env.url("logs/")]);
        assert_success(&output);
        assert!(stdout(&output).contains("app.log.gz:2:ERROR disk"));
    }

    #[test]
    fn test_mv_removes_source() {
        let Some(env) = TestEnv::setup("mv") else {
            eprintln!("Skipping: TEST_S3_* not set");
            return;
        };
        assert_success(&env.run(&["put", &env.url("from.json"), "{}"]));
        assert_success(&env.run(&["mv", &env.url("from.json"), &env.url("to.json")]));

        assert_eq!(env.run(&["head", &env.url("from.json")]).status.code(), Some(5));
        assert_success(&env.run(&["head", &env.url("to.json")]));
    }
}

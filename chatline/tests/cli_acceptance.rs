use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        fs::create_dir_all(&home).expect("failed to create HOME");
        fs::create_dir_all(&xdg_config).expect("failed to create XDG_CONFIG_HOME");
        fs::create_dir_all(&xdg_state).expect("failed to create XDG_STATE_HOME");

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_config,
            xdg_state,
        }
    }

    fn write_config(&self, contents: &str) {
        let dir = self.xdg_config.join("chatline");
        fs::create_dir_all(&dir).expect("failed to create config dir");
        fs::write(dir.join("config.toml"), contents).expect("failed to write config");
    }
}

fn fixture(name: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../chatline-core/tests/fixtures/ndjson")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    let bin_path = PathBuf::from(assert_cmd::cargo::cargo_bin!("chatline"));

    Command::new(bin_path)
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("failed to execute chatline: {e}"))
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let rendered_args = args
        .iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "chatline {rendered_args} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        output.status, stdout, stderr
    );
}

#[test]
fn replay_streams_tool_call_capture() {
    let env = CliTestEnv::new();
    let file = fixture("tool-call.ndjson");
    let args = ["replay", file.as_str(), "--chunk-size", "7"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    // Text item 0 resumes on its own line after the tool call interrupts it
    assert!(
        stdout.contains("assistant> Some\n"),
        "expected streamed text in stdout, got:\n{stdout}"
    );
    assert!(stdout.contains(" tool output for testing."));
    assert!(stdout.contains("[tool: Supertool] This is an example tool response."));
    assert!(stdout.contains("[image: N/A]"));
    assert!(stdout.contains("Example Document"));
    assert!(!stdout.contains("iVBORw0KGgo"));

    assert!(
        env.xdg_state.join("chatline").exists(),
        "log directory should be created under XDG_STATE_HOME"
    );
}

#[test]
fn replay_json_outputs_exchange() {
    let env = CliTestEnv::new();
    let file = fixture("signals.ndjson");
    let args = ["replay", file.as_str(), "--json"];

    let output = run_bin(&env, &args);
    assert_success(&args, &output);

    let exchange: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let items = exchange["items"].as_array().expect("items array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["hidden"], true);
    assert_eq!(items[1]["content"], "Answer: 42");
    assert!(items.iter().all(|i| i["active"] == false));
}

#[test]
fn replay_fails_on_unknown_record_class() {
    let env = CliTestEnv::new();
    let file = fixture("unknown-class.ndjson");

    let output = run_bin(&env, &["replay", file.as_str(), "--json"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("unknown record class: ToolProgressSignal"),
        "expected decode error in stderr, got:\n{stderr}"
    );

    // The partial exchange is still printed, ending in the error item
    let exchange: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let items = exchange["items"].as_array().expect("items array");
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["id"], "error");
}

#[test]
fn config_reports_xdg_paths_and_overrides() {
    let env = CliTestEnv::new();
    env.write_config("[server]\nbase_url = \"http://chat.internal:9000\"\n");

    let output = run_bin(&env, &["config"]);
    assert_success(&["config"], &output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&env.xdg_config.join("chatline/config.toml").display().to_string()));
    assert!(stdout.contains("http://chat.internal:9000/stream"));
    assert!(!stdout.contains("not found"));
}

#[test]
fn send_to_unreachable_server_reports_failure() {
    let env = CliTestEnv::new();
    let args = ["send", "hello", "--server", "http://127.0.0.1:9"];

    let output = run_bin(&env, &args);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error: Failed to send message."),
        "expected user-facing error in stderr, got:\n{stderr}"
    );
}

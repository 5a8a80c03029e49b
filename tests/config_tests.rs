//! Tests for loading mesh files.

use std::io::Write;
use std::sync::{Mutex, OnceLock};

use dumplings::config::MeshConfig;
use dumplings::error::MeshError;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 6] = [
    "API_KEY",
    "DUMPLINGS_API_KEY",
    "DUMPLINGS_ENDPOINT",
    "DUMPLINGS_MODEL",
    "DUMPLINGS_MAX_ITERATIONS",
    "DUMPLINGS_MAX_DELEGATION_DEPTH",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_config_env() -> EnvGuard {
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

fn mesh_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write mesh file");
    file
}

const MESH: &str = r#"
[defaults]
endpoint = "http://localhost:1234/v1/chat/completions"
model = "qwen3-8b"
api_key_env = "MESH_TEST_KEY"

[limits]
max_iterations = 6

[[agents]]
uuid = "8841cd45eef54217bc8122cafebe5fd6"
name = "time_agent"
prompt = "You tell the time."

[[agents]]
name = "scheduling_agent"
prompt = "You plan meetings."
native_tools = true
stream = false

[[mcp_servers]]
name = "files"
command = "mcp-files"
args = ["--root", "."]
allowed_agents = ["scheduling_agent"]
"#;

#[test]
fn load_reads_agents_servers_and_limits() {
    let _lock = env_lock_guard();
    let _env = clear_config_env();
    let file = mesh_file(MESH);

    let config = MeshConfig::load(file.path()).expect("mesh file should load");
    assert_eq!(config.limits.max_iterations, 6);
    assert_eq!(config.limits.max_delegation_depth, 8);
    assert_eq!(config.mcp_servers[0].args, vec!["--root", "."]);
    assert_eq!(config.mcp_servers[0].max_idle_secs, 300);

    let agents = config.resolve_agents().expect("agents should resolve");
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0].uuid, "8841cd45eef54217bc8122cafebe5fd6");
    assert_eq!(agents[0].model, "qwen3-8b");
    assert!(agents[0].stream);
    assert!(!agents[0].native_tools);
    assert_eq!(agents[1].uuid.len(), 32);
    assert!(agents[1].native_tools);
    assert!(!agents[1].stream);
}

#[test]
fn environment_overrides_file_values() {
    let _lock = env_lock_guard();
    let _env = clear_config_env();
    std::env::set_var("DUMPLINGS_MODEL", "override-model");
    std::env::set_var("DUMPLINGS_MAX_ITERATIONS", "2");
    let file = mesh_file(MESH);

    let config = MeshConfig::load(file.path()).expect("mesh file should load");
    assert_eq!(config.defaults.model.as_deref(), Some("override-model"));
    assert_eq!(config.limits.max_iterations, 2);
}

#[test]
fn missing_file_is_an_io_error() {
    let err = MeshConfig::load("/definitely/not/here/mesh.toml").expect_err("should fail");
    assert!(matches!(err, MeshError::Io(_)));
}

#[test]
fn duplicate_agent_names_are_rejected() {
    let err = MeshConfig::from_toml_str(
        r#"
[[agents]]
name = "a"
[[agents]]
name = "a"
"#,
    )
    .expect_err("duplicate names should fail");
    assert!(matches!(err, MeshError::Configuration(m) if m.contains("declared twice")));
}

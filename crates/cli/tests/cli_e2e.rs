//! End-to-end tests for the `chronicle` binary in offline mode.
//!
//! Each test gets its own HOME, config and state file so runs never touch
//! the developer's `~/.chronicle`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const CONFIG: &str = r#"
[memory]
recent_history_threshold = 40
chunk_target_size = 20
max_live_chunks = 2
deep_memory_max_tokens = 30
"#;

/// 40 characters, 10 heuristic tokens.
const LINE: &str = "The caravan crossed the dunes at dawn!!!";

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), CONFIG).unwrap();
        Self { dir }
    }

    fn state(&self) -> PathBuf {
        self.dir.path().join("state.json")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_chronicle"))
            .args(args)
            .arg("--offline")
            .arg("--state")
            .arg(self.state())
            .arg("--config")
            .arg(self.dir.path().join("config.toml"))
            .env("HOME", self.dir.path())
            .env_remove("CHRONICLE_STATE")
            .env_remove("CHRONICLE_SUMMARIZER")
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }

    fn ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "chronicle {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).unwrap()
    }

    fn state_json(&self) -> serde_json::Value {
        read_json(&self.state())
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn default_config_is_printed() {
    let sandbox = Sandbox::new();
    let out = sandbox.ok(&["config", "default"]);
    assert!(out.contains("recent_history_threshold = 800"));
    assert!(out.contains("[providers]"));
}

#[test]
fn append_creates_state_file() {
    let sandbox = Sandbox::new();
    let out = sandbox.ok(&["append", "I draw my sword.", "--author", "player"]);
    assert!(out.contains("entry_created #0"));

    let state = sandbox.state_json();
    assert_eq!(state["version"], 1);
    let recent = state["memory"]["recent_history"].as_array().unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0]["author"], "player");
    assert_eq!(recent[0]["text"], "I draw my sword.");
}

#[test]
fn replay_compresses_into_all_three_tiers() {
    let sandbox = Sandbox::new();
    let transcript: String = (0..12)
        .map(|i| {
            let author = if i % 2 == 0 { "player" } else { "narrator" };
            format!("{author}: {LINE}\n")
        })
        .collect();
    let path = sandbox.write("story.txt", &transcript);

    let out = sandbox.ok(&["replay", path.to_str().unwrap()]);
    assert!(out.contains("Replayed 12 entries"));

    let memory = &sandbox.state_json()["memory"];
    let chunks = memory["chunks"].as_array().unwrap();
    assert!(!chunks.is_empty() && chunks.len() <= 2);
    assert!(memory["deep_memory"]["chunks_merged"].as_u64().unwrap() >= 1);

    // Recent history continues right after the last chunk.
    let last_end = chunks.last().unwrap()["end_ordinal"].as_u64().unwrap();
    let recent = memory["recent_history"].as_array().unwrap();
    assert_eq!(recent[0]["ordinal"].as_u64().unwrap(), last_end + 1);
    assert_eq!(recent.last().unwrap()["ordinal"], 11);

    let context = sandbox.ok(&["context", "--budget", "1000"]);
    assert!(context.starts_with("# Ancient History (Major Events):"));
    assert!(context.contains("# Past Events:"));
    assert!(context.contains("# Recent Story:"));

    let stats = sandbox.ok(&["stats"]);
    assert!(stats.contains("Entries recorded: 12"));
}

#[test]
fn undo_and_edit_round_trip() {
    let sandbox = Sandbox::new();
    sandbox.ok(&["append", "The door is locked."]);
    sandbox.ok(&["append", "I kick it.", "-a", "player"]);

    let out = sandbox.ok(&["undo"]);
    assert!(out.contains("entry_removed #1"));

    let out = sandbox.ok(&["edit", "entry", "0", "The door is barred."]);
    assert!(out.contains("entry_updated #0"));

    let recent = sandbox.state_json()["memory"]["recent_history"].clone();
    assert_eq!(recent.as_array().unwrap().len(), 1);
    assert_eq!(recent[0]["text"], "The door is barred.");
}

#[test]
fn undo_on_empty_session_fails() {
    let sandbox = Sandbox::new();
    let output = sandbox.run(&["undo"]);
    assert!(!output.status.success());
    assert!(!sandbox.state().exists());
}

#[test]
fn context_json_respects_budget() {
    let sandbox = Sandbox::new();
    for _ in 0..3 {
        sandbox.ok(&["append", LINE]);
    }
    let out = sandbox.ok(&["context", "--budget", "25", "--json"]);
    let ctx: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert!(ctx["metadata"]["total_tokens"].as_u64().unwrap() <= 25);
    assert_eq!(ctx["sections"].as_array().unwrap().len(), 2);
}


use futures::{Stream, StreamExt};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use self::scripted::{ScriptedProvider, ScriptedStream};
use super::*;

const AGENT: &str = "alice";

fn setup(config: &str) -> TempDir {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join(AGENT);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.json"), config).unwrap();
    root
}

fn default_setup() -> TempDir {
    let root = setup(
        r#"{
            "model": "chat-model",
            "emotionModel": "score-model",
            "agentDescription": {"type": "text", "content": "Alice runs a tea shop."},
            "userDescription": {"type": "file", "path": "user.md"},
            "historyLimit": 2
        }"#,
    );
    fs::write(root.path().join(AGENT).join("user.md"), "\n  Bob, a regular.  \n").unwrap();
    root
}

fn history_path(root: &Path) -> PathBuf {
    root.join(AGENT).join("history.json")
}

fn open(root: &Path, provider: &Arc<ScriptedProvider>) -> Agent {
    let provider: Arc<dyn LLMProvider> = provider.clone();
    Agent::load_with(root, AGENT, move |_| provider).unwrap()
}

fn write_history(root: &Path, turns: Vec<Turn>) {
    TranscriptStore::new(history_path(root))
        .save(&Transcript::from_turns(turns))
        .unwrap();
}

/// Poll a reply stream to the end.
async fn drain(stream: impl Stream<Item = Result<String>>) -> (Vec<String>, Vec<AgentError>) {
    let mut stream = Box::pin(stream);
    let mut fragments = Vec::new();
    let mut errors = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => fragments.push(fragment),
            Err(e) => errors.push(e),
        }
    }
    (fragments, errors)
}

#[test]
fn test_missing_config_is_not_found() {
    let root = tempfile::tempdir().unwrap();
    let err = Agent::new(root.path(), "ghost").err().unwrap();

    match err {
        AgentError::AgentNotFound { name, path } => {
            assert_eq!(name, "ghost");
            assert_eq!(path, root.path().join("ghost").join("config.json"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_path_like_names_rejected() {
    let root = default_setup();
    for name in ["", "..", "alice/../alice", "."] {
        assert!(matches!(
            Agent::new(root.path(), name),
            Err(AgentError::AgentNotFound { .. })
        ));
    }
}

#[test]
fn test_missing_persona_file_is_fatal() {
    let root = setup(r#"{"model": "m", "agentDescription": {"type": "file", "path": "gone.md"}}"#);
    let err = Agent::new(root.path(), AGENT).err().unwrap();
    assert!(matches!(err, AgentError::DescriptionNotFound(_)));
}

#[test]
fn test_invalid_config_is_fatal() {
    let root = setup(r#"{"model": "m", "historyLimit": "lots"}"#);
    let err = Agent::new(root.path(), AGENT).err().unwrap();
    assert!(matches!(err, AgentError::Config { .. }));
}

#[test]
fn test_new_agent_writes_empty_history() {
    let root = default_setup();
    let agent = Agent::new(root.path(), AGENT).unwrap();

    assert!(agent.history().is_empty());
    assert_eq!(agent.emotion(), DEFAULT_EMOTION);
    assert_eq!(agent.history_path(), history_path(root.path()));
    let content = fs::read_to_string(history_path(root.path())).unwrap();
    assert_eq!(content, "{\n  \"version\": \"v1\",\n  \"history\": []\n}");
}

#[test]
fn test_corrupt_history_degrades_to_empty() {
    let root = default_setup();
    fs::write(history_path(root.path()), "{\"version\": \"v1\", \"history\": [{").unwrap();

    let agent = Agent::new(root.path(), AGENT).unwrap();
    assert!(agent.history().is_empty());
}

#[test]
fn test_v0_history_is_upgraded_on_open() {
    let root = default_setup();
    fs::write(
        history_path(root.path()),
        r#"[
            {"role": "user", "content": "hello"},
            {"role": "assistant", "content": "welcome!"},
            {"role": "user", "content": "dangling"}
        ]"#,
    )
    .unwrap();

    let agent = Agent::new(root.path(), AGENT).unwrap();
    assert_eq!(agent.history().turns(), &[Turn::new("hello", "welcome!", 50)]);

    let content = fs::read_to_string(history_path(root.path())).unwrap();
    assert!(content.contains("\"version\": \"v1\""));
    assert!(!content.contains("dangling"));
}

#[tokio::test]
async fn test_first_chat_commits_with_default_emotion() {
    let root = default_setup();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["Hel", "lo ", "there!"]);
    let mut agent = open(root.path(), &provider);

    let (fragments, errors) = drain(agent.chat("hi")).await;

    assert!(errors.is_empty());
    assert_eq!(fragments.concat(), "Hello there!");
    assert_eq!(agent.history().turns(), &[Turn::new("hi", "Hello there!", 50)]);
    assert_eq!(provider.completion_calls(), 0);

    let reopened = Agent::new(root.path(), AGENT).unwrap();
    assert_eq!(reopened.history(), agent.history());
}

#[tokio::test]
async fn test_request_composition() {
    let root = default_setup();
    write_history(
        root.path(),
        vec![
            Turn::new("u1", "a1", 10),
            Turn::new("u2", "a2", 20),
            Turn::new("u3", "a3", -35),
        ],
    );
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["ok"]);
    provider.push_completion(Ok("-30".into()));
    let mut agent = open(root.path(), &provider);

    drain(agent.chat("u4")).await;

    let request = provider.last_stream_request();
    assert_eq!(request.model, "chat-model");
    assert_eq!(request.params, agent.config().model_params);

    // historyLimit = 2: system + two windowed turns + new input
    let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents.len(), 6);
    assert_eq!(&contents[1..], &["u2", "a2", "u3", "a3", "u4"]);

    let system = &request.messages[0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("Alice runs a tea shop."));
    assert!(system.content.contains("Bob, a regular."));
    assert!(system.content.contains("emotion value is -35."));
}

#[tokio::test]
async fn test_hand_edited_emotion_is_clamped_in_prompt() {
    let root = default_setup();
    fs::write(
        history_path(root.path()),
        r#"{"version": "v1", "history": [{"user_message": "u1", "assistant_message": "a1", "emotion": 9000}]}"#,
    )
    .unwrap();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["ok"]);
    provider.push_completion(Ok("5".into()));
    let mut agent = open(root.path(), &provider);
    assert_eq!(agent.emotion(), 100);

    drain(agent.chat("u2")).await;

    let system = &provider.last_stream_request().messages[0].content;
    assert!(system.contains("emotion value is 100."));
    assert!(!system.contains("9000"));
}

#[tokio::test]
async fn test_emotion_feeds_next_turn() {
    let root = default_setup();
    write_history(root.path(), vec![Turn::new("u1", "a1", 40)]);
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["That's sad."]);
    provider.push_completion(Ok("<think>sympathy</think>-15".into()));
    provider.push_reply(vec!["Cheer up!"]);
    provider.push_completion(Ok("5".into()));
    let mut agent = open(root.path(), &provider);

    drain(agent.chat("my cat is sick")).await;
    assert_eq!(agent.emotion(), -15);

    // The scorer sees the pre-call history plus the new exchange
    let scoring = provider.completion_requests.lock().unwrap()[0].clone();
    assert_eq!(scoring.model, "score-model");
    assert_eq!(scoring.params.temperature, 0.0);
    assert_eq!(scoring.messages.len(), 4);
    assert_eq!(scoring.messages[2].content, "40");

    drain(agent.chat("thanks")).await;
    let request = provider.last_stream_request();
    assert!(request.messages[0].content.contains("emotion value is -15."));
    assert_eq!(agent.emotion(), 5);
}

#[tokio::test]
async fn test_emotion_is_clamped_and_falls_back() {
    let root = default_setup();
    write_history(root.path(), vec![Turn::new("u1", "a1", -70)]);
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["wow"]);
    provider.push_completion(Ok("9000".into()));
    provider.push_reply(vec!["hm"]);
    provider.push_completion(Err(AgentError::backend("scripted", "timeout")));
    let mut agent = open(root.path(), &provider);

    drain(agent.chat("a")).await;
    assert_eq!(agent.emotion(), 100);

    let (_, errors) = drain(agent.chat("b")).await;
    assert!(errors.is_empty());
    assert_eq!(agent.history().len(), 3);
    assert_eq!(agent.emotion(), 100);
}

#[tokio::test]
async fn test_think_segments_are_streamed_but_not_stored() {
    let root = default_setup();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["<think>", "secret plan", "</think>", "\n\nvisible"]);
    let mut agent = open(root.path(), &provider);

    let (fragments, _) = drain(agent.chat("hi")).await;

    assert_eq!(fragments.concat(), "<think>secret plan</think>\n\nvisible");
    assert_eq!(agent.history().turns()[0].assistant_message, "visible");
}

#[tokio::test]
async fn test_empty_or_unterminated_reply_is_discarded() {
    let root = default_setup();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["<think>", "never closed"]);
    provider.push_reply(vec!["   ", "\n"]);
    provider.push_reply(vec![]);
    let mut agent = open(root.path(), &provider);
    let before = fs::read(history_path(root.path())).unwrap();

    for _ in 0..3 {
        let (_, errors) = drain(agent.chat("hi")).await;
        assert!(errors.is_empty());
    }

    assert!(agent.history().is_empty());
    assert_eq!(fs::read(history_path(root.path())).unwrap(), before);
}

#[tokio::test]
async fn test_reply_ending_inside_reopened_think_is_discarded() {
    let root = default_setup();
    write_history(root.path(), vec![Turn::new("u1", "a1", 12)]);
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["<think>a</think>", "Sure.", "<think>", "hmm"]);
    let mut agent = open(root.path(), &provider);
    let before = fs::read(history_path(root.path())).unwrap();

    let (fragments, errors) = drain(agent.chat("hi")).await;

    assert!(errors.is_empty());
    assert_eq!(fragments.concat(), "<think>a</think>Sure.<think>hmm");
    assert_eq!(agent.history().turns(), &[Turn::new("u1", "a1", 12)]);
    assert_eq!(provider.completion_calls(), 0);
    assert_eq!(fs::read(history_path(root.path())).unwrap(), before);
}

#[tokio::test]
async fn test_stream_is_lazy() {
    let root = default_setup();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["unused"]);
    let mut agent = open(root.path(), &provider);

    drop(agent.chat("hi"));

    assert_eq!(provider.stream_calls(), 0);
    assert!(agent.history().is_empty());
}

#[tokio::test]
async fn test_abandoned_stream_leaves_file_untouched() {
    let root = default_setup();
    write_history(root.path(), vec![Turn::new("u1", "a1", 12)]);
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["par", "tial ", "reply"]);
    let mut agent = open(root.path(), &provider);
    let before = fs::read(history_path(root.path())).unwrap();

    {
        let mut stream = Box::pin(agent.chat("hi"));
        assert_eq!(stream.next().await.unwrap().unwrap(), "par");
    }

    assert_eq!(provider.stream_calls(), 1);
    assert_eq!(provider.completion_calls(), 0);
    assert_eq!(agent.history().len(), 1);
    assert_eq!(fs::read(history_path(root.path())).unwrap(), before);
}

#[tokio::test]
async fn test_backend_errors_propagate_and_change_nothing() {
    let root = default_setup();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_stream(ScriptedStream::Refused("HTTP 401"));
    provider.push_stream(ScriptedStream::Broken(vec!["Hal", "f"], "connection reset"));
    let mut agent = open(root.path(), &provider);

    let (fragments, errors) = drain(agent.chat("hi")).await;
    assert!(fragments.is_empty());
    assert!(matches!(errors.as_slice(), [AgentError::Backend { .. }]));

    let (fragments, errors) = drain(agent.chat("hi")).await;
    assert_eq!(fragments, vec!["Hal", "f"]);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].to_string().contains("connection reset"));

    assert!(agent.history().is_empty());
}

#[tokio::test]
async fn test_regenerate_on_empty_history_does_nothing() {
    let root = default_setup();
    let provider = Arc::new(ScriptedProvider::new());
    let mut agent = open(root.path(), &provider);

    let (fragments, errors) = drain(agent.regenerate()).await;

    assert!(fragments.is_empty() && errors.is_empty());
    assert_eq!(provider.stream_calls(), 0);
    assert!(agent.history().is_empty());
}

#[tokio::test]
async fn test_regenerate_single_turn() {
    let root = default_setup();
    write_history(root.path(), vec![Turn::new("tell me a joke", "no.", -80)]);
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["Why did the tea ", "steep? ..."]);
    let mut agent = open(root.path(), &provider);

    drain(agent.regenerate()).await;

    let request = provider.last_stream_request();
    assert_eq!(request.messages.len(), 2);
    assert_eq!(request.messages[1], Message::user("tell me a joke"));
    assert!(request.messages[0].content.contains("emotion value is 50."));

    // No prior history, so the fresh emotion is the default without a scorer call
    assert_eq!(
        agent.history().turns(),
        &[Turn::new("tell me a joke", "Why did the tea steep? ...", 50)]
    );
    assert_eq!(provider.completion_calls(), 0);
}

#[tokio::test]
async fn test_regenerate_replaces_last_turn_with_fresh_emotion() {
    let root = default_setup();
    write_history(
        root.path(),
        vec![Turn::new("u1", "a1", 30), Turn::new("u2", "bad answer", 90)],
    );
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["better answer"]);
    provider.push_completion(Ok("-10".into()));
    let mut agent = open(root.path(), &provider);

    drain(agent.regenerate()).await;

    let request = provider.last_stream_request();
    let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(&contents[1..], &["u1", "a1", "u2"]);
    assert!(contents[0].contains("emotion value is 30."));

    assert_eq!(
        agent.history().turns(),
        &[Turn::new("u1", "a1", 30), Turn::new("u2", "better answer", -10)]
    );
    let reopened = Agent::new(root.path(), AGENT).unwrap();
    assert_eq!(reopened.history(), agent.history());
}

#[tokio::test]
async fn test_failed_regenerate_keeps_old_turn() {
    let root = default_setup();
    write_history(root.path(), vec![Turn::new("u1", "a1", 30)]);
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_stream(ScriptedStream::Broken(vec!["new"], "eof"));
    provider.push_reply(vec!["<think>only thinking</think>"]);
    let mut agent = open(root.path(), &provider);

    drain(agent.regenerate()).await;
    drain(agent.regenerate()).await;

    assert_eq!(agent.history().turns(), &[Turn::new("u1", "a1", 30)]);
}

#[tokio::test]
async fn test_save_is_idempotent() {
    let root = default_setup();
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_reply(vec!["こんにちは 🍵"]);
    let mut agent = open(root.path(), &provider);
    drain(agent.chat("hi")).await;

    let after_commit = fs::read(history_path(root.path())).unwrap();
    agent.save().unwrap();
    agent.save().unwrap();

    assert_eq!(fs::read(history_path(root.path())).unwrap(), after_commit);
    assert!(String::from_utf8(after_commit).unwrap().contains("こんにちは 🍵"));
}

#[test]
fn test_list_agents() {
    let root = tempfile::tempdir().unwrap();
    assert!(list_agents(&root.path().join("missing")).unwrap().is_empty());

    for name in ["zed", "alice", "mika"] {
        fs::create_dir(root.path().join(name)).unwrap();
    }
    fs::write(root.path().join("notes.txt"), "not an agent").unwrap();

    assert_eq!(list_agents(root.path()).unwrap(), vec!["alice", "mika", "zed"]);

    let file_root = root.path().join("notes.txt");
    assert!(list_agents(&file_root).is_err());
}

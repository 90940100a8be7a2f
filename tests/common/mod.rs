use async_trait::async_trait;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, watch, Notify};

use mentesa::auth::IdentityProvider;
use mentesa::chat::{ChatDependencies, ChatOrchestrator, ChatSettings};
use mentesa::error::{MenteSaError, Result};
use mentesa::policy::KeywordPolicy;
use mentesa::providers::{Message, ModelClient, TextStream};
use mentesa::storage::{
    ConversationMetadata, ConversationStore, ConversationSummary, MessageRecord, NewMessage,
    SqliteStorage, StoreChange,
};

#[allow(dead_code)]
pub fn create_temp_storage() -> (SqliteStorage, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("mentesa.db");
    let storage =
        SqliteStorage::new_with_path(db_path).expect("failed to create sqlite storage with path");
    (storage, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// What the scripted model does on one call
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream these chunks
    Reply(Vec<String>),
    /// Fail when the stream is opened
    Fail(String),
    /// Yield the chunks, then an error
    FailMidStream(Vec<String>, String),
    /// Never answer
    Hang,
}

/// Model double that plays back scripted replies and records its inputs
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Script>>,
    calls: AtomicUsize,
    histories: Mutex<Vec<Vec<Message>>>,
    system_prompts: Mutex<Vec<String>>,
    gate: Option<Arc<Notify>>,
}

#[allow(dead_code)]
impl ScriptedModel {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    /// Every call waits for `gate` to be notified before answering
    pub fn gated(scripts: Vec<Script>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(scripts)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_history(&self) -> Vec<Message> {
        self.histories
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_system_prompt(&self) -> Option<String> {
        self.system_prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn stream_reply(
        &self,
        system_prompt: &str,
        history: &[Message],
        prompt: &str,
    ) -> Result<TextStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().unwrap().push(history.to_vec());
        self.system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.to_string());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::Reply(vec![format!("eco: {}", prompt)]));

        match script {
            Script::Reply(chunks) => {
                let items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Script::Fail(message) => Err(MenteSaError::Provider(message).into()),
            Script::FailMidStream(chunks, message) => {
                let mut items: Vec<Result<String>> = chunks.into_iter().map(Ok).collect();
                items.push(Err(MenteSaError::Provider(message).into()));
                Ok(Box::pin(futures::stream::iter(items)))
            }
            Script::Hang => Ok(Box::pin(futures::stream::pending::<Result<String>>())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Identity whose user can be switched by the test
#[derive(Default)]
pub struct SwitchableIdentity {
    user: Mutex<Option<String>>,
    name: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl SwitchableIdentity {
    pub fn signed_in(uid: &str) -> Self {
        let identity = Self::default();
        identity.set_user(Some(uid));
        identity
    }

    pub fn set_user(&self, uid: Option<&str>) {
        *self.user.lock().unwrap() = uid.map(str::to_string);
    }

    pub fn set_display_name(&self, name: Option<&str>) {
        *self.name.lock().unwrap() = name.map(str::to_string);
    }
}

impl IdentityProvider for SwitchableIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user.lock().unwrap().clone()
    }

    fn display_name(&self) -> Option<String> {
        self.name.lock().unwrap().clone()
    }
}

/// Store wrapper whose writes or reads can be made to fail
pub struct FlakyStore {
    inner: SqliteStorage,
    pub fail_inserts: AtomicBool,
    pub fail_reads: AtomicBool,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new(inner: SqliteStorage) -> Self {
        Self {
            inner,
            fail_inserts: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(MenteSaError::Storage("disk unavailable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn insert_message(&self, message: NewMessage) -> Result<i64> {
        Self::check(&self.fail_inserts)?;
        self.inner.insert_message(message).await
    }

    async fn messages_for_conversation(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Vec<MessageRecord>> {
        Self::check(&self.fail_reads)?;
        self.inner
            .messages_for_conversation(user_id, conversation_id)
            .await
    }

    async fn recent_messages(
        &self,
        user_id: &str,
        conversation_id: i64,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        Self::check(&self.fail_reads)?;
        self.inner
            .recent_messages(user_id, conversation_id, limit)
            .await
    }

    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        Self::check(&self.fail_reads)?;
        self.inner.conversations_for_user(user_id).await
    }

    async fn first_user_message_text(
        &self,
        user_id: &str,
        conversation_id: i64,
    ) -> Result<Option<String>> {
        Self::check(&self.fail_reads)?;
        self.inner
            .first_user_message_text(user_id, conversation_id)
            .await
    }

    async fn clear_conversation(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        Self::check(&self.fail_inserts)?;
        self.inner.clear_conversation(user_id, conversation_id).await
    }

    async fn upsert_metadata(&self, metadata: ConversationMetadata) -> Result<()> {
        Self::check(&self.fail_inserts)?;
        self.inner.upsert_metadata(metadata).await
    }

    async fn custom_title(&self, user_id: &str, conversation_id: i64) -> Result<Option<String>> {
        Self::check(&self.fail_reads)?;
        self.inner.custom_title(user_id, conversation_id).await
    }

    async fn metadata_for_user(&self, user_id: &str) -> Result<Vec<ConversationMetadata>> {
        Self::check(&self.fail_reads)?;
        self.inner.metadata_for_user(user_id).await
    }

    async fn delete_metadata(&self, user_id: &str, conversation_id: i64) -> Result<()> {
        Self::check(&self.fail_inserts)?;
        self.inner.delete_metadata(user_id, conversation_id).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

#[allow(dead_code)]
pub fn settings_with_window(history_window: usize) -> ChatSettings {
    ChatSettings {
        history_window,
        ..ChatSettings::default()
    }
}

#[allow(dead_code)]
pub async fn orchestrator_with(
    store: Arc<dyn ConversationStore>,
    model: Arc<ScriptedModel>,
    identity: Arc<SwitchableIdentity>,
    settings: ChatSettings,
) -> ChatOrchestrator {
    ChatOrchestrator::new(
        ChatDependencies {
            store,
            identity,
            model,
            policy: Arc::new(KeywordPolicy::default()),
        },
        settings,
    )
    .await
}

/// Waits until the watched value satisfies `predicate`
#[allow(dead_code)]
pub async fn wait_for<T, F>(rx: &mut watch::Receiver<T>, predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for watched value")
        .expect("watch sender dropped")
        .clone()
}

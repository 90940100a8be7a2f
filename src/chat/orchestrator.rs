//! Conversation orchestrator
//!
//! [`ChatOrchestrator`] owns the active conversation id, the visible message
//! list, the drawer's conversation list, and the loading/error status. All
//! of it is published through `watch` channels. Mutations are serialized by
//! an async mutex; the model call itself runs outside the lock so the user
//! can keep browsing while a reply streams in.
//!
//! Message and list views are kept fresh by two [`Subscription`]s that
//! re-query the store whenever it reports a relevant [`StoreChange`].

use crate::auth::IdentityProvider;
use crate::chat::state::{
    ChatSettings, ChatStatus, SendOutcome, BUSY_NOTICE, EMPTY_REPLY_MESSAGE, REPLY_ERROR_PREFIX,
};
use crate::chat::subscription::Subscription;
use crate::chat::title;
use crate::error::{MenteSaError, Result};
use crate::models::{
    is_new_conversation, ChatMessage, ConversationDisplayItem, ConversationType, Sender,
    NEW_CONVERSATION_ID, NEW_CONVERSATION_TITLE,
};
use crate::policy::{ContentPolicy, PolicyVerdict};
use crate::prompts::build_system_prompt;
use crate::providers::{Message, ModelClient};
use crate::storage::{ConversationMetadata, ConversationStore, NewMessage, StoreChange};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};

/// Collaborators injected into the orchestrator
#[derive(Clone)]
pub struct ChatDependencies {
    /// Conversation persistence
    pub store: Arc<dyn ConversationStore>,
    /// Source of the user id that scopes storage
    pub identity: Arc<dyn IdentityProvider>,
    /// Remote model
    pub model: Arc<dyn ModelClient>,
    /// Topic restrictions
    pub policy: Arc<dyn ContentPolicy>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Builds the drawer projection of every conversation the user owns
///
/// Conversations are ordered by their newest message, most recent first.
pub async fn load_display_items(
    store: &dyn ConversationStore,
    user_id: &str,
    title_max_chars: usize,
) -> Result<Vec<ConversationDisplayItem>> {
    let summaries = store.conversations_for_user(user_id).await?;
    let custom_titles: HashMap<i64, String> = store
        .metadata_for_user(user_id)
        .await?
        .into_iter()
        .filter_map(|m| m.custom_title.map(|t| (m.conversation_id, t)))
        .collect();

    let mut items = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let custom = custom_titles
            .get(&summary.id)
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty());
        let first = match custom {
            Some(_) => None,
            None => store.first_user_message_text(user_id, summary.id).await?,
        };

        items.push(ConversationDisplayItem {
            id: summary.id,
            display_title: title::effective_title(
                summary.id,
                custom,
                first.as_deref(),
                title_max_chars,
            ),
            last_updated: summary.last_timestamp,
            conversation_type: ConversationType::General,
        });
    }
    Ok(items)
}

/// Fails unless `conversation_id` is a conversation the user owns
///
/// A conversation is owned once it holds a message or a metadata row of the
/// user. The sentinel id is never owned.
///
/// # Errors
///
/// Returns [`MenteSaError::InvalidConversation`] for the sentinel or an id
/// the user does not own, or the storage error
pub async fn ensure_owned(
    store: &dyn ConversationStore,
    user_id: &str,
    conversation_id: i64,
) -> Result<()> {
    if is_new_conversation(conversation_id) {
        return Err(MenteSaError::InvalidConversation(conversation_id).into());
    }

    let has_messages = store
        .conversations_for_user(user_id)
        .await?
        .iter()
        .any(|c| c.id == conversation_id);
    if has_messages {
        return Ok(());
    }

    let has_metadata = store
        .metadata_for_user(user_id)
        .await?
        .iter()
        .any(|m| m.conversation_id == conversation_id);
    if has_metadata {
        return Ok(());
    }

    tracing::warn!(
        "Conversation {} does not belong to user {}",
        conversation_id,
        user_id
    );
    Err(MenteSaError::InvalidConversation(conversation_id).into())
}

/// Checks a rename request and returns the metadata row to store
///
/// # Errors
///
/// Returns [`MenteSaError::InvalidConversation`] or
/// [`MenteSaError::EmptyTitle`] before any storage access, then whatever
/// [`ensure_owned`] reports
pub async fn prepare_rename(
    store: &dyn ConversationStore,
    user_id: &str,
    conversation_id: i64,
    new_title: &str,
) -> Result<ConversationMetadata> {
    if is_new_conversation(conversation_id) {
        return Err(MenteSaError::InvalidConversation(conversation_id).into());
    }
    let new_title = new_title.trim();
    if new_title.is_empty() {
        return Err(MenteSaError::EmptyTitle.into());
    }

    ensure_owned(store, user_id, conversation_id).await?;
    Ok(ConversationMetadata {
        conversation_id,
        custom_title: Some(new_title.to_string()),
        user_id: user_id.to_string(),
    })
}

/// Keeps the message list of one conversation in sync with the store
struct MessageFeed {
    store: Arc<dyn ConversationStore>,
    user_id: String,
    conversation_id: i64,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    messages: Arc<watch::Sender<Vec<ChatMessage>>>,
    errors: Arc<watch::Sender<Option<String>>>,
}

impl MessageFeed {
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    fn is_relevant(&self, change: &StoreChange) -> bool {
        change.touches_messages()
            && change.conversation_id() == self.conversation_id
            && change.user_id() == self.user_id
    }

    async fn reload(&self) {
        match self
            .store
            .messages_for_conversation(&self.user_id, self.conversation_id)
            .await
        {
            Ok(records) => {
                if self.is_current() {
                    let messages = records.iter().map(|r| r.to_chat_message()).collect();
                    self.messages.send_replace(messages);
                }
            }
            Err(e) => {
                tracing::error!(
                    "Failed to load messages of conversation {}: {}",
                    self.conversation_id,
                    e
                );
                if self.is_current() {
                    self.errors
                        .send_replace(Some(format!("Erro ao carregar mensagens: {}", e)));
                }
            }
        }
    }

    async fn run(self, mut changes: broadcast::Receiver<StoreChange>) {
        loop {
            match changes.recv().await {
                Ok(change) if self.is_relevant(&change) => self.reload().await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Message feed skipped {} store changes", skipped);
                    self.reload().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

/// Keeps the drawer's conversation list in sync with the store
struct ListFeed {
    store: Arc<dyn ConversationStore>,
    user_id: String,
    title_max_chars: usize,
    generation: u64,
    current_generation: Arc<AtomicU64>,
    conversations: Arc<watch::Sender<Vec<ConversationDisplayItem>>>,
    errors: Arc<watch::Sender<Option<String>>>,
}

impl ListFeed {
    fn is_current(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) == self.generation
    }

    async fn reload(&self) {
        match load_display_items(self.store.as_ref(), &self.user_id, self.title_max_chars).await {
            Ok(items) => {
                if self.is_current() {
                    self.conversations.send_replace(items);
                }
            }
            Err(e) => {
                tracing::error!("Failed to load conversation list: {}", e);
                if self.is_current() {
                    self.errors
                        .send_replace(Some(format!("Erro ao carregar conversas: {}", e)));
                }
            }
        }
    }

    async fn run(self, mut changes: broadcast::Receiver<StoreChange>) {
        loop {
            match changes.recv().await {
                Ok(change) if change.user_id() == self.user_id => self.reload().await,
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("List feed skipped {} store changes", skipped);
                    self.reload().await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

struct Core {
    user_id: String,
    message_feed: Option<Subscription>,
    list_feed: Option<Subscription>,
}

struct Shared {
    deps: ChatDependencies,
    settings: ChatSettings,
    core: Mutex<Core>,
    last_minted: AtomicI64,
    message_generation: Arc<AtomicU64>,
    list_generation: Arc<AtomicU64>,
    current_id: watch::Sender<i64>,
    messages: Arc<watch::Sender<Vec<ChatMessage>>>,
    conversations: Arc<watch::Sender<Vec<ConversationDisplayItem>>>,
    status: watch::Sender<ChatStatus>,
    error: Arc<watch::Sender<Option<String>>>,
    notice: watch::Sender<Option<String>>,
    streaming: watch::Sender<Option<String>>,
    drawer_visible: watch::Sender<bool>,
}

/// State machine behind the chat screen
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ChatOrchestrator {
    shared: Arc<Shared>,
}

impl ChatOrchestrator {
    /// Creates the orchestrator for the current user
    ///
    /// Selects the user's most recent conversation, or starts a new one when
    /// the user has none. Storage failures during startup are logged and
    /// published as error text; the orchestrator still starts.
    pub async fn new(deps: ChatDependencies, settings: ChatSettings) -> Self {
        let user_id = deps.identity.effective_user_id();
        let shared = Arc::new(Shared {
            deps,
            settings,
            core: Mutex::new(Core {
                user_id: user_id.clone(),
                message_feed: None,
                list_feed: None,
            }),
            last_minted: AtomicI64::new(0),
            message_generation: Arc::new(AtomicU64::new(0)),
            list_generation: Arc::new(AtomicU64::new(0)),
            current_id: watch::channel(NEW_CONVERSATION_ID).0,
            messages: Arc::new(watch::channel(Vec::new()).0),
            conversations: Arc::new(watch::channel(Vec::new()).0),
            status: watch::channel(ChatStatus::Idle).0,
            error: Arc::new(watch::channel(None).0),
            notice: watch::channel(None).0,
            streaming: watch::channel(None).0,
            drawer_visible: watch::channel(true).0,
        });

        let orchestrator = Self { shared };
        {
            let mut core = orchestrator.shared.core.lock().await;
            orchestrator.bind_list_feed(&mut core).await;

            let store = &orchestrator.shared.deps.store;
            let initial = match store.conversations_for_user(&user_id).await {
                Ok(conversations) => {
                    if let Some(max_id) = conversations.iter().map(|c| c.id).max() {
                        orchestrator
                            .shared
                            .last_minted
                            .fetch_max(max_id, Ordering::SeqCst);
                    }
                    conversations.first().map(|c| c.id)
                }
                Err(e) => {
                    orchestrator.report_storage_error("Erro ao carregar conversas", &e);
                    None
                }
            };

            orchestrator
                .set_active(&mut core, initial.unwrap_or(NEW_CONVERSATION_ID))
                .await;
        }

        tracing::info!(
            "Chat ready for user {} (model {})",
            user_id,
            orchestrator.shared.deps.model.model_name()
        );
        orchestrator
    }

    // ---------------------------------------------------------------------
    // Observers
    // ---------------------------------------------------------------------

    /// Active conversation id (the sentinel while the conversation is unsaved)
    pub fn current_conversation_id(&self) -> watch::Receiver<i64> {
        self.shared.current_id.subscribe()
    }

    /// Messages of the active conversation, oldest first
    pub fn messages(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.shared.messages.subscribe()
    }

    /// Drawer entries, most recently active first
    pub fn conversation_list(&self) -> watch::Receiver<Vec<ConversationDisplayItem>> {
        self.shared.conversations.subscribe()
    }

    /// Loading/error status
    pub fn status(&self) -> watch::Receiver<ChatStatus> {
        self.shared.status.subscribe()
    }

    /// Error banner text
    pub fn error_message(&self) -> watch::Receiver<Option<String>> {
        self.shared.error.subscribe()
    }

    /// Transient notice text (e.g. the busy notice)
    pub fn notice(&self) -> watch::Receiver<Option<String>> {
        self.shared.notice.subscribe()
    }

    /// Partial reply while a reply streams in
    pub fn streaming_reply(&self) -> watch::Receiver<Option<String>> {
        self.shared.streaming.subscribe()
    }

    /// Whether the conversation drawer is shown
    pub fn drawer_visible(&self) -> watch::Receiver<bool> {
        self.shared.drawer_visible.subscribe()
    }

    /// User id that currently scopes all reads and writes
    pub async fn user_id(&self) -> String {
        self.shared.core.lock().await.user_id.clone()
    }

    /// Tunables in effect
    pub fn settings(&self) -> &ChatSettings {
        &self.shared.settings
    }

    // ---------------------------------------------------------------------
    // Internal helpers
    // ---------------------------------------------------------------------

    fn is_loading(&self) -> bool {
        *self.shared.status.borrow() == ChatStatus::Loading
    }

    fn clear_transient(&self) {
        self.shared.error.send_replace(None);
        if !self.is_loading() {
            self.shared.status.send_replace(ChatStatus::Idle);
        }
    }

    /// Publishes storage failures; validation failures only go to the caller
    fn report_unless_validation(&self, context: &str, error: &anyhow::Error) {
        let is_validation = error
            .downcast_ref::<MenteSaError>()
            .map(MenteSaError::is_validation)
            .unwrap_or(false);
        if !is_validation {
            self.report_storage_error(context, error);
        }
    }

    fn report_storage_error(&self, context: &str, error: &anyhow::Error) {
        tracing::error!("{}: {}", context, error);
        self.shared
            .error
            .send_replace(Some(format!("{}: {}", context, error)));
    }

    fn mint_conversation_id(&self) -> i64 {
        let now = now_millis();
        let previous = self
            .shared
            .last_minted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Switches the active id and rebinds the message feed to it
    async fn set_active(&self, core: &mut Core, conversation_id: i64) {
        if let Some(mut feed) = core.message_feed.take() {
            feed.dispose();
        }
        let generation = self.shared.message_generation.fetch_add(1, Ordering::SeqCst) + 1;

        self.shared.current_id.send_replace(conversation_id);
        self.shared.messages.send_replace(Vec::new());
        if is_new_conversation(conversation_id) {
            return;
        }

        let changes = self.shared.deps.store.subscribe();
        let feed = MessageFeed {
            store: self.shared.deps.store.clone(),
            user_id: core.user_id.clone(),
            conversation_id,
            generation,
            current_generation: self.shared.message_generation.clone(),
            messages: self.shared.messages.clone(),
            errors: self.shared.error.clone(),
        };
        feed.reload().await;
        core.message_feed = Some(Subscription::spawn(
            format!("messages:{}", conversation_id),
            feed.run(changes),
        ));
    }

    /// Rebinds the conversation list feed to the core's user id
    async fn bind_list_feed(&self, core: &mut Core) {
        if let Some(mut feed) = core.list_feed.take() {
            feed.dispose();
        }
        let generation = self.shared.list_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let changes = self.shared.deps.store.subscribe();
        let feed = ListFeed {
            store: self.shared.deps.store.clone(),
            user_id: core.user_id.clone(),
            title_max_chars: self.shared.settings.title_max_chars,
            generation,
            current_generation: self.shared.list_generation.clone(),
            conversations: self.shared.conversations.clone(),
            errors: self.shared.error.clone(),
        };
        feed.reload().await;
        core.list_feed = Some(Subscription::spawn(
            format!("conversations:{}", core.user_id),
            feed.run(changes),
        ));
    }

    async fn persist(
        &self,
        user_id: &str,
        conversation_id: i64,
        text: &str,
        sender: Sender,
    ) -> Result<i64> {
        self.shared
            .deps
            .store
            .insert_message(NewMessage {
                conversation_id,
                text: text.to_string(),
                sender,
                timestamp: now_millis(),
                user_id: user_id.to_string(),
            })
            .await
    }

    fn fail_send(&self, conversation_id: i64, context: &str, error: &anyhow::Error) -> SendOutcome {
        tracing::error!("{} (conversation {}): {}", context, conversation_id, error);
        let message = format!("{}: {}", context, error);
        self.shared.streaming.send_replace(None);
        self.shared.error.send_replace(Some(message.clone()));
        self.shared.status.send_replace(ChatStatus::Error);
        SendOutcome::Failed {
            conversation_id,
            message,
        }
    }

    async fn prior_history(&self, user_id: &str, conversation_id: i64, exclude_row: i64) -> Vec<Message> {
        let window = self.shared.settings.history_window;
        match self
            .shared
            .deps
            .store
            .recent_messages(user_id, conversation_id, window + 1)
            .await
        {
            Ok(records) => {
                let prior: Vec<_> = records.into_iter().filter(|r| r.id != exclude_row).collect();
                let skip = prior.len().saturating_sub(window);
                prior[skip..]
                    .iter()
                    .map(|r| Message::from(&r.to_chat_message()))
                    .collect()
            }
            Err(e) => {
                tracing::warn!("Sending without history, failed to load it: {}", e);
                Vec::new()
            }
        }
    }

    async fn stream_reply(&self, system_prompt: &str, history: &[Message], prompt: &str) -> Result<String> {
        let mut stream = self
            .shared
            .deps
            .model
            .stream_reply(system_prompt, history, prompt)
            .await?;

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            reply.push_str(&chunk?);
            self.shared.streaming.send_replace(Some(reply.clone()));
        }
        Ok(reply)
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Makes the unsaved sentinel conversation active
    ///
    /// Clears the error banner. The status returns to idle unless a reply is
    /// still streaming. Calling it while already on a new conversation
    /// changes nothing else.
    pub async fn start_new_conversation(&self) {
        let mut core = self.shared.core.lock().await;
        if !is_new_conversation(*self.shared.current_id.borrow()) {
            self.set_active(&mut core, NEW_CONVERSATION_ID).await;
            tracing::info!("Started a new conversation");
        }
        self.clear_transient();
    }

    /// Makes an existing conversation active
    ///
    /// # Errors
    ///
    /// Returns [`MenteSaError::InvalidConversation`] for the sentinel id or
    /// an id the user does not own
    pub async fn select_conversation(&self, conversation_id: i64) -> Result<()> {
        if is_new_conversation(conversation_id) {
            return Err(MenteSaError::InvalidConversation(conversation_id).into());
        }

        let mut core = self.shared.core.lock().await;
        if *self.shared.current_id.borrow() == conversation_id {
            return Ok(());
        }
        if let Err(e) =
            ensure_owned(self.shared.deps.store.as_ref(), &core.user_id, conversation_id).await
        {
            self.report_unless_validation("Erro ao abrir conversa", &e);
            return Err(e);
        }

        self.set_active(&mut core, conversation_id).await;
        self.clear_transient();
        tracing::info!("Selected conversation {}", conversation_id);
        Ok(())
    }

    /// Sends a user message and stores the assistant's reply
    ///
    /// Waits for the whole exchange. Storage and model failures do not
    /// return `Err`: they set the error status and yield
    /// [`SendOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`MenteSaError::EmptyMessage`] for blank text and
    /// [`MenteSaError::Busy`] while another reply is streaming. Neither
    /// changes any state besides the busy notice.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(MenteSaError::EmptyMessage.into());
        }

        let (user_id, conversation_id) = {
            let mut core = self.shared.core.lock().await;
            if self.is_loading() {
                tracing::debug!("Rejected send while a reply is streaming");
                self.shared.notice.send_replace(Some(BUSY_NOTICE.to_string()));
                return Err(MenteSaError::Busy(BUSY_NOTICE.to_string()).into());
            }

            self.shared.status.send_replace(ChatStatus::Loading);
            self.shared.error.send_replace(None);

            let user_id = core.user_id.clone();
            let mut conversation_id = *self.shared.current_id.borrow();
            if is_new_conversation(conversation_id) {
                conversation_id = self.mint_conversation_id();
                tracing::info!("Created conversation {}", conversation_id);
                self.set_active(&mut core, conversation_id).await;

                let seed = ConversationMetadata {
                    conversation_id,
                    custom_title: None,
                    user_id: user_id.clone(),
                };
                if let Err(e) = self.shared.deps.store.upsert_metadata(seed).await {
                    self.report_storage_error("Erro ao salvar conversa", &e);
                }
            }
            (user_id, conversation_id)
        };

        let user_row = match self
            .persist(&user_id, conversation_id, prompt, Sender::User)
            .await
        {
            Ok(id) => id,
            Err(e) => return Ok(self.fail_send(conversation_id, "Erro ao salvar mensagem", &e)),
        };

        let policy = &self.shared.deps.policy;
        if let PolicyVerdict::Blocked { category } = policy.check_prompt(prompt) {
            tracing::info!("Refused prompt about '{}' without calling the model", category);
            if let Err(e) = self
                .persist(&user_id, conversation_id, policy.refusal_message(), Sender::Bot)
                .await
            {
                return Ok(self.fail_send(conversation_id, "Erro ao salvar resposta", &e));
            }
            self.shared.status.send_replace(ChatStatus::Idle);
            return Ok(SendOutcome::Refused { conversation_id });
        }

        let history = self.prior_history(&user_id, conversation_id, user_row).await;
        let system_prompt = build_system_prompt(
            &self.shared.settings.system_prompt,
            self.shared.deps.identity.display_name().as_deref(),
        );

        self.shared.streaming.send_replace(Some(String::new()));
        let timeout = self.shared.settings.reply_timeout;
        let reply = match tokio::time::timeout(
            timeout,
            self.stream_reply(&system_prompt, &history, prompt),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Ok(self.fail_send(conversation_id, REPLY_ERROR_PREFIX, &e)),
            Err(_) => {
                let e = MenteSaError::Timeout(timeout.as_secs()).into();
                return Ok(self.fail_send(conversation_id, REPLY_ERROR_PREFIX, &e));
            }
        };

        let reply = reply.trim();
        let reply = if reply.is_empty() {
            tracing::warn!("Model returned an empty reply");
            EMPTY_REPLY_MESSAGE
        } else if !policy.validate_response(reply) {
            policy.fallback_message()
        } else {
            reply
        };

        if let Err(e) = self
            .persist(&user_id, conversation_id, reply, Sender::Bot)
            .await
        {
            return Ok(self.fail_send(conversation_id, "Erro ao salvar resposta", &e));
        }

        self.shared.streaming.send_replace(None);
        self.shared.status.send_replace(ChatStatus::Idle);
        tracing::debug!("Stored reply in conversation {}", conversation_id);
        Ok(SendOutcome::Replied {
            conversation_id,
            reply: reply.to_string(),
        })
    }

    /// Deletes a conversation's messages and title
    ///
    /// When the deleted conversation was active, the most recent remaining
    /// conversation becomes active, or a new one if none is left.
    ///
    /// # Errors
    ///
    /// Returns [`MenteSaError::InvalidConversation`] for the sentinel id or
    /// an id the user does not own, or the storage error (also published as
    /// error text)
    pub async fn delete_conversation(&self, conversation_id: i64) -> Result<()> {
        if is_new_conversation(conversation_id) {
            return Err(MenteSaError::InvalidConversation(conversation_id).into());
        }

        let mut core = self.shared.core.lock().await;
        let user_id = core.user_id.clone();
        let store = self.shared.deps.store.clone();

        if let Err(e) = ensure_owned(store.as_ref(), &user_id, conversation_id).await {
            self.report_unless_validation("Erro ao excluir conversa", &e);
            return Err(e);
        }
        if let Err(e) = store.clear_conversation(&user_id, conversation_id).await {
            self.report_storage_error("Erro ao excluir conversa", &e);
            return Err(e);
        }
        if let Err(e) = store.delete_metadata(&user_id, conversation_id).await {
            self.report_storage_error("Erro ao excluir título da conversa", &e);
        }
        tracing::info!("Deleted conversation {}", conversation_id);

        if *self.shared.current_id.borrow() == conversation_id {
            let next = match store.conversations_for_user(&user_id).await {
                Ok(conversations) => conversations
                    .into_iter()
                    .map(|c| c.id)
                    .find(|id| *id != conversation_id),
                Err(e) => {
                    self.report_storage_error("Erro ao carregar conversas", &e);
                    None
                }
            };
            self.set_active(&mut core, next.unwrap_or(NEW_CONVERSATION_ID))
                .await;
        }
        Ok(())
    }

    /// Sets a custom title for a conversation
    ///
    /// # Errors
    ///
    /// Returns [`MenteSaError::InvalidConversation`] for the sentinel id or
    /// an id the user does not own, [`MenteSaError::EmptyTitle`] for a blank
    /// title, or the storage error (also published as error text)
    pub async fn rename_conversation(&self, conversation_id: i64, new_title: &str) -> Result<()> {
        let core = self.shared.core.lock().await;
        let store = self.shared.deps.store.as_ref();
        let metadata = match prepare_rename(store, &core.user_id, conversation_id, new_title).await {
            Ok(metadata) => metadata,
            Err(e) => {
                self.report_unless_validation("Erro ao renomear conversa", &e);
                return Err(e);
            }
        };
        if let Err(e) = self.shared.deps.store.upsert_metadata(metadata).await {
            self.report_storage_error("Erro ao renomear conversa", &e);
            return Err(e);
        }
        tracing::info!("Renamed conversation {}", conversation_id);
        Ok(())
    }

    /// Title shown for a conversation
    ///
    /// # Errors
    ///
    /// Returns the storage error if the title data cannot be read
    pub async fn display_title(&self, conversation_id: i64) -> Result<String> {
        if is_new_conversation(conversation_id) {
            return Ok(NEW_CONVERSATION_TITLE.to_string());
        }

        let user_id = self.user_id().await;
        let store = &self.shared.deps.store;
        let custom = store
            .custom_title(&user_id, conversation_id)
            .await?
            .filter(|t| !t.trim().is_empty());
        let first = match custom {
            Some(_) => None,
            None => store.first_user_message_text(&user_id, conversation_id).await?,
        };

        Ok(title::effective_title(
            conversation_id,
            custom.as_deref(),
            first.as_deref(),
            self.shared.settings.title_max_chars,
        ))
    }

    async fn reset_for_current_user(&self) {
        let mut core = self.shared.core.lock().await;
        let user_id = self.shared.deps.identity.effective_user_id();
        if user_id != core.user_id {
            tracing::info!("Switching chat data to user {}", user_id);
        }
        core.user_id = user_id;

        self.bind_list_feed(&mut core).await;
        self.set_active(&mut core, NEW_CONVERSATION_ID).await;
        self.shared.notice.send_replace(None);
        self.clear_transient();
    }

    /// Hides the drawer and starts over as the signed-out user
    ///
    /// Stored conversations are kept.
    pub async fn handle_logout(&self) {
        self.shared.drawer_visible.send_replace(false);
        self.reset_for_current_user().await;
    }

    /// Shows the drawer and starts over as the signed-in user
    pub async fn handle_login(&self) {
        self.shared.drawer_visible.send_replace(true);
        self.reset_for_current_user().await;
    }

    /// Dismisses the error banner
    pub fn clear_error(&self) {
        self.shared.error.send_replace(None);
        if *self.shared.status.borrow() == ChatStatus::Error {
            self.shared.status.send_replace(ChatStatus::Idle);
        }
    }

    /// Dismisses the notice text
    pub fn clear_notice(&self) {
        self.shared.notice.send_replace(None);
    }
}

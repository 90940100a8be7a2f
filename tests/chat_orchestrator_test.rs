//! Integration tests for the chat orchestrator
//!
//! Exercises sending, conversation lifecycle, content restrictions, and
//! failure handling against a real SQLite store and a scripted model.

mod common;

use common::{
    create_temp_storage, orchestrator_with, settings_with_window, wait_for, FlakyStore, Script,
    ScriptedModel, SwitchableIdentity,
};
use mentesa::chat::state::{BUSY_NOTICE, EMPTY_REPLY_MESSAGE, REPLY_ERROR_PREFIX};
use mentesa::chat::{ChatSettings, ChatStatus, SendOutcome};
use mentesa::error::MenteSaError;
use mentesa::models::{ChatMessage, Sender, NEW_CONVERSATION_ID};
use mentesa::policy::{FALLBACK_MESSAGE, REFUSAL_MESSAGE};
use mentesa::providers::Message;
use mentesa::storage::{ConversationStore, NewMessage};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn validation_error(err: &anyhow::Error) -> &MenteSaError {
    err.downcast_ref::<MenteSaError>()
        .expect("expected a MenteSaError")
}

async fn seed(store: &dyn ConversationStore, user: &str, conversation: i64, text: &str, ts: i64) {
    store
        .insert_message(NewMessage {
            conversation_id: conversation,
            text: text.to_string(),
            sender: Sender::User,
            timestamp: ts,
            user_id: user.to_string(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_blank_message_is_rejected_without_side_effects() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    let model = Arc::new(ScriptedModel::default());
    let chat = orchestrator_with(
        store.clone(),
        model.clone(),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    for text in ["", "   ", "\n\t"] {
        let err = chat.send_message(text).await.unwrap_err();
        assert!(matches!(validation_error(&err), MenteSaError::EmptyMessage));
    }

    assert_eq!(model.calls(), 0);
    assert_eq!(*chat.current_conversation_id().borrow(), NEW_CONVERSATION_ID);
    assert_eq!(*chat.status().borrow(), ChatStatus::Idle);
    assert!(store
        .conversations_for_user("local_user")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_first_send_creates_conversation_and_lists_it() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    let model = Arc::new(ScriptedModel::new(vec![Script::Reply(vec![
        "Sinto muito ".to_string(),
        "que esteja assim.".to_string(),
    ])]));
    let chat = orchestrator_with(
        store.clone(),
        model.clone(),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    let outcome = chat
        .send_message("Tenho me sentido muito ansioso no trabalho")
        .await
        .unwrap();
    let SendOutcome::Replied {
        conversation_id,
        reply,
    } = outcome
    else {
        panic!("expected a reply, got {:?}", outcome);
    };

    assert!(conversation_id > 0);
    assert_eq!(reply, "Sinto muito que esteja assim.");
    assert_eq!(*chat.current_conversation_id().borrow(), conversation_id);
    assert_eq!(model.calls(), 1);

    let mut messages = chat.messages();
    let shown = wait_for(&mut messages, |m| m.len() == 2).await;
    assert_eq!(
        shown,
        vec![
            ChatMessage::user("Tenho me sentido muito ansioso no trabalho"),
            ChatMessage::bot("Sinto muito que esteja assim."),
        ]
    );

    let mut list = chat.conversation_list();
    let items = wait_for(&mut list, |items| items.len() == 1).await;
    assert_eq!(items[0].id, conversation_id);
    assert_eq!(items[0].display_title, "Tenho me sentido muito ansi...");
}

#[tokio::test]
async fn test_send_while_loading_is_rejected_with_notice() {
    let (store, _dir) = create_temp_storage();
    let gate = Arc::new(Notify::new());
    let model = Arc::new(ScriptedModel::gated(vec![], gate.clone()));
    let chat = orchestrator_with(
        Arc::new(store),
        model.clone(),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    let first = {
        let chat = chat.clone();
        tokio::spawn(async move { chat.send_message("primeira").await })
    };
    let mut status = chat.status();
    wait_for(&mut status, |s| *s == ChatStatus::Loading).await;

    let err = chat.send_message("segunda").await.unwrap_err();
    match validation_error(&err) {
        MenteSaError::Busy(text) => assert_eq!(text, BUSY_NOTICE),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(chat.notice().borrow().as_deref(), Some(BUSY_NOTICE));

    gate.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, SendOutcome::Replied { .. }));
    assert_eq!(model.calls(), 1);
    assert_eq!(*chat.status().borrow(), ChatStatus::Idle);

    chat.clear_notice();
    assert!(chat.notice().borrow().is_none());
}

#[tokio::test]
async fn test_blocked_topic_never_reaches_the_model() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    let model = Arc::new(ScriptedModel::default());
    let chat = orchestrator_with(
        store.clone(),
        model.clone(),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    let outcome = chat
        .send_message("Me explica física quântica")
        .await
        .unwrap();
    let conversation_id = outcome.conversation_id();
    assert_eq!(outcome, SendOutcome::Refused { conversation_id });
    assert_eq!(model.calls(), 0);
    assert_eq!(*chat.status().borrow(), ChatStatus::Idle);

    let records = store
        .messages_for_conversation("local_user", conversation_id)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].sender, Sender::User);
    assert_eq!(records[1].sender, Sender::Bot);
    assert_eq!(records[1].text, REFUSAL_MESSAGE);
}

#[tokio::test]
async fn test_off_topic_and_empty_replies_are_replaced() {
    let (store, _dir) = create_temp_storage();
    let model = Arc::new(ScriptedModel::new(vec![
        Script::Reply(vec!["O candidato venceu a eleição ontem.".to_string()]),
        Script::Reply(vec!["   ".to_string()]),
    ]));
    let chat = orchestrator_with(
        Arc::new(store),
        model,
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    match chat.send_message("Como lidar com o estresse?").await.unwrap() {
        SendOutcome::Replied { reply, .. } => assert_eq!(reply, FALLBACK_MESSAGE),
        other => panic!("unexpected outcome: {:?}", other),
    }
    match chat.send_message("Obrigado").await.unwrap() {
        SendOutcome::Replied { reply, .. } => assert_eq!(reply, EMPTY_REPLY_MESSAGE),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_history_is_bounded_and_excludes_current_prompt() {
    let (store, _dir) = create_temp_storage();
    let model = Arc::new(ScriptedModel::new(vec![
        Script::Reply(vec!["r1".to_string()]),
        Script::Reply(vec!["r2".to_string()]),
        Script::Reply(vec!["r3".to_string()]),
    ]));
    let chat = orchestrator_with(
        Arc::new(store),
        model.clone(),
        Arc::new(SwitchableIdentity::default()),
        settings_with_window(2),
    )
    .await;

    chat.send_message("m1").await.unwrap();
    assert!(model.last_history().is_empty());

    chat.send_message("m2").await.unwrap();
    assert_eq!(
        model.last_history(),
        vec![Message::user("m1"), Message::model("r1")]
    );

    chat.send_message("m3").await.unwrap();
    assert_eq!(
        model.last_history(),
        vec![Message::user("m2"), Message::model("r2")]
    );
}

#[tokio::test]
async fn test_display_name_reaches_system_prompt() {
    let (store, _dir) = create_temp_storage();
    let identity = Arc::new(SwitchableIdentity::signed_in("uid-ana"));
    identity.set_display_name(Some("Ana"));
    let model = Arc::new(ScriptedModel::default());
    let chat = orchestrator_with(
        Arc::new(store),
        model.clone(),
        identity,
        ChatSettings::default(),
    )
    .await;

    chat.send_message("oi").await.unwrap();
    let prompt = model.last_system_prompt().unwrap();
    assert!(prompt.contains("saúde mental"));
    assert!(prompt.contains("Ana"));
}

#[tokio::test]
async fn test_model_failure_sets_error_without_bot_message() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    let model = Arc::new(ScriptedModel::new(vec![
        Script::Fail("quota exceeded".to_string()),
        Script::FailMidStream(vec!["parcial".to_string()], "conexão caiu".to_string()),
    ]));
    let chat = orchestrator_with(
        store.clone(),
        model,
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    let outcome = chat.send_message("olá").await.unwrap();
    let conversation_id = outcome.conversation_id();
    match &outcome {
        SendOutcome::Failed { message, .. } => {
            assert!(message.starts_with(REPLY_ERROR_PREFIX));
            assert!(message.contains("quota exceeded"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(*chat.status().borrow(), ChatStatus::Error);
    assert!(chat.error_message().borrow().is_some());

    chat.clear_error();
    assert_eq!(*chat.status().borrow(), ChatStatus::Idle);
    assert!(chat.error_message().borrow().is_none());

    let outcome = chat.send_message("de novo").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    assert!(chat.streaming_reply().borrow().is_none());

    let records = store
        .messages_for_conversation("local_user", conversation_id)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.sender == Sender::User));
}

#[tokio::test]
async fn test_reply_timeout_is_reported() {
    let (store, _dir) = create_temp_storage();
    let model = Arc::new(ScriptedModel::new(vec![Script::Hang]));
    let settings = ChatSettings {
        reply_timeout: Duration::from_millis(50),
        ..ChatSettings::default()
    };
    let chat = orchestrator_with(
        Arc::new(store),
        model,
        Arc::new(SwitchableIdentity::default()),
        settings,
    )
    .await;

    match chat.send_message("alô?").await.unwrap() {
        SendOutcome::Failed { message, .. } => assert!(message.contains("timed out")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(*chat.status().borrow(), ChatStatus::Error);
}

#[tokio::test]
async fn test_failed_user_persist_skips_model() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(FlakyStore::new(store));
    store.fail_inserts.store(true, Ordering::SeqCst);
    let model = Arc::new(ScriptedModel::default());
    let chat = orchestrator_with(
        store.clone(),
        model.clone(),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    let outcome = chat.send_message("oi").await.unwrap();
    assert!(matches!(outcome, SendOutcome::Failed { .. }));
    assert_eq!(model.calls(), 0);
    assert_eq!(*chat.status().borrow(), ChatStatus::Error);
}

#[tokio::test]
async fn test_startup_selects_most_recent_conversation() {
    let (store, _dir) = create_temp_storage();
    seed(&store, "local_user", 100, "antiga", 100).await;
    seed(&store, "local_user", 200, "recente", 200).await;

    let chat = orchestrator_with(
        Arc::new(store),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    assert_eq!(*chat.current_conversation_id().borrow(), 200);
    assert_eq!(*chat.messages().borrow(), vec![ChatMessage::user("recente")]);

    let ids: Vec<i64> = chat.conversation_list().borrow().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![200, 100]);
}

#[tokio::test]
async fn test_minted_id_exceeds_existing_ids() {
    let (store, _dir) = create_temp_storage();
    let far_future = chrono::Utc::now().timestamp_millis() + 10_000_000;
    seed(&store, "local_user", far_future, "do futuro", 1).await;

    let chat = orchestrator_with(
        Arc::new(store),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;
    chat.start_new_conversation().await;

    let outcome = chat.send_message("nova").await.unwrap();
    assert!(outcome.conversation_id() > far_future);
}

#[tokio::test]
async fn test_select_and_start_new_conversation() {
    let (store, _dir) = create_temp_storage();
    seed(&store, "local_user", 100, "primeira", 100).await;
    seed(&store, "local_user", 200, "segunda", 200).await;

    let chat = orchestrator_with(
        Arc::new(store),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    chat.select_conversation(100).await.unwrap();
    assert_eq!(*chat.current_conversation_id().borrow(), 100);
    assert_eq!(*chat.messages().borrow(), vec![ChatMessage::user("primeira")]);

    let err = chat
        .select_conversation(NEW_CONVERSATION_ID)
        .await
        .unwrap_err();
    assert!(matches!(
        validation_error(&err),
        MenteSaError::InvalidConversation(_)
    ));
    assert_eq!(*chat.current_conversation_id().borrow(), 100);

    chat.start_new_conversation().await;
    assert_eq!(*chat.current_conversation_id().borrow(), NEW_CONVERSATION_ID);
    assert!(chat.messages().borrow().is_empty());

    chat.start_new_conversation().await;
    assert_eq!(*chat.current_conversation_id().borrow(), NEW_CONVERSATION_ID);
}

#[tokio::test]
async fn test_unknown_or_foreign_conversations_are_rejected() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    seed(store.as_ref(), "local_user", 100, "minha", 100).await;
    seed(store.as_ref(), "ana", 500, "da ana", 500).await;
    store
        .upsert_metadata(mentesa::storage::ConversationMetadata {
            conversation_id: 500,
            custom_title: Some("Diário da Ana".to_string()),
            user_id: "ana".to_string(),
        })
        .await
        .unwrap();

    let chat = orchestrator_with(
        store.clone(),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;
    assert_eq!(*chat.current_conversation_id().borrow(), 100);

    for id in [12_345, 500] {
        let err = chat.select_conversation(id).await.unwrap_err();
        assert!(matches!(
            validation_error(&err),
            MenteSaError::InvalidConversation(_)
        ));
        let err = chat.rename_conversation(id, "Roubado").await.unwrap_err();
        assert!(matches!(
            validation_error(&err),
            MenteSaError::InvalidConversation(_)
        ));
        let err = chat.delete_conversation(id).await.unwrap_err();
        assert!(matches!(
            validation_error(&err),
            MenteSaError::InvalidConversation(_)
        ));
    }

    assert_eq!(*chat.current_conversation_id().borrow(), 100);
    assert!(chat.error_message().borrow().is_none());
    assert_eq!(
        store.custom_title("ana", 500).await.unwrap().as_deref(),
        Some("Diário da Ana")
    );
    assert_eq!(
        store.messages_for_conversation("ana", 500).await.unwrap().len(),
        1
    );
    assert!(store.custom_title("local_user", 12_345).await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_conversation_with_only_a_title_can_be_selected() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    seed(store.as_ref(), "local_user", 100, "primeira", 100).await;
    store
        .upsert_metadata(mentesa::storage::ConversationMetadata {
            conversation_id: 200,
            custom_title: None,
            user_id: "local_user".to_string(),
        })
        .await
        .unwrap();

    let chat = orchestrator_with(
        store,
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    chat.select_conversation(200).await.unwrap();
    assert_eq!(*chat.current_conversation_id().borrow(), 200);
    chat.rename_conversation(200, "Rascunho").await.unwrap();
    assert_eq!(chat.display_title(200).await.unwrap(), "Rascunho");
}

#[tokio::test]
async fn test_delete_active_falls_back_to_most_recent_then_new() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    seed(store.as_ref(), "local_user", 100, "primeira", 100).await;
    seed(store.as_ref(), "local_user", 200, "segunda", 200).await;

    let chat = orchestrator_with(
        store.clone(),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;
    chat.rename_conversation(200, "Segunda-feira").await.unwrap();

    chat.delete_conversation(200).await.unwrap();
    assert_eq!(*chat.current_conversation_id().borrow(), 100);
    assert!(store.custom_title("local_user", 200).await.unwrap().is_none());

    let mut list = chat.conversation_list();
    wait_for(&mut list, |items| items.len() == 1 && items[0].id == 100).await;

    chat.delete_conversation(100).await.unwrap();
    assert_eq!(*chat.current_conversation_id().borrow(), NEW_CONVERSATION_ID);
    assert!(chat.messages().borrow().is_empty());
    wait_for(&mut list, |items| items.is_empty()).await;

    let err = chat
        .delete_conversation(NEW_CONVERSATION_ID)
        .await
        .unwrap_err();
    assert!(matches!(
        validation_error(&err),
        MenteSaError::InvalidConversation(_)
    ));
}

#[tokio::test]
async fn test_delete_inactive_keeps_selection() {
    let (store, _dir) = create_temp_storage();
    seed(&store, "local_user", 100, "primeira", 100).await;
    seed(&store, "local_user", 200, "segunda", 200).await;

    let chat = orchestrator_with(
        Arc::new(store),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    chat.delete_conversation(100).await.unwrap();
    assert_eq!(*chat.current_conversation_id().borrow(), 200);
}

#[tokio::test]
async fn test_rename_validation_and_titles() {
    let (store, _dir) = create_temp_storage();
    seed(&store, "local_user", 100, "Uma mensagem bem longa sobre a minha semana", 100).await;

    let chat = orchestrator_with(
        Arc::new(store),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    let derived = chat.display_title(100).await.unwrap();
    assert_eq!(derived, "Uma mensagem bem longa sobr...");
    assert_eq!(chat.display_title(100).await.unwrap(), derived);

    let err = chat.rename_conversation(100, "   ").await.unwrap_err();
    assert!(matches!(validation_error(&err), MenteSaError::EmptyTitle));
    let err = chat
        .rename_conversation(NEW_CONVERSATION_ID, "x")
        .await
        .unwrap_err();
    assert!(matches!(
        validation_error(&err),
        MenteSaError::InvalidConversation(_)
    ));

    chat.rename_conversation(100, "  Semana difícil  ").await.unwrap();
    assert_eq!(chat.display_title(100).await.unwrap(), "Semana difícil");

    let mut list = chat.conversation_list();
    wait_for(&mut list, |items| {
        items.len() == 1 && items[0].display_title == "Semana difícil"
    })
    .await;
}

#[tokio::test]
async fn test_in_flight_reply_stays_in_its_conversation() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    let gate = Arc::new(Notify::new());
    let model = Arc::new(ScriptedModel::gated(
        vec![Script::Reply(vec!["resposta".to_string()])],
        gate.clone(),
    ));
    let chat = orchestrator_with(
        store.clone(),
        model,
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    let pending = {
        let chat = chat.clone();
        tokio::spawn(async move { chat.send_message("oi").await })
    };
    let mut status = chat.status();
    wait_for(&mut status, |s| *s == ChatStatus::Loading).await;
    let started_in = *chat.current_conversation_id().borrow();

    chat.start_new_conversation().await;
    assert_eq!(*chat.status().borrow(), ChatStatus::Loading);

    gate.notify_one();
    let outcome = pending.await.unwrap().unwrap();
    assert_eq!(outcome.conversation_id(), started_in);
    assert_eq!(*chat.current_conversation_id().borrow(), NEW_CONVERSATION_ID);
    assert!(chat.messages().borrow().is_empty());

    let records = store
        .messages_for_conversation("local_user", started_in)
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].text, "resposta");
}

#[tokio::test]
async fn test_logout_and_login_rebind_to_the_new_user() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    seed(store.as_ref(), "ana", 100, "conversa da ana", 100).await;
    seed(store.as_ref(), "local_user", 300, "conversa local", 300).await;

    let identity = Arc::new(SwitchableIdentity::signed_in("ana"));
    let chat = orchestrator_with(
        store.clone(),
        Arc::new(ScriptedModel::default()),
        identity.clone(),
        ChatSettings::default(),
    )
    .await;
    assert_eq!(*chat.current_conversation_id().borrow(), 100);

    identity.set_user(None);
    chat.handle_logout().await;
    assert!(!*chat.drawer_visible().borrow());
    assert_eq!(chat.user_id().await, "local_user");
    assert_eq!(*chat.current_conversation_id().borrow(), NEW_CONVERSATION_ID);
    let ids: Vec<i64> = chat.conversation_list().borrow().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![300]);

    identity.set_user(Some("ana"));
    chat.handle_login().await;
    assert!(*chat.drawer_visible().borrow());
    assert_eq!(*chat.current_conversation_id().borrow(), NEW_CONVERSATION_ID);
    let ids: Vec<i64> = chat.conversation_list().borrow().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![100]);

    // Signing out never deletes anything.
    assert_eq!(store.conversations_for_user("ana").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_message_view_follows_external_writes() {
    let (store, _dir) = create_temp_storage();
    let store = Arc::new(store);
    seed(store.as_ref(), "local_user", 100, "primeira", 100).await;

    let chat = orchestrator_with(
        store.clone(),
        Arc::new(ScriptedModel::default()),
        Arc::new(SwitchableIdentity::default()),
        ChatSettings::default(),
    )
    .await;

    seed(store.as_ref(), "local_user", 100, "segunda", 101).await;
    seed(store.as_ref(), "outra", 100, "de outro usuário", 102).await;

    let mut messages = chat.messages();
    let shown = wait_for(&mut messages, |m| m.len() == 2).await;
    assert_eq!(shown[1], ChatMessage::user("segunda"));
}

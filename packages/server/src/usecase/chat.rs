//! UseCase: 1:1 チャット・ファイル送信・入力中表示・既読・全体ブロードキャスト
//!
//! 配信先はユーザーの全端末（マルチデバイス）。送信者自身の端末にもエコーする。
//! 相手がオフラインでもエラーにはならず、相手の分は捨てられる。
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - 7 から 42 への "hi" が 42 とエコーとして 7 の両方に届くこと
//! - 相手がオフラインでも送信者にはエコーが届くこと
//! - 編集・削除が会話の当事者だけに届くこと

use std::{collections::BTreeSet, sync::Arc};

use kizuna_shared::time::{Clock, millis_to_rfc3339};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    domain::{ConnectionId, ConnectionRegistry, MessagePusher, ServerEvent, UserId},
    infrastructure::store::ConnectionStore,
};

use super::error::ChatError;

/// 1:1 メッセージの入力
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrivateMessage {
    /// 未登録の接続から送る場合にだけ使われる送信者
    pub claimed_from: Option<UserId>,
    pub text: Option<String>,
    pub files: Vec<Value>,
    pub msg_id: Option<Value>,
    pub reply_to: Option<Value>,
}

/// 1:1 ファイル送信の入力
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileMessage {
    /// 未登録の接続から送る場合にだけ使われる送信者
    pub claimed_from: Option<UserId>,
    /// ファイル本体（データ URL など。中身は解釈しない）
    pub file: Value,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub msg_id: Option<Value>,
    pub preview: bool,
    pub reply_to: Option<Value>,
}

/// 配信の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub sender: UserId,
    /// 相手の端末に届いた数（0 なら相手はオフライン）
    pub delivered: usize,
}

fn new_msg_id() -> Value {
    Value::String(Uuid::new_v4().to_string())
}

/// チャットのユースケース
pub struct ChatUseCase {
    connections: ConnectionStore,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    clock: Arc<dyn Clock>,
}

impl ChatUseCase {
    pub fn new(
        connections: ConnectionStore,
        message_pusher: Arc<dyn MessagePusher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connections,
            message_pusher,
            clock,
        }
    }

    fn sender_of(registry: &ConnectionRegistry, connection: &ConnectionId) -> Result<UserId, ChatError> {
        registry
            .resolve_owner(connection)
            .ok_or(ChatError::SenderUnknown)
    }

    /// 2 人の全端末（重複なし）
    fn both_parties(registry: &ConnectionRegistry, a: &UserId, b: &UserId) -> Vec<ConnectionId> {
        let targets: BTreeSet<ConnectionId> = registry
            .resolve_devices(a)
            .into_iter()
            .chain(registry.resolve_devices(b))
            .collect();
        targets.into_iter().collect()
    }

    /// 1:1 メッセージを送る
    pub async fn send_private_message(
        &self,
        connection: ConnectionId,
        to: UserId,
        message: PrivateMessage,
    ) -> Result<Delivery, ChatError> {
        let content = message.text.unwrap_or_default();
        if content.trim().is_empty() && message.files.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let registry = self.connections.lock().await;
        let sender = registry
            .resolve_owner(&connection)
            .or(message.claimed_from)
            .ok_or(ChatError::SenderUnknown)?;

        let time = millis_to_rfc3339(self.clock.now_millis());
        let event = ServerEvent::ReceivePrivateMessage {
            msg_id: message.msg_id.unwrap_or_else(new_msg_id),
            sender: sender.clone(),
            recipient: to.clone(),
            content: content.clone(),
            files: message.files,
            time: time.clone(),
            reply_to: message.reply_to,
        };
        let delivered = self
            .deliver_direct(&registry, connection, &sender, &to, &event, content, time)
            .await;

        if delivered == 0 {
            tracing::info!("User '{}' is offline, message from '{}' echoed only", to, sender);
        } else {
            tracing::info!("Private message '{}' -> '{}' delivered", sender, to);
        }
        Ok(Delivery { sender, delivered })
    }

    /// 1:1 でファイルを送る
    pub async fn send_file(
        &self,
        connection: ConnectionId,
        to: UserId,
        file: FileMessage,
    ) -> Result<Delivery, ChatError> {
        if file.file.is_null() {
            return Err(ChatError::EmptyMessage);
        }

        let registry = self.connections.lock().await;
        let sender = registry
            .resolve_owner(&connection)
            .or(file.claimed_from)
            .ok_or(ChatError::SenderUnknown)?;

        let time = millis_to_rfc3339(self.clock.now_millis());
        let last_message = format!("[file: {}]", file.file_name.as_deref().unwrap_or_default());
        let event = ServerEvent::ReceiveFile {
            msg_id: file.msg_id.unwrap_or_else(new_msg_id),
            sender: sender.clone(),
            recipient: to.clone(),
            file: file.file,
            file_name: file.file_name,
            mime_type: file.mime_type,
            time: time.clone(),
            preview: file.preview,
            reply_to: file.reply_to,
        };
        let delivered = self
            .deliver_direct(&registry, connection, &sender, &to, &event, last_message, time)
            .await;

        tracing::info!("File '{}' -> '{}' reached {} devices", sender, to, delivered);
        Ok(Delivery { sender, delivered })
    }

    /// 相手の全端末と送信者の端末へ届け、双方の会話一覧を更新する
    ///
    /// 送信元の接続は未登録でもエコーの対象になる。戻り値は相手の端末に届いた数。
    #[allow(clippy::too_many_arguments)]
    async fn deliver_direct(
        &self,
        registry: &ConnectionRegistry,
        connection: ConnectionId,
        sender: &UserId,
        to: &UserId,
        event: &ServerEvent,
        last_message: String,
        time: String,
    ) -> usize {
        let recipient_devices = registry.resolve_devices(to);
        let mut echo_devices = registry.resolve_devices(sender);
        if !echo_devices.contains(&connection) {
            echo_devices.push(connection);
        }
        echo_devices.retain(|c| !recipient_devices.contains(c));

        let delivered = self
            .message_pusher
            .broadcast(&recipient_devices, event)
            .await;
        self.message_pusher.broadcast(&echo_devices, event).await;

        let for_recipient = ServerEvent::ConversationUpdated {
            user_id: sender.clone(),
            last_message: Some(last_message.clone()),
            time: Some(time.clone()),
            read: Some(false),
            typing: None,
        };
        self.message_pusher
            .broadcast(&recipient_devices, &for_recipient)
            .await;
        let for_sender = ServerEvent::ConversationUpdated {
            user_id: to.clone(),
            last_message: Some(last_message),
            time: Some(time),
            read: Some(true),
            typing: None,
        };
        self.message_pusher.broadcast(&echo_devices, &for_sender).await;
        delivered
    }

    /// メッセージの編集を当事者 2 人に届ける
    pub async fn edit_message(
        &self,
        connection: ConnectionId,
        to: UserId,
        message_id: Value,
        content: String,
    ) -> Result<Delivery, ChatError> {
        let registry = self.connections.lock().await;
        let sender = Self::sender_of(&registry, &connection)?;
        let event = ServerEvent::MessageEdited {
            message_id,
            content,
            by_user_id: sender.clone(),
        };
        let delivered = self
            .message_pusher
            .broadcast(&Self::both_parties(&registry, &sender, &to), &event)
            .await;
        Ok(Delivery { sender, delivered })
    }

    /// メッセージの削除を当事者 2 人に届ける
    pub async fn delete_message(
        &self,
        connection: ConnectionId,
        to: UserId,
        message_id: Value,
    ) -> Result<Delivery, ChatError> {
        let registry = self.connections.lock().await;
        let sender = Self::sender_of(&registry, &connection)?;
        let event = ServerEvent::MessageDeleted {
            message_id,
            by_user_id: sender.clone(),
        };
        let delivered = self
            .message_pusher
            .broadcast(&Self::both_parties(&registry, &sender, &to), &event)
            .await;
        Ok(Delivery { sender, delivered })
    }

    /// 入力中表示の開始・終了を相手に届ける（保持はしない）
    pub async fn typing(
        &self,
        connection: ConnectionId,
        to: UserId,
        typing: bool,
    ) -> Result<Delivery, ChatError> {
        let registry = self.connections.lock().await;
        let sender = Self::sender_of(&registry, &connection)?;
        let event = if typing {
            ServerEvent::UserTyping {
                from_user_id: sender.clone(),
            }
        } else {
            ServerEvent::UserStopTyping {
                from_user_id: sender.clone(),
            }
        };
        let devices = registry.resolve_devices(&to);
        let delivered = self.message_pusher.broadcast(&devices, &event).await;
        let updated = ServerEvent::ConversationUpdated {
            user_id: sender.clone(),
            last_message: None,
            time: None,
            read: None,
            typing: Some(typing),
        };
        self.message_pusher.broadcast(&devices, &updated).await;
        Ok(Delivery { sender, delivered })
    }

    /// 既読を相手に届け、自分の会話一覧を既読にする
    pub async fn mark_read(
        &self,
        connection: ConnectionId,
        to: UserId,
    ) -> Result<Delivery, ChatError> {
        let registry = self.connections.lock().await;
        let reader = Self::sender_of(&registry, &connection)?;
        let read = ServerEvent::MessagesRead {
            by_user_id: reader.clone(),
        };
        let delivered = self
            .message_pusher
            .broadcast(&registry.resolve_devices(&to), &read)
            .await;
        let updated = ServerEvent::ConversationUpdated {
            user_id: to,
            last_message: None,
            time: None,
            read: Some(true),
            typing: None,
        };
        self.message_pusher
            .broadcast(&registry.resolve_devices(&reader), &updated)
            .await;
        Ok(Delivery {
            sender: reader,
            delivered,
        })
    }

    /// 全接続へのブロードキャスト
    pub async fn broadcast(&self, connection: ConnectionId, content: String) -> Result<usize, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let registry = self.connections.lock().await;
        let event = ServerEvent::ReceiveBroadcastMessage {
            content,
            from: connection,
            from_user_id: registry.resolve_owner(&connection),
            time: millis_to_rfc3339(self.clock.now_millis()),
        };
        let delivered = self.message_pusher.broadcast_all(&event).await;
        tracing::info!("Broadcast from '{}' reached {} connections", connection, delivered);
        Ok(delivered)
    }

    /// 公開チャットを送信元以外の全接続へ中継する
    pub async fn relay_public(&self, connection: ConnectionId, message: Value) -> usize {
        let registry = self.connections.lock().await;
        let others: Vec<ConnectionId> = registry
            .attached()
            .into_iter()
            .filter(|c| c != &connection)
            .collect();
        self.message_pusher
            .broadcast(&others, &ServerEvent::NewMessage(message))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecase::test_support::{TestHub, drain, event_names, user};
    use serde_json::json;

    fn text(content: &str) -> PrivateMessage {
        PrivateMessage {
            text: Some(content.to_string()),
            ..PrivateMessage::default()
        }
    }

    #[tokio::test]
    async fn test_private_message_is_delivered_and_echoed() {
        // テスト項目: 7 から 42 への "hi" は 42 に届き、7 にも同じ内容がエコーされる
        // given (前提条件):
        let hub = TestHub::new();
        let (h1, mut rx42) = hub.registered("42").await;
        let (h7, mut rx7) = hub.registered("7").await;

        // when (操作):
        let delivery = hub
            .chat
            .send_private_message(h7, user("42"), text("hi"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(delivery.delivered, 1);
        let received = drain(&mut rx42);
        let echoed = drain(&mut rx7);
        assert_eq!(
            event_names(&received),
            vec!["receive-private-message", "conversation-updated"]
        );
        assert_eq!(received[0]["data"]["sender"], "7");
        assert_eq!(received[0]["data"]["recipient"], "42");
        assert_eq!(received[0]["data"]["content"], "hi");
        assert_eq!(echoed[0], received[0]);
        assert_eq!(received[1]["data"]["userId"], "7");
        assert_eq!(echoed[1]["data"]["userId"], "42");
        assert_ne!(h1, h7);
    }

    #[tokio::test]
    async fn test_private_message_to_offline_user_is_still_echoed() {
        // テスト項目: 相手がオフラインでも送信者にはエコーが届き、エラーにならない
        // given (前提条件):
        let hub = TestHub::new();
        let (h7, mut rx7) = hub.registered("7").await;

        // when (操作):
        let delivery = hub
            .chat
            .send_private_message(h7, user("42"), text("hi"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(delivery.delivered, 0);
        let echoed = drain(&mut rx7);
        assert_eq!(echoed[0]["event"], "receive-private-message");
    }

    #[tokio::test]
    async fn test_private_message_reaches_every_device() {
        // テスト項目: 相手の全端末と送信者の他の端末に届く
        // given (前提条件):
        let hub = TestHub::new();
        let (_phone, mut phone_rx) = hub.registered("42").await;
        let (_laptop, mut laptop_rx) = hub.registered("42").await;
        let (h7, _rx7) = hub.registered("7").await;
        let (_tablet7, mut tablet7_rx) = hub.registered("7").await;

        // when (操作):
        let delivery = hub
            .chat
            .send_private_message(h7, user("42"), text("hi"))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(delivery.delivered, 2);
        for rx in [&mut phone_rx, &mut laptop_rx, &mut tablet7_rx] {
            assert_eq!(drain(rx)[0]["data"]["content"], "hi");
        }
    }

    #[tokio::test]
    async fn test_unregistered_sender_uses_claimed_identity() {
        // テスト項目: 未登録の接続は fromUserId を名乗って送れ、その接続にエコーされる
        // given (前提条件):
        let hub = TestHub::new();
        let (_h42, mut rx42) = hub.registered("42").await;
        let (anonymous, mut anonymous_rx) = hub.connect().await;
        let message = PrivateMessage {
            claimed_from: Some(user("7")),
            ..text("hi")
        };

        // when (操作):
        hub.chat
            .send_private_message(anonymous, user("42"), message)
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(drain(&mut rx42)[0]["data"]["sender"], "7");
        assert_eq!(drain(&mut anonymous_rx)[0]["data"]["sender"], "7");
    }

    #[tokio::test]
    async fn test_empty_message_or_unknown_sender_is_rejected() {
        // テスト項目: 本文も添付も無いメッセージ、送信者不明のメッセージは破棄される
        // given (前提条件):
        let hub = TestHub::new();
        let (anonymous, mut anonymous_rx) = hub.connect().await;

        // when (操作):
        let empty = hub
            .chat
            .send_private_message(anonymous, user("42"), text("  "))
            .await;
        let unknown = hub
            .chat
            .send_private_message(anonymous, user("42"), text("hi"))
            .await;

        // then (期待する結果):
        assert_eq!(empty, Err(ChatError::EmptyMessage));
        assert_eq!(unknown, Err(ChatError::SenderUnknown));
        assert!(drain(&mut anonymous_rx).is_empty());
    }

    #[tokio::test]
    async fn test_edit_reaches_only_the_two_parties() {
        // テスト項目: 編集は会話の当事者だけに届く
        // given (前提条件):
        let hub = TestHub::new();
        let (h7, mut rx7) = hub.registered("7").await;
        let (_h42, mut rx42) = hub.registered("42").await;
        let (_h99, mut rx99) = hub.registered("99").await;

        // when (操作):
        hub.chat
            .edit_message(h7, user("42"), json!("m-1"), "fixed".to_string())
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(event_names(&drain(&mut rx7)), vec!["message-edited"]);
        let edited = drain(&mut rx42);
        assert_eq!(edited[0]["data"]["messageId"], "m-1");
        assert_eq!(edited[0]["data"]["content"], "fixed");
        assert!(drain(&mut rx99).is_empty());
    }

    #[tokio::test]
    async fn test_typing_and_read_receipts_are_signals() {
        // テスト項目: 入力中は相手の会話一覧にも反映され、既読は自分の会話一覧も更新する
        // given (前提条件):
        let hub = TestHub::new();
        let (h7, mut rx7) = hub.registered("7").await;
        let (_h42, mut rx42) = hub.registered("42").await;

        // when (操作):
        hub.chat.typing(h7, user("42"), true).await.unwrap();
        hub.chat.typing(h7, user("42"), false).await.unwrap();
        hub.chat.mark_read(h7, user("42")).await.unwrap();

        // then (期待する結果):
        let received = drain(&mut rx42);
        assert_eq!(
            event_names(&received),
            vec![
                "user-typing",
                "conversation-updated",
                "user-stop-typing",
                "conversation-updated",
                "messages-read"
            ]
        );
        assert_eq!(received[1]["data"], json!({"userId": "7", "typing": true}));
        assert_eq!(received[3]["data"], json!({"userId": "7", "typing": false}));
        let own = drain(&mut rx7);
        assert_eq!(event_names(&own), vec!["conversation-updated"]);
        assert_eq!(own[0]["data"]["read"], true);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        // テスト項目: ブロードキャストは登録の有無に関わらず全接続に届く
        // given (前提条件):
        let hub = TestHub::new();
        let (h7, mut rx7) = hub.registered("7").await;
        let (_anonymous, mut anonymous_rx) = hub.connect().await;

        // when (操作):
        let delivered = hub.chat.broadcast(h7, "hello all".to_string()).await.unwrap();

        // then (期待する結果):
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx7)[0]["event"], "receive-broadcast-message");
        assert_eq!(drain(&mut anonymous_rx)[0]["data"]["fromUserId"], "7");
    }

    #[tokio::test]
    async fn test_file_is_delivered_with_preview_and_reply() {
        // テスト項目: ファイルは相手と送信者に届き、会話一覧にはファイル名が表示される
        // given (前提条件):
        let hub = TestHub::new();
        let (h7, mut rx7) = hub.registered("7").await;
        let (_h42, mut rx42) = hub.registered("42").await;
        let file = FileMessage {
            file: json!("data:image/png;base64,AAA"),
            file_name: Some("cat.png".to_string()),
            mime_type: Some("image/png".to_string()),
            preview: true,
            reply_to: Some(json!(12)),
            ..FileMessage::default()
        };

        // when (操作):
        let delivery = hub.chat.send_file(h7, user("42"), file).await.unwrap();

        // then (期待する結果):
        assert_eq!(delivery.delivered, 1);
        let received = drain(&mut rx42);
        assert_eq!(
            event_names(&received),
            vec!["receive-file", "conversation-updated"]
        );
        let data = &received[0]["data"];
        assert_eq!(data["sender"], "7");
        assert_eq!(data["fileName"], "cat.png");
        assert_eq!(data["mimeType"], "image/png");
        assert_eq!(data["preview"], true);
        assert_eq!(data["replyTo"], 12);
        assert_eq!(received[1]["data"]["lastMessage"], "[file: cat.png]");
        assert_eq!(received[1]["data"]["read"], false);
        let echoed = drain(&mut rx7);
        assert_eq!(echoed[0], received[0]);
        assert_eq!(echoed[1]["data"]["userId"], "42");
    }

    #[tokio::test]
    async fn test_file_without_content_or_sender_is_rejected() {
        // テスト項目: ファイル本体が無い、または送信者不明のファイル送信は破棄される
        // given (前提条件):
        let hub = TestHub::new();
        let (anonymous, mut anonymous_rx) = hub.connect().await;
        let (_h42, mut rx42) = hub.registered("42").await;

        // when (操作):
        let empty = hub
            .chat
            .send_file(anonymous, user("42"), FileMessage::default())
            .await;
        let unknown = hub
            .chat
            .send_file(
                anonymous,
                user("42"),
                FileMessage {
                    file: json!("data:,x"),
                    ..FileMessage::default()
                },
            )
            .await;

        // then (期待する結果):
        assert_eq!(empty, Err(ChatError::EmptyMessage));
        assert_eq!(unknown, Err(ChatError::SenderUnknown));
        assert!(drain(&mut anonymous_rx).is_empty());
        assert!(drain(&mut rx42).is_empty());
    }

    #[tokio::test]
    async fn test_public_message_skips_sender() {
        // テスト項目: 公開チャットは送信元以外の全接続へそのまま届く
        // given (前提条件):
        let hub = TestHub::new();
        let (h7, mut rx7) = hub.registered("7").await;
        let (_h42, mut rx42) = hub.registered("42").await;
        let (_anonymous, mut anonymous_rx) = hub.connect().await;

        // when (操作):
        let delivered = hub.chat.relay_public(h7, json!({"text": "salut"})).await;

        // then (期待する結果):
        assert_eq!(delivered, 2);
        assert!(drain(&mut rx7).is_empty());
        for rx in [&mut rx42, &mut anonymous_rx] {
            let events = drain(rx);
            assert_eq!(event_names(&events), vec!["new-message"]);
            assert_eq!(events[0]["data"]["text"], "salut");
        }
    }
}

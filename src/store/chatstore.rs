// store/chatstore.rs
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::feed::{EventKind, EventPayload};
use super::store::{StoreClient, StoreError};
use crate::models::chatmodel::Message;

#[async_trait]
pub trait ChatStoreExt {
    async fn insert_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: String,
    ) -> Result<Message, StoreError>;

    /// Conversation between two users in insertion order.
    async fn messages_between(&self, user_one_id: Uuid, user_two_id: Uuid) -> Vec<Message>;

    /// Flip the read flag on every unread message from `counterparty_id`
    /// addressed to `viewer_id`. One `MessageRead` event per flipped row.
    async fn mark_messages_read(&self, viewer_id: Uuid, counterparty_id: Uuid) -> Vec<Message>;
}

#[async_trait]
impl ChatStoreExt for StoreClient {
    async fn insert_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: String,
    ) -> Result<Message, StoreError> {
        let mut tables = self.tables.write().await;

        if !tables.users.contains_key(&sender_id) {
            return Err(StoreError::RowNotFound("user", sender_id));
        }
        if !tables.users.contains_key(&receiver_id) {
            return Err(StoreError::RowNotFound("user", receiver_id));
        }

        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content,
            read: false,
            created_at: Utc::now(),
        };
        tables.messages.push(message.clone());
        self.feed().append(
            EventKind::MessageCreated,
            EventPayload::Message(message.clone()),
        );

        Ok(message)
    }

    async fn messages_between(&self, user_one_id: Uuid, user_two_id: Uuid) -> Vec<Message> {
        self.tables
            .read()
            .await
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == user_one_id && m.receiver_id == user_two_id)
                    || (m.sender_id == user_two_id && m.receiver_id == user_one_id)
            })
            .cloned()
            .collect()
    }

    async fn mark_messages_read(&self, viewer_id: Uuid, counterparty_id: Uuid) -> Vec<Message> {
        let mut tables = self.tables.write().await;
        let mut flipped = Vec::new();

        for message in tables.messages.iter_mut() {
            if message.receiver_id == viewer_id
                && message.sender_id == counterparty_id
                && !message.read
            {
                message.read = true;
                let snapshot = message.clone();
                self.feed().append(
                    EventKind::MessageRead,
                    EventPayload::Message(snapshot.clone()),
                );
                flipped.push(snapshot);
            }
        }

        flipped
    }
}

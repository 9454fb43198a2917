use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use agentry_core::{ChatMessage, Memory, MemorySnapshot, Result};

/// Append-only conversation buffer. Clones share the same buffer.
#[derive(Debug, Default)]
pub struct BufferMemory {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl BufferMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages: Arc::new(RwLock::new(messages)),
        }
    }

    /// Copy of the buffer without going through the async interface.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }
}

impl Clone for BufferMemory {
    fn clone(&self) -> Self {
        Self {
            messages: Arc::clone(&self.messages),
        }
    }
}

#[async_trait]
impl Memory for BufferMemory {
    async fn add_message(&self, message: ChatMessage) -> Result<()> {
        let mut messages = self.messages.write();
        debug!(role = ?message.role, position = messages.len(), "memory append");
        messages.push(message);
        Ok(())
    }

    async fn get_messages(&self, limit: Option<usize>) -> Result<Vec<ChatMessage>> {
        let messages = self.messages.read();
        match limit {
            Some(n) => {
                let start = messages.len().saturating_sub(n);
                Ok(messages[start..].to_vec())
            }
            None => Ok(messages.clone()),
        }
    }

    async fn clear(&self) -> Result<()> {
        self.messages.write().clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.messages.read().len()
    }

    async fn restore(&self, snapshot: MemorySnapshot) -> Result<()> {
        *self.messages.write() = snapshot.messages;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_core::Role;

    #[tokio::test]
    async fn test_add_and_get_messages() {
        let memory = BufferMemory::new();

        memory.add_message(ChatMessage::user("hello")).await.unwrap();
        memory.add_message(ChatMessage::assistant("world")).await.unwrap();

        let messages = memory.get_messages(None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_no_eviction() {
        let memory = BufferMemory::new();
        for i in 0..50 {
            memory
                .add_message(ChatMessage::user(format!("msg{}", i)))
                .await
                .unwrap();
        }
        assert_eq!(memory.len(), 50);
        assert_eq!(memory.messages()[0].content, "msg0");
    }

    #[tokio::test]
    async fn test_get_messages_with_limit() {
        let memory = BufferMemory::new();
        for i in 0..5 {
            memory
                .add_message(ChatMessage::user(format!("msg{}", i)))
                .await
                .unwrap();
        }

        let messages = memory.get_messages(Some(2)).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "msg3");
        assert_eq!(messages[1].content, "msg4");
    }

    #[tokio::test]
    async fn test_clear() {
        let memory = BufferMemory::new();

        memory.add_message(ChatMessage::user("test")).await.unwrap();
        assert!(!memory.is_empty());

        memory.clear().await.unwrap();
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let memory1 = BufferMemory::new();
        let memory2 = memory1.clone();

        memory1
            .add_message(ChatMessage::user("from memory1"))
            .await
            .unwrap();

        let messages = memory2.get_messages(None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "from memory1");
    }

    #[tokio::test]
    async fn test_snapshot_restore() {
        let memory = BufferMemory::with_messages(vec![
            ChatMessage::user("msg1"),
            ChatMessage::assistant("msg2"),
        ]);

        let snapshot = memory.snapshot().await.unwrap();
        assert_eq!(snapshot.messages.len(), 2);

        memory.clear().await.unwrap();
        assert!(memory.is_empty());

        memory.restore(snapshot).await.unwrap();
        let messages = memory.get_messages(None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "msg1");
    }
}

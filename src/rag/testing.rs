use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;

use crate::model::{Document, RankedList, ScoredDocument};
use crate::providers::{ChatMessage, ChatModel, Retriever};

/// Chat double that replays scripted replies in call order and records every
/// prompt it receives.
pub(crate) struct ScriptedChat {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    delay: Option<Duration>,
}

impl ScriptedChat {
    pub(crate) fn new(replies: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
            delay: None,
        })
    }

    pub(crate) fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|reply| Ok(*reply)).collect())
    }

    pub(crate) fn failing(message: &str) -> Arc<Self> {
        Self::new(vec![Err(message)])
    }

    pub(crate) fn slow(delay: Duration, replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|reply| Ok(reply.to_string())).collect()),
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
        })
    }

    pub(crate) fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.calls.lock().expect("calls lock").push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().expect("replies lock").pop_front();
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => bail!("{message}"),
            None => Err(anyhow!("no scripted chat reply left")),
        }
    }
}

/// Retriever double keyed by query text. Unknown queries return nothing.
#[derive(Default)]
pub(crate) struct StaticRetriever {
    lists: HashMap<String, RankedList>,
    failures: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    searched: Mutex<Vec<(String, usize)>>,
}

impl StaticRetriever {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_list(mut self, query: &str, ids: &[&str]) -> Self {
        let list = ids
            .iter()
            .enumerate()
            .map(|(index, id)| ScoredDocument::new(passage(id), 1.0 - index as f64 * 0.05))
            .collect();
        self.lists.insert(query.to_string(), list);
        self
    }

    pub(crate) fn with_failure(mut self, query: &str, message: &str) -> Self {
        self.failures.insert(query.to_string(), message.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }

    pub(crate) fn searched(&self) -> Vec<(String, usize)> {
        self.searched.lock().expect("searched lock").clone()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<RankedList> {
        self.searched
            .lock()
            .expect("searched lock")
            .push((query.to_string(), k));

        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(query) {
            bail!("{message}");
        }

        let mut list = self.lists.get(query).cloned().unwrap_or_default();
        list.truncate(k);
        Ok(list)
    }
}

pub(crate) fn passage(id: &str) -> Document {
    Document::new(format!("Passage {id}.")).with_id(id)
}

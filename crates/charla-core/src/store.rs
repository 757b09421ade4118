//! The conversation store: the only place messages are appended.
//!
//! `submit` appends the user message synchronously and hands the prompt to a
//! background task. Finished calls come back over a channel and are applied
//! with [`ConversationStore::drain_completed`] (non-blocking, for event
//! loops) or [`ConversationStore::next_answer`] (awaits one completion).
//! Each completion appends exactly one assistant message. Every append is
//! followed by a best-effort save of the whole conversation.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::ai::AnswerSource;
use crate::persistence::Persistence;
use crate::state::{ChatMessage, Conversation, ERROR_REPLY};
use crate::storage::Storage;

/// How overlapping submissions are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitPolicy {
    /// Every submission calls out immediately. Replies land in completion
    /// order, so two overlapping turns may get each other's slot.
    #[default]
    Concurrent,
    /// One call in flight at a time; later prompts wait in a FIFO queue and
    /// replies land in submission order.
    Serialized,
}

struct Completion {
    ticket: u64,
    result: anyhow::Result<String>,
}

pub struct ConversationStore<S: Storage> {
    conversation: Conversation,
    persistence: Persistence<S>,
    source: Arc<dyn AnswerSource>,
    policy: SubmitPolicy,
    in_flight: usize,
    queued: VecDeque<(u64, String)>,
    next_ticket: u64,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl<S: Storage> ConversationStore<S> {
    /// Restore the persisted conversation. An unreadable or corrupt slot
    /// starts an empty conversation instead of failing.
    pub fn initialize(persistence: Persistence<S>, source: Arc<dyn AnswerSource>) -> Self {
        let conversation = match persistence.load() {
            Ok(conversation) => {
                debug!(messages = conversation.len(), "Restored conversation");
                conversation
            }
            Err(e) => {
                warn!(error = %e, "Discarding stored conversation, starting empty");
                Conversation::new()
            }
        };

        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Self {
            conversation,
            persistence,
            source,
            policy: SubmitPolicy::default(),
            in_flight: 0,
            queued: VecDeque::new(),
            next_ticket: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn with_policy(mut self, policy: SubmitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SubmitPolicy {
        self.policy
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.conversation.messages()
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    /// True while any submission has not yet received its reply
    pub fn is_awaiting(&self) -> bool {
        self.pending() > 0
    }

    /// Submissions still waiting for a reply, in flight or queued
    pub fn pending(&self) -> usize {
        self.in_flight + self.queued.len()
    }

    /// Append `text` as a user message and start the remote call.
    ///
    /// Blank input is ignored and returns `false`. Must be called from within
    /// a tokio runtime.
    pub fn submit(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        self.append(ChatMessage::user(text));

        let ticket = self.next_ticket;
        self.next_ticket += 1;

        if self.policy == SubmitPolicy::Serialized && self.in_flight > 0 {
            debug!(ticket, queued = self.queued.len() + 1, "Queueing submission");
            self.queued.push_back((ticket, text.to_string()));
        } else {
            self.dispatch(ticket, text.to_string());
        }
        true
    }

    /// Apply every completion that has already arrived. Returns how many
    /// assistant messages were appended.
    pub fn drain_completed(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.complete(completion);
            applied += 1;
        }
        applied
    }

    /// Wait for the next completion and return the assistant message it
    /// appended. Returns `None` when nothing is pending.
    pub async fn next_answer(&mut self) -> Option<&ChatMessage> {
        if self.in_flight == 0 {
            return None;
        }
        let completion = self.completions_rx.recv().await?;
        self.complete(completion);
        self.conversation.last()
    }

    fn dispatch(&mut self, ticket: u64, prompt: String) {
        debug!(ticket, "Dispatching remote answer call");
        self.in_flight += 1;

        let source = Arc::clone(&self.source);
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = source.answer(&prompt).await;
            // The receiver lives as long as the store; a send error only means
            // the store was dropped mid-call.
            let _ = tx.send(Completion { ticket, result });
        });
    }

    fn complete(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);

        let reply = match completion.result {
            Ok(text) => {
                debug!(ticket = completion.ticket, "Remote answer received");
                ChatMessage::assistant(text)
            }
            Err(e) => {
                warn!(ticket = completion.ticket, error = %e, "Remote answer call failed");
                ChatMessage::assistant(ERROR_REPLY)
            }
        };
        self.append(reply);

        if self.in_flight == 0 {
            if let Some((ticket, prompt)) = self.queued.pop_front() {
                self.dispatch(ticket, prompt);
            }
        }
    }

    fn append(&mut self, message: ChatMessage) {
        self.conversation.push(message);
        if let Err(e) = self.persistence.save(&self.conversation) {
            warn!(error = %e, "Failed to save conversation");
        }
    }
}

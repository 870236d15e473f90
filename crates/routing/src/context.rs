//! Per-conversation handler context and the store that owns it.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use {
    serde::{Serialize, de::DeserializeOwned},
    synebot_channels::{Channel, ConversationKind, Directory, Group, InboundEvent, User},
    tracing::debug,
};

/// Identifies one context: `author@conversation:slot`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(String);

impl ContextKey {
    pub fn new(author: &str, conversation: &str, slot: &str) -> Self {
        Self(format!("{author}@{conversation}:{slot}"))
    }

    pub fn for_event(event: &InboundEvent, slot: &str) -> Self {
        Self::new(&event.user, &event.channel, slot)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State one handler keeps for one author in one conversation.
///
/// Identities are resolved once when the context is created and are not
/// refreshed on later turns.
#[derive(Debug, Clone)]
pub struct Context {
    key: ContextKey,
    kind: ConversationKind,
    /// Author of the messages, if known to the directory.
    pub user: Option<User>,
    /// Set only for channel conversations.
    pub channel: Option<Channel>,
    /// Set only for group conversations.
    pub group: Option<Group>,
    events: VecDeque<InboundEvent>,
    /// Handler-owned state. `Null` until the handler writes to it.
    pub state: serde_json::Value,
    created_at: Instant,
    last_active: Instant,
}

impl Context {
    fn create(
        key: ContextKey,
        event: &InboundEvent,
        directory: &dyn Directory,
        now: Instant,
    ) -> Self {
        let kind = event.conversation_kind();
        let (channel, group) = match kind {
            ConversationKind::Channel => (directory.channel(&event.channel).cloned(), None),
            ConversationKind::Group => (None, directory.group(&event.channel).cloned()),
            ConversationKind::Direct | ConversationKind::Unknown => (None, None),
        };
        Self {
            key,
            kind,
            user: directory.user(&event.user).cloned(),
            channel,
            group,
            events: VecDeque::new(),
            state: serde_json::Value::Null,
            created_at: now,
            last_active: now,
        }
    }

    pub fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn kind(&self) -> ConversationKind {
        self.kind
    }

    pub fn is_direct(&self) -> bool {
        self.kind.is_direct()
    }

    pub fn is_channel(&self) -> bool {
        self.kind.is_channel()
    }

    pub fn is_group(&self) -> bool {
        self.kind.is_group()
    }

    /// Events seen in this conversation, oldest first.
    pub fn events(&self) -> impl ExactSizeIterator<Item = &InboundEvent> {
        self.events.iter()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// The event currently being handled.
    pub fn latest_event(&self) -> Option<&InboundEvent> {
        self.events.back()
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_active(&self) -> Instant {
        self.last_active
    }

    /// Decode the handler state, or `None` if unset or of another shape.
    pub fn typed_state<T: DeserializeOwned>(&self) -> Option<T> {
        if self.state.is_null() {
            return None;
        }
        serde_json::from_value(self.state.clone()).ok()
    }

    pub fn set_state<T: Serialize>(&mut self, state: &T) -> serde_json::Result<()> {
        self.state = serde_json::to_value(state)?;
        Ok(())
    }

    fn push_event(&mut self, event: &InboundEvent, max_history: usize, now: Instant) {
        self.events.push_back(event.clone());
        if max_history > 0 {
            while self.events.len() > max_history {
                self.events.pop_front();
            }
        }
        self.last_active = now;
    }
}

/// Bounds on what the store keeps in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    /// Events kept per context, oldest dropped first. `0` keeps everything.
    pub max_history: usize,
    /// Contexts idle for longer than this are dropped by
    /// [`ContextStore::evict_idle`]. `None` keeps them forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_history: 50,
            idle_timeout: Some(Duration::from_secs(60 * 60)),
        }
    }
}

impl ContextLimits {
    pub fn unbounded() -> Self {
        Self {
            max_history: 0,
            idle_timeout: None,
        }
    }
}

/// A context handed out by [`ContextStore::resolve_or_create`].
#[derive(Debug)]
pub enum Resolved<'a> {
    /// Already in the store; mutations land in place.
    Stored(&'a mut Context),
    /// Built for this event and not stored yet.
    Fresh(Context),
}

impl Resolved<'_> {
    pub fn context(&self) -> &Context {
        match self {
            Self::Stored(ctx) => ctx,
            Self::Fresh(ctx) => ctx,
        }
    }

    pub fn context_mut(&mut self) -> &mut Context {
        match self {
            Self::Stored(ctx) => ctx,
            Self::Fresh(ctx) => ctx,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// In-memory map of live contexts. Only the dispatcher writes to it.
#[derive(Debug, Default)]
pub struct ContextStore {
    contexts: HashMap<ContextKey, Context>,
    limits: ContextLimits,
}

impl ContextStore {
    pub fn new(limits: ContextLimits) -> Self {
        Self {
            contexts: HashMap::new(),
            limits,
        }
    }

    pub fn limits(&self) -> ContextLimits {
        self.limits
    }

    /// Look up the context for `(author, conversation, slot)` or build a new
    /// one, then append `event` to its history.
    ///
    /// A fresh context is not inserted; hand it to [`Self::retain`] to keep it.
    pub fn resolve_or_create(
        &mut self,
        event: &InboundEvent,
        slot: &str,
        directory: &dyn Directory,
    ) -> Resolved<'_> {
        self.resolve_or_create_at(event, slot, directory, Instant::now())
    }

    pub fn resolve_or_create_at(
        &mut self,
        event: &InboundEvent,
        slot: &str,
        directory: &dyn Directory,
        now: Instant,
    ) -> Resolved<'_> {
        let key = ContextKey::for_event(event, slot);
        let max_history = self.limits.max_history;
        match self.contexts.get_mut(&key) {
            Some(ctx) => {
                ctx.push_event(event, max_history, now);
                Resolved::Stored(ctx)
            },
            None => {
                debug!(key = %key, "creating context");
                let mut ctx = Context::create(key, event, directory, now);
                ctx.push_event(event, max_history, now);
                Resolved::Fresh(ctx)
            },
        }
    }

    /// Insert or overwrite a context under its own key.
    pub fn retain(&mut self, context: Context) {
        self.contexts.insert(context.key.clone(), context);
    }

    /// Remove a context. Absent keys are ignored.
    pub fn evict(&mut self, key: &ContextKey) -> Option<Context> {
        self.contexts.remove(key)
    }

    /// Drop every context idle for longer than the configured timeout.
    /// Returns the number removed.
    pub fn evict_idle(&mut self, now: Instant) -> usize {
        let Some(timeout) = self.limits.idle_timeout else {
            return 0;
        };
        let before = self.contexts.len();
        self.contexts
            .retain(|_, ctx| now.saturating_duration_since(ctx.last_active) <= timeout);
        before - self.contexts.len()
    }

    pub fn get(&self, key: &ContextKey) -> Option<&Context> {
        self.contexts.get(key)
    }

    pub fn contains(&self, key: &ContextKey) -> bool {
        self.contexts.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

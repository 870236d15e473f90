use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A workspace member as listed by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    /// Deactivated accounts stay listed but can never be the bot.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Bot integration id; present only on bot users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
}

/// A public channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A private group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Read-only lookup of known users, channels and groups.
pub trait Directory: Send + Sync {
    fn user(&self, id: &str) -> Option<&User>;
    fn channel(&self, id: &str) -> Option<&Channel>;
    fn group(&self, id: &str) -> Option<&Group>;
    fn users(&self) -> Vec<&User>;
}

/// Directory snapshot taken when the transport connects.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
    groups: HashMap<String, Group>,
}

impl DirectorySnapshot {
    pub fn new(
        users: impl IntoIterator<Item = User>,
        channels: impl IntoIterator<Item = Channel>,
        groups: impl IntoIterator<Item = Group>,
    ) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
            channels: channels.into_iter().map(|c| (c.id.clone(), c)).collect(),
            groups: groups.into_iter().map(|g| (g.id.clone(), g)).collect(),
        }
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Directory for DirectorySnapshot {
    fn user(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.get(id)
    }

    fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    fn users(&self) -> Vec<&User> {
        self.users.values().collect()
    }
}

/// The bot's own user record, needed to recognise mentions and self-messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub name: String,
    pub bot_id: Option<String>,
}

impl BotIdentity {
    /// Find the bot's user by name.
    ///
    /// Deleted users are skipped. When several live users share the name,
    /// bot accounts win, then the lowest user id, so the choice does not
    /// depend on directory order. Dispatching without a resolved identity
    /// would misclassify mentions and the bot's own messages, so a miss is
    /// an error.
    pub fn resolve(directory: &dyn Directory, name: &str) -> Result<Self> {
        directory
            .users()
            .into_iter()
            .filter(|user| user.name == name && !user.deleted)
            .min_by(|a, b| b.is_bot.cmp(&a.is_bot).then_with(|| a.id.cmp(&b.id)))
            .map(Self::from_user)
            .ok_or_else(|| Error::unknown_bot_user(name))
    }

    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            name: user.name.clone(),
            bot_id: user.profile.bot_id.clone(),
        }
    }

    /// Formatted reference the platform inserts when someone mentions the bot.
    pub fn mention_token(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

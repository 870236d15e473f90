//! Minimal Slack Web API client.
//!
//! Only the handful of methods the bot needs: identity check, directory
//! listing, Socket Mode URL negotiation and posting messages.

use {
    reqwest::RequestBuilder,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    synebot_channels::{Channel, DirectorySnapshot, Group, ReplyOptions, User},
    synebot_config::SlackConfig,
    tracing::debug,
};

use crate::{Error, Result};

/// Page size for cursor-paginated list methods.
const PAGE_LIMIT: u32 = 200;

/// Conversation types the bot can be a member of, excluding IMs.
const CONVERSATION_TYPES: &str = "public_channel,private_channel,mpim";

/// Result of `auth.test`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthInfo {
    pub user_id: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

/// Result of `chat.postMessage`.
#[derive(Debug, Clone, Deserialize)]
pub struct PostedMessage {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(alias = "members", alias = "channels", default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct Conversation {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpen {
    url: String,
}

#[derive(Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(flatten)]
    options: &'a ReplyOptions,
}

/// Web API client bound to one bot installation.
#[derive(Clone)]
pub struct SlackApi {
    http: reqwest::Client,
    base_url: String,
    bot_token: Secret<String>,
    app_token: Secret<String>,
}

impl std::fmt::Debug for SlackApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SlackApi {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: Secret<String>,
        app_token: Secret<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token,
            app_token,
        }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(
            config.api_base_url.clone(),
            config.bot_token.clone(),
            config.app_token.clone(),
        )
    }

    fn request(&self, method: &str, token: &Secret<String>) -> RequestBuilder {
        self.http
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(token.expose_secret())
    }

    async fn send<T: DeserializeOwned>(method: &str, request: RequestBuilder) -> Result<T> {
        let response = request.send().await?.error_for_status()?;
        let value: serde_json::Value = response.json().await?;
        parse_response(method, value)
    }

    /// Fetch every page of a cursor-paginated list method.
    async fn list_all<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut form: Vec<(&str, String)> = params
                .iter()
                .map(|(k, v)| (*k, (*v).to_string()))
                .collect();
            form.push(("limit", PAGE_LIMIT.to_string()));
            if !cursor.is_empty() {
                form.push(("cursor", cursor.clone()));
            }

            let page: Page<T> =
                Self::send(method, self.request(method, &self.bot_token).form(&form)).await?;
            items.extend(page.items);

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                break;
            }
            debug!(method, "fetching next page");
        }
        Ok(items)
    }

    /// Identify the bot token's user.
    pub async fn auth_test(&self) -> Result<AuthInfo> {
        Self::send("auth.test", self.request("auth.test", &self.bot_token)).await
    }

    pub async fn users_list(&self) -> Result<Vec<User>> {
        self.list_all("users.list", &[]).await
    }

    /// List conversations the bot can see, split into channels and private
    /// groups by their id prefix.
    pub async fn conversations_list(&self) -> Result<(Vec<Channel>, Vec<Group>)> {
        let conversations: Vec<Conversation> = self
            .list_all("conversations.list", &[
                ("types", CONVERSATION_TYPES),
                ("exclude_archived", "true"),
            ])
            .await?;

        let mut channels = Vec::new();
        let mut groups = Vec::new();
        for conv in conversations {
            if conv.id.starts_with('G') {
                groups.push(Group {
                    id: conv.id,
                    name: conv.name,
                });
            } else {
                channels.push(Channel {
                    id: conv.id,
                    name: conv.name,
                });
            }
        }
        Ok((channels, groups))
    }

    /// Users, channels and groups in one snapshot.
    pub async fn directory(&self) -> Result<DirectorySnapshot> {
        let users = self.users_list().await?;
        let (channels, groups) = self.conversations_list().await?;
        Ok(DirectorySnapshot::new(users, channels, groups))
    }

    /// Ask for a Socket Mode WebSocket URL. Uses the app-level token.
    pub async fn open_connection(&self) -> Result<String> {
        let open: ConnectionsOpen = Self::send(
            "apps.connections.open",
            self.request("apps.connections.open", &self.app_token),
        )
        .await?;
        Ok(open.url)
    }

    pub async fn chat_post_message(
        &self,
        channel: &str,
        text: &str,
        options: &ReplyOptions,
    ) -> Result<PostedMessage> {
        let body = PostMessage {
            channel,
            text,
            options,
        };
        Self::send(
            "chat.postMessage",
            self.request("chat.postMessage", &self.bot_token).json(&body),
        )
        .await
    }
}

fn parse_response<T: DeserializeOwned>(method: &str, value: serde_json::Value) -> Result<T> {
    if value.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
        let code = value
            .get("error")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown_error");
        return Err(Error::api(method, code));
    }
    Ok(serde_json::from_value(value)?)
}

//! Programmatic client for the chat API: a REST client plus a reconnecting
//! gateway socket.

mod socket;

use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::{AuthResponse, LoginRequest, RegisterRequest},
    messages::SendMessageRequest,
    models::{Message, Room, User},
    rooms::{NewRoomRequest, PrivateRoomRequest},
};

pub use socket::{ConnectionState, ReconnectPolicy, SocketClient};

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> ApiClient {
        ApiClient {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    /// A socket client authenticated with this client's token.
    pub fn socket(&self, policy: ReconnectPolicy) -> anyhow::Result<SocketClient> {
        let token = self.token.as_deref().context("not logged in")?;
        Ok(SocketClient::new(&self.base_url, token, policy))
    }

    /// Logs in and keeps the returned token for later calls.
    pub async fn login(&mut self, username: &str, password: &str) -> anyhow::Result<AuthResponse> {
        let body = LoginRequest { username: username.to_owned(), password: password.to_owned() };
        let auth: AuthResponse = self.send(self.request(Method::POST, "/api/auth/login").json(&body)).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn register(
        &mut self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> anyhow::Result<AuthResponse> {
        let body = RegisterRequest {
            username: username.to_owned(),
            password: password.to_owned(),
            display_name: display_name.map(str::to_owned),
        };
        let auth: AuthResponse = self.send(self.request(Method::POST, "/api/auth/register").json(&body)).await?;
        self.token = Some(auth.token.clone());
        Ok(auth)
    }

    pub async fn me(&self) -> anyhow::Result<User> {
        self.send(self.request(Method::GET, "/api/auth/me")).await
    }

    pub async fn rooms(&self) -> anyhow::Result<Vec<Room>> {
        self.send(self.request(Method::GET, "/api/rooms")).await
    }

    pub async fn create_room(&self, name: &str, participants: &[Uuid]) -> anyhow::Result<Room> {
        let body = NewRoomRequest { name: name.to_owned(), participants: participants.to_vec() };
        self.send(self.request(Method::POST, "/api/rooms").json(&body)).await
    }

    pub async fn private_room(&self, user_id: Uuid) -> anyhow::Result<Room> {
        self.send(self.request(Method::POST, "/api/rooms/private").json(&PrivateRoomRequest { user_id }))
            .await
    }

    pub async fn messages(
        &self,
        room_id: Uuid,
        limit: Option<i64>,
        before: Option<Uuid>,
    ) -> anyhow::Result<Vec<Message>> {
        #[derive(Serialize)]
        struct Page {
            #[serde(skip_serializing_if = "Option::is_none")]
            limit: Option<i64>,
            #[serde(skip_serializing_if = "Option::is_none")]
            before: Option<Uuid>,
        }

        let req = self
            .request(Method::GET, &format!("/api/rooms/{room_id}/messages"))
            .query(&Page { limit, before });
        self.send(req).await
    }

    pub async fn send_message(&self, room_id: Uuid, body: &str) -> anyhow::Result<Message> {
        let req = self
            .request(Method::POST, &format!("/api/rooms/{room_id}/messages"))
            .json(&SendMessageRequest { body: body.to_owned() });
        self.send(req).await
    }

    pub async fn mark_read(&self, message_id: Uuid) -> anyhow::Result<()> {
        let res = self
            .request(Method::POST, &format!("/api/messages/{message_id}/read"))
            .send()
            .await?;
        check(res).await?;
        Ok(())
    }

    pub async fn unread(&self) -> anyhow::Result<BTreeMap<Uuid, i64>> {
        self.send(self.request(Method::GET, "/api/unread")).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> anyhow::Result<T> {
        let res = check(req.send().await?).await?;
        Ok(res.json().await?)
    }
}

/// Turns a non-success response into an error carrying the server's message.
async fn check(res: Response) -> anyhow::Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(anyhow!("{status}: {message}"))
}

/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

//! Redfish authentication: HTTP Basic plus token sessions minted by the
//! SessionService. Tokens ride in `X-Auth-Token` (or `Authorization: Bearer`)
//! and idle sessions are swept in the background.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::json::JsonExt;

use super::{error_body, RedfishState};

pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
    pub session_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "password".to_string(),
            session_timeout: SESSION_IDLE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedfishSession {
    pub id: String,
    pub token: String,
    pub username: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug)]
struct StoredSession {
    session: RedfishSession,
    last_access: Instant,
}

#[derive(Debug)]
pub struct SessionStore {
    config: AuthConfig,
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl SessionStore {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Mint a session if the credentials match.
    pub fn create(&self, username: &str, password: &str) -> Option<RedfishSession> {
        if username != self.config.username || password != self.config.password {
            warn!(username, "session creation with bad credentials");
            return None;
        }
        let session = RedfishSession {
            id: Uuid::new_v4().simple().to_string(),
            token: Uuid::new_v4().simple().to_string(),
            username: username.to_string(),
            created: Utc::now(),
        };
        info!(session = %session.id, username, "redfish session created");
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(
            session.id.clone(),
            StoredSession {
                session: session.clone(),
                last_access: Instant::now(),
            },
        );
        Some(session)
    }

    pub fn get(&self, id: &str) -> Option<RedfishSession> {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(id).map(|stored| stored.session.clone())
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        let removed = sessions.remove(id).is_some();
        if removed {
            info!(session = %id, "redfish session deleted");
        }
        removed
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().unwrap().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    fn token_valid(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        for stored in sessions.values_mut() {
            if stored.session.token == token {
                stored.last_access = Instant::now();
                return true;
            }
        }
        false
    }

    fn basic_valid(&self, encoded: &str) -> bool {
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        match credentials.split_once(':') {
            Some((username, password)) => {
                username == self.config.username && password == self.config.password
            }
            None => false,
        }
    }

    /// Check the request headers against Basic credentials or a live token.
    pub fn authenticate(&self, headers: &HeaderMap) -> bool {
        if let Some(token) = headers.get("x-auth-token").and_then(|v| v.to_str().ok()) {
            if self.token_valid(token) {
                return true;
            }
        }
        if let Some(authorization) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
        {
            if let Some(encoded) = authorization.strip_prefix("Basic ") {
                return self.basic_valid(encoded);
            }
            if let Some(token) = authorization.strip_prefix("Bearer ") {
                return self.token_valid(token);
            }
        }
        false
    }

    /// Drop sessions idle past the configured timeout.
    pub fn sweep_idle(&self) -> usize {
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|id, stored| {
            let keep = stored.last_access.elapsed() <= self.config.session_timeout;
            if !keep {
                info!(session = %id, "expiring idle redfish session");
            }
            keep
        });
        before - sessions.len()
    }
}

pub fn unauthorized() -> Response {
    let mut response = error_body("Base.1.0.NoValidSession", "Authentication required")
        .into_response(StatusCode::UNAUTHORIZED);
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"Redfish\""),
    );
    response
}

/// Routes reachable without credentials: the version index, the service root
/// and session creation.
fn is_public(method: &Method, path: &str) -> bool {
    let path = path.trim_end_matches('/');
    match *method {
        Method::GET => matches!(path, "/redfish" | "/redfish/v1"),
        Method::POST => path == "/redfish/v1/SessionService/Sessions",
        _ => false,
    }
}

pub async fn require_session(
    State(state): State<RedfishState>,
    request: Request,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path())
        || state.sessions.authenticate(request.headers())
    {
        return next.run(request).await;
    }
    debug!(path = %request.uri().path(), "unauthenticated request refused");
    unauthorized()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(AuthConfig::default())
    }

    fn basic(username: &str, password: &str) -> HeaderMap {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {encoded}")).unwrap(),
        );
        headers
    }

    #[test]
    fn basic_credentials_authenticate() {
        let store = store();
        assert!(store.authenticate(&basic("admin", "password")));
        assert!(!store.authenticate(&basic("admin", "wrong")));
        assert!(!store.authenticate(&HeaderMap::new()));
    }

    #[test]
    fn tokens_authenticate_until_removed() {
        let store = store();
        let session = store.create("admin", "password").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-auth-token", HeaderValue::from_str(&session.token).unwrap());
        assert!(store.authenticate(&headers));

        assert!(store.remove(&session.id));
        assert!(!store.authenticate(&headers));
        assert!(!store.remove(&session.id));
    }

    #[test]
    fn bad_credentials_mint_no_session() {
        let store = store();
        assert!(store.create("admin", "nope").is_none());
        assert!(store.ids().is_empty());
    }

    #[test]
    fn idle_sessions_are_swept() {
        let store = SessionStore::new(AuthConfig {
            session_timeout: Duration::ZERO,
            ..AuthConfig::default()
        });
        store.create("admin", "password").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.sweep_idle(), 1);
        assert!(store.ids().is_empty());
    }

    #[test]
    fn public_route_table() {
        assert!(is_public(&Method::GET, "/redfish/v1"));
        assert!(is_public(&Method::GET, "/redfish/v1/"));
        assert!(is_public(&Method::POST, "/redfish/v1/SessionService/Sessions"));
        assert!(!is_public(&Method::GET, "/redfish/v1/Systems"));
        assert!(!is_public(&Method::DELETE, "/redfish/v1/SessionService/Sessions/abc"));
    }
}

//! Shared helpers for integration tests
#![allow(dead_code)]

use callflux::Response;
use callflux::testing::Signal;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct User {
    pub id: u64,
}

pub fn ok_user(id: u64) -> Response<User> {
    Response::success(User { id })
}

pub fn not_found() -> Response<User> {
    Response::error(
        StatusCode::NOT_FOUND,
        HeaderMap::new(),
        Some(r#"{"error":"no such user"}"#.into()),
    )
}

/// `true` when `signals` is a prefix of `[next] (complete | error)`.
pub fn is_well_formed<T>(signals: &[Signal<T>]) -> bool {
    match signals {
        [] | [Signal::Next(_)] => true,
        [terminal] => terminal.is_terminal(),
        [Signal::Next(_), terminal] => terminal.is_terminal(),
        _ => false,
    }
}

/// A server answering `GET /users/{id}` with the given status and JSON body.
pub async fn user_server(id: u64, status: u16, body: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/users/{id}")))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(&server)
        .await;
    server
}

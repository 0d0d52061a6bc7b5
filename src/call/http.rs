//! `reqwest`-backed call
//!
//! [`HttpCall`] performs one JSON request on a tokio runtime. `execute`
//! blocks the calling thread. On a multi-thread runtime worker it does so
//! through `block_in_place`; on a current-thread runtime it is rejected with
//! a configuration error, so schedule it elsewhere (for example with
//! [`TokioScheduler`](crate::flux::TokioScheduler) on a multi-thread
//! runtime). `enqueue` spawns onto the runtime and reports from a worker
//! thread.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{Call, Callback, Response, SharedCall};
use crate::error::CallError;

/// Method, URL, headers and optional JSON body of a request.
#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
}

impl HttpRequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::POST, url)
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

struct Attempt {
    id: Uuid,
    client: Client,
    handle: Handle,
    request: HttpRequestSpec,
    token: CancellationToken,
    executed: AtomicBool,
}

/// One attempt of an HTTP request decoding 2xx bodies into `T`.
pub struct HttpCall<T> {
    attempt: Arc<Attempt>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> HttpCall<T> {
    fn from_attempt(attempt: Arc<Attempt>) -> Self {
        Self {
            attempt,
            _payload: PhantomData,
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> HttpCall<T> {
    pub fn new(client: Client, handle: Handle, request: HttpRequestSpec) -> Self {
        Self::from_attempt(Arc::new(Attempt {
            id: Uuid::new_v4(),
            client,
            handle,
            request,
            token: CancellationToken::new(),
            executed: AtomicBool::new(false),
        }))
    }

    /// Bind to the runtime of the calling context.
    pub fn try_current(client: Client, request: HttpRequestSpec) -> Result<Self, CallError> {
        let handle = Handle::try_current()
            .map_err(|e| CallError::ConfigurationError(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(client, handle, request))
    }

    pub fn shared(self) -> SharedCall<T> {
        Arc::new(self)
    }

    /// Attempt id, attached to this attempt's log events.
    pub fn id(&self) -> Uuid {
        self.attempt.id
    }

    pub fn request(&self) -> &HttpRequestSpec {
        &self.attempt.request
    }

    fn start(&self) -> Result<(), CallError> {
        if self.attempt.executed.swap(true, Ordering::AcqRel) {
            return Err(CallError::ConfigurationError("call already executed".into()));
        }
        tracing::debug!(
            target: "callflux::http",
            id = %self.attempt.id,
            method = %self.attempt.request.method,
            url = %self.attempt.request.url,
            "starting request"
        );
        Ok(())
    }
}

impl Attempt {
    async fn perform<T: DeserializeOwned>(&self) -> Result<Response<T>, CallError> {
        let exchange = async {
            let mut builder = self
                .client
                .request(self.request.method.clone(), &self.request.url)
                .headers(self.request.headers.clone());
            if let Some(body) = &self.request.body {
                builder = builder.json(body);
            }
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let bytes = response.bytes().await?;
            decode(status, headers, &bytes)
        };

        let outcome = tokio::select! {
            _ = self.token.cancelled() => Err(CallError::Canceled),
            outcome = exchange => outcome,
        };
        match &outcome {
            Ok(response) => {
                tracing::debug!(target: "callflux::http", id = %self.id, status = response.code(), "request finished");
            }
            Err(error) => {
                tracing::debug!(target: "callflux::http", id = %self.id, err = %error, "request failed");
            }
        }
        outcome
    }
}

fn decode<T: DeserializeOwned>(
    status: StatusCode,
    headers: HeaderMap,
    bytes: &[u8],
) -> Result<Response<T>, CallError> {
    if !status.is_success() {
        let body = (!bytes.is_empty()).then(|| String::from_utf8_lossy(bytes).into_owned());
        return Ok(Response::error(status, headers, body));
    }
    if bytes.is_empty() || status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return Ok(Response::empty(status, headers));
    }
    let body = serde_json::from_slice(bytes)?;
    Ok(Response::success_with(status, headers, body))
}

impl<T: DeserializeOwned + Send + 'static> Call<T> for HttpCall<T> {
    fn execute(&self) -> Result<Response<T>, CallError> {
        let on_current_thread_runtime = Handle::try_current()
            .is_ok_and(|current| current.runtime_flavor() == RuntimeFlavor::CurrentThread);
        if on_current_thread_runtime {
            return Err(CallError::ConfigurationError(
                "execute cannot block a current-thread runtime".into(),
            ));
        }
        self.start()?;
        let attempt = &self.attempt;
        tokio::task::block_in_place(|| attempt.handle.block_on(attempt.perform()))
    }

    fn enqueue(&self, callback: Arc<dyn Callback<T>>) {
        if let Err(error) = self.start() {
            callback.on_failure(self, error);
            return;
        }
        let attempt = self.attempt.clone();
        drop(self.attempt.handle.spawn(async move {
            let outcome = attempt.perform().await;
            let call = HttpCall::<T>::from_attempt(attempt);
            match outcome {
                Ok(response) => callback.on_response(&call, response),
                Err(error) => callback.on_failure(&call, error),
            }
        }));
    }

    fn cancel(&self) {
        if !self.attempt.token.is_cancelled() {
            tracing::trace!(target: "callflux::http", id = %self.attempt.id, "cancelling request");
        }
        self.attempt.token.cancel();
    }

    fn is_canceled(&self) -> bool {
        self.attempt.token.is_cancelled()
    }

    fn is_executed(&self) -> bool {
        self.attempt.executed.load(Ordering::Acquire)
    }

    fn clone_call(&self) -> SharedCall<T> {
        HttpCall::<T>::new(
            self.attempt.client.clone(),
            self.attempt.handle.clone(),
            self.attempt.request.clone(),
        )
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
    }

    struct ChannelCallback<T> {
        tx: mpsc::UnboundedSender<(bool, Result<Response<T>, CallError>)>,
    }

    impl<T: Send> Callback<T> for ChannelCallback<T> {
        fn on_response(&self, call: &dyn Call<T>, response: Response<T>) {
            let _ = self.tx.send((call.is_canceled(), Ok(response)));
        }

        fn on_failure(&self, call: &dyn Call<T>, error: CallError) {
            let _ = self.tx.send((call.is_canceled(), Err(error)));
        }
    }

    fn call<T: DeserializeOwned + Send + 'static>(request: HttpRequestSpec) -> HttpCall<T> {
        HttpCall::try_current(Client::new(), request).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn execute_decodes_successful_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 42})))
            .mount(&server)
            .await;

        let call: HttpCall<User> = call(HttpRequestSpec::get(format!("{}/users/42", server.uri())));
        let response = tokio::task::spawn_blocking(move || call.execute())
            .await
            .unwrap()
            .unwrap();

        assert!(response.is_successful());
        assert_eq!(response.into_body(), Some(User { id: 42 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_success_keeps_raw_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such user"))
            .mount(&server)
            .await;

        let call: HttpCall<User> = call(HttpRequestSpec::get(server.uri()));
        let response = tokio::task::spawn_blocking(move || call.execute())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.code(), 404);
        assert!(!response.is_successful());
        assert_eq!(response.error_body(), Some("no such user"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn no_content_has_no_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .and(header("x-trace", "abc"))
            .and(body_json(serde_json::json!({"kind": "ping"})))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let request = HttpRequestSpec::post_json(
            format!("{}/events", server.uri()),
            serde_json::json!({"kind": "ping"}),
        )
        .header(HeaderName::from_static("x-trace"), HeaderValue::from_static("abc"));
        let call: HttpCall<User> = call(request);
        let response = tokio::task::spawn_blocking(move || call.execute())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.code(), 204);
        assert!(response.is_successful());
        assert!(response.body().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn malformed_json_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let call: HttpCall<User> = call(HttpRequestSpec::get(server.uri()));
        let outcome = tokio::task::spawn_blocking(move || call.execute())
            .await
            .unwrap();
        assert!(matches!(outcome, Err(CallError::ParseError(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn enqueue_reports_through_the_callback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 7})))
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let call: HttpCall<User> = call(HttpRequestSpec::get(server.uri()));
        call.enqueue(Arc::new(ChannelCallback { tx }));

        let (canceled, outcome) = rx.recv().await.unwrap();
        assert!(!canceled);
        assert_eq!(outcome.unwrap().into_body(), Some(User { id: 7 }));
        assert!(call.is_executed());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancel_aborts_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 1}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let call: HttpCall<User> = call(HttpRequestSpec::get(server.uri()));
        call.enqueue(Arc::new(ChannelCallback { tx }));
        call.cancel();

        let (canceled, outcome) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(canceled);
        assert!(matches!(outcome, Err(CallError::Canceled)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_start_is_rejected_and_clone_is_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 3})))
            .mount(&server)
            .await;

        let call: HttpCall<User> = call(HttpRequestSpec::get(server.uri()));
        let fresh = call.clone_call();
        assert!(!fresh.is_executed());

        let outcomes = tokio::task::spawn_blocking(move || (call.execute(), call.execute(), fresh.execute()))
            .await
            .unwrap();
        assert!(outcomes.0.is_ok());
        assert!(matches!(outcomes.1, Err(CallError::ConfigurationError(m)) if m == "call already executed"));
        assert!(outcomes.2.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn execute_on_an_async_worker_blocks_in_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 11})))
            .mount(&server)
            .await;

        let call: HttpCall<User> = call(HttpRequestSpec::get(server.uri()));
        let response = call.execute().unwrap();
        assert_eq!(response.into_body(), Some(User { id: 11 }));
    }

    #[tokio::test]
    async fn execute_on_a_current_thread_runtime_is_rejected() {
        let call: HttpCall<User> = call(HttpRequestSpec::get("http://localhost"));
        let outcome = call.execute();
        assert!(matches!(outcome, Err(CallError::ConfigurationError(_))));
        assert!(!call.is_executed());
    }

    #[test]
    fn requires_a_runtime() {
        let outcome = HttpCall::<User>::try_current(Client::new(), HttpRequestSpec::get("http://localhost"));
        assert!(matches!(outcome, Err(CallError::ConfigurationError(_))));
    }
}

//! A mock JSOC archive built on wiremock

use jsoc_dl::{ClientConfig, JsocClient};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Path of the export endpoint on the mock server
pub const FETCH_PATH: &str = "/cgi-bin/ajax/jsoc_fetch";

/// Export directory every staged request uses
pub const EXPORT_DIR: &str = "/SUM1/D12345/S00000";

/// The archive's size-limit message
pub const SIZE_LIMIT: &str = "Request exceeds max byte limit of 100000MB";

/// Matches a form-encoded body whose field `key` equals `value`
pub struct FormField {
    key: &'static str,
    value: String,
}

impl Match for FormField {
    fn matches(&self, request: &Request) -> bool {
        url::form_urlencoded::parse(&request.body).any(|(k, v)| k == self.key && v == self.value)
    }
}

/// Match the `ds` field for `series[start_TAI-end_TAI]`
pub fn dataset(series: &str, start: &str, end: &str) -> FormField {
    FormField {
        key: "ds",
        value: format!("{series}[{start}_TAI-{end}_TAI]"),
    }
}

/// Client pointed at the mock archive with fast polling
pub fn client_for(server: &MockServer) -> JsocClient {
    JsocClient::new(ClientConfig {
        export_url: format!("{}{}", server.uri(), FETCH_PATH),
        base_download_url: server.uri(),
        poll_interval: Duration::from_millis(20),
        max_poll_passes: Some(20),
        ..Default::default()
    })
    .expect("mock client config is valid")
}

/// Answer an `exp_request` for `ds` with an accepted request id
pub async fn accept(server: &MockServer, ds: FormField, request_id: &str) {
    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .and(ds)
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 2, "requestid": request_id, "error": null})),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Answer an `exp_request` for `ds` with the size-limit rejection
pub async fn too_large(server: &MockServer, ds: FormField) {
    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .and(ds)
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 3, "requestid": null, "error": SIZE_LIMIT})),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Report `request_id` as pending for its first `times` lookups
pub async fn pending_for(server: &MockServer, request_id: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(FETCH_PATH))
        .and(query_param("op", "exp_status"))
        .and(query_param("requestid", request_id))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 1, "requestid": request_id, "wait": 10})),
        )
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Report `request_id` as staged with `files` under [`EXPORT_DIR`]
pub async fn ready(server: &MockServer, request_id: &str, files: &[&str]) {
    let data: Vec<_> = files
        .iter()
        .map(|f| json!({"record": format!("{f}[0]"), "filename": f}))
        .collect();
    Mock::given(method("GET"))
        .and(path(FETCH_PATH))
        .and(query_param("op", "exp_status"))
        .and(query_param("requestid", request_id))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "requestid": request_id,
            "exptime": "2010.01.02_00:00:00_UTC",
            "dir": EXPORT_DIR,
            "size": 0.25,
            "data": data,
        })))
        .mount(server)
        .await;
}

/// Report `request_id` as failed
pub async fn failed(server: &MockServer, request_id: &str, error: &str) {
    Mock::given(method("GET"))
        .and(path(FETCH_PATH))
        .and(query_param("op", "exp_status"))
        .and(query_param("requestid", request_id))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": 4, "error": error})),
        )
        .mount(server)
        .await;
}

/// Serve `body` as the staged file `filename`
pub async fn serve_file(server: &MockServer, filename: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("{EXPORT_DIR}/{filename}")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

/// Fail every download of `filename` with `status`
pub async fn refuse_file(server: &MockServer, filename: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("{EXPORT_DIR}/{filename}")))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

//! Shared fixtures: an in-process fake of the GitHub and Gitea REST APIs and
//! a command runner that never spawns processes.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde::Deserialize;
use serde_json::{Value, json};
use simple_git_release::archive::{CommandOutput, CommandRunner};
use simple_git_release::{AppState, ReleaseConfig, build_router};
use std::collections::HashMap;
use std::io;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex};

pub const FAKE_ZIP: &[u8] = b"PK\x03\x04fake-archive";
pub const SCRIPT_ZIP: &[u8] = b"PK\x03\x04from-script";

#[derive(Debug, Clone)]
pub struct Upload {
    pub release_id: u64,
    pub name: String,
    pub content_type: String,
    pub len: usize,
}

#[derive(Default)]
pub struct MockState {
    pub base: String,
    pub calls: Vec<String>,
    /// tag name -> release id
    pub releases: HashMap<String, u64>,
    pub created: Vec<Value>,
    pub uploads: Vec<Upload>,
    /// Tag object sha -> tag name; unknown shas name themselves.
    pub tag_names: HashMap<String, String>,
    /// Step that answers 500 instead of its normal response.
    pub fail: Option<&'static str>,
    /// Step that answers 200 with a body that is not JSON.
    pub garble: Option<&'static str>,
    /// Release creation answers 422 with a validation error other than
    /// `already_exists`.
    pub reject_create: bool,
    next_id: u64,
}

impl MockState {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn writes(&self) -> usize {
        self.calls.iter().filter(|c| c.starts_with("POST")).count()
    }

    fn record(&mut self, call: &str) -> bool {
        self.calls.push(call.to_string());
        self.fail.is_some_and(|f| call.ends_with(f))
    }

    fn garbled(&self, call: &str) -> bool {
        self.garble.is_some_and(|g| call.ends_with(g))
    }
}

pub type Mock = Arc<Mutex<MockState>>;

#[derive(Deserialize)]
struct AssetQuery {
    name: String,
}

fn failed() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"message": "boom"}))).into_response()
}

fn not_json() -> Response {
    (StatusCode::OK, "not json").into_response()
}

async fn github_ref(
    State(mock): State<Mock>,
    Path((owner, repo, tag)): Path<(String, String, String)>,
) -> Response {
    let mut m = mock.lock().unwrap();
    if m.record("GET ref") {
        return failed();
    }
    if m.garbled("GET ref") {
        return not_json();
    }
    let kind = if tag.starts_with("light") { "commit" } else { "tag" };
    // tag objects are addressed by id, never by name
    let sha = format!("{:040x}", m.tag_names.len() + 1);
    m.tag_names.insert(sha.clone(), tag.clone());
    let url = format!("{}/repos/{}/{}/git/tags/{}", m.base, owner, repo, sha);
    Json(json!({
        "ref": format!("refs/tags/{}", tag),
        "object": {"type": kind, "sha": "0123abcd", "url": url}
    }))
    .into_response()
}

async fn tag_object(
    State(mock): State<Mock>,
    Path((_owner, _repo, sha)): Path<(String, String, String)>,
) -> Response {
    let mut m = mock.lock().unwrap();
    if m.record("GET tag") {
        return failed();
    }
    if m.garbled("GET tag") {
        return not_json();
    }
    if sha == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response();
    }
    let tag = m.tag_names.get(&sha).cloned().unwrap_or(sha);
    Json(json!({
        "tag": tag,
        "sha": "0123abcd",
        "message": "  Release notes\n\n"
    }))
    .into_response()
}

fn release_json(base: &str, owner: &str, repo: &str, tag: &str, id: u64) -> Value {
    json!({
        "id": id,
        "tag_name": tag,
        "upload_url": format!("{}/uploads/repos/{}/{}/releases/{}/assets{{?name,label}}", base, owner, repo, id),
    })
}

fn create_release(
    mock: &Mock,
    owner: &str,
    repo: &str,
    body: Value,
    conflict_status: StatusCode,
) -> Response {
    let mut m = mock.lock().unwrap();
    if m.record("POST create") {
        return failed();
    }
    let tag = body["tag_name"].as_str().unwrap_or_default().to_string();
    if m.reject_create {
        let error = json!({
            "message": "Validation Failed",
            "errors": [{"resource": "Release", "code": "invalid", "field": "target_commitish"}]
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(error)).into_response();
    }
    if m.releases.contains_key(&tag) {
        let error = if conflict_status == StatusCode::UNPROCESSABLE_ENTITY {
            json!({
                "message": "Validation Failed",
                "errors": [{"resource": "Release", "code": "already_exists", "field": "tag_name"}]
            })
        } else {
            json!({"message": "release tag already exists"})
        };
        return (conflict_status, Json(error)).into_response();
    }
    m.next_id += 1;
    let id = m.next_id;
    m.releases.insert(tag.clone(), id);
    m.created.push(body);
    let release = release_json(&m.base, owner, repo, &tag, id);
    (StatusCode::CREATED, Json(release)).into_response()
}

async fn github_create(
    State(mock): State<Mock>,
    Path((owner, repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    create_release(&mock, &owner, &repo, body, StatusCode::UNPROCESSABLE_ENTITY)
}

async fn gitea_create(
    State(mock): State<Mock>,
    Path((owner, repo)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    create_release(&mock, &owner, &repo, body, StatusCode::CONFLICT)
}

async fn existing_release(
    State(mock): State<Mock>,
    Path((owner, repo, tag)): Path<(String, String, String)>,
) -> Response {
    let mut m = mock.lock().unwrap();
    if m.record("GET existing") {
        return failed();
    }
    match m.releases.get(&tag) {
        Some(id) => Json(release_json(&m.base, &owner, &repo, &tag, *id)).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"message": "Not Found"}))).into_response(),
    }
}

async fn upload_asset(
    State(mock): State<Mock>,
    Path((_owner, _repo, id)): Path<(String, String, u64)>,
    Query(query): Query<AssetQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut m = mock.lock().unwrap();
    if m.record("POST upload") {
        return failed();
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    m.uploads.push(Upload {
        release_id: id,
        name: query.name.clone(),
        content_type,
        len: body.len(),
    });
    (StatusCode::CREATED, Json(json!({"id": 1, "name": query.name}))).into_response()
}

fn provider_routes(mock: Mock, gitea: bool) -> Router {
    let create = if gitea { post(gitea_create) } else { post(github_create) };
    Router::new()
        .route("/repos/{owner}/{repo}/git/refs/tags/{tag}", get(github_ref))
        .route("/repos/{owner}/{repo}/git/tags/{sha}", get(tag_object))
        .route("/repos/{owner}/{repo}/releases", create)
        .route("/repos/{owner}/{repo}/releases/tags/{tag}", get(existing_release))
        .route("/repos/{owner}/{repo}/releases/{id}/assets", post(upload_asset))
        .with_state(mock)
}

/// Starts the fake API on an ephemeral port. GitHub routes live at the root
/// (uploads under `/uploads`), Gitea routes under `/api/v1`.
pub async fn spawn_mock() -> Mock {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let mock = Arc::new(Mutex::new(MockState {
        base,
        ..Default::default()
    }));

    let app = Router::new()
        .merge(provider_routes(mock.clone(), false))
        .nest("/uploads", provider_routes(mock.clone(), false))
        .nest("/api/v1", provider_routes(mock.clone(), true));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    mock
}

pub fn base(mock: &Mock) -> String {
    mock.lock().unwrap().base.clone()
}

/// Command runner double: a clone creates the checkout directory (with a
/// packaging script when asked), `git archive` and the script emit fixed bytes.
#[derive(Default)]
pub struct FakeRunner {
    pub calls: Mutex<Vec<(String, Vec<String>)>>,
    pub with_script: bool,
    pub fail_on: Option<&'static str>,
}

impl FakeRunner {
    pub fn steps(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(program, args)| {
                if program == "sh" {
                    "script".to_string()
                } else {
                    args[0].clone()
                }
            })
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _cwd: Option<&FsPath>,
    ) -> io::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        let step = if program == "sh" { "script" } else { args[0].as_str() };

        if self.fail_on == Some(step) {
            return Ok(CommandOutput {
                exit_code: Some(128),
                stdout: Vec::new(),
                stderr: b"fatal: simulated".to_vec(),
            });
        }

        let stdout = match step {
            "clone" => {
                let dest = PathBuf::from(args.last().unwrap());
                std::fs::create_dir_all(&dest)?;
                if self.with_script {
                    std::fs::create_dir_all(dest.join(".bin"))?;
                    std::fs::write(dest.join(".bin/release.sh"), "#!/bin/sh\n")?;
                }
                Vec::new()
            }
            "archive" => FAKE_ZIP.to_vec(),
            "script" => SCRIPT_ZIP.to_vec(),
            _ => Vec::new(),
        };
        Ok(CommandOutput {
            exit_code: Some(0),
            stdout,
            stderr: Vec::new(),
        })
    }
}

pub struct Harness {
    pub app: Router,
    pub runner: Arc<FakeRunner>,
    pub work_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(provider_section: &str, runner: FakeRunner) -> Self {
        let work_dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "{}\n[http]\ntimeout_secs = 5\n[archive]\nwork_dir = \"{}\"\n",
            provider_section,
            work_dir.path().display()
        );
        let config: ReleaseConfig = simple_git_release::parse_config(&toml).unwrap();
        let runner = Arc::new(runner);
        let state = AppState::new(config, runner.clone()).unwrap();
        Self {
            app: build_router(Arc::new(state)),
            runner,
            work_dir,
        }
    }

    /// Entries left in the clone parent directory.
    pub fn leftover_clones(&self) -> usize {
        std::fs::read_dir(self.work_dir.path()).unwrap().count()
    }
}

pub fn request(uri: &str, headers: &[(&str, String)], body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

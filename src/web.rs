// atva (andrew's tool for video annotation)
// Copyright (C) 2025 Andrew Nissen

use crate::clipper;
use crate::config::AtvaConfig;
use crate::controller::{self, AnnotationForm, Level, Message, NavAction, PageView};
use crate::files::{self, Item};
use crate::prefetch::Prefetcher;
use crate::session::{SESSION_COOKIE, SessionState};
use crate::store::{AnnotationRow, AnnotationStore};
use crate::tasks::{self, Task};
use chrono::Utc;
use rocket::form::{Form, FromForm};
use rocket::fs::NamedFile;
use rocket::http::{Cookie, CookieJar, SameSite};
use rocket::request::FlashMessage;
use rocket::response::{Flash, Redirect};
use rocket::serde::Serialize;
use rocket::serde::json::Json;
use rocket::figment::Figment;
use rocket::{Build, Rocket, State, get, post, routes};
use rocket_dyn_templates::Template;
use rust_embed::RustEmbed;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(RustEmbed)]
#[folder = "templates/"]
struct TemplateAssets;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

pub struct AppState {
    pub cfg: Arc<AtvaConfig>,
    pub prefetcher: Arc<Prefetcher>,
}

#[derive(FromForm)]
struct IndexForm {
    index: usize,
}

fn read_session(cookies: &CookieJar<'_>) -> SessionState {
    cookies
        .get(SESSION_COOKIE)
        .and_then(|cookie| SessionState::decode(cookie.value()))
        .unwrap_or_else(|| SessionState::new(Utc::now()))
}

fn write_session(cookies: &CookieJar<'_>, session: &SessionState) {
    let cookie = Cookie::build((SESSION_COOKIE, session.encode()))
        .same_site(SameSite::Lax)
        .http_only(true)
        .path("/")
        .build();
    cookies.add(cookie);
}

fn flash(message: Message) -> Flash<Redirect> {
    Flash::new(Redirect::to("/annotate"), message.level.as_str(), message.text)
}

async fn blocking<T, F>(job: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| format!("Background task failed: {}", e))
}

fn find_task(cfg: &AtvaConfig, index: usize) -> Result<Task, String> {
    let tasks = tasks::load_tasks(cfg).map_err(|e| e.to_string())?;
    let len = tasks.len();
    tasks
        .into_iter()
        .nth(index)
        .ok_or_else(|| format!("Task {} does not exist ({} configured)", index, len))
}

#[get("/")]
fn index() -> Redirect {
    Redirect::to("/annotate")
}

#[get("/annotate")]
async fn annotate(
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
    flash: Option<FlashMessage<'_>>,
) -> Template {
    let session = read_session(cookies);
    let fallback = session.clone();
    let cfg = Arc::clone(&state.cfg);
    let prefetcher = Arc::clone(&state.prefetcher);

    let result = blocking(move || {
        let mut session = session;
        let page = controller::build_page(&cfg, &mut session, Some(&prefetcher), Utc::now());
        (page, session)
    })
    .await;

    let (mut page, session) = match result {
        Ok(built) => built,
        Err(e) => (PageView::fatal(e), fallback),
    };
    write_session(cookies, &session);

    if let Some(flash) = flash {
        page.messages
            .insert(0, Message::new(Level::from_kind(flash.kind()), flash.message()));
    }

    Template::render("annotate", &page)
}

#[post("/annotate/save", data = "<form>")]
async fn save(form: Form<AnnotationForm>, state: &State<AppState>, cookies: &CookieJar<'_>) -> Flash<Redirect> {
    let session = read_session(cookies);
    let cfg = Arc::clone(&state.cfg);
    let form = form.into_inner();

    let result = blocking(move || {
        let mut session = session;
        let message = controller::save_annotation(&cfg, &mut session, &form, Utc::now());
        (message, session)
    })
    .await;

    match result {
        Ok((message, session)) => {
            write_session(cookies, &session);
            flash(message)
        }
        Err(e) => flash(Message::error(e)),
    }
}

async fn run_nav(state: &AppState, cookies: &CookieJar<'_>, action: NavAction) -> Result<Redirect, Flash<Redirect>> {
    let session = read_session(cookies);
    let cfg = Arc::clone(&state.cfg);

    let result = blocking(move || {
        let mut session = session;
        let message = controller::navigate(&cfg, &mut session, action, Utc::now());
        (message, session)
    })
    .await;

    match result {
        Ok((message, session)) => {
            write_session(cookies, &session);
            match message {
                Some(message) => Err(flash(message)),
                None => Ok(Redirect::to("/annotate")),
            }
        }
        Err(e) => Err(flash(Message::error(e))),
    }
}

#[post("/nav/previous")]
async fn nav_previous(state: &State<AppState>, cookies: &CookieJar<'_>) -> Result<Redirect, Flash<Redirect>> {
    run_nav(state, cookies, NavAction::Previous).await
}

#[post("/nav/next")]
async fn nav_next(state: &State<AppState>, cookies: &CookieJar<'_>) -> Result<Redirect, Flash<Redirect>> {
    run_nav(state, cookies, NavAction::Next).await
}

#[post("/nav/refresh")]
async fn nav_refresh(state: &State<AppState>, cookies: &CookieJar<'_>) -> Result<Redirect, Flash<Redirect>> {
    run_nav(state, cookies, NavAction::Refresh).await
}

#[post("/nav/item", data = "<form>")]
async fn nav_item(
    form: Form<IndexForm>,
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, Flash<Redirect>> {
    run_nav(state, cookies, NavAction::Item(form.index)).await
}

#[post("/nav/task", data = "<form>")]
async fn nav_task(
    form: Form<IndexForm>,
    state: &State<AppState>,
    cookies: &CookieJar<'_>,
) -> Result<Redirect, Flash<Redirect>> {
    run_nav(state, cookies, NavAction::Task(form.index)).await
}

/// Serves finished preview clips only; the annotation file and partial cuts
/// share the workspace but are not exposed.
#[get("/clips/<task>/<file..>")]
async fn clip(task: usize, file: PathBuf, state: &State<AppState>) -> Option<NamedFile> {
    if !clipper::is_servable_clip(&file, state.cfg.schema) {
        return None;
    }
    let cfg = Arc::clone(&state.cfg);
    let workspace = blocking(move || find_task(&cfg, task).map(|t| t.workspace))
        .await
        .ok()?
        .ok()?;
    NamedFile::open(workspace.join(file)).await.ok()
}

#[get("/api/health")]
fn health() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}

#[get("/api/items?<task>")]
async fn api_items(task: Option<usize>, state: &State<AppState>) -> Json<ApiResponse<Vec<Item>>> {
    let cfg = Arc::clone(&state.cfg);
    let result = blocking(move || {
        let task = find_task(&cfg, task.unwrap_or(0))?;
        files::list_items(&task.root).map_err(|e| e.to_string())
    })
    .await;

    match result {
        Ok(Ok(items)) => Json(ApiResponse::success(items)),
        Ok(Err(e)) | Err(e) => Json(ApiResponse::error(e)),
    }
}

#[get("/api/rows?<task>")]
async fn api_rows(task: Option<usize>, state: &State<AppState>) -> Json<ApiResponse<Vec<AnnotationRow>>> {
    let cfg = Arc::clone(&state.cfg);
    let result = blocking(move || {
        let task = find_task(&cfg, task.unwrap_or(0))?;
        let store = AnnotationStore::load(&task.store_path(), cfg.schema).map_err(|e| e.to_string())?;
        Ok::<_, String>(store.rows().to_vec())
    })
    .await;

    match result {
        Ok(Ok(rows)) => Json(ApiResponse::success(rows)),
        Ok(Err(e)) | Err(e) => Json(ApiResponse::error(e)),
    }
}

/// Writes the embedded templates into `target_dir` for the handlebars loader.
fn extract_templates(target_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(target_dir)?;

    for file_path in TemplateAssets::iter() {
        if let Some(content) = TemplateAssets::get(&file_path) {
            let target_path = target_dir.join(file_path.as_ref());
            if let Some(parent) = target_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(target_path, content.data.as_ref())?;
        }
    }
    Ok(())
}

/// Routes, state and the template fairing on top of `figment`, which must
/// carry `template_dir`.
fn build_rocket(figment: Figment, state: AppState) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(state)
        .mount("/", routes())
        .attach(Template::fairing())
}

/// Queues previews for every item of the first task so the operator rarely waits.
fn warm_first_task(cfg: &AtvaConfig, prefetcher: &Prefetcher) {
    let task = match find_task(cfg, 0) {
        Ok(task) => task,
        Err(e) => {
            tracing::warn!(error = %e, "skipping startup warm");
            return;
        }
    };
    if let Err(e) = task.ensure_workspace() {
        tracing::warn!(workspace = %task.workspace.display(), error = %e, "skipping startup warm");
        return;
    }
    match controller::representative_files(cfg, &task) {
        Ok(sources) => {
            let queued = prefetcher.warm(cfg, task.clip_dir(), &sources);
            tracing::info!(task = %task.name, queued, "warming preview clips");
        }
        Err(e) => tracing::warn!(task = %task.name, error = %e, "skipping startup warm"),
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![
        index,
        annotate,
        save,
        nav_previous,
        nav_next,
        nav_refresh,
        nav_item,
        nav_task,
        clip,
        health,
        api_items,
        api_rows
    ]
}

pub async fn launch_server(cfg: AtvaConfig, host: &str, port: u16) -> Result<(), Box<dyn Error>> {
    let template_dir = std::env::temp_dir().join("atva_templates");
    extract_templates(&template_dir)?;

    let prefetcher = Arc::new(Prefetcher::new(cfg.workers)?);
    if cfg.warm_on_start {
        warm_first_task(&cfg, &prefetcher);
    }

    let log_level = if cfg!(debug_assertions) {
        "normal"
    } else {
        "off"
    };
    let figment = rocket::Config::figment()
        .merge(("template_dir", template_dir.to_string_lossy().to_string()))
        .merge(("address", host))
        .merge(("port", port))
        .merge(("log_level", log_level));

    tracing::info!(host, port, schema = %cfg.schema, clip_mode = %cfg.clip_mode, "starting web server");

    let state = AppState {
        cfg: Arc::new(cfg),
        prefetcher,
    };
    build_rocket(figment, state).launch().await?;

    Ok(())
}

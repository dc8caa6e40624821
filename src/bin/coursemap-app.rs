use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use coursemap::app::pane::{ContentPane, render_load_error};
use coursemap::app::{AppController, ViewMode};
use coursemap::config::Settings;
use coursemap::content::{ContentStore, source_for};
use coursemap::error::{ExportError, LoadError};
use coursemap::events::{ContentSelection, EventBus};
use coursemap::formats::{Bookmark, Course, FlatNode, SectionRef};
use coursemap::mindmap::export::{export_png, export_svg};
use coursemap::mindmap::{DEFAULT_SETTLE_TICKS, LayoutKind, MindMap, Point, Transform};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// Course document: a file path or an http(s) URL.
    #[arg(long)]
    course: String,

    /// Bookmark storage directory (defaults to COURSEMAP_DATA_DIR or `.coursemap`).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Layout of the session's mind map.
    #[arg(long, value_enum, default_value_t = LayoutKind::Hierarchical)]
    layout: LayoutKind,

    /// Static web assets directory (serve if exists).
    #[arg(long, default_value = "web/dist")]
    web_dir: PathBuf,
}

#[derive(Clone)]
struct AppState {
    content: Arc<ContentStore>,
    /// `None` when the course failed to load.
    session: Option<Arc<Mutex<AppController>>>,
}

impl AppState {
    async fn session(&self) -> ApiResult<MutexGuard<'_, AppController>> {
        match &self.session {
            Some(session) => Ok(session.lock().await),
            None => match self.content.load().await {
                Err(err) => Err(ApiError::Load(err)),
                Ok(_) => Err(ApiError::Internal(anyhow::anyhow!("session not started"))),
            },
        }
    }
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    coursemap::logging::init_with_default("info,tower_http=debug")?;

    let args = AppArgs::parse();
    let mut settings = Settings::from_env()?;
    if let Some(data_dir) = args.data_dir.clone() {
        settings.data_dir = data_dir;
    }
    tracing::info!(?args, "starting coursemap-app");

    let content = Arc::new(ContentStore::new(source_for(&args.course)?));
    // A failure stays memoized; every API route reports it until restart.
    let session = match AppController::start(&content, &settings, args.layout).await {
        Ok(controller) => Some(Arc::new(Mutex::new(controller))),
        Err(err) => {
            tracing::warn!(%err, "course failed to load; serving error pane");
            None
        }
    };
    let state = AppState { content, session };

    let mut app = Router::new()
        .route("/healthz", get(|| async { "ok\n" }))
        .route("/api/course", get(course_handler))
        .route("/api/session", get(session_handler))
        .route("/api/view", post(view_handler))
        .route("/api/search", get(search_handler))
        .route("/api/mindmap", get(mindmap_handler))
        .route("/api/mindmap.svg", get(mindmap_svg_handler))
        .route("/api/mindmap.png", get(mindmap_png_handler))
        .route("/api/chapters/:id", get(chapter_handler))
        .route("/api/bookmarks", get(list_bookmarks).post(add_bookmark))
        .route("/api/bookmarks/:chapter", delete(remove_bookmark))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let web_index = args.web_dir.join("index.html");
    if web_index.exists() {
        let static_files = ServeDir::new(args.web_dir).not_found_service(ServeFile::new(web_index));
        app = app.fallback_service(static_files);
    } else {
        app = app.fallback(|| async { Html(INLINE_PAGE) });
    }

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

const INLINE_PAGE: &str = r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>coursemap</title></head>
  <body>
    <h1>coursemap</h1>
    <p>web assets not found. The JSON API is under <code>/api</code>;
    try <a href="/api/mindmap.svg">/api/mindmap.svg</a>.</p>
  </body>
</html>
"#;

enum ApiError {
    Load(LoadError),
    Export(ExportError),
    NotFound(String),
    BadRequest(String),
    Internal(anyhow::Error),
}

impl From<LoadError> for ApiError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

impl From<ExportError> for ApiError {
    fn from(err: ExportError) -> Self {
        Self::Export(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Load(err) => {
                (StatusCode::SERVICE_UNAVAILABLE, Html(render_load_error(&err))).into_response()
            }
            Self::Export(err @ (ExportError::EmptySurface { .. } | ExportError::NothingVisible)) => {
                (StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }
            Self::Export(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
            Self::NotFound(what) => (StatusCode::NOT_FOUND, what).into_response(),
            Self::BadRequest(why) => (StatusCode::BAD_REQUEST, why).into_response(),
            Self::Internal(err) => {
                tracing::error!(err = %format!("{err:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn course_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let course = state.content.load().await?;
    let etag = state
        .content
        .fingerprint()
        .map(|fp| format!("\"{fp}\""))
        .and_then(|tag| HeaderValue::from_str(&tag).ok());

    if let Some(etag) = &etag
        && headers.get(header::IF_NONE_MATCH) == Some(etag)
    {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let mut resp = Json(CourseResponse {
        stats: course.stats(),
        course: course.as_ref(),
    })
    .into_response();
    if let Some(etag) = etag {
        resp.headers_mut().insert(header::ETAG, etag);
    }
    Ok(resp)
}

#[derive(Serialize)]
struct CourseResponse<'a> {
    stats: coursemap::formats::CourseStats,
    course: &'a Course,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Response> {
    let app = state.session().await?;
    Ok(Json(app.search(&query.q)).into_response())
}

#[derive(Debug, Deserialize)]
struct MindmapQuery {
    #[serde(default)]
    layout: LayoutKind,
    /// `all`, or comma-separated node ids to expand in order.
    #[serde(default)]
    expand: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

async fn build_mindmap(state: &AppState, query: &MindmapQuery) -> ApiResult<MindMap> {
    let course = state.content.load().await?;
    let mut map = MindMap::from_course(&course, query.layout, EventBus::default());
    match query.expand.as_deref().map(str::trim) {
        None | Some("") => {}
        Some("all") => map.expand_all(),
        Some(ids) => {
            for id in ids.split(',').map(str::trim).filter(|id| !id.is_empty()) {
                if map.node(id).is_none() {
                    return Err(ApiError::BadRequest(format!("unknown node: {id}")));
                }
                if !map.is_expanded(id) {
                    map.toggle(id);
                }
            }
        }
    }
    map.settle(DEFAULT_SETTLE_TICKS);
    if let (Some(width), Some(height)) = (query.width, query.height) {
        map.resize(width, height);
    }
    map.reset_view();
    Ok(map)
}

#[derive(Serialize)]
struct PlacedNode<'a> {
    #[serde(flatten)]
    node: &'a FlatNode,
    position: Option<Point>,
    expanded: bool,
    has_children: bool,
}

#[derive(Serialize)]
struct MindmapResponse<'a> {
    layout: &'static str,
    transform: Transform,
    nodes: Vec<PlacedNode<'a>>,
}

async fn mindmap_handler(
    State(state): State<AppState>,
    Query(query): Query<MindmapQuery>,
) -> ApiResult<Response> {
    let map = build_mindmap(&state, &query).await?;
    let nodes = map
        .visible_nodes()
        .into_iter()
        .map(|node| PlacedNode {
            node,
            position: map.position(&node.id),
            expanded: map.is_expanded(&node.id),
            has_children: map.has_children(&node.id),
        })
        .collect();
    Ok(Json(MindmapResponse {
        layout: map.layout_name(),
        transform: map.viewport().transform(),
        nodes,
    })
    .into_response())
}

async fn mindmap_svg_handler(
    State(state): State<AppState>,
    Query(query): Query<MindmapQuery>,
) -> ApiResult<Response> {
    let map = build_mindmap(&state, &query).await?;
    let svg = export_svg(&map)?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

async fn mindmap_png_handler(
    State(state): State<AppState>,
    Query(query): Query<MindmapQuery>,
) -> ApiResult<Response> {
    let map = build_mindmap(&state, &query).await?;
    let png = export_png(&map)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

#[derive(Debug, Deserialize)]
struct ChapterQuery {
    /// Dotted section path, e.g. `0.2`.
    section: Option<String>,
    takeaway: Option<usize>,
}

#[derive(Serialize)]
struct ChapterResponse {
    pane: ContentPane,
    markdown: String,
    html: String,
}

async fn chapter_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Query(query): Query<ChapterQuery>,
) -> ApiResult<Response> {
    let selection = match (query.section.as_deref(), query.takeaway) {
        (Some(raw), _) => {
            let path = raw
                .parse::<SectionRef>()
                .map_err(|err| ApiError::BadRequest(format!("{err:#}")))?;
            ContentSelection::section(id, path)
        }
        (None, Some(index)) => ContentSelection::takeaway(id, index),
        (None, None) => ContentSelection::chapter(id),
    };
    let mut app = state.session().await?;
    let missing = format!("no content for {}", selection.event_name());
    let pane = app
        .select(selection)
        .cloned()
        .ok_or(ApiError::NotFound(missing))?;
    Ok(Json(ChapterResponse {
        markdown: pane.render_markdown(),
        html: pane.render_html(),
        pane,
    })
    .into_response())
}

async fn list_bookmarks(State(state): State<AppState>) -> ApiResult<Response> {
    let app = state.session().await?;
    Ok(Json(app.bookmarks().to_vec()).into_response())
}

#[derive(Debug, Deserialize)]
struct AddBookmark {
    chapter: u32,
}

async fn add_bookmark(
    State(state): State<AppState>,
    Json(body): Json<AddBookmark>,
) -> ApiResult<Response> {
    let mut app = state.session().await?;
    if app.course().chapter(body.chapter).is_none() {
        return Err(ApiError::NotFound(format!("unknown chapter: {}", body.chapter)));
    }
    let created = app
        .add_bookmark(body.chapter)
        .await
        .map_err(ApiError::Internal)?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(app.bookmarks().to_vec())).into_response())
}

async fn remove_bookmark(
    State(state): State<AppState>,
    Path(chapter): Path<u32>,
) -> ApiResult<Response> {
    let mut app = state.session().await?;
    if !app
        .remove_bookmark(chapter)
        .await
        .map_err(ApiError::Internal)?
    {
        return Err(ApiError::NotFound(format!("chapter {chapter} is not bookmarked")));
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Serialize)]
struct SessionResponse<'a> {
    view_mode: ViewMode,
    breakpoint_px: u32,
    first_visit: bool,
    pane: Option<&'a ContentPane>,
    bookmarks: &'a [Bookmark],
}

fn session_json(app: &AppController) -> Response {
    Json(SessionResponse {
        view_mode: app.view_mode(),
        breakpoint_px: app.breakpoint_px(),
        first_visit: app.is_first_visit(),
        pane: app.pane(),
        bookmarks: app.bookmarks(),
    })
    .into_response()
}

async fn session_handler(State(state): State<AppState>) -> ApiResult<Response> {
    let app = state.session().await?;
    Ok(session_json(&app))
}

#[derive(Debug, Deserialize)]
struct ViewRequest {
    #[serde(default)]
    mode: Option<ViewMode>,
    /// Current window width; narrow widths force content-only.
    #[serde(default)]
    width: Option<u32>,
}

async fn view_handler(
    State(state): State<AppState>,
    Json(body): Json<ViewRequest>,
) -> ApiResult<Response> {
    let mut app = state.session().await?;
    if let Some(mode) = body.mode {
        app.set_view_mode(mode);
    }
    if let Some(width) = body.width {
        app.on_resize(width);
    }
    Ok(session_json(&app))
}

use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{extract::FromRequestParts, routing, Json, Router, ServiceExt};
use serde::Deserialize;
use serde_json::json;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::actions;
use crate::config::Config;
use crate::db;
use crate::site;
use crate::tree;
use crate::util::ForumErr;

pub struct ServerCtx<DB> {
    pub config:  Config,
    pub actions: actions::Actions,
    pub db:      DB,
}

impl IntoResponse for ForumErr {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ForumErr::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ForumErr::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            ForumErr::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ForumErr::Database(_) | ForumErr::Internal(_) => {
                // Full detail stays server-side.
                error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    String::from("internal server error"),
                )
            },
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The auth collaborator terminates sessions upstream and forwards the
/// identity in headers; this extractor is the only place that contract
/// is read.
impl<S> FromRequestParts<S> for actions::AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };

        let (uuid, username) = match (header("x-auth-uuid"), header("x-auth-username")) {
            (Some(uuid), Some(username)) if !uuid.is_empty() && !username.is_empty() => {
                (uuid, username)
            },
            _ => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "authentication required" })),
                )
                    .into_response())
            },
        };

        let is_staff = matches!(header("x-auth-staff").as_deref(), Some("1") | Some("true"));

        Ok(actions::AuthUser { uuid,
                               username,
                               is_staff, })
    }
}

#[derive(Deserialize)]
struct PageParams {
    page:  Option<u64>,
    limit: Option<u64>,
}

#[derive(Deserialize)]
struct NewThread {
    title:       String,
    content:     String,
    category_id: u64,
}

#[derive(Deserialize)]
struct NewReply {
    content:   String,
    parent_id: Option<u64>,
}

#[derive(Deserialize)]
struct EditReply {
    content: String,
}

#[derive(Deserialize)]
struct ReactBody {
    reaction: String,
}

async fn create_thread<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    auth: actions::AuthUser,
    Json(body): Json<NewThread>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    let thread_id =
        ctx.actions
           .create_thread(&ctx.db, &auth, &body.title, &body.content, body.category_id)?;

    Ok(Json(json!({ "thread_id": thread_id })))
}

async fn get_thread<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(thread_id): Path<u64>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    let thread = ctx.db.get_thread(thread_id)?;

    let uuids = vec![thread.author_uuid.clone()];
    let users = ctx.db.get_users_by_uuids(&uuids)?;
    let username = users.first().map(|u| u.username.as_str());

    Ok(Json(json!({ "thread": tree::view_thread(&thread, username) })))
}

async fn delete_thread<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(thread_id): Path<u64>,
    auth: actions::AuthUser,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    ctx.actions.delete_thread(&ctx.db, &auth, thread_id)?;
    Ok(Json(json!({ "success": true })))
}

async fn get_thread_replies<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(thread_id): Path<u64>,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    // 404 for a thread that never existed; a soft-deleted thread's
    // replies stay navigable.
    ctx.db.get_thread(thread_id)?;

    let page = params.page.unwrap_or(1).max(1);
    let limit = params
        .limit
        .unwrap_or(ctx.config.tree.page_limit)
        .clamp(1, ctx.config.tree.max_page_limit);

    let page_data = tree::thread_replies(
        &ctx.db,
        thread_id,
        page,
        limit,
        ctx.config.tree.max_fetch_depth,
    )?;

    Ok(Json(json!({ "replies": page_data.replies, "total": page_data.total })))
}

async fn get_reply_branch<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path((thread_id, parent_id)): Path<(u64, u64)>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    let branch =
        tree::reply_branch(&ctx.db, thread_id, parent_id, ctx.config.tree.max_fetch_depth)?;

    Ok(Json(json!({ "parent": branch.parent, "replies": branch.replies })))
}

async fn create_reply<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(thread_id): Path<u64>,
    auth: actions::AuthUser,
    Json(body): Json<NewReply>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    let post_id =
        ctx.actions
           .create_reply(&ctx.db, &auth, thread_id, &body.content, body.parent_id)?;

    let reply = tree::single_post(&ctx.db, post_id)?;
    Ok(Json(json!({ "reply": reply })))
}

async fn get_reply<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(post_id): Path<u64>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    let reply = tree::single_post(&ctx.db, post_id)?;
    Ok(Json(json!({ "reply": reply })))
}

async fn edit_reply<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(post_id): Path<u64>,
    auth: actions::AuthUser,
    Json(body): Json<EditReply>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    ctx.actions.edit_reply(&ctx.db, &auth, post_id, &body.content)?;
    Ok(Json(json!({ "success": true })))
}

async fn delete_reply<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(post_id): Path<u64>,
    auth: actions::AuthUser,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    ctx.actions.delete_reply(&ctx.db, &auth, post_id)?;
    Ok(Json(json!({ "success": true })))
}

async fn react<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(post_id): Path<u64>,
    auth: actions::AuthUser,
    Json(body): Json<ReactBody>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    let kind = site::ReactionKind::from_str(&body.reaction)
        .ok_or_else(|| ForumErr::validation(format!("invalid reaction type {}", body.reaction)))?;

    let reputation = ctx.actions.react(&ctx.db, &auth, post_id, kind)?;
    Ok(Json(json!({ "success": true, "reputation": reputation })))
}

async fn get_reputation<DB>(
    State(ctx): State<Arc<ServerCtx<DB>>>,
    Path(post_id): Path<u64>,
) -> Result<Json<serde_json::Value>, ForumErr>
where
    DB: 'static + db::Database + Sync + Send,
{
    ctx.db.get_post(post_id)?;
    let reputation = ctx.db.score(post_id)?;
    Ok(Json(json!({ "reputation": reputation })))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not found" })),
    )
        .into_response()
}

pub fn router<DB>(ctx: Arc<ServerCtx<DB>>) -> Router
where
    DB: 'static + db::Database + Sync + Send,
{
    Router::new()
        .route("/threads", routing::post(create_thread::<DB>))
        .route(
            "/threads/{id}",
            routing::get(get_thread::<DB>).delete(delete_thread::<DB>),
        )
        .route(
            "/threads/{id}/replies",
            routing::get(get_thread_replies::<DB>).post(create_reply::<DB>),
        )
        .route(
            "/threads/{id}/replies/{parent_id}",
            routing::get(get_reply_branch::<DB>),
        )
        .route(
            "/replies/{id}",
            routing::get(get_reply::<DB>)
                .put(edit_reply::<DB>)
                .delete(delete_reply::<DB>),
        )
        .route("/posts/{id}/react", routing::post(react::<DB>))
        .route("/posts/{id}/reputation", routing::get(get_reputation::<DB>))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

pub async fn serve<DB>(config: Config, actions: actions::Actions, database: DB)
where
    DB: 'static + db::Database + Sync + Send,
{
    let addr = config.addr;
    let ctx = Arc::new(ServerCtx { config,
                                   actions,
                                   db: database, });

    let app = NormalizePathLayer::trim_trailing_slash().layer(router(ctx));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("could not bind server address");

    info!(%addr, "serving forum api");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .await
        .expect("server quit unexpectedly");
}

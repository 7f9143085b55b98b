//! HTTP routes.
//!
//! Public:
//! - `GET /` and `GET /:slug`, `GET /links/:slug`: redirect (301 to the
//!   target, 302 to the fallback).
//!
//! Admin (guarded by `x-api-key` when `ADMIN_API_KEY` is set):
//! - `POST /links`: create, 201 `{shortUrl}`.
//! - `GET /links`: list, 200 `{total, data}`.
//! - `PUT /links/:slug`: change URL, 200 `{slug, url, shortUrl}`.
//! - `DELETE /links/:slug`: 204.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use domain::service::{LinkService, Redirect};
use domain::{Link, LinkError, NewLink, Slug, SystemClock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ApiError;
use crate::repo::AnyRepo;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub svc: Arc<LinkService<AnyRepo, SystemClock>>,
    pub admin_api_key: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/links", post(create_link).get(list_links))
        .route("/links/", put(missing_slug).delete(missing_slug))
        .route("/links/:slug", put(update_link).delete(delete_link))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/", get(redirect_root))
        .route("/:slug", get(redirect_slug))
        .route("/links/:slug", get(redirect_slug))
        .merge(admin)
        .with_state(state)
}

#[derive(Deserialize)]
struct CreateLinkReq {
    #[serde(default)]
    slug: String,
    #[serde(default)]
    url: String,
}

#[derive(Deserialize)]
struct UpdateLinkReq {
    #[serde(default)]
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatedOut {
    short_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkOut {
    slug: String,
    url: String,
    creation_date: u64,
    last_update_date: u64,
    visit_count: u64,
}

impl From<&Link> for LinkOut {
    fn from(link: &Link) -> Self {
        Self {
            slug: link.slug().to_string(),
            url: link.url().to_string(),
            creation_date: link.creation_date(),
            last_update_date: link.last_update_date(),
            visit_count: link.visit_count(),
        }
    }
}

#[derive(Serialize)]
struct ListOut {
    total: usize,
    data: Vec<LinkOut>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdatedOut {
    slug: String,
    url: String,
    short_url: String,
}

/// Reject admin calls without the configured key. No key configured means
/// access control lives upstream.
async fn require_api_key(
    State(st): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = st.admin_api_key.as_deref() {
        let given = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            warn!(path = %req.uri().path(), "rejected admin request: bad or missing api key");
            return Err(ApiError::Unauthorized("Invalid or missing API key".into()));
        }
    }
    Ok(next.run(req).await)
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::BadRequest("Request body is required".into()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// 301 to the target or 302 to the fallback. A stored target that cannot be
/// sent as a `Location` header degrades to the fallback.
fn redirect_response(redirect: Redirect, fallback_url: &str) -> Response {
    let target = match redirect {
        Redirect::Target(url) => url,
        Redirect::Fallback(url) => {
            return (StatusCode::FOUND, [(header::LOCATION, url)]).into_response();
        }
    };
    match HeaderValue::try_from(target.as_str()) {
        Ok(location) => {
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
        }
        Err(e) => {
            warn!(url = %target.escape_debug(), err = %e, "unusable redirect target");
            let location = fallback_url.to_string();
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
    }
}

async fn redirect_root(State(st): State<AppState>) -> Response {
    redirect_response(st.svc.redirect_link(None).await, st.svc.fallback_url())
}

async fn redirect_slug(State(st): State<AppState>, Path(slug): Path<String>) -> Response {
    redirect_response(
        st.svc.redirect_link(Some(&slug)).await,
        st.svc.fallback_url(),
    )
}

async fn create_link(
    State(st): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedOut>), ApiError> {
    let req: CreateLinkReq = parse_body(&body)?;
    let input = NewLink {
        slug: req.slug,
        url: req.url,
    };
    let link = Link::create_for_new(&input, st.svc.clock())
        .map_err(|e| ApiError::from_link_error(e.into(), "Invalid link data"))?;
    let created = st.svc.create_link(&link).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedOut {
            short_url: created.short_url,
        }),
    ))
}

async fn list_links(State(st): State<AppState>) -> Result<Json<ListOut>, ApiError> {
    let list = st.svc.get_all_links().await?;
    Ok(Json(ListOut {
        total: list.total,
        data: list.data.iter().map(LinkOut::from).collect(),
    }))
}

async fn update_link(
    State(st): State<AppState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Result<Json<UpdatedOut>, ApiError> {
    let req: UpdateLinkReq = parse_body(&body)?;
    let slug = Slug::parse(raw.trim())
        .map_err(|e| ApiError::from_link_error(e.into(), "Invalid slug"))?;
    let updated = st
        .svc
        .update_link(&slug, &req.url)
        .await
        .map_err(|e| ApiError::from_link_error(e, "Invalid new link data"))?;
    Ok(Json(UpdatedOut {
        slug: updated.slug.to_string(),
        url: updated.url,
        short_url: updated.short_url,
    }))
}

async fn delete_link(
    State(st): State<AppState>,
    Path(raw): Path<String>,
) -> Result<StatusCode, ApiError> {
    // A malformed slug can never have been stored
    let slug = Slug::parse(raw.trim())
        .map_err(|_| ApiError::from(LinkError::SlugNotFound(raw.clone())))?;
    st.svc.delete_link(&slug).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn missing_slug() -> ApiError {
    ApiError::BadRequest("Slug is required in path parameters".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use serde_json::Value;
    use tower::util::ServiceExt;

    const API: &str = "https://sho.rt";
    const FALLBACK: &str = "https://portfolio.sho.rt";

    fn app(key: Option<&str>) -> Router {
        let state = AppState {
            svc: Arc::new(LinkService::new(AnyRepo::memory(), SystemClock, API)),
            admin_api_key: key.map(Arc::from),
        };
        router(state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> Response {
        send_with(app, method, uri, body, &[]).await
    }

    async fn send_with(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<&str>,
        headers: &[(&str, &str)],
    ) -> Response {
        let mut req = axum::http::Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let body = match body {
            Some(b) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(req.body(body).unwrap()).await.unwrap()
    }

    async fn json(resp: Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn location(resp: &Response) -> &str {
        resp.headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn create_redirect_update_delete_flow() {
        let app = app(None);

        let resp = send(
            &app,
            "POST",
            "/links",
            Some(r#"{"slug":"promo","url":"https://example.com/sale"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body = json(resp).await;
        let short_url = body["shortUrl"].as_str().unwrap();
        assert!(short_url.ends_with("/promo"));
        assert_eq!(short_url, "https://sho.rt/promo");

        let resp = send(&app, "GET", "/links/promo", None).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location(&resp), "https://example.com/sale");

        let list = json(send(&app, "GET", "/links", None).await).await;
        assert_eq!(list["total"], 1);
        assert_eq!(list["data"][0]["slug"], "promo");
        assert_eq!(list["data"][0]["visitCount"], 1);

        let resp = send(
            &app,
            "PUT",
            "/links/promo",
            Some(r#"{"url":"https://example.com/sale2"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        assert_eq!(body["slug"], "promo");
        assert_eq!(body["url"], "https://example.com/sale2");
        assert_eq!(body["shortUrl"], "https://sho.rt/promo");

        let resp = send(&app, "DELETE", "/links/promo", None).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());

        let resp = send(&app, "GET", "/links/promo", None).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), FALLBACK);
    }

    #[tokio::test]
    async fn list_shape_uses_camel_case_fields() {
        let app = app(None);
        let list = json(send(&app, "GET", "/links", None).await).await;
        assert_eq!(list["total"], 0);
        assert_eq!(list["data"], Value::Array(vec![]));

        send(&app, "POST", "/links", Some(r#"{"slug":"a1","url":"https://a.example"}"#)).await;
        send(&app, "POST", "/links", Some(r#"{"slug":"b2","url":"https://b.example"}"#)).await;
        let list = json(send(&app, "GET", "/links", None).await).await;
        assert_eq!(list["total"], 2);
        let first = &list["data"][0];
        for field in ["slug", "url", "creationDate", "lastUpdateDate", "visitCount"] {
            assert!(first.get(field).is_some(), "missing {field}");
        }
        assert_eq!(first["creationDate"], first["lastUpdateDate"]);
    }

    #[tokio::test]
    async fn short_path_and_root_redirects() {
        let app = app(None);
        send(&app, "POST", "/links", Some(r#"{"slug":"Docs","url":"https://docs.example"}"#)).await;

        let resp = send(&app, "GET", "/docs", None).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location(&resp), "https://docs.example");

        let resp = send(&app, "GET", "/DOCS", None).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);

        let resp = send(&app, "GET", "/", None).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), FALLBACK);

        let resp = send(&app, "GET", "/not_a-valid!slug", None).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), FALLBACK);
    }

    #[tokio::test]
    async fn create_reports_every_invalid_field() {
        let app = app(None);
        let resp = send(&app, "POST", "/links", Some(r#"{"slug":"a","url":"not-a-url"}"#)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json(resp).await;
        assert_eq!(body["error"]["code"], "validation_error");
        assert_eq!(body["error"]["message"], "Invalid link data");
        let fields: Vec<&str> = body["error"]["issues"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|i| i["field"].as_str())
            .collect();
        assert!(fields.contains(&"slug"));
        assert!(fields.contains(&"url"));

        // missing fields are reported, not rejected as malformed JSON
        let resp = send(&app, "POST", "/links", Some("{}")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn create_duplicate_conflicts() {
        let app = app(None);
        let body = r#"{"slug":"dup","url":"https://example.com"}"#;
        assert_eq!(send(&app, "POST", "/links", Some(body)).await.status(), StatusCode::CREATED);

        let resp = send(
            &app,
            "POST",
            "/links",
            Some(r#"{"slug":"DUP","url":"https://other.com"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = json(resp).await;
        assert_eq!(body["error"]["code"], "conflict");
        assert_eq!(body["error"]["message"], "Slug 'dup' already exists");
    }

    #[tokio::test]
    async fn body_is_required_and_must_be_json() {
        let app = app(None);

        let resp = send(&app, "POST", "/links", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["error"]["message"], "Request body is required");

        let resp = send(&app, "PUT", "/links/promo", Some("  ")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["error"]["message"], "Request body is required");

        let resp = send(&app, "POST", "/links", Some("{not json")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn missing_slug_in_path() {
        let app = app(None);
        for method in ["PUT", "DELETE"] {
            let resp = send(&app, method, "/links/", Some(r#"{"url":"https://x.example"}"#)).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{method}");
            assert_eq!(
                json(resp).await["error"]["message"],
                "Slug is required in path parameters"
            );
        }
    }

    #[tokio::test]
    async fn update_errors() {
        let app = app(None);

        let resp = send(&app, "PUT", "/links/ghost", Some(r#"{"url":"https://x.example"}"#)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json(resp).await["error"]["message"],
            "Link with slug 'ghost' not found"
        );

        let resp = send(
            &app,
            "PUT",
            "/links/bad_slug",
            Some(r#"{"url":"https://x.example"}"#),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        send(&app, "POST", "/links", Some(r#"{"slug":"promo","url":"https://example.com"}"#)).await;
        let resp = send(&app, "PUT", "/links/promo", Some(r#"{"url":"nope"}"#)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json(resp).await;
        assert_eq!(body["error"]["message"], "Invalid new link data");
        assert_eq!(body["error"]["issues"][0]["field"], "url");
    }

    #[tokio::test]
    async fn update_with_same_url_returns_current_state() {
        let app = app(None);
        send(&app, "POST", "/links", Some(r#"{"slug":"same","url":"https://example.com"}"#)).await;
        let resp = send(&app, "PUT", "/links/same", Some(r#"{"url":"https://example.com"}"#)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json(resp).await["url"], "https://example.com");
    }

    #[tokio::test]
    async fn delete_errors() {
        let app = app(None);
        let resp = send(&app, "DELETE", "/links/ghost", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(resp).await["error"]["message"], "Slug 'ghost' not found");

        let resp = send(&app, "DELETE", "/links/no_such!slug", None).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn api_key_guards_admin_routes_only() {
        let app = app(Some("s3cret"));
        let body = r#"{"slug":"guarded","url":"https://example.com"}"#;

        let resp = send(&app, "POST", "/links", Some(body)).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(resp).await["error"]["code"], "unauthorized");

        let resp = send_with(
            &app,
            "POST",
            "/links",
            Some(body),
            &[(API_KEY_HEADER, "wrong")],
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = send_with(
            &app,
            "POST",
            "/links",
            Some(body),
            &[(API_KEY_HEADER, "s3cret")],
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        for (method, uri) in [("GET", "/links"), ("DELETE", "/links/guarded")] {
            let resp = send(&app, method, uri, None).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }

        // redirects stay public
        let resp = send(&app, "GET", "/links/guarded", None).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        let resp = send(&app, "GET", "/guarded", None).await;
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    }

    #[test]
    fn unsendable_target_redirects_to_fallback() {
        let resp = redirect_response(Redirect::Target("https://example.com/a\nb".into()), FALLBACK);
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), FALLBACK);

        let resp = redirect_response(Redirect::Target("https://example.com/ok".into()), FALLBACK);
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(location(&resp), "https://example.com/ok");
    }

    #[tokio::test]
    async fn stored_target_with_newline_falls_back() {
        use domain::adapters::memory_repo::InMemoryRepo;
        use domain::{LinkRecord, LinkRepository};

        let repo = InMemoryRepo::new();
        let legacy = Link::reconstitute(LinkRecord {
            slug: "legacy".into(),
            url: "https://example.com/a\nb".into(),
            creation_date: 1_700_000_000_000,
            last_update_date: 1_700_000_000_000,
            visit_count: 0,
        });
        repo.create(&legacy).await.unwrap();
        let app = router(AppState {
            svc: Arc::new(LinkService::new(AnyRepo::Memory(repo), SystemClock, API)),
            admin_api_key: None,
        });

        let resp = send(&app, "GET", "/links/legacy", None).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(location(&resp), FALLBACK);

        let body = r#"{"slug":"nl","url":"https://example.com/a\nb"}"#;
        let resp = send(&app, "POST", "/links", Some(body)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(resp).await["error"]["issues"][0]["field"], "url");
    }
}

//! Catalog route handlers
//!
//! Each handler validates its query parameters, builds the route's cache key
//! and funnels the provider call through the cache-aside layer. Validation
//! failures are terminal responses, not errors; anything the provider or the
//! store reports bubbles up to the router's 500 boundary.

use super::AppState;
use crate::catalog::{AudioKind, StreamingServer};
use crate::error::Result;
use crate::utils::{json_message, json_response, QueryParams};
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Response, StatusCode};
use std::sync::Arc;

pub fn health() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain")
        .body(Body::from("Welcome to anix api!"))
        .unwrap()
}

pub async fn recent_episodes(state: &AppState, query: &QueryParams) -> Result<Response<Body>> {
    let page: u32 = query.get("page").and_then(|v| v.parse().ok()).unwrap_or(1);
    let kind: u32 = query.get("type").and_then(|v| v.parse().ok()).unwrap_or(1);

    let key = format!("recent-episodes;page;{};type;{}", page, kind);
    let provider = Arc::clone(&state.provider);
    let value = state
        .cached(&key, state.config.cache.ttl(), move || async move {
            provider.recent_episodes(page, kind).await
        })
        .await?;

    Ok(json_response(StatusCode::OK, &value))
}

pub async fn search(state: &AppState, query: &QueryParams) -> Result<Response<Body>> {
    let keyword = match query.get_non_empty("keyword") {
        Some(keyword) => keyword.to_string(),
        None => {
            return Ok(json_message(
                StatusCode::BAD_REQUEST,
                "Search keyword is required",
            ))
        }
    };
    let page: u32 = query.get("page").and_then(|v| v.parse().ok()).unwrap_or(1);

    let key = format!("search;{};{};", keyword, page);
    let provider = Arc::clone(&state.provider);
    let value = state
        .cached(&key, state.config.cache.ttl(), move || async move {
            provider.search(&keyword, page).await
        })
        .await?;

    Ok(json_response(StatusCode::OK, &value))
}

pub async fn anime_info(state: &AppState, query: &QueryParams) -> Result<Response<Body>> {
    let id = match query.get_non_empty("id") {
        Some(id) => id.to_string(),
        None => return Ok(json_message(StatusCode::BAD_REQUEST, "id is required")),
    };

    let key = format!("info;{};", id);
    let provider = Arc::clone(&state.provider);
    let value = state
        .cached(&key, state.config.cache.ttl(), move || async move {
            provider.anime_info(&id).await
        })
        .await?;

    Ok(json_response(StatusCode::OK, &value))
}

pub async fn watch(state: &AppState, query: &QueryParams) -> Result<Response<Body>> {
    let audio = match query.get("type") {
        None => AudioKind::Sub,
        Some(raw) => match raw.parse::<AudioKind>() {
            Ok(audio) => audio,
            Err(_) => {
                return Ok(json_message(
                    StatusCode::BAD_REQUEST,
                    "type must be sub or dub",
                ))
            }
        },
    };
    let id = match query.get_non_empty("id") {
        Some(id) => id.to_string(),
        None => return Ok(json_message(StatusCode::BAD_REQUEST, "id is required")),
    };
    let episode_id = match query.get_non_empty("epId") {
        Some(episode_id) => episode_id.to_string(),
        None => return Ok(json_message(StatusCode::BAD_REQUEST, "epId is required")),
    };
    let server = match query.get("server") {
        Some(raw) => match raw.parse::<StreamingServer>() {
            Ok(server) => server,
            Err(_) => return Ok(json_message(StatusCode::BAD_REQUEST, "Invalid server")),
        },
        None => StreamingServer::BuiltIn,
    };

    let key = format!(
        "watch;{};{};{};type;{}",
        id,
        episode_id,
        server.as_str(),
        audio.as_str()
    );
    let provider = Arc::clone(&state.provider);
    let value = state
        .cached(&key, state.config.cache.ttl(), move || async move {
            provider
                .episode_sources(&id, &episode_id, server, audio)
                .await
        })
        .await?;

    Ok(json_response(StatusCode::OK, &value))
}

pub async fn episode_servers(state: &AppState, query: &QueryParams) -> Result<Response<Body>> {
    let audio = match query.get("type") {
        None => AudioKind::Sub,
        Some(raw) => match raw.parse::<AudioKind>() {
            Ok(audio) => audio,
            Err(_) => {
                return Ok(json_message(
                    StatusCode::BAD_REQUEST,
                    "type must be sub or dub",
                ))
            }
        },
    };
    let id = match query.get_non_empty("id") {
        Some(id) => id.to_string(),
        None => return Ok(json_message(StatusCode::BAD_REQUEST, "id is required")),
    };
    let episode_id = match query.get_non_empty("epId") {
        Some(episode_id) => episode_id.to_string(),
        None => return Ok(json_message(StatusCode::BAD_REQUEST, "epId is required")),
    };

    let key = format!("server;{};{};type;{}", id, episode_id, audio.as_str());
    let provider = Arc::clone(&state.provider);
    let value = state
        .cached(&key, state.config.cache.ttl(), move || async move {
            provider.episode_servers(&id, &episode_id, audio).await
        })
        .await?;

    Ok(json_response(StatusCode::OK, &value))
}

pub async fn random_anime(state: &AppState) -> Result<Response<Body>> {
    let provider = Arc::clone(&state.provider);
    let value = state
        .cached(
            "random",
            state.config.cache.random_anime_ttl(),
            move || async move { provider.random_anime().await },
        )
        .await?;

    Ok(json_response(StatusCode::OK, &value))
}

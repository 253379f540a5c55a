//! /search, /download, /upload, /delete handlers for operator requests.
//!
//! Each handler only sends the request. The answer arrives asynchronously
//! and shows up under /outcomes, keyed by the `request` returned here.

use std::path::PathBuf;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use treecast_core::wire::SearchType;

use super::{parse_identity, request_failed, ApiState};

#[derive(Serialize)]
pub struct RequestAccepted {
    /// Correlation key, `identity:serial`.
    pub request: String,
}

// ── /search ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SearchRequest {
    pub search_type: SearchType,
    pub query: String,
}

pub async fn handle_search(
    State(state): State<ApiState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<RequestAccepted>, (StatusCode, String)> {
    let request = state
        .peer
        .search(req.search_type, &req.query)
        .await
        .map_err(request_failed)?;
    Ok(Json(RequestAccepted { request }))
}

// ── /download ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DownloadRequest {
    pub peer: String,
    pub remote: String,
    /// Where to write the file on this machine.
    pub local: PathBuf,
}

pub async fn handle_download(
    State(state): State<ApiState>,
    Json(req): Json<DownloadRequest>,
) -> Result<Json<RequestAccepted>, (StatusCode, String)> {
    let peer = parse_identity(&req.peer)?;
    let request = state
        .peer
        .download(peer, &req.remote, req.local)
        .await
        .map_err(request_failed)?;
    Ok(Json(RequestAccepted { request }))
}

// ── /upload ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UploadRequest {
    pub peer: String,
    /// File on this machine to send.
    pub local: PathBuf,
    pub remote: String,
}

pub async fn handle_upload(
    State(state): State<ApiState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<RequestAccepted>, (StatusCode, String)> {
    let peer = parse_identity(&req.peer)?;
    let request = state
        .peer
        .upload(peer, req.local, &req.remote)
        .await
        .map_err(request_failed)?;
    Ok(Json(RequestAccepted { request }))
}

// ── /delete ───────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DeleteRequest {
    pub peer: String,
    pub remote: String,
}

pub async fn handle_delete(
    State(state): State<ApiState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<RequestAccepted>, (StatusCode, String)> {
    let peer = parse_identity(&req.peer)?;
    let request = state
        .peer
        .delete(peer, &req.remote)
        .await
        .map_err(request_failed)?;
    Ok(Json(RequestAccepted { request }))
}

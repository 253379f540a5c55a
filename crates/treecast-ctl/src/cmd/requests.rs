//! Search, download, upload, delete commands.
//!
//! The daemon answers immediately with the request key; results are read
//! back with `outcomes`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use super::http::{base_url, post_json_body};

#[derive(Deserialize)]
struct RequestAccepted {
    request: String,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    search_type: &'a str,
    query: &'a str,
}

#[derive(Serialize)]
struct DownloadRequest<'a> {
    peer: &'a str,
    remote: &'a str,
    local: PathBuf,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    peer: &'a str,
    local: PathBuf,
    remote: &'a str,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    peer: &'a str,
    remote: &'a str,
}

/// The daemon resolves paths against its own working directory.
fn absolute(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    Ok(cwd.join(path))
}

fn accepted(what: &str, resp: RequestAccepted) {
    println!("{} sent as {}", what, resp.request);
    println!("  results: treecast-ctl outcomes {}", resp.request);
}

pub async fn cmd_search(port: u16, search_type: &str, query: &str) -> Result<()> {
    let search_type = search_type.to_ascii_lowercase();
    if !matches!(search_type.as_str(), "path" | "filename" | "substring") {
        bail!("search type must be path, filename or substring");
    }
    let req = SearchRequest {
        search_type: &search_type,
        query,
    };
    let resp: RequestAccepted =
        post_json_body(&format!("{}/search", base_url(port)), &req).await?;
    accepted("Search", resp);
    Ok(())
}

pub async fn cmd_download(port: u16, peer: &str, remote: &str, local: &str) -> Result<()> {
    let req = DownloadRequest {
        peer,
        remote,
        local: absolute(local)?,
    };
    let resp: RequestAccepted =
        post_json_body(&format!("{}/download", base_url(port)), &req).await?;
    accepted("Download", resp);
    Ok(())
}

pub async fn cmd_upload(port: u16, peer: &str, local: &str, remote: &str) -> Result<()> {
    let req = UploadRequest {
        peer,
        local: absolute(local)?,
        remote,
    };
    let resp: RequestAccepted =
        post_json_body(&format!("{}/upload", base_url(port)), &req).await?;
    accepted("Upload", resp);
    Ok(())
}

pub async fn cmd_delete(port: u16, peer: &str, remote: &str) -> Result<()> {
    let req = DeleteRequest { peer, remote };
    let resp: RequestAccepted =
        post_json_body(&format!("{}/delete", base_url(port)), &req).await?;
    accepted("Delete", resp);
    Ok(())
}

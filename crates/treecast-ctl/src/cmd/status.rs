//! Daemon status, peers, shutdown commands.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json, post_json};

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    identity: String,
    root_dir: String,
    server_port: u16,
    capabilities: Capabilities,
    peers_discovered: usize,
    pending: PendingInfo,
    outcomes: usize,
    uptime_secs: u64,
}

#[derive(Deserialize)]
struct PendingInfo {
    search: usize,
    download: usize,
    upload: usize,
    delete: usize,
}

#[derive(Deserialize)]
struct Capabilities {
    remote_browse: bool,
    search: bool,
    search_match: String,
    download: bool,
    upload: bool,
    delete: bool,
}

impl Capabilities {
    fn print(&self, indent: &str) {
        let flag = |on: bool| if on { "✓" } else { "○" };
        println!(
            "{}{} browse  {} search ({})  {} download  {} upload  {} delete",
            indent,
            flag(self.remote_browse),
            flag(self.search),
            self.search_match,
            flag(self.download),
            flag(self.upload),
            flag(self.delete),
        );
    }
}

#[derive(Deserialize)]
struct PeersResponse {
    peers: Vec<PeerInfo>,
}

#[derive(Deserialize)]
struct PeerInfo {
    identity: String,
    server_port: u16,
    capabilities: Capabilities,
    sent_at: String,
    age_ms: u64,
}

// ── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Treecast Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Identity         : {}", resp.identity);
    println!("  Shared root      : {}", resp.root_dir);
    println!("  Server port      : {}", resp.server_port);
    println!("  Uptime           : {}s", resp.uptime_secs);
    println!("  Peers discovered : {}", resp.peers_discovered);
    println!("  Outcomes         : {}", resp.outcomes);
    println!(
        "  Pending          : search {}, download {}, upload {}, delete {}",
        resp.pending.search, resp.pending.download, resp.pending.upload, resp.pending.delete
    );
    println!("\n  Capabilities:");
    resp.capabilities.print("    ");

    Ok(())
}

pub async fn cmd_peers(port: u16) -> Result<()> {
    let resp: PeersResponse = get_json(&format!("{}/peers", base_url(port))).await?;

    if resp.peers.is_empty() {
        println!("No peers discovered yet.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Discovered Peers ({})", resp.peers.len());
    println!("═══════════════════════════════════════");

    for p in &resp.peers {
        println!("  ┌─ {}", p.identity);
        println!("  │  server port : {}", p.server_port);
        println!("  │  beacon sent : {}", p.sent_at);
        print!("  │  ");
        p.capabilities.print("");
        println!("  └─ last seen   : {}ms ago", p.age_ms);
    }

    Ok(())
}

pub async fn cmd_shutdown(port: u16) -> Result<()> {
    #[derive(Deserialize)]
    struct ShutdownResponse {
        message: String,
    }

    let resp: ShutdownResponse = post_json(&format!("{}/daemon/shutdown", base_url(port))).await?;
    println!("{}", resp.message);
    Ok(())
}

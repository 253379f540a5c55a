//! treecast-ctl: command-line interface for the Treecast daemon.

mod cmd;

use anyhow::{Context, Result};

use cmd::{outcomes, requests, status};

const DEFAULT_PORT: u16 = 4106;

fn print_usage() {
    println!("Usage: treecast-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                              Show identity, capabilities and pending requests");
    println!("  peers                               List peers heard from recently");
    println!("  search <type> <query>               Search every peer (type: path, filename, substring)");
    println!("  download <peer> <remote> <local>    Fetch a file from a peer");
    println!("  upload <peer> <local> <remote>      Send a file to a peer");
    println!("  delete <peer> <remote>              Delete a file on a peer");
    println!("  outcomes [request]                  Show results, optionally for one request");
    println!("  shutdown                            Stop the daemon");
    println!();
    println!("Peers are written username@hostname. Remote paths start at the peer's shared root.");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => status::cmd_status(port).await,
        ["peers"] => status::cmd_peers(port).await,
        ["search", search_type, query] => requests::cmd_search(port, search_type, query).await,
        ["download", peer, remote, local] => {
            requests::cmd_download(port, peer, remote, local).await
        }
        ["upload", peer, local, remote] => requests::cmd_upload(port, peer, local, remote).await,
        ["delete", peer, remote] => requests::cmd_delete(port, peer, remote).await,
        ["outcomes"] => outcomes::cmd_outcomes(port, None).await,
        ["outcomes", request] => outcomes::cmd_outcomes(port, Some(request)).await,
        ["shutdown"] => status::cmd_shutdown(port).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

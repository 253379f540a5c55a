//! Real multicast sockets. Skipped when the host cannot join a group.

use std::net::Ipv4Addr;

use crate::*;
use treecast_core::config::NetworkConfig;
use treecast_core::{Body, Header, SearchType};
use treecast_services::MulticastTransport;

fn network(port: u16) -> NetworkConfig {
    NetworkConfig {
        port,
        loopback: true,
        reuse_addr: true,
        ..NetworkConfig::default()
    }
}

/// Two sockets on the same group and port both see a datagram.
#[tokio::test]
async fn two_members_share_the_group() {
    let group = Ipv4Addr::new(239, 255, 41, 99);
    let port = 41_599;
    let (Ok(a), Ok(b)) = (
        MulticastTransport::bind(&network(port), group),
        MulticastTransport::bind(&network(port), group),
    ) else {
        eprintln!("SKIP: multicast not available");
        return;
    };

    let message = Message::new(
        Header::now(Identity::new("alice", HOST), 7),
        Body::SearchRequest {
            search_type: SearchType::Filename,
            query: "song.ogg".into(),
        },
    );
    if let Err(e) = a.send(&message).await {
        eprintln!("SKIP: no multicast route ({e})");
        return;
    }

    match b.receive(Duration::from_secs(2)).await {
        Ok(Some(got)) => assert_eq!(got, message),
        other => eprintln!("SKIP: datagram not looped back ({other:?})"),
    }
}

//! Request/response correlation for one operation family.
//!
//! A correlator owns two tables:
//!
//! - **outgoing**: requests this peer sent, keyed on their own
//!   `identity:serial`. A response is matched by looking up its
//!   `responseIdentity:responseSerialNumber` here.
//! - **incoming**: messages the router delivered that have not been handled
//!   yet, keyed on the delivered message's own `identity:serial`. A
//!   re-delivered duplicate replaces the waiting copy.
//!
//! Requests addressed to this peer are answered by performing the local
//! action; responses that match a pending request produce exactly one
//! `Outcome`. Everything else is dropped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, Notify};
use tokio::time::Instant;
use treecast_core::wire::{Body, Family, Message, Phase, ResponseTo, SearchType, Target};

use crate::context::PeerContext;
use crate::files;
use crate::handoff::{self, Direction};
use crate::outcome::Outcome;
use crate::workers::ticker;

/// A request this peer sent and still expects an answer to.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub request: Message,
    /// Download destination, or upload source.
    pub local_path: Option<PathBuf>,
    pub sent_at: Instant,
}

pub struct Correlator {
    family: Family,
    ctx: Arc<PeerContext>,
    outgoing: Mutex<HashMap<String, PendingRequest>>,
    incoming: Mutex<HashMap<String, Message>>,
    wake: Notify,
}

impl Correlator {
    pub fn new(family: Family, ctx: Arc<PeerContext>) -> Self {
        Self {
            family,
            ctx,
            outgoing: Mutex::new(HashMap::new()),
            incoming: Mutex::new(HashMap::new()),
            wake: Notify::new(),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Queue a received message for processing.
    pub async fn deliver(&self, message: Message) {
        let key = message.key();
        let replaced = self.incoming.lock().await.insert(key.clone(), message);
        if replaced.is_some() {
            tracing::trace!(family = %self.family, %key, "duplicate delivery replaced");
        }
        self.wake.notify_one();
    }

    /// Remember an outgoing request. Returns its correlation key.
    pub async fn register(&self, request: Message, local_path: Option<PathBuf>) -> String {
        let key = request.key();
        self.outgoing.lock().await.insert(
            key.clone(),
            PendingRequest {
                request,
                local_path,
                sent_at: Instant::now(),
            },
        );
        key
    }

    /// Forget an outgoing request that could not be sent.
    pub async fn withdraw(&self, key: &str) -> Option<PendingRequest> {
        self.outgoing.lock().await.remove(key)
    }

    pub async fn pending(&self) -> usize {
        self.outgoing.lock().await.len()
    }

    pub async fn queued(&self) -> usize {
        self.incoming.lock().await.len()
    }

    /// Handle everything currently queued. Returns how many were handled.
    ///
    /// The inbox is emptied under its lock before any handling starts, so a
    /// message is processed at most once even if this runs concurrently.
    /// Messages from one sender are handled in the order they were sent.
    pub async fn process_inbox(&self) -> usize {
        let mut batch: Vec<Message> = {
            let mut incoming = self.incoming.lock().await;
            incoming.drain().map(|(_, m)| m).collect()
        };
        // Serials only grow, so this restores each sender's order.
        batch.sort_by_key(|m| m.header.serial);
        let n = batch.len();
        for message in batch {
            self.handle(message).await;
        }
        n
    }

    /// Drop outgoing requests older than `ttl`. A zero ttl keeps them forever.
    pub async fn evict_stale(&self, ttl: Duration) -> usize {
        if ttl.is_zero() {
            return 0;
        }
        let mut outgoing = self.outgoing.lock().await;
        let before = outgoing.len();
        outgoing.retain(|_, p| p.sent_at.elapsed() <= ttl);
        let removed = before - outgoing.len();
        if removed > 0 {
            tracing::debug!(family = %self.family, removed, "evicted stale pending requests");
        }
        removed
    }

    /// Process the inbox whenever something arrives (or every `poll`), and
    /// evict stale pending requests every sweep period, until shutdown.
    pub async fn run(self: Arc<Self>, poll: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut poll_tick = ticker(poll);
        let mut sweep = ticker(self.ctx.timing.sleep_time());
        let ttl = self.ctx.timing.pending_ttl();

        tracing::info!(family = %self.family, "correlator starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(family = %self.family, "correlator shutting down");
                    return;
                }
                _ = self.wake.notified() => {
                    self.process_inbox().await;
                }
                _ = poll_tick.tick() => {
                    self.process_inbox().await;
                }
                _ = sweep.tick() => {
                    self.evict_stale(ttl).await;
                }
            }
        }
    }

    async fn handle(&self, message: Message) {
        match message.body.phase() {
            Phase::Request => self.answer(message).await,
            Phase::Result | Phase::Error => self.correlate(message).await,
            Phase::Announce => {
                tracing::trace!(family = %self.family, "announcement delivered to correlator, ignored")
            }
        }
    }

    // ── Answering requests ───────────────────────────────────────────────────

    async fn answer(&self, request: Message) {
        if let Some(target) = request.body.target() {
            if !self.ctx.is_local(&target.peer) {
                tracing::trace!(
                    family = %self.family,
                    target = %target.peer,
                    from = %request.header.identity,
                    "request addressed elsewhere, dropped"
                );
                return;
            }
        }

        tracing::debug!(
            family = %self.family,
            from = %request.header.identity,
            serial = request.header.serial,
            "answering request"
        );

        let reply = ResponseTo::of(&request.header);
        let responses = match &request.body {
            Body::SearchRequest { search_type, query } => {
                self.answer_search(reply, *search_type, query)
            }
            Body::DownloadRequest(target) => vec![self.answer_download(reply, target).await],
            Body::UploadRequest(target) => vec![self.answer_upload(reply, target).await],
            Body::DeleteRequest(target) => vec![self.answer_delete(reply, target)],
            _ => return,
        };

        for body in responses {
            self.ctx.send(self.ctx.message(body));
        }
    }

    fn answer_search(&self, response_to: ResponseTo, search_type: SearchType, query: &str) -> Vec<Body> {
        let caps = self.ctx.capabilities;
        if !caps.search || !caps.search_match.allows(search_type) {
            tracing::debug!(%search_type, search_match = %caps.search_match, "search refused by configuration");
            return vec![Body::SearchError { response_to }];
        }

        let hits = files::search(&self.ctx.root, search_type, query);
        tracing::debug!(%search_type, query, hits = hits.len(), "search complete");
        if hits.is_empty() {
            return vec![Body::SearchError { response_to }];
        }
        hits.into_iter()
            .map(|matched_path| Body::SearchResult {
                response_to: response_to.clone(),
                matched_path,
            })
            .collect()
    }

    async fn answer_download(&self, response_to: ResponseTo, target: &Target) -> Body {
        if !self.ctx.capabilities.download {
            tracing::debug!(path = %target.path, "download refused by configuration");
            return Body::DownloadError { response_to };
        }
        let local = match files::check_download(&self.ctx.root, &target.path) {
            Ok(local) => local,
            Err(e) => {
                tracing::debug!(error = %e, "download refused");
                return Body::DownloadError { response_to };
            }
        };
        match handoff::listen(local, Direction::Serve, self.ctx.accept_timeout).await {
            Ok(listener) => Body::DownloadResult {
                response_to,
                port: listener.port,
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %target.path, "could not arm download listener");
                Body::DownloadError { response_to }
            }
        }
    }

    async fn answer_upload(&self, response_to: ResponseTo, target: &Target) -> Body {
        if !self.ctx.capabilities.upload {
            tracing::debug!(path = %target.path, "upload refused by configuration");
            return Body::UploadError { response_to };
        }
        let local = match files::prepare_upload(&self.ctx.root, &target.path) {
            Ok(local) => local,
            Err(e) => {
                tracing::debug!(error = %e, "upload refused");
                return Body::UploadError { response_to };
            }
        };
        match handoff::listen(local, Direction::Receive, self.ctx.accept_timeout).await {
            Ok(listener) => Body::UploadResult {
                response_to,
                port: listener.port,
            },
            Err(e) => {
                tracing::warn!(error = %e, path = %target.path, "could not arm upload listener");
                Body::UploadError { response_to }
            }
        }
    }

    fn answer_delete(&self, response_to: ResponseTo, target: &Target) -> Body {
        if !self.ctx.capabilities.delete {
            tracing::debug!(path = %target.path, "delete refused by configuration");
            return Body::DeleteError { response_to };
        }
        match files::delete(&self.ctx.root, &target.path) {
            Ok(()) => {
                tracing::info!(path = %target.path, "file deleted on request");
                Body::DeleteResult { response_to }
            }
            Err(e) => {
                tracing::debug!(error = %e, "delete refused");
                Body::DeleteError { response_to }
            }
        }
    }

    // ── Matching responses ───────────────────────────────────────────────────

    async fn correlate(&self, response: Message) {
        let Some(response_to) = response.body.response_to() else {
            return;
        };
        let key = response_to.key();

        // One search fans out to every peer, so its entry stays until evicted.
        let pending = {
            let mut outgoing = self.outgoing.lock().await;
            match self.family {
                Family::Search => outgoing.get(&key).cloned(),
                _ => outgoing.remove(&key),
            }
        };
        let Some(pending) = pending else {
            tracing::trace!(family = %self.family, %key, kind = %response.body.kind(), "no pending request, dropped");
            return;
        };

        let responder = response.header.identity.clone();
        let remote = pending
            .request
            .body
            .target()
            .map(|t| t.path.clone())
            .unwrap_or_default();
        let outcome = |success: bool, summary: String| {
            Outcome::new(self.family, key.clone(), responder.to_string(), success, summary)
        };

        match response.body {
            Body::SearchResult { matched_path, .. } => {
                self.ctx.present(outcome(
                    true,
                    format!("Search Result: '{}' At {}", matched_path, responder),
                ));
            }
            Body::SearchError { .. } => {
                self.ctx.present(outcome(false, format!("Search Result: No Result At {}", responder)));
            }
            Body::DownloadError { .. } => {
                self.ctx.present(outcome(false, "Could not download the file.".to_string()));
            }
            Body::UploadError { .. } => {
                self.ctx.present(outcome(false, "Could not upload the file.".to_string()));
            }
            Body::DeleteResult { .. } => {
                self.ctx.present(outcome(
                    true,
                    format!("Successfully deleted {} At {}", remote, responder),
                ));
            }
            Body::DeleteError { .. } => {
                self.ctx.present(outcome(
                    false,
                    format!("Failed To Delete {} At {}", remote, responder),
                ));
            }
            Body::DownloadResult { port, .. } => {
                let Some(dest) = pending.local_path else {
                    self.ctx.present(outcome(false, "Could not download the file.".to_string()));
                    return;
                };
                let ctx = self.ctx.clone();
                let host = responder.hostname.clone();
                let summary = format!("Successfully downloaded {} From {}", remote, responder);
                let done = outcome(true, summary);
                tokio::spawn(async move {
                    match handoff::fetch(&host, port, &dest).await {
                        Ok(bytes) => {
                            tracing::info!(bytes, dest = %dest.display(), "download complete");
                            ctx.present(done);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, %host, port, "download transfer failed");
                            ctx.present(Outcome {
                                success: false,
                                summary: "Could not download the file.".to_string(),
                                ..done
                            });
                        }
                    }
                });
            }
            Body::UploadResult { port, .. } => {
                let Some(src) = pending.local_path else {
                    self.ctx.present(outcome(false, "Could not upload the file.".to_string()));
                    return;
                };
                let ctx = self.ctx.clone();
                let host = responder.hostname.clone();
                let summary = format!("Successfully Uploaded To {} At {}", remote, responder);
                let done = outcome(true, summary);
                tokio::spawn(async move {
                    match handoff::push(&host, port, &src).await {
                        Ok(bytes) => {
                            tracing::info!(bytes, src = %src.display(), "upload complete");
                            ctx.present(done);
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, %host, port, "upload transfer failed");
                            ctx.present(Outcome {
                                success: false,
                                summary: "Could not upload the file.".to_string(),
                                ..done
                            });
                        }
                    }
                });
            }
            Body::Beacon { .. }
            | Body::SearchRequest { .. }
            | Body::DownloadRequest(_)
            | Body::UploadRequest(_)
            | Body::DeleteRequest(_) => {}
        }
    }
}

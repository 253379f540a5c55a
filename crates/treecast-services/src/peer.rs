//! A complete peer: directory, correlators, router, and the operator actions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use treecast_core::wire::{Body, Family, Message, SearchType, Target};
use treecast_core::Identity;

use crate::beacon::{self, BeaconDirectory};
use crate::context::PeerContext;
use crate::correlator::Correlator;
use crate::router::Router;
use crate::workers::Workers;

/// Why an operator request was not sent.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("local file {path} is not readable: {source}")]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("outbound queue closed")]
    QueueClosed,
}

pub struct Peer {
    ctx: Arc<PeerContext>,
    directory: BeaconDirectory,
    search: Arc<Correlator>,
    download: Arc<Correlator>,
    upload: Arc<Correlator>,
    delete: Arc<Correlator>,
    router: Arc<Router>,
}

impl Peer {
    pub fn new(ctx: Arc<PeerContext>) -> Self {
        let directory = BeaconDirectory::new();
        let search = Arc::new(Correlator::new(Family::Search, ctx.clone()));
        let download = Arc::new(Correlator::new(Family::Download, ctx.clone()));
        let upload = Arc::new(Correlator::new(Family::Upload, ctx.clone()));
        let delete = Arc::new(Correlator::new(Family::Delete, ctx.clone()));
        let router = Arc::new(Router::new(
            directory.clone(),
            search.clone(),
            download.clone(),
            upload.clone(),
            delete.clone(),
        ));
        Self {
            ctx,
            directory,
            search,
            download,
            upload,
            delete,
            router,
        }
    }

    pub fn context(&self) -> &Arc<PeerContext> {
        &self.ctx
    }

    pub fn identity(&self) -> &Identity {
        &self.ctx.identity
    }

    pub fn directory(&self) -> &BeaconDirectory {
        &self.directory
    }

    pub fn router(&self) -> Arc<Router> {
        self.router.clone()
    }

    /// Outgoing requests of `family` still awaiting an answer.
    pub async fn pending(&self, family: Family) -> usize {
        match self.router.correlator(family) {
            Some(correlator) => correlator.pending().await,
            None => 0,
        }
    }

    /// Spawn the beacon and correlator loops. `poll` bounds how long a
    /// delivered message can wait if a wakeup is missed.
    pub fn start(&self, workers: &mut Workers, poll: Duration) {
        let timing = &self.ctx.timing;

        let ctx = self.ctx.clone();
        workers.spawn("beacon-announce", move |rx| beacon::announce_loop(ctx, rx));

        let directory = self.directory.clone();
        let (sleep, ttl) = (timing.sleep_time(), timing.maximum_beacon_period());
        workers.spawn("beacon-expiry", move |rx| {
            beacon::expiry_loop(directory, sleep, ttl, rx)
        });

        for (name, correlator) in [
            ("search-correlator", &self.search),
            ("download-correlator", &self.download),
            ("upload-correlator", &self.upload),
            ("delete-correlator", &self.delete),
        ] {
            let correlator = correlator.clone();
            workers.spawn(name, move |rx| correlator.run(poll, rx));
        }
    }

    // ── Operator actions ──────────────────────────────────────────────────────
    //
    // Each returns the correlation key of the request it sent. Outcomes
    // arrive later through the sink.

    /// Ask every peer to search its tree.
    pub async fn search(&self, search_type: SearchType, query: &str) -> Result<String, RequestError> {
        let request = self.ctx.message(Body::SearchRequest {
            search_type,
            query: query.to_string(),
        });
        self.submit(&self.search, request, None).await
    }

    /// Fetch `remote` from `peer` into `local`.
    pub async fn download(
        &self,
        peer: Identity,
        remote: &str,
        local: PathBuf,
    ) -> Result<String, RequestError> {
        let request = self.ctx.message(Body::DownloadRequest(Target {
            peer,
            path: remote.to_string(),
        }));
        self.submit(&self.download, request, Some(local)).await
    }

    /// Send `local` to `peer`, stored at `remote`.
    pub async fn upload(
        &self,
        peer: Identity,
        local: PathBuf,
        remote: &str,
    ) -> Result<String, RequestError> {
        if let Err(source) = std::fs::File::open(&local) {
            return Err(RequestError::LocalFile {
                path: local,
                source,
            });
        }
        let request = self.ctx.message(Body::UploadRequest(Target {
            peer,
            path: remote.to_string(),
        }));
        self.submit(&self.upload, request, Some(local)).await
    }

    /// Delete `remote` on `peer`.
    pub async fn delete(&self, peer: Identity, remote: &str) -> Result<String, RequestError> {
        let request = self.ctx.message(Body::DeleteRequest(Target {
            peer,
            path: remote.to_string(),
        }));
        self.submit(&self.delete, request, None).await
    }

    /// Pending before sending, so a fast loopback reply always finds its entry.
    async fn submit(
        &self,
        correlator: &Correlator,
        request: Message,
        local_path: Option<PathBuf>,
    ) -> Result<String, RequestError> {
        let key = correlator.register(request.clone(), local_path).await;
        if !self.ctx.send(request) {
            correlator.withdraw(&key).await;
            return Err(RequestError::QueueClosed);
        }
        tracing::debug!(family = %correlator.family(), %key, "request sent");
        Ok(key)
    }
}

//! Routes decoded messages to the component that owns their family.

use std::sync::Arc;

use treecast_core::wire::{Family, Message};

use crate::beacon::BeaconDirectory;
use crate::correlator::Correlator;

/// Beacons go to the directory; everything else to its family's correlator.
pub struct Router {
    directory: BeaconDirectory,
    search: Arc<Correlator>,
    download: Arc<Correlator>,
    upload: Arc<Correlator>,
    delete: Arc<Correlator>,
}

impl Router {
    pub fn new(
        directory: BeaconDirectory,
        search: Arc<Correlator>,
        download: Arc<Correlator>,
        upload: Arc<Correlator>,
        delete: Arc<Correlator>,
    ) -> Self {
        Self {
            directory,
            search,
            download,
            upload,
            delete,
        }
    }

    pub async fn route(&self, message: Message) {
        match message.family() {
            Family::Beacon => {
                self.directory.observe(&message);
            }
            family => {
                if let Some(correlator) = self.correlator(family) {
                    correlator.deliver(message).await;
                }
            }
        }
    }

    pub fn correlator(&self, family: Family) -> Option<&Arc<Correlator>> {
        match family {
            Family::Beacon => None,
            Family::Search => Some(&self.search),
            Family::Download => Some(&self.download),
            Family::Upload => Some(&self.upload),
            Family::Delete => Some(&self.delete),
        }
    }

    pub fn directory(&self) -> &BeaconDirectory {
        &self.directory
    }
}

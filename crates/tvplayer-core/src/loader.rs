//! Media load tracking
//!
//! Provider fetches run as tokio tasks. Their results come back over an
//! unbounded channel and are applied by the player's owner, so callbacks never
//! leave the owning context and need not be `Send`.
//!
//! Only one fetch is in flight at a time. Starting a new one (or setting media
//! directly) supersedes it: the task is aborted and its callback dropped.

use crate::error::{Error, Result};
use crate::provider::MediaProvider;
use crate::types::MediaEntry;
use std::collections::HashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Completion callback of a media load.
///
/// Receives the entry as stored by the player, or the load error.
pub type LoadCallback = Box<dyn FnOnce(std::result::Result<&MediaEntry, Error>)>;

/// Handle identifying one `load_media` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn id(&self) -> u64 {
        self.0
    }
}

struct Completion {
    ticket: LoadTicket,
    result: Result<MediaEntry>,
}

/// A load result ready to be applied on the owning context
pub(crate) struct Finished {
    pub ticket: LoadTicket,
    pub result: Result<MediaEntry>,
    pub callback: LoadCallback,
}

pub(crate) struct MediaLoader {
    next_id: u64,
    active: Option<(LoadTicket, JoinHandle<()>)>,
    callbacks: HashMap<LoadTicket, LoadCallback>,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
}

impl MediaLoader {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            next_id: 0,
            active: None,
            callbacks: HashMap::new(),
            tx,
            rx,
        }
    }

    fn next_ticket(&mut self) -> LoadTicket {
        self.next_id += 1;
        LoadTicket(self.next_id)
    }

    /// Abort the in-flight fetch, if any, and drop its callback
    pub fn supersede(&mut self) -> Option<LoadTicket> {
        let (ticket, task) = self.active.take()?;
        task.abort();
        if self.callbacks.remove(&ticket).is_some() {
            debug!(ticket = ticket.0, "Superseded in-flight media load");
        }
        Some(ticket)
    }

    /// Whether a load started now would find a tokio runtime
    pub fn has_runtime() -> bool {
        Handle::try_current().is_ok()
    }

    /// Run `provider` on the current tokio runtime
    pub fn start(&mut self, provider: Box<dyn MediaProvider>, callback: LoadCallback) -> LoadTicket {
        let Ok(runtime) = Handle::try_current() else {
            error!("loadMedia called outside a tokio runtime");
            return self.reject(Error::Runtime, callback);
        };

        let ticket = self.next_ticket();
        let tx = self.tx.clone();
        let task = runtime.spawn(async move {
            let result = provider.load().await;
            // The receiver lives as long as the player
            let _ = tx.send(Completion { ticket, result });
        });

        self.callbacks.insert(ticket, callback);
        self.active = Some((ticket, task));
        debug!(ticket = ticket.0, "Media load started");
        ticket
    }

    /// Queue `error` for delivery through the normal dispatch path
    pub fn reject(&mut self, error: Error, callback: LoadCallback) -> LoadTicket {
        let ticket = self.next_ticket();
        self.callbacks.insert(ticket, callback);
        let _ = self.tx.send(Completion {
            ticket,
            result: Err(error),
        });
        ticket
    }

    /// Next completion already received, skipping superseded ones
    pub fn try_next(&mut self) -> Option<Finished> {
        while let Ok(completion) = self.rx.try_recv() {
            if let Some(finished) = self.accept(completion) {
                return Some(finished);
            }
        }
        None
    }

    /// Wait for the next live completion. Returns `None` when nothing is pending.
    pub async fn next(&mut self) -> Option<Finished> {
        while !self.callbacks.is_empty() {
            let completion = self.rx.recv().await?;
            if let Some(finished) = self.accept(completion) {
                return Some(finished);
            }
        }
        None
    }

    fn accept(&mut self, completion: Completion) -> Option<Finished> {
        let Some(callback) = self.callbacks.remove(&completion.ticket) else {
            debug!(ticket = completion.ticket.0, "Dropping superseded load result");
            return None;
        };
        if self.active.as_ref().is_some_and(|(t, _)| *t == completion.ticket) {
            self.active = None;
        }
        Some(Finished {
            ticket: completion.ticket,
            result: completion.result,
            callback,
        })
    }

    pub fn is_loading(&self) -> bool {
        self.active.is_some()
    }

    /// Callbacks still waiting for a result
    pub fn pending(&self) -> usize {
        self.callbacks.len()
    }
}

impl Drop for MediaLoader {
    fn drop(&mut self) {
        if let Some((_, task)) = self.active.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    struct FixedProvider {
        id: &'static str,
        delay_ms: u64,
    }

    #[async_trait]
    impl MediaProvider for FixedProvider {
        async fn load(&self) -> Result<MediaEntry> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(MediaEntry::new(self.id))
        }
    }

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn() -> LoadCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let make = move || -> LoadCallback {
            let sink = sink.clone();
            Box::new(move |result| {
                sink.borrow_mut().push(match result {
                    Ok(entry) => entry.id.clone(),
                    Err(e) => e.error_code().to_string(),
                })
            })
        };
        (seen, make)
    }

    fn deliver(finished: Finished) {
        match finished.result {
            Ok(entry) => (finished.callback)(Ok(&entry)),
            Err(e) => (finished.callback)(Err(e)),
        }
    }

    #[tokio::test]
    async fn test_completion_delivered() {
        let (seen, callback) = recorder();
        let mut loader = MediaLoader::new();
        let ticket = loader.start(Box::new(FixedProvider { id: "E1", delay_ms: 0 }), callback());
        assert!(loader.is_loading());

        let finished = loader.next().await.unwrap();
        assert_eq!(finished.ticket, ticket);
        deliver(finished);
        assert_eq!(*seen.borrow(), vec!["E1".to_string()]);
        assert!(!loader.is_loading());
        assert!(loader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_superseded_callback_dropped() {
        let (seen, callback) = recorder();
        let mut loader = MediaLoader::new();
        loader.start(Box::new(FixedProvider { id: "old", delay_ms: 50 }), callback());
        loader.supersede();
        loader.start(Box::new(FixedProvider { id: "new", delay_ms: 0 }), callback());

        while let Some(finished) = loader.next().await {
            deliver(finished);
        }
        assert_eq!(*seen.borrow(), vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_rejection_goes_through_dispatch() {
        let (seen, callback) = recorder();
        let mut loader = MediaLoader::new();
        loader.reject(Error::Superseded, callback());
        assert!(seen.borrow().is_empty());

        deliver(loader.try_next().unwrap());
        assert_eq!(*seen.borrow(), vec!["SUPERSEDED".to_string()]);
    }

    #[test]
    fn test_load_on_blocking_runtime() {
        let (seen, callback) = recorder();
        let mut loader = MediaLoader::new();
        tokio_test::block_on(async {
            loader.start(Box::new(FixedProvider { id: "E2", delay_ms: 5 }), callback());
            deliver(loader.next().await.unwrap());
        });
        assert_eq!(*seen.borrow(), vec!["E2".to_string()]);
        assert_eq!(loader.pending(), 0);
    }

    #[test]
    fn test_no_runtime_rejects() {
        let (seen, callback) = recorder();
        let mut loader = MediaLoader::new();
        loader.start(Box::new(FixedProvider { id: "E1", delay_ms: 0 }), callback());
        assert!(!loader.is_loading());

        deliver(loader.try_next().unwrap());
        assert_eq!(*seen.borrow(), vec!["RUNTIME".to_string()]);
    }
}

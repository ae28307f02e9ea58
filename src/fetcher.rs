// Raffle View - Raffle list fetcher
//
// The indexer is tried first under a deadline. On timeout, transport error or
// a query-level error the registry is enumerated on-chain instead, exactly
// once. Both paths go through the same deployer filter.
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{RaffleClientError, Result, UserNote};
use crate::indexer::{IndexerClient, IndexerTransport};
use crate::raffle_state::{Address, Raffle};
use crate::rpc::{ChainReader, RpcTransport};

/// Where a result came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Indexer,
    Chain,
    /// Both paths failed
    Unavailable,
}

/// A fetched value plus an optional soft note for the user
#[derive(Clone, Debug, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: Source,
    pub note: Option<UserNote>,
}

pub type FetchOutcome = Fetched<Vec<Raffle>>;

impl<T: Default> Fetched<T> {
    fn unavailable() -> Self {
        Self {
            value: T::default(),
            source: Source::Unavailable,
            note: Some(UserNote::load_failed()),
        }
    }
}

/// Merge two raffle lists keyed by address. Duplicates collapse to the
/// record with the newest `last_updated_timestamp`; on a tie the earlier
/// (primary) record stays. Order of first appearance is kept.
pub fn merge_by_address(primary: Vec<Raffle>, secondary: Vec<Raffle>) -> Vec<Raffle> {
    let mut merged: Vec<Raffle> = Vec::with_capacity(primary.len() + secondary.len());
    let mut positions: HashMap<Address, usize> = HashMap::new();

    for raffle in primary.into_iter().chain(secondary) {
        match positions.get(&raffle.id) {
            Some(&i) => {
                if raffle.last_updated_timestamp > merged[i].last_updated_timestamp {
                    merged[i] = raffle;
                }
            }
            None => {
                positions.insert(raffle.id, merged.len());
                merged.push(raffle);
            }
        }
    }
    merged
}

pub struct RaffleFetcher<I: IndexerTransport, R: RpcTransport> {
    indexer: IndexerClient<I>,
    chain: ChainReader<R>,
    factory: Address,
    deployer: Address,
    indexer_timeout: Duration,
    indexer_page_size: u32,
    /// Raffles created this session that the indexer may not have yet
    pending: Mutex<BTreeSet<Address>>,
}

impl<I: IndexerTransport, R: RpcTransport> RaffleFetcher<I, R> {
    pub fn new(config: &ClientConfig, indexer: I, rpc: R) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            indexer: IndexerClient::new(indexer),
            chain: ChainReader::new(rpc, config.rpc_batch_size, config.registry_page_size),
            factory: config.factory,
            deployer: config.current_deployer(),
            indexer_timeout: config.indexer_timeout(),
            indexer_page_size: config.indexer_page_size,
            pending: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn chain(&self) -> &ChainReader<R> {
        &self.chain
    }

    /// Remember a freshly created raffle until the indexer reports it
    pub fn mark_pending(&self, raffle: Address) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(raffle);
        }
    }

    fn pending_snapshot(&self) -> Vec<Address> {
        self.pending
            .lock()
            .map(|pending| pending.iter().copied().collect())
            .unwrap_or_default()
    }

    /// From the current deployer and not sold past its ticket cap
    fn is_current(&self, raffle: &Raffle) -> bool {
        if raffle.deployer != self.deployer {
            return false;
        }
        if !raffle.sold_within_cap() {
            warn!(
                raffle = %raffle.id,
                sold = raffle.sold,
                max_tickets = raffle.max_tickets,
                "dropping raffle sold past its cap"
            );
            return false;
        }
        true
    }

    fn retain_current(&self, raffles: &mut Vec<Raffle>) {
        let before = raffles.len();
        raffles.retain(|r| self.is_current(r));
        if raffles.len() != before {
            debug!(dropped = before - raffles.len(), "filtered raffles");
        }
    }

    async fn with_indexer_deadline<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout(self.indexer_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RaffleClientError::Timeout(self.indexer_timeout.as_millis() as u64)),
        }
    }

    async fn from_chain(&self) -> Result<Vec<Raffle>> {
        let addresses = self.chain.raffle_addresses(self.factory).await?;
        info!(count = addresses.len(), "reading raffles on-chain");
        self.chain.read_raffles(&addresses).await
    }

    /// Add pending raffles the indexer has not caught up with yet
    async fn merge_pending(&self, indexed: Vec<Raffle>) -> Vec<Raffle> {
        let pending = self.pending_snapshot();
        if pending.is_empty() {
            return indexed;
        }
        let (seen, missing): (Vec<Address>, Vec<Address>) = pending
            .into_iter()
            .partition(|address| indexed.iter().any(|r| r.id == *address));
        if let Ok(mut set) = self.pending.lock() {
            for address in &seen {
                set.remove(address);
            }
        }
        if missing.is_empty() {
            return indexed;
        }
        match self.chain.read_raffles(&missing).await {
            Ok(fresh) => merge_by_address(indexed, fresh),
            Err(e) => {
                warn!(error = %e, "could not read pending raffles");
                indexed
            }
        }
    }

    /// Fetch every current raffle. Never fails; see `Fetched::note`.
    pub async fn fetch_all(&self) -> FetchOutcome {
        let indexed = self
            .with_indexer_deadline(self.indexer.fetch_raffles(self.deployer, self.indexer_page_size))
            .await;

        match indexed {
            Ok(raffles) => {
                let mut raffles = self.merge_pending(raffles).await;
                self.retain_current(&mut raffles);
                return Fetched {
                    value: raffles,
                    source: Source::Indexer,
                    note: None,
                };
            }
            Err(e) => warn!(error = %e, "indexer unavailable, falling back to chain reads"),
        }

        match self.from_chain().await {
            Ok(mut raffles) => {
                self.retain_current(&mut raffles);
                Fetched {
                    value: raffles,
                    source: Source::Chain,
                    note: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "on-chain fallback failed");
                Fetched::unavailable()
            }
        }
    }

    /// Fetch one raffle by address, reading the chain when the indexer has
    /// not seen it yet. Raffles from another deployer, or sold past their cap,
    /// resolve to `None`.
    pub async fn fetch_one(&self, id: Address) -> Fetched<Option<Raffle>> {
        match self.with_indexer_deadline(self.indexer.fetch_raffle(id)).await {
            Ok(Some(raffle)) => {
                let raffle = Some(raffle).filter(|r| self.is_current(r));
                return Fetched {
                    value: raffle,
                    source: Source::Indexer,
                    note: None,
                };
            }
            Ok(None) => debug!(raffle = %id, "raffle not indexed yet"),
            Err(e) => warn!(raffle = %id, error = %e, "indexer unavailable for raffle"),
        }

        match self.chain.read_raffle(id).await {
            Ok(raffle) => Fetched {
                value: Some(raffle).filter(|r| self.is_current(r)),
                source: Source::Chain,
                note: None,
            },
            Err(e) => {
                warn!(raffle = %id, error = %e, "on-chain read failed");
                Fetched::unavailable()
            }
        }
    }

    /// Raffles created by `creator`, newest first when the indexer answers
    pub async fn fetch_by_creator(&self, creator: Address) -> FetchOutcome {
        let indexed = self
            .with_indexer_deadline(self.indexer.fetch_raffles_by_creator(
                self.deployer,
                creator,
                self.indexer_page_size,
            ))
            .await;
        match indexed {
            Ok(mut raffles) => {
                self.retain_current(&mut raffles);
                return Fetched {
                    value: raffles,
                    source: Source::Indexer,
                    note: None,
                };
            }
            Err(e) => warn!(error = %e, "indexer unavailable, falling back to chain reads"),
        }

        match self.from_chain().await {
            Ok(mut raffles) => {
                self.retain_current(&mut raffles);
                raffles.retain(|r| r.creator == creator);
                Fetched {
                    value: raffles,
                    source: Source::Chain,
                    note: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "on-chain fallback failed");
                Fetched::unavailable()
            }
        }
    }
}

impl<I, R> RaffleFetcher<I, R>
where
    I: IndexerTransport + 'static,
    R: RpcTransport + 'static,
{
    /// Start a list refresh through `latest`, superseding any in flight
    pub fn refresh(self: &Arc<Self>, latest: &mut LatestRequest<FetchOutcome>) {
        let fetcher = Arc::clone(self);
        latest.spawn(async move { fetcher.fetch_all().await });
    }
}

/// Runs at most one request at a time; starting a new one aborts the old,
/// so a stale response can never replace a fresher one.
pub struct LatestRequest<T> {
    current: Option<JoinHandle<()>>,
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Option<T>>>,
}

impl<T: Send + Sync + 'static> LatestRequest<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            current: None,
            generation: Arc::new(AtomicU64::new(0)),
            tx: Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }

    pub fn spawn<F>(&mut self, request: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let my_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.current.take() {
            debug!(generation = my_generation, "superseding in-flight request");
            previous.abort();
        }

        let generation = Arc::clone(&self.generation);
        let tx = Arc::clone(&self.tx);
        self.current = Some(tokio::spawn(async move {
            let value = request.await;
            let mut value = Some(value);
            tx.send_if_modified(|slot| {
                if generation.load(Ordering::SeqCst) != my_generation {
                    return false;
                }
                *slot = value.take();
                true
            });
        }));
    }

    /// Abort the in-flight request, if any
    pub fn cancel(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
        }
    }
}

impl<T: Send + Sync + 'static> Default for LatestRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LatestRequest<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
        }
    }
}

// Raffle View - Wallet session
use borsh::{BorshDeserialize, BorshSerialize};
use std::future::Future;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{RaffleClientError, Result};
use crate::raffle_state::Address;

/// Wallet connection SDK the user picked
#[derive(BorshSerialize, BorshDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectorKind {
    /// Browser-injected provider
    Injected,
    WalletConnect,
    CoinbaseWallet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WalletAccount {
    pub address: Address,
    pub chain_id: u64,
}

/// A contract call to be signed and sent by the wallet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRequest {
    pub to: Address,
    pub data: Vec<u8>,
    /// Native value attached, in wei
    pub value: u128,
}

/// One event log from a mined transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxLog {
    /// Contract that emitted the event
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: String,
    /// False when the transaction was mined but reverted
    pub success: bool,
    pub logs: Vec<TxLog>,
}

/// The wallet-connection boundary. Signing happens entirely on the other side.
pub trait WalletConnector: Send + Sync {
    /// Open a connection; `silent` restores without prompting the user
    fn connect(
        &self,
        kind: ConnectorKind,
        silent: bool,
    ) -> impl Future<Output = Result<WalletAccount>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<()>> + Send;

    /// Send `tx` and wait until it is mined
    fn send_and_confirm(&self, tx: TxRequest) -> impl Future<Output = Result<TxReceipt>> + Send;
}

/// Small persisted state that survives a reload
#[derive(BorshSerialize, BorshDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Preferences {
    pub connector: Option<ConnectorKind>,
    pub disclaimer_accepted: bool,
}

pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Preferences>;
    fn save(&self, preferences: &Preferences) -> Result<()>;
}

fn encode_preferences(preferences: &Preferences) -> Result<Vec<u8>> {
    preferences
        .try_to_vec()
        .map_err(|e| RaffleClientError::Storage(e.to_string()))
}

fn decode_preferences(bytes: &[u8]) -> Result<Preferences> {
    Preferences::try_from_slice(bytes).map_err(|e| RaffleClientError::Storage(e.to_string()))
}

/// Preferences in a borsh-encoded file
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load(&self) -> Result<Preferences> {
        match std::fs::read(&self.path) {
            Ok(bytes) => decode_preferences(&bytes),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(Preferences::default()),
            Err(e) => Err(RaffleClientError::Storage(format!("{}: {}", self.path.display(), e))),
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        let bytes = encode_preferences(preferences)?;
        std::fs::write(&self.path, bytes)
            .map_err(|e| RaffleClientError::Storage(format!("{}: {}", self.path.display(), e)))
    }
}

/// Preferences kept in memory, for tests and embedders without storage
#[derive(Default)]
pub struct MemoryPreferenceStore {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Preferences> {
        let bytes = self
            .bytes
            .lock()
            .map_err(|_| RaffleClientError::Storage("preference lock poisoned".to_string()))?;
        match bytes.as_deref() {
            Some(bytes) => decode_preferences(bytes),
            None => Ok(Preferences::default()),
        }
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        let encoded = encode_preferences(preferences)?;
        let mut bytes = self
            .bytes
            .lock()
            .map_err(|_| RaffleClientError::Storage("preference lock poisoned".to_string()))?;
        *bytes = Some(encoded);
        Ok(())
    }
}

/// What subscribers see of the session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub account: Option<Address>,
    pub chain_id: Option<u64>,
    pub connector: Option<ConnectorKind>,
}

impl SessionSnapshot {
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }
}

/// Session state owned by the app shell and handed to whoever needs it
pub struct WalletSession<W: WalletConnector, S: PreferenceStore> {
    wallet: W,
    store: S,
    preferences: Mutex<Preferences>,
    state: watch::Sender<SessionSnapshot>,
}

impl<W: WalletConnector, S: PreferenceStore> WalletSession<W, S> {
    pub fn new(wallet: W, store: S) -> Result<Self> {
        let preferences = store.load()?;
        let (state, _rx) = watch::channel(SessionSnapshot::default());
        Ok(Self {
            wallet,
            store,
            preferences: Mutex::new(preferences),
            state,
        })
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.state.borrow()
    }

    fn update_preferences(&self, change: impl FnOnce(&mut Preferences)) -> Result<()> {
        let mut preferences = self
            .preferences
            .lock()
            .map_err(|_| RaffleClientError::Storage("preference lock poisoned".to_string()))?;
        change(&mut preferences);
        self.store.save(&preferences)
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn publish(&self, account: Option<WalletAccount>, connector: Option<ConnectorKind>) {
        self.state.send_replace(SessionSnapshot {
            account: account.map(|a| a.address),
            chain_id: account.map(|a| a.chain_id),
            connector,
        });
    }

    /// Connect with `kind` and remember it for the next load
    pub async fn connect(&self, kind: ConnectorKind) -> Result<WalletAccount> {
        let account = match self.wallet.connect(kind, false).await {
            Ok(account) => account,
            Err(RaffleClientError::UserRejected) => {
                info!(?kind, "wallet connection declined");
                return Err(RaffleClientError::UserRejected);
            }
            Err(e) => return Err(e),
        };
        info!(account = %account.address, chain_id = account.chain_id, ?kind, "wallet connected");
        self.publish(Some(account), Some(kind));
        self.update_preferences(|p| p.connector = Some(kind))?;
        Ok(account)
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.wallet.disconnect().await?;
        self.publish(None, None);
        self.update_preferences(|p| p.connector = None)?;
        info!("wallet disconnected");
        Ok(())
    }

    /// Reconnect silently with the stored connector. A failed restore
    /// forgets the connector and leaves the session disconnected.
    pub async fn restore(&self) -> Result<Option<WalletAccount>> {
        let kind = match self.preferences().connector {
            Some(kind) => kind,
            None => return Ok(None),
        };
        match self.wallet.connect(kind, true).await {
            Ok(account) => {
                debug!(account = %account.address, ?kind, "session restored");
                self.publish(Some(account), Some(kind));
                Ok(Some(account))
            }
            Err(e) => {
                warn!(?kind, error = %e, "silent restore failed");
                self.update_preferences(|p| p.connector = None)?;
                Ok(None)
            }
        }
    }

    /// The wallet switched accounts, or locked (`None`)
    pub fn account_changed(&self, account: Option<Address>) {
        self.state.send_modify(|s| {
            s.account = account;
            if account.is_none() {
                s.chain_id = None;
            }
        });
    }

    pub fn chain_changed(&self, chain_id: u64) {
        self.state.send_modify(|s| s.chain_id = Some(chain_id));
    }

    pub fn accept_disclaimer(&self) -> Result<()> {
        self.update_preferences(|p| p.disclaimer_accepted = true)
    }

    pub fn disclaimer_accepted(&self) -> bool {
        self.preferences().disclaimer_accepted
    }
}

use std::{collections::HashMap, sync::Arc};

use chain::{ChainReader, MissingWallet, WalletProvider};
use primitive_types::U256;
use shared::{
    domain::{
        Address, BlockMeta, CommandKey, FeeMap, HookPath, PoolId, ResolvedAddressSet, TxId,
        TxRecord, TxStatus,
    },
    error::CoreError,
    protocol::{render_draft_text, WalletEvent},
};
use tokio::{
    sync::{broadcast, Mutex, RwLock},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod composer;
pub mod dry_run;
pub mod master_control;
pub mod orchestrator;
pub mod resolver;

use composer::{
    BlockKind, BlockParams, CommandDraft, DragSource, DraftBook, DraftEntry, DropOutcome,
    DropTarget, EntryBody, EntryId,
};
use dry_run::{compute_targets, DryRunReport, DryRunValidator, PoolSnapshot};
use orchestrator::{Operation, TransactionOrchestrator, TxEvent};
use resolver::{AddressBook, AddressResolver, DEFAULT_INDEX_LIMIT};

pub type SessionKey = (PoolId, HookPath);

#[derive(Debug, Clone, Default)]
pub struct ControllerConfig {
    /// Registry probed for component addresses.
    pub access_control: Option<Address>,
    /// Explicit MasterControl; otherwise taken from resolution.
    pub master_control: Option<Address>,
    pub resolver_index_limit: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    AddressesResolved(Arc<ResolvedAddressSet>),
    SessionOpened { pool: PoolId, hook_path: HookPath },
    DraftChanged { pool: PoolId, hook_path: HookPath, len: usize },
    DraftFeesUpdated { pool: PoolId, hook_path: HookPath, fees: FeeMap },
    DraftDiscarded { pool: PoolId, hook_path: HookPath },
    Wallet(WalletEvent),
    Tx(TxEvent),
}

#[derive(Debug, Clone)]
pub struct SessionView {
    pub pool: PoolId,
    pub hook_path: HookPath,
    pub entries: Vec<DraftEntry>,
    pub apply_list: Vec<u64>,
    pub snapshot: PoolSnapshot,
    pub draft_fees: FeeMap,
}

#[derive(Default)]
struct EditorState {
    drafts: DraftBook,
    active: Option<SessionKey>,
    snapshots: HashMap<SessionKey, PoolSnapshot>,
    /// Target set each fee map was fetched for.
    draft_fees: HashMap<SessionKey, (Vec<Address>, FeeMap)>,
}

impl EditorState {
    fn active_key(&self) -> Result<SessionKey, CoreError> {
        self.active.ok_or(CoreError::MissingContext("pool and hook path"))
    }

    fn active_draft(&mut self) -> Result<&mut CommandDraft, CoreError> {
        let (pool, hook_path) = self.active_key()?;
        self.drafts
            .get_mut(pool, hook_path)
            .ok_or(CoreError::MissingContext("draft"))
    }

    /// Locked keys that would disappear if `entry` left the active draft.
    fn locked_if_removed(&self, entry: EntryId) -> Result<Vec<CommandKey>, CoreError> {
        let (pool, hook_path) = self.active_key()?;
        let draft = self
            .drafts
            .get(pool, hook_path)
            .ok_or(CoreError::MissingContext("draft"))?;
        let Some(key) = draft
            .entries()
            .iter()
            .find(|candidate| candidate.id == entry)
            .and_then(DraftEntry::command)
            .map(|command| command.key())
        else {
            return Ok(Vec::new());
        };
        let locked = self
            .snapshots
            .get(&(pool, hook_path))
            .and_then(|snapshot| snapshot.locks.get(&key).copied())
            .unwrap_or(false);
        let kept = draft
            .entries()
            .iter()
            .filter(|candidate| candidate.id != entry)
            .filter_map(DraftEntry::command)
            .any(|command| command.key() == key);
        Ok(if locked && !kept { vec![key] } else { Vec::new() })
    }
}

/// Coordinates resolution, drafting, dry runs and submission for one editor.
pub struct CommandEditorController {
    config: ControllerConfig,
    resolver: AddressResolver,
    address_book: AddressBook,
    validator: RwLock<DryRunValidator>,
    orchestrator: TransactionOrchestrator,
    inner: Mutex<EditorState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl CommandEditorController {
    pub fn new(reader: ChainReader, config: ControllerConfig) -> Arc<Self> {
        Self::new_with_wallet(reader, Arc::new(MissingWallet::default()), config)
    }

    pub fn new_with_wallet(
        reader: ChainReader,
        wallet: Arc<dyn WalletProvider>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let resolver = AddressResolver::new(reader.clone()).with_index_limit(
            config
                .resolver_index_limit
                .unwrap_or(DEFAULT_INDEX_LIMIT),
        );
        Arc::new(Self {
            resolver,
            address_book: AddressBook::new(),
            validator: RwLock::new(DryRunValidator::new(reader, config.master_control)),
            orchestrator: TransactionOrchestrator::new(wallet, config.master_control),
            inner: Mutex::new(EditorState::default()),
            events,
            config,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    pub fn orchestrator(&self) -> &TransactionOrchestrator {
        &self.orchestrator
    }

    /// Re-emits wallet and transaction notifications as controller events.
    pub fn start_event_forwarding(self: &Arc<Self>) -> JoinHandle<()> {
        let mut wallet_events = self.orchestrator.wallet().subscribe();
        let mut tx_events = self.orchestrator.subscribe();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut wallet_open = true;
            let mut tx_open = true;
            while wallet_open || tx_open {
                tokio::select! {
                    event = wallet_events.recv(), if wallet_open => match event {
                        Ok(event) => controller.emit(ControllerEvent::Wallet(event)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "controller: wallet events lagged")
                        }
                        Err(broadcast::error::RecvError::Closed) => wallet_open = false,
                    },
                    event = tx_events.recv(), if tx_open => match event {
                        Ok(event) => controller.emit(ControllerEvent::Tx(event)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "controller: tx events lagged")
                        }
                        Err(broadcast::error::RecvError::Closed) => tx_open = false,
                    },
                }
            }
        })
    }

    pub async fn master_control(&self) -> Option<Address> {
        self.validator.read().await.master_control()
    }

    pub async fn addresses(&self) -> Arc<ResolvedAddressSet> {
        self.address_book.snapshot().await
    }

    /// Resolves from `seed` or the configured registry. A resolved `masterControl`
    /// becomes the write target unless one was configured explicitly.
    pub async fn resolve_addresses(
        &self,
        seed: Option<Address>,
    ) -> Result<Arc<ResolvedAddressSet>, CoreError> {
        let seed = seed
            .or(self.config.access_control)
            .ok_or(CoreError::MissingContext("access control address"))?;
        let set = self.address_book.refresh(&self.resolver, seed).await;
        if set.is_empty() {
            let absent = CoreError::ResolutionAbsent { seed };
            info!(%seed, code = ?absent.code(), "controller: {absent}");
        }
        if self.config.master_control.is_none() {
            if let Some(master) = set.get("masterControl") {
                self.validator.write().await.set_master_control(Some(master));
                self.orchestrator.set_target(Some(master)).await;
                info!(%master, "controller: using resolved master control");
            }
        }
        self.emit(ControllerEvent::AddressesResolved(Arc::clone(&set)));
        Ok(set)
    }

    /// Activates the session for `(pool, hook_path)`, seeding a new draft from
    /// the commands currently on chain.
    pub async fn open_session(
        &self,
        pool: PoolId,
        hook_path: HookPath,
    ) -> Result<SessionView, CoreError> {
        let existing = self.inner.lock().await.drafts.get(pool, hook_path).is_some();
        if !existing {
            let snapshot = self.validator.read().await.snapshot(pool, hook_path).await;
            let commands = snapshot.commands.clone().unwrap_or_default();
            let mut state = self.inner.lock().await;
            if state.drafts.get(pool, hook_path).is_none() {
                state
                    .drafts
                    .insert(CommandDraft::seeded(pool, hook_path, commands));
            }
            state.snapshots.insert((pool, hook_path), snapshot);
        }
        self.inner.lock().await.active = Some((pool, hook_path));
        info!(%pool, hook_path = %hook_path, reused = existing, "controller: session opened");
        self.emit(ControllerEvent::SessionOpened { pool, hook_path });
        self.session().await
    }

    pub async fn close_session(&self) {
        self.inner.lock().await.active = None;
    }

    pub async fn session(&self) -> Result<SessionView, CoreError> {
        let state = self.inner.lock().await;
        let (pool, hook_path) = state.active_key()?;
        let draft = state
            .drafts
            .get(pool, hook_path)
            .ok_or(CoreError::MissingContext("draft"))?;
        Ok(SessionView {
            pool,
            hook_path,
            entries: draft.entries().to_vec(),
            apply_list: draft.apply_list().to_vec(),
            snapshot: state
                .snapshots
                .get(&(pool, hook_path))
                .cloned()
                .unwrap_or_default(),
            draft_fees: state
                .draft_fees
                .get(&(pool, hook_path))
                .map(|(_, fees)| fees.clone())
                .unwrap_or_default(),
        })
    }

    async fn edit<R>(
        self: &Arc<Self>,
        change: impl FnOnce(&mut CommandDraft) -> R,
    ) -> Result<R, CoreError> {
        let (result, key, len) = {
            let mut state = self.inner.lock().await;
            let key = state.active_key()?;
            let draft = state.active_draft()?;
            let result = change(draft);
            (result, key, draft.len())
        };
        self.emit(ControllerEvent::DraftChanged {
            pool: key.0,
            hook_path: key.1,
            len,
        });
        self.spawn_fee_refresh();
        Ok(result)
    }

    pub async fn insert_from_palette(
        self: &Arc<Self>,
        kind: BlockKind,
        target: DropTarget,
    ) -> Result<Option<EntryId>, CoreError> {
        self.edit(|draft| draft.insert_from_palette(kind, target))
            .await
    }

    pub async fn reorder(
        self: &Arc<Self>,
        source: EntryId,
        destination: DropTarget,
    ) -> Result<bool, CoreError> {
        self.edit(|draft| draft.reorder(source, destination)).await
    }

    /// Refuses to drop the last entry carrying a locked on-chain command.
    pub async fn remove(self: &Arc<Self>, id: EntryId) -> Result<Option<DraftEntry>, CoreError> {
        let blocked = self.inner.lock().await.locked_if_removed(id)?;
        if !blocked.is_empty() {
            return Err(CoreError::ValidationBlocked(blocked));
        }
        self.edit(|draft| draft.remove(id)).await
    }

    pub async fn update_params(
        self: &Arc<Self>,
        id: EntryId,
        params: BlockParams,
    ) -> Result<bool, CoreError> {
        self.edit(|draft| draft.update_params(id, params)).await
    }

    pub async fn begin_drag(&self, source: DragSource) -> Result<(), CoreError> {
        self.inner.lock().await.active_draft()?.begin_drag(source);
        Ok(())
    }

    pub async fn drag_over(&self, target: Option<DropTarget>) -> Result<Option<usize>, CoreError> {
        let mut state = self.inner.lock().await;
        let draft = state.active_draft()?;
        draft.drag_over(target);
        Ok(draft.ghost_index())
    }

    pub async fn end_drag(self: &Arc<Self>, target: DropTarget) -> Result<DropOutcome, CoreError> {
        {
            let mut state = self.inner.lock().await;
            let drag = state.active_draft()?.drag_state();
            if let (composer::DragState::FromList { entry, .. }, DropTarget::Trash) = (drag, target)
            {
                let blocked = state.locked_if_removed(entry)?;
                if !blocked.is_empty() {
                    state.active_draft()?.cancel_drag();
                    return Err(CoreError::ValidationBlocked(blocked));
                }
            }
        }
        self.edit(|draft| draft.end_drag(target)).await
    }

    /// Appends a catalog block. Unknown commands are looked up on chain first.
    pub async fn append_block(self: &Arc<Self>, mut block: BlockMeta) -> Result<(), CoreError> {
        if block.commands.is_none() {
            block.commands = self
                .validator
                .read()
                .await
                .fetch_block_commands(block.id)
                .await;
        }
        self.edit(|draft| draft.append_block(&block)).await
    }

    pub async fn import_text(self: &Arc<Self>, raw: &str) -> Result<usize, CoreError> {
        let commands = dry_run::parse_draft(raw)?;
        let count = commands.len();
        self.edit(|draft| draft.replace_commands(commands)).await?;
        Ok(count)
    }

    pub async fn export_text(&self) -> Result<String, CoreError> {
        let mut state = self.inner.lock().await;
        let commands = state.active_draft()?.commands();
        render_draft_text(&commands).map_err(|err| CoreError::Parse(err.to_string()))
    }

    /// Restores the active draft to the last on-chain snapshot.
    pub async fn reset(self: &Arc<Self>) -> Result<(), CoreError> {
        let (pool, hook_path) = {
            let mut state = self.inner.lock().await;
            let key = state.active_key()?;
            let commands = state
                .snapshots
                .get(&key)
                .and_then(|snapshot| snapshot.commands.clone())
                .unwrap_or_default();
            state.drafts.discard(key.0, key.1);
            state.draft_fees.remove(&key);
            state
                .drafts
                .insert(CommandDraft::seeded(key.0, key.1, commands));
            key
        };
        self.emit(ControllerEvent::DraftDiscarded { pool, hook_path });
        self.spawn_fee_refresh();
        Ok(())
    }

    fn spawn_fee_refresh(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = controller.refresh_draft_fees().await {
                debug!(error = %err, "controller: fee refresh skipped");
            }
        });
    }

    /// Fetches fees for the active draft's targets. The response is dropped if
    /// the draft's target set changed while the reads were in flight.
    pub async fn refresh_draft_fees(&self) -> Result<bool, CoreError> {
        let (key, targets) = {
            let mut state = self.inner.lock().await;
            let key = state.active_key()?;
            let targets = compute_targets(&state.active_draft()?.commands());
            (key, targets)
        };
        let fees = self.validator.read().await.fetch_fees(&targets).await;
        Ok(self.apply_draft_fees(key, targets, fees).await)
    }

    async fn apply_draft_fees(&self, key: SessionKey, targets: Vec<Address>, fees: FeeMap) -> bool {
        let mut state = self.inner.lock().await;
        let current = state
            .drafts
            .get(key.0, key.1)
            .map(|draft| compute_targets(&draft.commands()));
        if current.as_ref() != Some(&targets) {
            debug!(pool = %key.0, "controller: stale fee response discarded");
            return false;
        }
        state.draft_fees.insert(key, (targets, fees.clone()));
        drop(state);
        self.emit(ControllerEvent::DraftFeesUpdated {
            pool: key.0,
            hook_path: key.1,
            fees,
        });
        true
    }

    pub async fn dry_run(&self) -> Result<DryRunReport, CoreError> {
        let (commands, snapshot) = {
            let mut state = self.inner.lock().await;
            let key = state.active_key()?;
            let commands = state.active_draft()?.commands();
            let snapshot = state.snapshots.get(&key).cloned().unwrap_or_default();
            (commands, snapshot)
        };
        Ok(self
            .validator
            .read()
            .await
            .evaluate(commands, &snapshot)
            .await)
    }

    /// Builds the write for the active draft, rejecting it when it cannot be sent.
    async fn set_commands_operation(&self) -> Result<Operation, CoreError> {
        let mut state = self.inner.lock().await;
        let key = state.active_key()?;
        let commands = state.active_draft()?.commands();
        if commands.is_empty() {
            return Err(CoreError::MissingContext("draft commands"));
        }
        if let Some(snapshot) = state.snapshots.get(&key) {
            let locked = dry_run::detect_locked_removals(&commands, &snapshot.locks);
            if !locked.is_empty() {
                return Err(CoreError::ValidationBlocked(
                    locked.iter().map(|command| command.key()).collect(),
                ));
            }
        }
        Ok(Operation::SetCommands {
            pool: key.0,
            hook_path: key.1,
            commands,
        })
    }

    async fn apply_blocks_operation(&self) -> Result<Operation, CoreError> {
        let mut state = self.inner.lock().await;
        let key = state.active_key()?;
        let block_ids = state.active_draft()?.apply_list().to_vec();
        if block_ids.is_empty() {
            return Err(CoreError::MissingContext("blocks to apply"));
        }
        Ok(Operation::ApplyBlocks {
            pool: key.0,
            block_ids,
        })
    }

    pub async fn estimate(&self) -> Result<U256, CoreError> {
        let operation = self.set_commands_operation().await?;
        self.orchestrator.estimate(&operation).await
    }

    /// Submits the active draft. On success the draft is discarded so the next
    /// open re-seeds from chain.
    pub async fn submit(&self) -> Result<TxRecord, CoreError> {
        let operation = self.set_commands_operation().await?;
        let record = self.orchestrator.submit(&operation).await?;
        if record.status == TxStatus::Success {
            if let Operation::SetCommands {
                pool, hook_path, ..
            } = operation
            {
                let mut state = self.inner.lock().await;
                state.drafts.discard(pool, hook_path);
                state.snapshots.remove(&(pool, hook_path));
                state.draft_fees.remove(&(pool, hook_path));
                if state.active == Some((pool, hook_path)) {
                    state.active = None;
                }
                drop(state);
                self.emit(ControllerEvent::DraftDiscarded { pool, hook_path });
            }
        }
        Ok(record)
    }

    pub async fn estimate_apply_blocks(&self) -> Result<U256, CoreError> {
        let operation = self.apply_blocks_operation().await?;
        self.orchestrator.estimate(&operation).await
    }

    pub async fn submit_apply_blocks(&self) -> Result<TxRecord, CoreError> {
        let operation = self.apply_blocks_operation().await?;
        let record = self.orchestrator.submit(&operation).await?;
        if record.status == TxStatus::Success {
            if let Ok(draft) = self.inner.lock().await.active_draft() {
                draft.clear_apply_list();
            }
        }
        Ok(record)
    }

    pub async fn history(&self) -> Vec<TxRecord> {
        self.orchestrator.history().await
    }

    pub async fn remove_tx(&self, id: &TxId) -> Option<TxRecord> {
        self.orchestrator.remove(id).await
    }

    pub async fn clear_history(&self) {
        self.orchestrator.clear().await
    }

    /// Entries whose body originated on chain, for display.
    pub async fn existing_entries(&self) -> Result<Vec<DraftEntry>, CoreError> {
        let mut state = self.inner.lock().await;
        Ok(state
            .active_draft()?
            .entries()
            .iter()
            .filter(|entry| matches!(entry.body, EntryBody::Command(_)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use std::{collections::HashMap, fmt};

use chain::abi::selector;
use serde::{Deserialize, Serialize};
use shared::domain::{Address, BlockMeta, CallType, Command, HookPath, PoolId, Selector};
use tracing::debug;

pub const PATH_DROPZONE: &str = "path-dropzone";
pub const TRASH_DROPZONE: &str = "trash-dropzone";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockKind {
    MintPoints,
    AddFee,
    CallContractWithValue,
    ViewContract,
}

impl BlockKind {
    pub const ALL: [BlockKind; 4] = [
        BlockKind::MintPoints,
        BlockKind::AddFee,
        BlockKind::CallContractWithValue,
        BlockKind::ViewContract,
    ];

    pub fn type_id(&self) -> &'static str {
        match self {
            BlockKind::MintPoints => "mintPoints",
            BlockKind::AddFee => "addFee",
            BlockKind::CallContractWithValue => "callContractWithValue",
            BlockKind::ViewContract => "viewContract",
        }
    }

    pub fn from_type_id(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_id() == raw)
    }

    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::MintPoints => "Mint Points",
            BlockKind::AddFee => "Add Fee",
            BlockKind::CallContractWithValue => "Call Contract With Value",
            BlockKind::ViewContract => "View Contract",
        }
    }

    pub fn empty_params(&self) -> BlockParams {
        match self {
            BlockKind::MintPoints => BlockParams::MintPoints {
                mode: AmountMode::Percent,
                amount: 0.0,
            },
            BlockKind::AddFee => BlockParams::AddFee {
                fee_type: FeeType::Token0,
                percent: 0.0,
                recipient: String::new(),
            },
            BlockKind::CallContractWithValue => BlockParams::CallContractWithValue {
                address: String::new(),
                function_name: String::new(),
                call_data: String::new(),
                send_mode: AmountMode::Percent,
                send_amount: 0.0,
                return_option: ReturnOption::None,
            },
            BlockKind::ViewContract => BlockParams::ViewContract {
                address: String::new(),
                function_name: String::new(),
                return_type: "uint256".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AmountMode {
    Percent,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeeType {
    Token0,
    Token1,
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnOption {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "requireTrue")]
    RequireTrue,
    #[serde(rename = "requireFalse")]
    RequireFalse,
    #[serde(rename = "<0")]
    Negative,
    #[serde(rename = ">0")]
    Positive,
    #[serde(rename = "0")]
    Zero,
}

/// Type-specific payload of a palette entry. The composer only moves these around.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum BlockParams {
    MintPoints {
        mode: AmountMode,
        amount: f64,
    },
    AddFee {
        fee_type: FeeType,
        percent: f64,
        recipient: String,
    },
    CallContractWithValue {
        address: String,
        function_name: String,
        call_data: String,
        send_mode: AmountMode,
        send_amount: f64,
        return_option: ReturnOption,
    },
    ViewContract {
        address: String,
        function_name: String,
        return_type: String,
    },
}

fn function_selector(function_name: &str) -> Option<Selector> {
    let name = function_name.trim();
    if name.is_empty() {
        return None;
    }
    if name.starts_with("0x") {
        return name.parse().ok();
    }
    if name.contains('(') {
        Some(selector(name))
    } else {
        Some(selector(&format!("{name}()")))
    }
}

impl BlockParams {
    pub fn kind(&self) -> BlockKind {
        match self {
            BlockParams::MintPoints { .. } => BlockKind::MintPoints,
            BlockParams::AddFee { .. } => BlockKind::AddFee,
            BlockParams::CallContractWithValue { .. } => BlockKind::CallContractWithValue,
            BlockParams::ViewContract { .. } => BlockKind::ViewContract,
        }
    }

    /// Payloads that name a contract and function lower to a command.
    pub fn to_command(&self) -> Option<Command> {
        let (address, function_name, call_type) = match self {
            BlockParams::CallContractWithValue {
                address,
                function_name,
                ..
            } => (address, function_name, CallType::Call),
            BlockParams::ViewContract {
                address,
                function_name,
                ..
            } => (address, function_name, CallType::StaticCall),
            BlockParams::MintPoints { .. } | BlockParams::AddFee { .. } => return None,
        };
        let target: Address = address.trim().parse().ok()?;
        let mut command = Command::new(target, function_selector(function_name)?);
        command.call_type = call_type;
        Some(command)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "camelCase")]
pub enum EntryBody {
    Command(Command),
    Palette(BlockParams),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEntry {
    pub id: EntryId,
    pub body: EntryBody,
}

impl DraftEntry {
    pub fn command(&self) -> Option<Command> {
        match &self.body {
            EntryBody::Command(command) => Some(command.clone()),
            EntryBody::Palette(params) => params.to_command(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Entry(EntryId),
    EndOfList,
    Trash,
    Outside,
}

impl DropTarget {
    /// Maps a drop-zone id (`path-dropzone`, `trash-dropzone`, `entry-N`).
    pub fn parse(raw: &str) -> Self {
        match raw {
            PATH_DROPZONE => DropTarget::EndOfList,
            TRASH_DROPZONE => DropTarget::Trash,
            other => other
                .strip_prefix("entry-")
                .and_then(|n| n.parse().ok())
                .map(|n| DropTarget::Entry(EntryId(n)))
                .unwrap_or(DropTarget::Outside),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragSource {
    Palette(BlockKind),
    Entry(EntryId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    FromPalette {
        kind: BlockKind,
        over: Option<DropTarget>,
    },
    FromList {
        entry: EntryId,
        over: Option<DropTarget>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Inserted(EntryId),
    Moved(EntryId),
    Removed(EntryId),
    Ignored,
}

/// Ordered command list for one `(pool, hook path)`. Order is execution order.
#[derive(Debug, Clone)]
pub struct CommandDraft {
    pool: PoolId,
    hook_path: HookPath,
    entries: Vec<DraftEntry>,
    apply_list: Vec<u64>,
    next_id: u64,
    drag: DragState,
}

impl CommandDraft {
    pub fn new(pool: PoolId, hook_path: HookPath) -> Self {
        Self {
            pool,
            hook_path,
            entries: Vec::new(),
            apply_list: Vec::new(),
            next_id: 1,
            drag: DragState::Idle,
        }
    }

    pub fn seeded(pool: PoolId, hook_path: HookPath, commands: Vec<Command>) -> Self {
        let mut draft = Self::new(pool, hook_path);
        draft.append_commands(commands);
        draft
    }

    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn hook_path(&self) -> HookPath {
        self.hook_path
    }

    pub fn entries(&self) -> &[DraftEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn apply_list(&self) -> &[u64] {
        &self.apply_list
    }

    pub fn drag_state(&self) -> DragState {
        self.drag
    }

    /// Lowered commands in draft order; palette entries that cannot lower yet are skipped.
    pub fn commands(&self) -> Vec<Command> {
        self.entries.iter().filter_map(DraftEntry::command).collect()
    }

    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    fn allocate_id(&mut self) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        id
    }

    fn drop_index(&self, target: DropTarget) -> Option<usize> {
        match target {
            DropTarget::Entry(id) => Some(self.position(id).unwrap_or(self.entries.len())),
            DropTarget::EndOfList => Some(self.entries.len()),
            DropTarget::Trash | DropTarget::Outside => None,
        }
    }

    pub fn insert_from_palette_at(&mut self, kind: BlockKind, index: usize) -> EntryId {
        let id = self.allocate_id();
        let index = index.min(self.entries.len());
        self.entries.insert(
            index,
            DraftEntry {
                id,
                body: EntryBody::Palette(kind.empty_params()),
            },
        );
        debug!(pool = %self.pool, entry = %id, kind = kind.type_id(), index, "composer: inserted");
        id
    }

    /// Inserts before a matching entry, appends on the end sentinel or an unknown entry.
    pub fn insert_from_palette(&mut self, kind: BlockKind, target: DropTarget) -> Option<EntryId> {
        let index = self.drop_index(target)?;
        Some(self.insert_from_palette_at(kind, index))
    }

    pub fn reorder(&mut self, source: EntryId, destination: DropTarget) -> bool {
        let to = match destination {
            DropTarget::Entry(id) if id == source => return false,
            DropTarget::Entry(id) => match self.position(id) {
                Some(index) => index,
                None => return false,
            },
            DropTarget::EndOfList => self.entries.len().saturating_sub(1),
            DropTarget::Trash | DropTarget::Outside => return false,
        };
        let Some(from) = self.position(source) else {
            return false;
        };
        if from == to {
            return false;
        }
        let entry = self.entries.remove(from);
        self.entries.insert(to, entry);
        true
    }

    pub fn remove(&mut self, id: EntryId) -> Option<DraftEntry> {
        let index = self.position(id)?;
        Some(self.entries.remove(index))
    }

    pub fn update_params(&mut self, id: EntryId, params: BlockParams) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        match &mut self.entries[index].body {
            EntryBody::Palette(current) if current.kind() == params.kind() => {
                *current = params;
                true
            }
            _ => false,
        }
    }

    pub fn append_commands(&mut self, commands: impl IntoIterator<Item = Command>) {
        for command in commands {
            let id = self.allocate_id();
            self.entries.push(DraftEntry {
                id,
                body: EntryBody::Command(command),
            });
        }
    }

    /// Replaces every entry with freshly identified command entries.
    pub fn replace_commands(&mut self, commands: Vec<Command>) {
        self.entries.clear();
        self.append_commands(commands);
    }

    /// Appends a catalog block's commands, or one placeholder when they are unknown,
    /// and records the block for a later apply.
    pub fn append_block(&mut self, block: &BlockMeta) {
        let commands = match &block.commands {
            Some(commands) if !commands.is_empty() => commands.clone(),
            _ => vec![Command::placeholder()],
        };
        self.append_commands(commands);
        self.apply_list.push(block.id);
    }

    pub fn clear_apply_list(&mut self) {
        self.apply_list.clear();
    }

    pub fn begin_drag(&mut self, source: DragSource) {
        self.drag = match source {
            DragSource::Palette(kind) => DragState::FromPalette { kind, over: None },
            DragSource::Entry(entry) => DragState::FromList { entry, over: None },
        };
    }

    pub fn drag_over(&mut self, target: Option<DropTarget>) {
        match &mut self.drag {
            DragState::FromPalette { over, .. } | DragState::FromList { over, .. } => {
                *over = target
            }
            DragState::Idle => {}
        }
    }

    /// Preview slot for a palette drag; list drags and idle state have none.
    pub fn ghost_index(&self) -> Option<usize> {
        match self.drag {
            DragState::FromPalette {
                over: Some(DropTarget::EndOfList),
                ..
            } => Some(self.entries.len()),
            DragState::FromPalette {
                over: Some(DropTarget::Entry(id)),
                ..
            } => self.position(id),
            _ => None,
        }
    }

    pub fn end_drag(&mut self, target: DropTarget) -> DropOutcome {
        let drag = std::mem::take(&mut self.drag);
        match (drag, target) {
            (DragState::Idle, _) | (_, DropTarget::Outside) => DropOutcome::Ignored,
            (DragState::FromPalette { .. }, DropTarget::Trash) => DropOutcome::Ignored,
            (DragState::FromPalette { kind, .. }, target) => self
                .insert_from_palette(kind, target)
                .map(DropOutcome::Inserted)
                .unwrap_or(DropOutcome::Ignored),
            (DragState::FromList { entry, .. }, DropTarget::Trash) => self
                .remove(entry)
                .map(|removed| DropOutcome::Removed(removed.id))
                .unwrap_or(DropOutcome::Ignored),
            (DragState::FromList { entry, .. }, target) => {
                if self.reorder(entry, target) {
                    DropOutcome::Moved(entry)
                } else {
                    DropOutcome::Ignored
                }
            }
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag = DragState::Idle;
    }
}

/// Drafts keyed by `(pool, hook path)`, owned by one editor session.
#[derive(Debug, Default)]
pub struct DraftBook {
    drafts: HashMap<(PoolId, HookPath), CommandDraft>,
}

impl DraftBook {
    pub fn get(&self, pool: PoolId, hook_path: HookPath) -> Option<&CommandDraft> {
        self.drafts.get(&(pool, hook_path))
    }

    pub fn get_mut(&mut self, pool: PoolId, hook_path: HookPath) -> Option<&mut CommandDraft> {
        self.drafts.get_mut(&(pool, hook_path))
    }

    pub fn insert(&mut self, draft: CommandDraft) {
        self.drafts.insert((draft.pool, draft.hook_path), draft);
    }

    pub fn discard(&mut self, pool: PoolId, hook_path: HookPath) -> Option<CommandDraft> {
        self.drafts.remove(&(pool, hook_path))
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/composer_tests.rs"]
mod tests;

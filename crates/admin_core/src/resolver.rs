use std::sync::Arc;

use chain::{
    abi::{Function, ParamType, Token},
    ChainReader,
};
use shared::domain::{Address, Placement, ResolvedAddressSet};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_INDEX_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeShape {
    /// `name() -> address`
    Single,
    /// `name() -> address[]`
    List,
    /// `name(uint256) -> address`, walked over an index range
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub name: &'static str,
    pub shape: ProbeShape,
    pub key: Option<&'static str>,
}

impl Probe {
    const fn single(name: &'static str, key: &'static str) -> Self {
        Self {
            name,
            shape: ProbeShape::Single,
            key: Some(key),
        }
    }

    const fn list(name: &'static str) -> Self {
        Self {
            name,
            shape: ProbeShape::List,
            key: None,
        }
    }

    const fn indexed(name: &'static str) -> Self {
        Self {
            name,
            shape: ProbeShape::Indexed,
            key: None,
        }
    }

    pub fn function(&self) -> Function {
        match self.shape {
            ProbeShape::Single => Function::new(self.name, vec![], vec![ParamType::Address]),
            ProbeShape::List => Function::new(
                self.name,
                vec![],
                vec![ParamType::array_of(ParamType::Address)],
            ),
            ProbeShape::Indexed => Function::new(
                self.name,
                vec![ParamType::Uint(256)],
                vec![ParamType::Address],
            ),
        }
    }
}

/// Walked top to bottom; within a shape, earlier rows win.
pub const PROBES: &[Probe] = &[
    Probe::single("masterControl", "masterControl"),
    Probe::single("getMasterControl", "masterControl"),
    Probe::single("master_controller", "masterControl"),
    Probe::single("master", "masterControl"),
    Probe::single("master_addr", "masterControl"),
    Probe::single("masterControlAddress", "masterControl"),
    Probe::single("poolManager", "poolManager"),
    Probe::single("getPoolManager", "poolManager"),
    Probe::single("manager", "poolManager"),
    Probe::single("managerAddress", "poolManager"),
    Probe::single("poolLaunchPad", "poolLaunchPad"),
    Probe::single("getPoolLaunchPad", "poolLaunchPad"),
    Probe::single("pool_launch_pad", "poolLaunchPad"),
    Probe::single("poolLaunchpad", "poolLaunchPad"),
    Probe::single("launchPad", "poolLaunchPad"),
    Probe::single("create2Factory", "create2Factory"),
    Probe::single("getCreate2Factory", "create2Factory"),
    Probe::single("factory", "create2Factory"),
    Probe::single("create2FactoryAddress", "create2Factory"),
    Probe::single("createFactory", "create2Factory"),
    Probe::single("feeCollector", "feeCollector"),
    Probe::single("getFeeCollector", "feeCollector"),
    Probe::single("feeCollectorAddress", "feeCollector"),
    Probe::single("gasBank", "gasBank"),
    Probe::single("getGasBank", "gasBank"),
    Probe::single("gasBankAddress", "gasBank"),
    Probe::single("degenPool", "degenPool"),
    Probe::single("degenPoolAddress", "degenPool"),
    Probe::single("prizeBox", "prizeBox"),
    Probe::single("prizeBoxAddress", "prizeBox"),
    Probe::single("settings", "settings"),
    Probe::single("settingsAddress", "settings"),
    Probe::single("shareSplitter", "shareSplitter"),
    Probe::single("shareSplitterAddress", "shareSplitter"),
    Probe::single("bonding", "bonding"),
    Probe::single("bondingAddress", "bonding"),
    Probe::single("shaker", "shaker"),
    Probe::single("shakerAddress", "shaker"),
    Probe::single("pointsCommand", "pointsCommand"),
    Probe::single("pointsCommandAddress", "pointsCommand"),
    Probe::single("bidManager", "bidManager"),
    Probe::single("bidManagerAddress", "bidManager"),
    Probe::single("accessControl", "accessControl"),
    Probe::single("getAccessControl", "accessControl"),
    Probe::single("access_control", "accessControl"),
    Probe::single("poolFactory", "poolFactory"),
    Probe::single("admin", "admin"),
    Probe::single("governance", "governance"),
    Probe::list("getAllAddresses"),
    Probe::list("allAddresses"),
    Probe::list("getAddresses"),
    Probe::list("addresses"),
    Probe::list("members"),
    Probe::list("getMembers"),
    Probe::list("getRoleAddresses"),
    Probe::list("getAll"),
    Probe::list("registryAddresses"),
    Probe::list("listedAddresses"),
    Probe::list("getMembersByRole"),
    Probe::list("getAllContracts"),
    Probe::list("listAddresses"),
    Probe::list("all"),
    Probe::list("contracts"),
    Probe::list("registeredContracts"),
    Probe::list("list"),
    Probe::list("listAll"),
    Probe::indexed("getAddress"),
    Probe::indexed("addresses"),
    Probe::indexed("getAddr"),
    Probe::indexed("get"),
    Probe::indexed("registry"),
    Probe::indexed("memberAt"),
    Probe::indexed("members"),
    Probe::indexed("addressAt"),
    Probe::indexed("at"),
    Probe::indexed("getAddressAt"),
    Probe::indexed("addrAt"),
];

/// Canonical keys in table order, without repeats.
pub fn canonical_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = Vec::new();
    for key in PROBES.iter().filter_map(|probe| probe.key) {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn probes(shape: ProbeShape) -> impl Iterator<Item = &'static Probe> {
    PROBES.iter().filter(move |probe| probe.shape == shape)
}

/// Discovers component addresses behind a registry contract. Never fails:
/// every unreachable probe is treated as absent.
#[derive(Clone)]
pub struct AddressResolver {
    reader: ChainReader,
    index_limit: usize,
}

impl AddressResolver {
    pub fn new(reader: ChainReader) -> Self {
        Self {
            reader,
            index_limit: DEFAULT_INDEX_LIMIT,
        }
    }

    pub fn with_index_limit(mut self, index_limit: usize) -> Self {
        self.index_limit = index_limit;
        self
    }

    pub async fn resolve(&self, seed: Address) -> ResolvedAddressSet {
        let mut set = ResolvedAddressSet::default();
        match self.reader.has_code(seed).await {
            Ok(true) => {}
            Ok(false) => {
                info!(%seed, "resolver: no code at seed address");
                return set;
            }
            Err(err) => {
                warn!(%seed, error = %err, "resolver: code lookup failed");
                return set;
            }
        }

        for probe in probes(ProbeShape::Single) {
            let Some(key) = probe.key else {
                continue;
            };
            if let Some(address) = self.probe_single(seed, probe).await {
                match set.record(key, address) {
                    Placement::Canonical => {
                        debug!(%seed, key, probe = probe.name, %address, "resolver: canonical hit")
                    }
                    Placement::Other => {
                        debug!(%seed, key, probe = probe.name, %address, "resolver: extra hit")
                    }
                    Placement::Ignored => {}
                }
            }
        }

        let unresolved = canonical_keys()
            .into_iter()
            .filter(|key| set.get(key).is_none())
            .count();
        if unresolved > 0 {
            for probe in probes(ProbeShape::List) {
                for address in self.probe_list(seed, probe).await {
                    set.record_other(address);
                }
            }
            for probe in probes(ProbeShape::Indexed) {
                self.walk_indexed(seed, probe, &mut set).await;
            }
        }

        info!(
            %seed,
            canonical = set.addresses.len(),
            others = set.others.len(),
            unresolved_keys = unresolved,
            "resolver: resolution finished"
        );
        set
    }

    async fn probe_single(&self, seed: Address, probe: &Probe) -> Option<Address> {
        match self.reader.call_one(seed, &probe.function(), &[]).await {
            Ok(Token::Address(address)) if !address.is_zero() => Some(address),
            Ok(_) => None,
            Err(err) => {
                debug!(probe = probe.name, error = %err, "resolver: probe absent");
                None
            }
        }
    }

    async fn probe_list(&self, seed: Address, probe: &Probe) -> Vec<Address> {
        match self.reader.call_one(seed, &probe.function(), &[]).await {
            Ok(Token::Array(items)) => items
                .into_iter()
                .filter_map(Token::into_address)
                .filter(|address| !address.is_zero())
                .collect(),
            Ok(_) => Vec::new(),
            Err(err) => {
                debug!(probe = probe.name, error = %err, "resolver: probe absent");
                Vec::new()
            }
        }
    }

    async fn walk_indexed(&self, seed: Address, probe: &Probe, set: &mut ResolvedAddressSet) {
        let function = probe.function();
        for index in 0..self.index_limit {
            match self
                .reader
                .call_one(seed, &function, &[Token::uint(index as u64)])
                .await
            {
                Ok(Token::Address(address)) => {
                    set.record_other(address);
                }
                Ok(_) => break,
                Err(err) => {
                    debug!(probe = probe.name, index, error = %err, "resolver: indexed probe stopped");
                    break;
                }
            }
        }
    }
}

/// Shared resolution result. Readers hold an immutable snapshot; a refresh
/// swaps the whole set.
#[derive(Default)]
pub struct AddressBook {
    current: RwLock<Arc<ResolvedAddressSet>>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Arc<ResolvedAddressSet> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn replace(&self, set: ResolvedAddressSet) -> Arc<ResolvedAddressSet> {
        let next = Arc::new(set);
        *self.current.write().await = Arc::clone(&next);
        next
    }

    pub async fn refresh(
        &self,
        resolver: &AddressResolver,
        seed: Address,
    ) -> Arc<ResolvedAddressSet> {
        let set = resolver.resolve(seed).await;
        self.replace(set).await
    }
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;

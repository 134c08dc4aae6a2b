//! In-memory doubles for the ledger client and key provider.
//!
//! [`InMemoryLedger`] simulates the four contracts (Future / Ready claim
//! tokens, Escrow, Marketplace) against one shared chain state. Writes are
//! dry-run on a copy of the state during estimation and applied atomically
//! when the transaction is mined, so two transactions that both pass
//! estimation can still see one of them revert in the block.
//!
//! Mining is driven by receipt polls: with `mine_after_polls = n` the first
//! `n` polls for a hash return `None` and the next one mines it.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use cropledger_types::{
    Address, CallValue, ContractEvent, ContractName, CropMetadata, EscrowId, EscrowStatus,
    NetworkId, NetworkProfile, NetworkRegistry, ProviderError, Receipt, TokenId, TokenKind,
    TransactionRequest, TxHash, ValueReader,
    constants::{self, events, methods},
    date_to_unix,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tokio::sync::{Notify, broadcast};

use crate::client::{KeyProvider, LedgerClient, ProviderEvent};

const GAS_BASE: u64 = 21_000;
const GAS_PER_ARG: u64 = 10_000;

/// Calls observed by an [`InMemoryLedger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounters {
    pub estimates: u32,
    pub submits: u32,
    pub receipt_polls: u32,
    pub balance_queries: u32,
    pub view_calls: u32,
    pub switch_attempts: u32,
    pub networks_added: u32,
    pub last_estimate: Option<u64>,
    pub last_gas_limit: Option<u64>,
}

// ---------------------------------------------------------------------------
// Chain state
// ---------------------------------------------------------------------------

type Revert = String;

#[derive(Debug, Clone)]
struct TokenRecord {
    owner: Address,
    crop_type: String,
    quantity: u64,
    date: u128,
    redeemed: bool,
}

#[derive(Debug, Clone, Default)]
struct TokenBook {
    tokens: BTreeMap<u64, TokenRecord>,
    last_id: u64,
}

impl TokenBook {
    fn get(&self, id: u64) -> Result<&TokenRecord, Revert> {
        self.tokens.get(&id).ok_or_else(|| format!("token {id} does not exist"))
    }

    fn get_mut(&mut self, id: u64) -> Result<&mut TokenRecord, Revert> {
        self.tokens.get_mut(&id).ok_or_else(|| format!("token {id} does not exist"))
    }

    fn insert(&mut self, id: u64, record: TokenRecord) {
        self.last_id = self.last_id.max(id);
        self.tokens.insert(id, record);
    }

    fn owned_by(&self, owner: Address) -> Vec<u64> {
        self.tokens
            .iter()
            .filter(|(_, t)| t.owner == owner)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[derive(Debug, Clone)]
struct EscrowRecord {
    buyer: Address,
    seller: Address,
    amount: u128,
    token_id: u64,
    status: EscrowStatus,
}

#[derive(Debug, Clone)]
struct ListingRecord {
    token_id: u64,
    kind: TokenKind,
    price: u128,
    seller: Address,
    active: bool,
}

#[derive(Debug, Clone, Default)]
struct Chain {
    native: HashMap<Address, u128>,
    future: TokenBook,
    ready: TokenBook,
    escrows: BTreeMap<u64, EscrowRecord>,
    last_escrow: u64,
    listings: BTreeMap<u64, ListingRecord>,
    last_listing: u64,
}

struct Invocation<'a> {
    from: Address,
    method: &'a str,
    args: &'a [CallValue],
    value: u128,
}

impl Invocation<'_> {
    fn reader(&self) -> ValueReader<'_> {
        ValueReader::new(self.method, self.args)
    }

    fn non_payable(&self) -> Result<(), Revert> {
        if self.value == 0 {
            Ok(())
        } else {
            Err(format!("{} is not payable", self.method))
        }
    }
}

fn decode<T>(result: cropledger_types::Result<T>) -> Result<T, Revert> {
    result.map_err(|e| e.to_string())
}

impl Chain {
    fn book(&self, kind: TokenKind) -> &TokenBook {
        match kind {
            TokenKind::Future => &self.future,
            TokenKind::Ready => &self.ready,
        }
    }

    fn book_mut(&mut self, kind: TokenKind) -> &mut TokenBook {
        match kind {
            TokenKind::Future => &mut self.future,
            TokenKind::Ready => &mut self.ready,
        }
    }

    fn credit(&mut self, who: Address, amount: u128) {
        let balance = self.native.entry(who).or_default();
        *balance = balance.saturating_add(amount);
    }

    fn debit(&mut self, who: Address, amount: u128) -> Result<(), Revert> {
        let balance = self.native.entry(who).or_default();
        *balance = balance
            .checked_sub(amount)
            .ok_or_else(|| format!("insufficient funds for {}", who.short()))?;
        Ok(())
    }

    fn execute(
        &mut self,
        contract: ContractName,
        call: &Invocation<'_>,
    ) -> Result<Vec<ContractEvent>, Revert> {
        match contract {
            ContractName::FutureClaimToken => self.token_call(TokenKind::Future, call),
            ContractName::ReadyClaimToken => self.token_call(TokenKind::Ready, call),
            ContractName::Escrow => self.escrow_call(call),
            ContractName::Marketplace => self.market_call(call),
        }
    }

    fn token_call(
        &mut self,
        kind: TokenKind,
        call: &Invocation<'_>,
    ) -> Result<Vec<ContractEvent>, Revert> {
        call.non_payable()?;
        let mut r = call.reader();
        match call.method {
            methods::MINT => {
                let to = decode(r.address())?;
                let crop_type = decode(r.text())?;
                let quantity = decode(r.u64())?;
                let date = decode(r.uint())?;
                if quantity == 0 {
                    return Err("quantity must be positive".into());
                }
                if to.is_zero() {
                    return Err("mint to zero address".into());
                }
                let book = self.book_mut(kind);
                let id = book.last_id + 1;
                book.insert(id, TokenRecord {
                    owner: to,
                    crop_type,
                    quantity,
                    date,
                    redeemed: false,
                });
                Ok(vec![
                    ContractEvent::new(events::MINTED)
                        .with_field(events::MINTED_ID, id)
                        .with_field("owner", to),
                ])
            }
            methods::TRANSFER_FROM => {
                let from = decode(r.address())?;
                let to = decode(r.address())?;
                let id = decode(r.u64())?;
                let token = self.book_mut(kind).get_mut(id)?;
                if token.owner != from || call.from != from {
                    return Err(format!("caller is not owner of token {id}"));
                }
                if token.redeemed {
                    return Err(format!("token {id} is redeemed"));
                }
                if to.is_zero() {
                    return Err("transfer to zero address".into());
                }
                token.owner = to;
                Ok(vec![
                    ContractEvent::new("Transfer")
                        .with_field("from", from)
                        .with_field("to", to)
                        .with_field("tokenId", id),
                ])
            }
            methods::REDEEM => {
                if kind == TokenKind::Future {
                    return Err("future claims are not redeemable".into());
                }
                let id = decode(r.u64())?;
                let token = self.book_mut(kind).get_mut(id)?;
                if token.owner != call.from {
                    return Err(format!("caller is not owner of token {id}"));
                }
                if token.redeemed {
                    return Err(format!("token {id} already redeemed"));
                }
                token.redeemed = true;
                Ok(vec![ContractEvent::new("Redeemed").with_field("tokenId", id)])
            }
            other => Err(format!("unknown method {other}")),
        }
    }

    fn escrow_call(&mut self, call: &Invocation<'_>) -> Result<Vec<ContractEvent>, Revert> {
        let mut r = call.reader();
        match call.method {
            methods::CREATE_ESCROW => {
                let seller = decode(r.address())?;
                let token_id = decode(r.u64())?;
                if call.value == 0 {
                    return Err("escrow amount must be positive".into());
                }
                if seller == call.from {
                    return Err("buyer and seller must differ".into());
                }
                self.debit(call.from, call.value)?;
                self.last_escrow += 1;
                let id = self.last_escrow;
                self.escrows.insert(id, EscrowRecord {
                    buyer: call.from,
                    seller,
                    amount: call.value,
                    token_id,
                    status: EscrowStatus::Pending,
                });
                Ok(vec![
                    ContractEvent::new(events::ESCROW_CREATED)
                        .with_field(events::ESCROW_CREATED_ID, id),
                ])
            }
            methods::RELEASE_FUNDS | methods::REFUND => {
                call.non_payable()?;
                let id = decode(r.u64())?;
                let escrow = self
                    .escrows
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| format!("escrow {id} does not exist"))?;
                if escrow.status != EscrowStatus::Pending {
                    return Err(format!("escrow {id} is {}", escrow.status));
                }
                let (authorized, payee, status, event) = if call.method == methods::RELEASE_FUNDS {
                    (escrow.buyer, escrow.seller, EscrowStatus::Completed, "FundsReleased")
                } else {
                    (escrow.seller, escrow.buyer, EscrowStatus::Refunded, "Refunded")
                };
                if call.from != authorized {
                    return Err(format!("caller may not {} escrow {id}", call.method));
                }
                self.credit(payee, escrow.amount);
                if let Some(record) = self.escrows.get_mut(&id) {
                    record.status = status;
                }
                Ok(vec![ContractEvent::new(event).with_field("escrowId", id)])
            }
            other => Err(format!("unknown method {other}")),
        }
    }

    fn market_call(&mut self, call: &Invocation<'_>) -> Result<Vec<ContractEvent>, Revert> {
        let mut r = call.reader();
        match call.method {
            methods::LIST_TOKEN => {
                call.non_payable()?;
                let token_id = decode(r.u64())?;
                let kind = decode(r.uint().and_then(TokenKind::from_code))?;
                let price = decode(r.uint())?;
                if self.book(kind).get(token_id)?.owner != call.from {
                    return Err(format!("caller is not owner of token {token_id}"));
                }
                if price == 0 {
                    return Err("price must be positive".into());
                }
                self.last_listing += 1;
                let id = self.last_listing;
                self.listings.insert(id, ListingRecord {
                    token_id,
                    kind,
                    price,
                    seller: call.from,
                    active: true,
                });
                Ok(vec![ContractEvent::new(events::LISTED).with_field(events::LISTED_ID, id)])
            }
            methods::BUY_TOKEN => {
                let id = decode(r.u64())?;
                let listing = self
                    .listings
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| format!("listing {id} does not exist"))?;
                if !listing.active {
                    return Err(format!("listing {id} is not active"));
                }
                if call.value != listing.price {
                    return Err(format!("listing {id} requires exact price"));
                }
                if call.from == listing.seller {
                    return Err("seller cannot buy own listing".into());
                }
                let token = self.book_mut(listing.kind).get_mut(listing.token_id)?;
                if token.owner != listing.seller {
                    return Err(format!("seller no longer owns token {}", listing.token_id));
                }
                token.owner = call.from;
                self.debit(call.from, call.value)?;
                self.credit(listing.seller, call.value);
                if let Some(record) = self.listings.get_mut(&id) {
                    record.active = false;
                }
                Ok(vec![
                    ContractEvent::new("Sold")
                        .with_field("listingId", id)
                        .with_field("buyer", call.from),
                ])
            }
            methods::CANCEL_LISTING => {
                call.non_payable()?;
                let id = decode(r.u64())?;
                let listing = self
                    .listings
                    .get_mut(&id)
                    .ok_or_else(|| format!("listing {id} does not exist"))?;
                if listing.seller != call.from {
                    return Err(format!("caller is not seller of listing {id}"));
                }
                if !listing.active {
                    return Err(format!("listing {id} is not active"));
                }
                listing.active = false;
                Ok(vec![ContractEvent::new("ListingCancelled").with_field("listingId", id)])
            }
            other => Err(format!("unknown method {other}")),
        }
    }

    fn view(
        &self,
        contract: ContractName,
        method: &str,
        args: &[CallValue],
    ) -> Result<Vec<CallValue>, Revert> {
        let mut r = ValueReader::new(method, args);
        let kind = match contract {
            ContractName::FutureClaimToken => Some(TokenKind::Future),
            ContractName::ReadyClaimToken => Some(TokenKind::Ready),
            ContractName::Escrow | ContractName::Marketplace => None,
        };
        match (kind, method) {
            (Some(kind), methods::TOKEN_INFO) => {
                let token = self.book(kind).get(decode(r.u64())?)?;
                Ok(vec![
                    CallValue::Address(token.owner),
                    CallValue::Text(token.crop_type.clone()),
                    CallValue::from(token.quantity),
                    CallValue::Uint(token.date),
                    CallValue::Bool(token.redeemed),
                ])
            }
            (Some(kind), methods::BALANCE_OF) => {
                let owner = decode(r.address())?;
                let count = self.book(kind).owned_by(owner).len();
                Ok(vec![CallValue::Uint(u128::try_from(count).unwrap_or(u128::MAX))])
            }
            (Some(kind), methods::TOKEN_OF_OWNER_BY_INDEX) => {
                let owner = decode(r.address())?;
                let index = decode(r.u64())?;
                let owned = self.book(kind).owned_by(owner);
                usize::try_from(index)
                    .ok()
                    .and_then(|i| owned.get(i))
                    .map(|id| vec![CallValue::from(*id)])
                    .ok_or_else(|| format!("owner index {index} out of range"))
            }
            (None, methods::GET_ESCROW) if contract == ContractName::Escrow => {
                let id = decode(r.u64())?;
                let escrow = self
                    .escrows
                    .get(&id)
                    .ok_or_else(|| format!("escrow {id} does not exist"))?;
                Ok(vec![
                    CallValue::Address(escrow.buyer),
                    CallValue::Address(escrow.seller),
                    CallValue::Uint(escrow.amount),
                    CallValue::from(escrow.token_id),
                    CallValue::from(escrow.status.code()),
                ])
            }
            (None, methods::GET_LISTING) if contract == ContractName::Marketplace => {
                let id = decode(r.u64())?;
                let listing = self
                    .listings
                    .get(&id)
                    .ok_or_else(|| format!("listing {id} does not exist"))?;
                Ok(vec![
                    CallValue::from(listing.token_id),
                    CallValue::from(listing.kind.code()),
                    CallValue::Uint(listing.price),
                    CallValue::Address(listing.seller),
                    CallValue::Bool(listing.active),
                ])
            }
            (None, methods::GET_ACTIVE_LISTINGS) if contract == ContractName::Marketplace => {
                let ids = self
                    .listings
                    .iter()
                    .filter(|(_, l)| l.active)
                    .map(|(id, _)| CallValue::from(*id))
                    .collect();
                Ok(vec![CallValue::List(ids)])
            }
            (_, other) => Err(format!("unknown view {other} on {contract}")),
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryLedger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct PendingTx {
    hash: TxHash,
    contract: ContractName,
    request: TransactionRequest,
    polls_remaining: u32,
}

struct LedgerState {
    active_network: NetworkId,
    known_networks: BTreeSet<NetworkId>,
    ignore_registrations: bool,
    chain: Chain,
    pending: Vec<PendingTx>,
    receipts: HashMap<TxHash, Receipt>,
    block_number: u64,
    nonce: u64,
    mine_after_polls: u32,
    emit_events: bool,
    fail_next_estimate: Option<ProviderError>,
    fail_next_submit: Option<ProviderError>,
    fail_next_view: Option<ProviderError>,
    counters: LedgerCounters,
}

impl LedgerState {
    fn mine(&mut self, tx: PendingTx) -> Receipt {
        self.block_number += 1;
        let mut next = self.chain.clone();
        let result = next.execute(tx.contract, &Invocation {
            from: tx.request.from,
            method: &tx.request.method,
            args: &tx.request.args,
            value: tx.request.value,
        });
        let (success, events) = match result {
            Ok(events) => {
                self.chain = next;
                (true, if self.emit_events { events } else { Vec::new() })
            }
            Err(reason) => {
                tracing::debug!(
                    hash = %tx.hash.short(),
                    reason = %reason,
                    "Simulated transaction reverted"
                );
                (false, Vec::new())
            }
        };
        let receipt = Receipt {
            hash: tx.hash,
            success,
            block_number: self.block_number,
            gas_used: tx.request.gas_limit.unwrap_or(GAS_BASE),
            events,
        };
        self.receipts.insert(tx.hash, receipt.clone());
        receipt
    }
}

/// A simulated ledger network implementing [`LedgerClient`].
pub struct InMemoryLedger {
    registry: Arc<NetworkRegistry>,
    state: Mutex<LedgerState>,
    events: broadcast::Sender<ProviderEvent>,
}

impl InMemoryLedger {
    /// A ledger that knows every network in `registry` and starts on the
    /// first one in id order.
    #[must_use]
    pub fn new(registry: Arc<NetworkRegistry>) -> Self {
        let known_networks: BTreeSet<NetworkId> = registry.network_ids().cloned().collect();
        let active_network = known_networks
            .iter()
            .next()
            .cloned()
            .unwrap_or_else(|| NetworkId::new("localnet"));
        let (events, _) = broadcast::channel(constants::PROVIDER_EVENT_CAPACITY);
        Self {
            registry,
            state: Mutex::new(LedgerState {
                active_network,
                known_networks,
                ignore_registrations: false,
                chain: Chain::default(),
                pending: Vec::new(),
                receipts: HashMap::new(),
                block_number: 0,
                nonce: 0,
                mine_after_polls: 0,
                emit_events: true,
                fail_next_estimate: None,
                fail_next_submit: None,
                fail_next_view: None,
                counters: LedgerCounters::default(),
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn contract_at(&self, network: &NetworkId, to: Address) -> Option<ContractName> {
        ContractName::ALL
            .into_iter()
            .find(|c| self.registry.contract_address(*c, network).ok() == Some(to))
    }

    fn active_profile(&self, state: &LedgerState) -> Option<NetworkProfile> {
        self.registry.profile(&state.active_network).cloned()
    }

    // -- test hooks ---------------------------------------------------------

    #[must_use]
    pub fn counters(&self) -> LedgerCounters {
        self.lock().counters
    }

    /// Credit `amount` of the native asset to `who`.
    pub fn fund(&self, who: Address, amount: Decimal) {
        let mut state = self.lock();
        match self.active_profile(&state).map(|p| p.to_base_units(amount)) {
            Some(Ok(units)) => state.chain.credit(who, units),
            _ => tracing::warn!(
                amount = %amount,
                "Cannot fund in base units of the active network"
            ),
        }
    }

    /// Native balance of `who`, in whole units of the active network.
    #[must_use]
    pub fn native_balance(&self, who: Address) -> Decimal {
        let state = self.lock();
        let units = state.chain.native.get(&who).copied().unwrap_or(0);
        self.active_profile(&state)
            .and_then(|p| p.from_base_units(units).ok())
            .unwrap_or_default()
    }

    /// Place a token directly into a claim-token contract.
    pub fn seed_token(
        &self,
        kind: TokenKind,
        id: TokenId,
        owner: Address,
        crop_type: &str,
        quantity: u64,
    ) {
        let metadata = CropMetadata::dummy(crop_type);
        self.lock().chain.book_mut(kind).insert(id.0, TokenRecord {
            owner,
            crop_type: metadata.crop_type,
            quantity,
            date: date_to_unix(metadata.harvest_or_ready_date),
            redeemed: false,
        });
    }

    #[must_use]
    pub fn token_owner(&self, kind: TokenKind, id: TokenId) -> Option<Address> {
        self.lock().chain.book(kind).tokens.get(&id.0).map(|t| t.owner)
    }

    /// Force an escrow status, as an external arbitration path would.
    /// Returns `false` if the escrow does not exist.
    pub fn set_escrow_status(&self, id: EscrowId, status: EscrowStatus) -> bool {
        match self.lock().chain.escrows.get_mut(&id.0) {
            Some(escrow) => {
                escrow.status = status;
                true
            }
            None => false,
        }
    }

    /// Number of receipt polls that return `None` before a transaction mines.
    pub fn set_mine_after_polls(&self, polls: u32) {
        self.lock().mine_after_polls = polls;
    }

    /// Mine every pending transaction in submission order.
    pub fn mine_pending(&self) {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        for tx in pending {
            state.mine(tx);
        }
    }

    /// When `false`, confirmed receipts carry no event logs.
    pub fn set_emit_events(&self, emit: bool) {
        self.lock().emit_events = emit;
    }

    pub fn fail_next_estimate(&self, err: ProviderError) {
        self.lock().fail_next_estimate = Some(err);
    }

    pub fn fail_next_submit(&self, err: ProviderError) {
        self.lock().fail_next_submit = Some(err);
    }

    /// Fail the next read-only contract call.
    pub fn fail_next_view(&self, err: ProviderError) {
        self.lock().fail_next_view = Some(err);
    }

    /// Make the provider treat `network` as unknown until it is registered.
    pub fn forget_network(&self, network: &NetworkId) {
        self.lock().known_networks.remove(network);
    }

    /// Accept `add_network` calls without actually learning the network.
    pub fn ignore_registrations(&self, ignore: bool) {
        self.lock().ignore_registrations = ignore;
    }

    /// Push a provider notification to all subscribers.
    pub fn emit(&self, event: ProviderEvent) {
        // No subscribers is not an error here.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn network_id(&self) -> Result<NetworkId, ProviderError> {
        Ok(self.lock().active_network.clone())
    }

    async fn balance(&self, address: Address) -> Result<u128, ProviderError> {
        let mut state = self.lock();
        state.counters.balance_queries += 1;
        Ok(state.chain.native.get(&address).copied().unwrap_or(0))
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, ProviderError> {
        let mut state = self.lock();
        state.counters.estimates += 1;
        if let Some(err) = state.fail_next_estimate.take() {
            return Err(err);
        }
        let contract = self
            .contract_at(&state.active_network, request.to)
            .ok_or_else(|| ProviderError::Reverted(format!("no contract at {}", request.to)))?;
        let mut dry_run = state.chain.clone();
        dry_run
            .execute(contract, &Invocation {
                from: request.from,
                method: &request.method,
                args: &request.args,
                value: request.value,
            })
            .map_err(ProviderError::Reverted)?;
        let args = u64::try_from(request.args.len()).unwrap_or(u64::MAX);
        let gas = GAS_BASE.saturating_add(GAS_PER_ARG.saturating_mul(args));
        state.counters.last_estimate = Some(gas);
        Ok(gas)
    }

    async fn submit(&self, request: &TransactionRequest) -> Result<TxHash, ProviderError> {
        let mut state = self.lock();
        state.counters.submits += 1;
        if let Some(err) = state.fail_next_submit.take() {
            return Err(err);
        }
        let contract = self
            .contract_at(&state.active_network, request.to)
            .ok_or_else(|| ProviderError::Transport(format!("no contract at {}", request.to)))?;
        state.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(state.nonce.to_be_bytes());
        hasher.update(request.from.as_bytes());
        hasher.update(request.method.as_bytes());
        let hash = TxHash(hasher.finalize().into());
        state.counters.last_gas_limit = request.gas_limit;
        let polls_remaining = state.mine_after_polls;
        state.pending.push(PendingTx {
            hash,
            contract,
            request: request.clone(),
            polls_remaining,
        });
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Receipt>, ProviderError> {
        let mut state = self.lock();
        state.counters.receipt_polls += 1;
        if let Some(receipt) = state.receipts.get(&hash) {
            return Ok(Some(receipt.clone()));
        }
        let Some(pos) = state.pending.iter().position(|tx| tx.hash == hash) else {
            return Ok(None);
        };
        if state.pending[pos].polls_remaining == 0 {
            let tx = state.pending.remove(pos);
            Ok(Some(state.mine(tx)))
        } else {
            state.pending[pos].polls_remaining -= 1;
            Ok(None)
        }
    }

    async fn call(
        &self,
        contract: Address,
        method: &str,
        args: &[CallValue],
    ) -> Result<Vec<CallValue>, ProviderError> {
        let mut state = self.lock();
        state.counters.view_calls += 1;
        if let Some(err) = state.fail_next_view.take() {
            return Err(err);
        }
        let name = self
            .contract_at(&state.active_network, contract)
            .ok_or_else(|| ProviderError::Reverted(format!("no contract at {contract}")))?;
        state.chain.view(name, method, args).map_err(ProviderError::Reverted)
    }

    async fn switch_network(&self, network: &NetworkId) -> Result<(), ProviderError> {
        {
            let mut state = self.lock();
            state.counters.switch_attempts += 1;
            if !state.known_networks.contains(network) {
                return Err(ProviderError::UnrecognizedNetwork(network.clone()));
            }
            state.active_network = network.clone();
        }
        self.emit(ProviderEvent::NetworkChanged(network.clone()));
        Ok(())
    }

    async fn add_network(&self, profile: &NetworkProfile) -> Result<(), ProviderError> {
        let mut state = self.lock();
        state.counters.networks_added += 1;
        if !state.ignore_registrations {
            state.known_networks.insert(profile.id.clone());
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// StaticKeyProvider
// ---------------------------------------------------------------------------

/// A key provider holding one ed25519 key.
///
/// Supports one-shot rejection, simulated unavailability, and holding
/// account requests until [`approve`](Self::approve) is called.
pub struct StaticKeyProvider {
    signing_key: SigningKey,
    address: Address,
    reject_next: AtomicBool,
    unavailable: AtomicBool,
    held: AtomicBool,
    gate: Notify,
    /// Number of `request_accounts` calls seen.
    pub requests: AtomicUsize,
}

impl StaticKeyProvider {
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::from_key(SigningKey::from_bytes(&seed))
    }

    #[must_use]
    pub fn random() -> Self {
        Self::from_key(SigningKey::generate(&mut rand::rngs::OsRng))
    }

    fn from_key(signing_key: SigningKey) -> Self {
        let address = Address::from_public_key(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
            reject_next: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            held: AtomicBool::new(false),
            gate: Notify::new(),
            requests: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn reject_next_request(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Park subsequent account requests until [`approve`](Self::approve).
    pub fn hold_requests(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn approve(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.notify_one();
    }

    #[must_use]
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        Signature::from_slice(signature)
            .and_then(|sig| self.signing_key.verifying_key().verify(message, &sig))
            .is_ok()
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable);
        }
        if self.held.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::UserRejected);
        }
        Ok(vec![self.address])
    }

    async fn sign_message(
        &self,
        address: Address,
        message: &[u8],
    ) -> Result<Vec<u8>, ProviderError> {
        if address != self.address {
            return Err(ProviderError::Transport(format!("no key for {address}")));
        }
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(Arc::new(NetworkRegistry::builtin()))
    }

    fn request(
        ledger: &InMemoryLedger,
        contract: ContractName,
        from: Address,
        method: &str,
        args: Vec<CallValue>,
    ) -> TransactionRequest {
        let to = ledger
            .registry
            .contract_address(contract, &NetworkId::new("localnet"))
            .unwrap();
        TransactionRequest {
            from,
            to,
            method: method.to_string(),
            args,
            value: 0,
            gas_limit: None,
        }
    }

    fn redeem_request(ledger: &InMemoryLedger, owner: Address, token: u64) -> TransactionRequest {
        request(
            ledger,
            ContractName::ReadyClaimToken,
            owner,
            methods::REDEEM,
            vec![CallValue::Uint(u128::from(token))],
        )
    }

    #[tokio::test]
    async fn starts_on_localnet() {
        assert_eq!(ledger().network_id().await.unwrap(), NetworkId::new("localnet"));
    }

    #[tokio::test]
    async fn estimate_does_not_mutate_state() {
        let ledger = ledger();
        let owner = Address::repeat(1);
        ledger.seed_token(TokenKind::Ready, TokenId(1), owner, "maize", 5);
        let req = redeem_request(&ledger, owner, 1);

        ledger.estimate_gas(&req).await.unwrap();
        ledger.estimate_gas(&req).await.unwrap();
        assert_eq!(ledger.counters().estimates, 2);
    }

    #[tokio::test]
    async fn mining_waits_for_configured_polls() {
        let ledger = ledger();
        let owner = Address::repeat(1);
        ledger.seed_token(TokenKind::Ready, TokenId(1), owner, "maize", 5);
        ledger.set_mine_after_polls(2);
        let req = redeem_request(&ledger, owner, 1);

        let hash = ledger.submit(&req).await.unwrap();
        assert!(ledger.receipt(hash).await.unwrap().is_none());
        assert!(ledger.receipt(hash).await.unwrap().is_none());
        let receipt = ledger.receipt(hash).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.events[0].name, "Redeemed");
    }

    #[tokio::test]
    async fn failed_block_leaves_state_untouched() {
        let ledger = ledger();
        let buyer = Address::repeat(1);
        ledger.fund(buyer, Decimal::new(1, 0));
        let mut req = request(
            &ledger,
            ContractName::Escrow,
            buyer,
            methods::CREATE_ESCROW,
            vec![CallValue::Address(Address::repeat(2)), CallValue::Uint(9)],
        );
        req.value = 5;
        let hash = ledger.submit(&req).await.unwrap();
        // Drain the buyer before the block lands.
        ledger.lock().chain.native.insert(buyer, 0);

        let receipt = ledger.receipt(hash).await.unwrap().unwrap();
        assert!(!receipt.success);
        assert!(ledger.lock().chain.escrows.is_empty());
    }

    #[tokio::test]
    async fn view_of_missing_token_reverts() {
        let ledger = ledger();
        let address = ledger
            .registry
            .contract_address(ContractName::FutureClaimToken, &NetworkId::new("localnet"))
            .unwrap();
        let err = ledger
            .call(address, methods::TOKEN_INFO, &[CallValue::Uint(3)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Reverted(_)));
    }

    #[tokio::test]
    async fn key_provider_signs_and_verifies() {
        let keys = StaticKeyProvider::random();
        let sig = keys.sign_message(keys.address(), b"harvest").await.unwrap();
        assert!(keys.verify(b"harvest", &sig));
        assert!(!keys.verify(b"other", &sig));
        assert!(keys.sign_message(Address::repeat(1), b"harvest").await.is_err());
    }
}

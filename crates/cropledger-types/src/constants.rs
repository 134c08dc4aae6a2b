//! System-wide constants for the CropLedger gateway.

/// Default safety margin added on top of a gas estimate, in percent.
pub const DEFAULT_GAS_MARGIN_PERCENT: u32 = 20;

/// Default interval between receipt polls in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of receipt polls before a call is reported as timed out.
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 60;

/// Decimals assumed for the native asset of a network missing from the registry.
pub const DEFAULT_NATIVE_DECIMALS: u32 = 18;

/// Largest decimals value a profile may declare (`10^28` still fits in `Decimal`).
pub const MAX_NATIVE_DECIMALS: u32 = 28;

/// Capacity of the provider notification channel.
pub const PROVIDER_EVENT_CAPACITY: usize = 64;

/// Upper bound on index lookups performed by a single `list_owned` call.
pub const MAX_OWNED_ENUMERATION: u64 = 10_000;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "CropLedger";

// ---------------------------------------------------------------------------
// Contract method names
// ---------------------------------------------------------------------------

/// Method and event names shared by the coordinators and any ledger client
/// implementation that simulates the contracts.
pub mod methods {
    // Claim tokens (Future and Ready share one interface).
    pub const MINT: &str = "mint";
    pub const TRANSFER_FROM: &str = "transferFrom";
    pub const REDEEM: &str = "redeem";
    pub const TOKEN_INFO: &str = "tokenInfo";
    pub const BALANCE_OF: &str = "balanceOf";
    pub const TOKEN_OF_OWNER_BY_INDEX: &str = "tokenOfOwnerByIndex";

    // Escrow.
    pub const CREATE_ESCROW: &str = "createEscrow";
    pub const RELEASE_FUNDS: &str = "releaseFunds";
    pub const REFUND: &str = "refund";
    pub const GET_ESCROW: &str = "getEscrow";

    // Marketplace.
    pub const LIST_TOKEN: &str = "listToken";
    pub const BUY_TOKEN: &str = "buyToken";
    pub const CANCEL_LISTING: &str = "cancelListing";
    pub const GET_LISTING: &str = "getListing";
    pub const GET_ACTIVE_LISTINGS: &str = "getActiveListings";
}

/// Event names and the fields that carry contract-assigned ids.
pub mod events {
    pub const MINTED: &str = "Minted";
    pub const MINTED_ID: &str = "tokenId";
    pub const ESCROW_CREATED: &str = "EscrowCreated";
    pub const ESCROW_CREATED_ID: &str = "escrowId";
    pub const LISTED: &str = "Listed";
    pub const LISTED_ID: &str = "listingId";
}

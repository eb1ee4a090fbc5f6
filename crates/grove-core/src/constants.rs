//! ─── Grove protocol constants ────────────────────────────────────────────────

// ── Trx limits ───────────────────────────────────────────────────────────────

/// POST payload limit after encoding, before encryption (spec §4.5).
pub const OBJECT_SIZE_LIMIT: usize = 200 * 1024;

/// Default trx expiration window from creation (spec §3: "default +5 minutes").
/// Kept configurable per §9 — this is only the default.
pub const DEFAULT_TRX_EXPIRATION_SECS: i64 = 5 * 60;

// ── Syncer ───────────────────────────────────────────────────────────────────

/// Default retry timer for an in-flight sync request (spec §4.8).
pub const SYNC_RETRY_INTERVAL_SECS: u64 = 10;

/// Default retry cap before transitioning to SYNC_FAILED (spec §4.8).
pub const SYNC_RETRY_CAP: u32 = 5;

// ── Wire protocol ────────────────────────────────────────────────────────────

/// Channel name prefixes (spec §6 "Wire protocol").
pub const USER_CHANNEL_PREFIX: &str = "user_channel_";
pub const PRODUCER_CHANNEL_PREFIX: &str = "prod_channel_";

/// Protocol prefix advertised over the transport: `/grove/<networkName>`.
pub const PROTOCOL_PREFIX_BASE: &str = "/grove";

// ── Storage key-prefix scheme (spec §4.3) ─────────────────────────────────────

pub const TRX_PREFIX: &str = "trx";
pub const BLK_PREFIX: &str = "blk";
pub const GRP_PREFIX: &str = "grp";
pub const CNT_PREFIX: &str = "cnt";
pub const ATH_PREFIX: &str = "ath";
pub const PRD_PREFIX: &str = "prd";
pub const ANN_PREFIX: &str = "ann";
pub const SMA_PREFIX: &str = "sma";
pub const CHD_PREFIX: &str = "chd";

// ── Exit codes (spec §6) ─────────────────────────────────────────────────────

pub const EXIT_CODE_STORAGE_LOCKED: i32 = 16;

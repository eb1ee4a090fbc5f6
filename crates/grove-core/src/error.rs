use thiserror::Error;

#[derive(Debug, Error)]
pub enum GroveError {
    // ── Validation ───────────────────────────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("payload exceeds object size limit of {limit} bytes: got {got}")]
    PayloadTooLarge { limit: usize, got: usize },

    #[error("unsupported consensus type: {0}")]
    UnsupportedConsensusType(String),

    // ── Not-found ────────────────────────────────────────────────────────────
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("trx not found: {0}")]
    TrxNotFound(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    // ── Authorization ────────────────────────────────────────────────────────
    #[error("only group owner can add or remove producer")]
    NotOwner,

    #[error("only non-owner members may leave a group")]
    OwnerCannotLeave,

    #[error("producer is not announced")]
    ProducerNotAnnounced,

    #[error("can not post to group, group is in syncing or sync failed")]
    GroupNotReadyForPost,

    // ── Crypto ───────────────────────────────────────────────────────────────
    #[error("invalid signature")]
    InvalidSignature,

    #[error("decrypt failed: {0}")]
    DecryptFailed(String),

    #[error("incorrect passphrase")]
    IncorrectPassphrase,

    #[error("key already exists: {0}")]
    KeyAlreadyExists(String),

    #[error("keystore is locked")]
    KeystoreLocked,

    // ── Storage ──────────────────────────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("storage is locked by another process")]
    StorageLocked,

    #[error("serialization error: {0}")]
    Serialization(String),

    // ── Chain ────────────────────────────────────────────────────────────────
    #[error("PARENT_NOT_EXIST")]
    ParentNotExist,

    #[error("HASH_MISMATCH")]
    HashMismatch,

    #[error("SIGNATURE_MISMATCH")]
    SignatureMismatch,

    #[error("BLOCK_ALREADY_SAVED")]
    BlockAlreadySaved,

    #[error("group with same group id existed")]
    GroupAlreadyExists,

    // ── Sync ─────────────────────────────────────────────────────────────────
    #[error("GROUP_ALREADY_IN_SYNCING")]
    GroupAlreadyInSyncing,

    #[error("SYNC_FAILED")]
    SyncFailed,

    // ── Version ──────────────────────────────────────────────────────────────
    #[error("protocol version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: String, got: String },

    // ── General ──────────────────────────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

pub type GroveResult<T> = Result<T, GroveError>;

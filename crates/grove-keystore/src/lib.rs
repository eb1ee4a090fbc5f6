pub mod backup;
pub mod keystore;
pub mod storedkey;

pub use backup::{backup, restore, BackupBundle};
pub use keystore::Keystore;
pub use storedkey::KeyType;

//! grove-group
//!
//! `Group` create/join/leave/delete and the `GroupMgr` registry that holds
//! one `Chain` per group (spec §4.9). `GroupMgr` is not a process-wide
//! singleton — it is a value held by `NodeRuntime` and passed around by
//! reference, same discipline the teacher binary uses for its `Arc<StateDb>`.

pub mod group;
pub mod groupmgr;
pub mod join;

pub use group::{ContentReader, CreateGroupParams, Group};
pub use groupmgr::GroupMgr;
pub use join::JoinPayload;

//! Wire protocol message tags shared by the client command channel (§6).
//!
//! Each tag is written as a single `i32` ahead of its payload on the
//! `Transfer`; the peer dispatches on it before reading the rest of the
//! message per the table in §6.

pub const SESSION_PREPARE: i32 = 1;
pub const SESSION_PREPARE_READ_PARAMS: i32 = 2;
pub const COMMAND_GET_META_DATA: i32 = 3;
pub const COMMAND_EXECUTE_QUERY: i32 = 4;
pub const COMMAND_EXECUTE_DISTRIBUTED_QUERY: i32 = 5;
pub const COMMAND_EXECUTE_UPDATE: i32 = 6;
pub const COMMAND_EXECUTE_DISTRIBUTED_UPDATE: i32 = 7;
pub const COMMAND_CLOSE: i32 = 8;

/// Sentinel id that always forces `prepare_if_required` to re-prepare
/// (§4.2: "force `id := MIN_SENTINEL`").
pub const MIN_SENTINEL: i64 = i64::MIN;

/// No cap on rows fetched per round trip — used for scrollable executes and
/// `getMetaData`'s "unbounded fetch" (§4.2).
pub const UNBOUNDED_FETCH: i64 = -1;

//! File-backed contact and group-member stores
//!
//! Both stores are owned by the serial processing loop; locks are only held
//! for map access, never across gateway calls.

mod contacts;
mod groups;

pub use contacts::{ContactRecord, ContactStore};
pub use groups::{GroupDirectory, GroupMember};

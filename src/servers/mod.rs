//! Process-lifecycle plumbing shared by every long-running task the
//! crawler spawns.

pub mod signals;

//! Process-wide table of open databases
//!
//! Opening a directory that is already open in this process hands back the
//! existing instance. A second instance would fail on the `LOCK` file and
//! would replay the revision log into stores that no one else sees.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Weak;

use super::Database;

/// Canonical data directory -> weak handle
///
/// Entries go stale when the last `Arc<Database>` is dropped; `open`
/// replaces them.
pub(crate) static OPEN_DATABASES: Lazy<Mutex<HashMap<PathBuf, Weak<Database>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

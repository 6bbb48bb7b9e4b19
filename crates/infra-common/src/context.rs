//! Request context tags.

use uuid::Uuid;

/// A fresh random tag for log correlation.
///
/// Every datagram a worker picks up gets one, and the tag follows the
/// call into the registry so reaper activity can be matched back to the
/// request that created the entry.
pub fn random_tag() -> String {
    Uuid::new_v4().to_string()
}

// Subscription registry
//
// Tracks active subscriptions for one connection: id → kind + filters.
// The dispatcher consults it to route server events to the right user
// callback; the unsubscribe surface looks ids up by (kind, device set).

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use devicehive_api::Error;
use devicehive_api::envelope::SubscriptionId;

/// Which server stream a subscription follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    CommandInsert,
    CommandUpdate,
    Notification,
}

impl SubscriptionKind {
    fn describe(self) -> &'static str {
        match self {
            Self::CommandInsert => "command-insert",
            Self::CommandUpdate => "command-update",
            Self::Notification => "notification",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SubscriptionEntry {
    pub kind: SubscriptionKind,
    pub device_ids: BTreeSet<String>,
}

#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    inner: Mutex<HashMap<SubscriptionId, SubscriptionEntry>>,
}

impl SubscriptionRegistry {
    /// Register a subscription under a fresh id. Rejects a reused id and
    /// a second subscription over the same (kind, device set).
    pub fn add(&self, id: SubscriptionId, entry: SubscriptionEntry) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.contains_key(&id) {
            return Err(Error::Subscription {
                message: format!("subscription '{id}' already registered"),
            });
        }
        if inner
            .values()
            .any(|e| e.kind == entry.kind && e.device_ids == entry.device_ids)
        {
            return Err(Error::Subscription {
                message: format!(
                    "{} subscription for this device set already exists",
                    entry.kind.describe()
                ),
            });
        }
        inner.insert(id, entry);
        Ok(())
    }

    /// Drop a subscription; unknown ids fail.
    pub fn remove(&self, id: &str) -> Result<SubscriptionEntry, Error> {
        self.lock().remove(id).ok_or_else(|| Error::Subscription {
            message: format!("subscription '{id}' not found"),
        })
    }

    /// Id of the subscription covering exactly this (kind, device set).
    pub fn find(&self, kind: SubscriptionKind, device_ids: &BTreeSet<String>) -> Option<SubscriptionId> {
        self.lock()
            .iter()
            .find(|(_, e)| e.kind == kind && &e.device_ids == device_ids)
            .map(|(id, _)| id.clone())
    }

    /// Kind registered under an id; `None` for unknown (late) events.
    pub fn kind_of(&self, id: &str) -> Option<SubscriptionKind> {
        self.lock().get(id).map(|e| e.kind)
    }

    /// Forget everything; called when the transport disconnects.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, SubscriptionEntry>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn add_and_route() {
        let registry = SubscriptionRegistry::default();
        registry
            .add(
                "sub-1".into(),
                SubscriptionEntry {
                    kind: SubscriptionKind::CommandInsert,
                    device_ids: devices(&["d1"]),
                },
            )
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(
            registry.kind_of("sub-1"),
            Some(SubscriptionKind::CommandInsert)
        );
        assert_eq!(registry.kind_of("sub-2"), None);
        assert_eq!(
            registry.find(SubscriptionKind::CommandInsert, &devices(&["d1"])),
            Some("sub-1".into())
        );
    }

    #[test]
    fn duplicate_device_set_is_rejected() {
        let registry = SubscriptionRegistry::default();
        let entry = SubscriptionEntry {
            kind: SubscriptionKind::Notification,
            device_ids: devices(&["d1", "d2"]),
        };
        registry
            .add("sub-1".into(), entry.clone())
            .unwrap_or_else(|_| unreachable!());

        let result = registry.add("sub-2".into(), entry);
        assert!(matches!(result, Err(Error::Subscription { .. })));

        // Same devices under a different kind is a distinct stream.
        let result = registry.add(
            "sub-3".into(),
            SubscriptionEntry {
                kind: SubscriptionKind::CommandUpdate,
                device_ids: devices(&["d1", "d2"]),
            },
        );
        assert!(result.is_ok());
    }

    #[test]
    fn remove_unknown_fails() {
        let registry = SubscriptionRegistry::default();
        let result = registry.remove("missing");
        assert!(matches!(result, Err(Error::Subscription { .. })));
    }

    #[test]
    fn clear_forgets_everything() {
        let registry = SubscriptionRegistry::default();
        registry
            .add(
                "sub-1".into(),
                SubscriptionEntry {
                    kind: SubscriptionKind::CommandInsert,
                    device_ids: devices(&["d1"]),
                },
            )
            .unwrap_or_else(|_| unreachable!());
        registry.clear();
        assert_eq!(registry.kind_of("sub-1"), None);
    }
}

use std::sync::Weak;

use crate::coordinator::{Inner, LeaseCoordinator};
use crate::error::Result;

/// Handle for a claim written to the store.
///
/// The coordinator that created the token owns the claim; a token handed to a
/// caller is a reference to it. Releasing a token that is no longer the
/// coordinator's current one does nothing.
#[derive(Debug, Clone)]
pub struct LeaseToken {
    key: String,
    owner: Weak<Inner>,
}

impl LeaseToken {
    pub(crate) fn new(key: String, owner: Weak<Inner>) -> Self {
        Self { key, owner }
    }

    /// Marker key, `<prefix><6 digits>`
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn owner(&self) -> Weak<Inner> {
        self.owner.clone()
    }

    /// Release the claim through the owning coordinator.
    ///
    /// Returns `false` if the claim was already gone.
    pub async fn release(&self) -> Result<bool> {
        match self.owner.upgrade() {
            Some(inner) => LeaseCoordinator::from_inner(inner).release_token(&self.key).await,
            None => Ok(false),
        }
    }
}

impl PartialEq for LeaseToken {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && Weak::ptr_eq(&self.owner, &other.owner)
    }
}

impl Eq for LeaseToken {}

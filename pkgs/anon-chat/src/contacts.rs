//! Contact registry for the current user
//!
//! Contacts are plain peer ids kept in insertion order. The set is loaded from
//! and written back to [`Storage`] under the current user's id, so switching
//! users never leaks one user's contacts into another's.

use std::sync::Arc;
use tracing::{debug, info};

use crate::storage::{self, Namespace, Storage};

pub struct ContactRegistry {
    user_id: String,
    contacts: Vec<String>,
    storage: Arc<dyn Storage>,
}

impl ContactRegistry {
    /// Load the registry for `user_id`
    pub fn load(storage: Arc<dyn Storage>, user_id: &str) -> Self {
        let mut registry = Self {
            user_id: String::new(),
            contacts: Vec::new(),
            storage,
        };
        registry.switch_user(user_id);
        registry
    }

    /// Drop the in-memory set and reload it for another user
    pub fn switch_user(&mut self, user_id: &str) {
        let stored: Vec<String> =
            storage::load_or_default(self.storage.as_ref(), Namespace::Contacts, user_id);

        let mut contacts: Vec<String> = Vec::with_capacity(stored.len());
        for contact in stored {
            if contact != user_id && !contact.is_empty() && !contacts.contains(&contact) {
                contacts.push(contact);
            }
        }

        debug!(user = %user_id, count = contacts.len(), "Loaded contacts");
        self.user_id = user_id.to_string();
        self.contacts = contacts;
    }

    /// Add a contact; returns `false` when it is the current user or already present
    pub fn add(&mut self, contact_id: &str) -> bool {
        if contact_id.is_empty() || contact_id == self.user_id || self.contains(contact_id) {
            return false;
        }

        self.contacts.push(contact_id.to_string());
        storage::save(
            self.storage.as_ref(),
            Namespace::Contacts,
            &self.user_id,
            &self.contacts,
        );
        info!(user = %self.user_id, contact = %contact_id, "Added contact");
        true
    }

    pub fn contains(&self, contact_id: &str) -> bool {
        self.contacts.iter().any(|c| c == contact_id)
    }

    pub fn list(&self) -> &[String] {
        &self.contacts
    }
}

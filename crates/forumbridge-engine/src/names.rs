//! Name Resolver.
//!
//! Display names come from the contact cache in the Identity Store. The
//! Network-A directory is only asked when the cache has no row for a user,
//! or when the operator runs `/synccontacts`.

use forumbridge_core::Environment;
use forumbridge_proto::{DirectoryEntry, Jid};

use crate::{
    context::Bridge,
    error::BridgeError,
    storage::{ContactName, Storage},
};

impl From<DirectoryEntry> for ContactName {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            first_name: entry.first_name,
            full_name: entry.full_name,
            push_name: entry.push_name,
            business_name: entry.business_name,
        }
    }
}

impl ContactName {
    /// Best available name: full, business, then push name.
    ///
    /// Returns `None` when every field is blank.
    pub fn best(&self) -> Option<&str> {
        [&self.full_name, &self.business_name, &self.push_name]
            .into_iter()
            .map(|name| name.trim())
            .find(|name| !name.is_empty())
    }

    /// Whether any name field contains `needle` (already lower-cased).
    pub fn matches(&self, needle: &str) -> bool {
        [&self.first_name, &self.full_name, &self.push_name, &self.business_name]
            .into_iter()
            .any(|name| name.to_lowercase().contains(needle))
    }
}

/// Title form of a user: `Name [ user ]`, or the bare user when unnamed.
pub fn titled(names: Option<&ContactName>, bare_user: &str) -> String {
    match names.and_then(ContactName::best) {
        Some(name) => format!("{name} [ {bare_user} ]"),
        None => bare_user.to_string(),
    }
}

impl<E: Environment, S: Storage> Bridge<E, S> {
    /// Cached names for `user`, asking the directory on a cache miss.
    ///
    /// Directory failures degrade to `None`; store failures propagate.
    pub async fn contact_names(&self, user: &Jid) -> Result<Option<ContactName>, BridgeError> {
        let user = user.to_non_device();
        let key = user.to_string();
        if let Some(names) = self.store.contact(&key)? {
            return Ok(Some(names));
        }

        match self.source.contact(&user).await {
            Ok(Some(entry)) => {
                let names = ContactName::from(entry);
                self.store.upsert_contact(&key, &names)?;
                Ok(Some(names))
            },
            Ok(None) => Ok(None),
            Err(err) => {
                tracing::warn!(a_user = %key, error = %err, "directory lookup failed");
                Ok(None)
            },
        }
    }

    /// Plain display name: the fallback ladder without the id suffix.
    ///
    /// `push_hint` is the push name carried by the event, cached when the
    /// store has none yet.
    pub async fn display_name(&self, user: &Jid, push_hint: &str) -> Result<String, BridgeError> {
        let mut names = self.contact_names(user).await?.unwrap_or_default();
        let push_hint = push_hint.trim();
        if names.push_name.is_empty() && !push_hint.is_empty() {
            names.push_name = push_hint.to_string();
            self.store.upsert_contact(&user.to_non_device().to_string(), &names)?;
        }
        Ok(names.best().map_or_else(|| user.user_part().to_string(), str::to_string))
    }

    /// Name of a user as used for topic titles and listings.
    pub async fn resolve_user(&self, user: &Jid) -> Result<String, BridgeError> {
        let names = self.contact_names(user).await?;
        Ok(titled(names.as_ref(), user.user_part()))
    }

    /// Group subject, empty when unknown.
    ///
    /// Subjects are cached in the contact table under the group's JID.
    pub async fn resolve_group(&self, group: &Jid) -> Result<String, BridgeError> {
        let group = group.to_non_device();
        if let Some(cached) = self.store.contact(&group.to_string())?
            && !cached.full_name.is_empty()
        {
            return Ok(cached.full_name);
        }
        self.refresh_group_name(&group).await
    }

    /// Fetch a group's subject from the directory and cache it.
    pub async fn refresh_group_name(&self, group: &Jid) -> Result<String, BridgeError> {
        let group = group.to_non_device();
        match self.source.group_info(&group).await {
            Ok(summary) => {
                if !summary.name.is_empty() {
                    self.cache_group_name(&group, &summary.name)?;
                }
                Ok(summary.name)
            },
            Err(err) => {
                tracing::warn!(a_chat = %group, error = %err, "group lookup failed");
                Ok(String::new())
            },
        }
    }

    /// Remember a group subject seen in an event.
    pub(crate) fn cache_group_name(&self, group: &Jid, name: &str) -> Result<(), BridgeError> {
        let names = ContactName { full_name: name.to_string(), ..ContactName::default() };
        self.store.upsert_contact(&group.to_non_device().to_string(), &names)?;
        Ok(())
    }

    /// Title for a conversation's topic.
    pub async fn conversation_title(&self, chat: &Jid) -> Result<String, BridgeError> {
        if chat.is_group() {
            let name = self.resolve_group(chat).await?;
            return Ok(if name.trim().is_empty() { chat.user_part().to_string() } else { name });
        }
        self.resolve_user(chat).await
    }

    /// Refresh the whole contact cache from the directory.
    ///
    /// Returns the number of contacts written.
    pub async fn sync_contacts(&self) -> Result<usize, BridgeError> {
        let contacts: Vec<(String, ContactName)> = self
            .source
            .all_contacts()
            .await?
            .into_iter()
            .map(|(jid, entry)| (jid.to_non_device().to_string(), ContactName::from(entry)))
            .collect();
        self.store.bulk_upsert_contacts(&contacts)?;
        tracing::info!(count = contacts.len(), "contacts synced");
        Ok(contacts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(full: &str, business: &str, push: &str) -> ContactName {
        ContactName {
            first_name: String::new(),
            full_name: full.into(),
            push_name: push.into(),
            business_name: business.into(),
        }
    }

    #[test]
    fn ladder_prefers_full_then_business_then_push() {
        assert_eq!(names("Alice Smith", "Acme", "ali").best(), Some("Alice Smith"));
        assert_eq!(names("", "Acme", "ali").best(), Some("Acme"));
        assert_eq!(names(" ", "", "ali").best(), Some("ali"));
        assert_eq!(names("", "", "").best(), None);
    }

    #[test]
    fn titled_keeps_identifier() {
        let alice = names("Alice", "", "");
        assert_eq!(titled(Some(&alice), "447700900123"), "Alice [ 447700900123 ]");
        assert_eq!(titled(None, "447700900123"), "447700900123");
        assert_eq!(titled(Some(&ContactName::default()), "447700900123"), "447700900123");
    }

    #[test]
    fn search_matches_any_field() {
        let contact = ContactName { first_name: "Bob".into(), ..names("", "", "bobby") };
        assert!(contact.matches("bob"));
        assert!(!contact.matches("alice"));
    }
}

//! In-memory roster arena with id and address indexes

use std::collections::HashMap;

use signhost_api::Host;
use uuid::Uuid;

/// Whether an upsert created a record or overwrote one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Result of applying an upsert to the arena
#[derive(Debug, Clone)]
pub(crate) struct UpsertPlan {
    pub host: Host,
    pub outcome: UpsertOutcome,
    pub evicted: Vec<Host>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Roster {
    hosts: Vec<Host>,
    by_id: HashMap<String, usize>,
    by_ip: HashMap<String, usize>,
}

pub(crate) fn new_host_id() -> String {
    Uuid::new_v4().to_string()
}

impl Roster {
    pub fn from_hosts(hosts: Vec<Host>) -> Self {
        let mut roster = Self {
            hosts,
            ..Self::default()
        };
        roster.reindex();
        roster
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_ip.clear();
        for (i, host) in self.hosts.iter().enumerate() {
            self.by_id.insert(host.id.clone(), i);
            if !host.ip_address.is_empty() {
                self.by_ip.insert(host.ip_address.clone(), i);
            }
        }
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn by_id(&self, id: &str) -> Option<&Host> {
        self.by_id.get(id).map(|&i| &self.hosts[i])
    }

    pub fn by_ip(&self, ip: &str) -> Option<&Host> {
        if ip.is_empty() {
            return None;
        }
        self.by_ip.get(ip).map(|&i| &self.hosts[i])
    }

    pub fn push(&mut self, host: Host) {
        self.hosts.push(host);
        self.reindex();
    }

    /// Overwrite the record sharing `host.id`
    pub fn replace(&mut self, host: Host) {
        if let Some(&i) = self.by_id.get(&host.id) {
            self.hosts[i] = host;
            self.reindex();
        }
    }

    pub fn remove_by_id(&mut self, id: &str) -> Option<Host> {
        let i = *self.by_id.get(id)?;
        let removed = self.hosts.remove(i);
        self.reindex();
        Some(removed)
    }

    /// Insert or overwrite a record
    ///
    /// The target is found by id, or by address when the incoming id is
    /// empty. Any other record holding the incoming address is a stale
    /// entry and is evicted. Incoming records without an id adopt the
    /// target's id or get a fresh one.
    pub fn upsert(&mut self, mut host: Host) -> UpsertPlan {
        if host.id.is_empty() {
            host.id = self
                .by_ip(&host.ip_address)
                .map_or_else(new_host_id, |existing| existing.id.clone());
        }

        let evicted: Vec<Host> = if host.ip_address.is_empty() {
            Vec::new()
        } else {
            self.hosts
                .iter()
                .filter(|h| h.ip_address == host.ip_address && h.id != host.id)
                .cloned()
                .collect()
        };
        if !evicted.is_empty() {
            self.hosts
                .retain(|h| !evicted.iter().any(|stale| stale.id == h.id));
            self.reindex();
        }

        let outcome = if self.by_id.contains_key(&host.id) {
            self.replace(host.clone());
            UpsertOutcome::Updated
        } else {
            self.push(host.clone());
            UpsertOutcome::Inserted
        };

        UpsertPlan {
            host,
            outcome,
            evicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(id: &str, ip: &str) -> Host {
        Host {
            id: id.to_string(),
            ip_address: ip.to_string(),
            ..Host::default()
        }
    }

    #[test]
    fn test_upsert_inserts_and_overwrites_by_id() {
        let mut roster = Roster::default();
        assert_eq!(roster.upsert(host("a", "10.0.0.1")).outcome, UpsertOutcome::Inserted);

        let mut moved = host("a", "10.0.0.7");
        moved.nickname = "moved".to_string();
        let plan = roster.upsert(moved);

        assert_eq!(plan.outcome, UpsertOutcome::Updated);
        assert_eq!(roster.len(), 1);
        assert!(roster.by_ip("10.0.0.1").is_none());
        assert_eq!(roster.by_ip("10.0.0.7").unwrap().nickname, "moved");
    }

    #[test]
    fn test_upsert_without_id_matches_by_address() {
        let mut roster = Roster::from_hosts(vec![host("a", "10.0.0.1")]);
        let plan = roster.upsert(host("", "10.0.0.1"));

        assert_eq!(plan.outcome, UpsertOutcome::Updated);
        assert_eq!(plan.host.id, "a");
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_upsert_evicts_stale_entry_at_address() {
        let mut roster = Roster::from_hosts(vec![host("x", "10.0.0.1"), host("b", "10.0.0.2")]);
        let plan = roster.upsert(host("y", "10.0.0.1"));

        assert_eq!(plan.evicted.len(), 1);
        assert_eq!(plan.evicted[0].id, "x");
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.by_ip("10.0.0.1").unwrap().id, "y");
        assert!(roster.by_id("x").is_none());
    }

    #[test]
    fn test_upsert_assigns_fresh_id() {
        let mut roster = Roster::default();
        let plan = roster.upsert(host("", "10.0.0.3"));
        assert!(!plan.host.id.is_empty());
        assert!(roster.by_id(&plan.host.id).is_some());
    }

    #[test]
    fn test_remove_reindexes() {
        let mut roster = Roster::from_hosts(vec![host("a", "10.0.0.1"), host("b", "10.0.0.2")]);
        assert_eq!(roster.remove_by_id("a").unwrap().id, "a");
        assert_eq!(roster.by_ip("10.0.0.2").unwrap().id, "b");
        assert!(roster.remove_by_id("a").is_none());
    }
}

//! Stable identities for all dynamically started actors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role an actor plays in the simulation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActorKind {
    Node,
    Backend,
    Distributor,
    Client,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Node => "node",
            ActorKind::Backend => "backend",
            ActorKind::Distributor => "distributor",
            ActorKind::Client => "client",
        }
    }
}

impl fmt::Display for ActorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independently running process the orchestrator provisions and talks to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub kind: ActorKind,
    pub name: String,
    pub endpoint: String,
    pub ready: bool,
}

/// Assigns and resolves stable identities for all actors started during a run.
///
/// Names are `{kind}-{index}` where index is the count of that kind already
/// registered. Indices are monotonic and never reused, so names are unique and
/// stable for the lifetime of the run.
#[derive(Default, Debug)]
pub struct Registry {
    actors: Vec<Actor>,
}

impl Registry {
    /// Registers a new actor of `kind` reachable at `endpoint` and returns
    /// its assigned identity.
    pub fn register(&mut self, kind: ActorKind, endpoint: impl Into<String>) -> Actor {
        let index = self.actors.iter().filter(|a| a.kind == kind).count();
        let actor = Actor {
            kind,
            name: format!("{kind}-{index}"),
            endpoint: endpoint.into(),
            ready: false,
        };
        self.actors.push(actor.clone());
        actor
    }

    pub fn lookup(&self, name: &str) -> Option<&Actor> {
        self.actors.iter().find(|a| a.name == name)
    }

    /// Marks the named actor as having passed its readiness check.
    pub fn mark_ready(&mut self, name: &str) {
        if let Some(actor) = self.actors.iter_mut().find(|a| a.name == name) {
            actor.ready = true;
        }
    }

    /// All actors of `kind`, in registration order. Fan-out operations iterate
    /// this sequence so their ordering is deterministic.
    pub fn all_of(&self, kind: ActorKind) -> impl Iterator<Item = &Actor> + '_ {
        self.actors.iter().filter(move |a| a.kind == kind)
    }

    /// All actors in registration order.
    pub fn all(&self) -> &[Actor] {
        &self.actors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_monotonic_per_kind() {
        let mut registry = Registry::default();
        assert_eq!(registry.register(ActorKind::Node, "a").name, "node-0");
        assert_eq!(registry.register(ActorKind::Client, "b").name, "client-0");
        assert_eq!(registry.register(ActorKind::Client, "c").name, "client-1");
        assert_eq!(registry.register(ActorKind::Backend, "d").name, "backend-0");
        assert_eq!(registry.register(ActorKind::Client, "e").name, "client-2");
    }

    #[test]
    fn lookup_and_readiness() {
        let mut registry = Registry::default();
        registry.register(ActorKind::Distributor, "127.0.0.1:37128");
        assert!(!registry.lookup("distributor-0").unwrap().ready);
        registry.mark_ready("distributor-0");
        assert!(registry.lookup("distributor-0").unwrap().ready);
        assert!(registry.lookup("distributor-1").is_none());
    }

    #[test]
    fn all_of_preserves_registration_order() {
        let mut registry = Registry::default();
        for i in 0..5 {
            registry.register(ActorKind::Client, format!("127.0.0.1:{}", 37129 + i));
        }
        registry.register(ActorKind::Node, "127.0.0.1:18443");
        let names: Vec<_> = registry
            .all_of(ActorKind::Client)
            .map(|a| a.name.clone())
            .collect();
        assert_eq!(
            names,
            vec!["client-0", "client-1", "client-2", "client-3", "client-4"]
        );
    }
}

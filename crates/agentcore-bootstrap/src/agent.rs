// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! [`AgentBuilder`] — single entry point for constructing a fully wired
//! [`Agent`](agentcore_core::Agent) from configuration.
//!
//! The builder owns the pieces an `Agent` is assembled from — the event bus,
//! the durable store, the permission gate, and the tool registry — so that a
//! frontend only has to supply a [`Config`] and a model provider.

use std::path::Path;
use std::sync::Arc;

use agentcore_bus::EventBus;
use agentcore_config::Config;
use agentcore_core::Agent;
use agentcore_model::ModelProvider;
use agentcore_permission::PermissionGate;
use agentcore_store::Store;
use anyhow::Result;

use crate::registry::build_tool_registry;

/// Constructs a fully wired primary [`Agent`] from configuration.
pub struct AgentBuilder {
    config: Config,
}

impl AgentBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Open (or create) the SQLite-backed store at the configured database
    /// path and wire a fresh [`EventBus`] and [`PermissionGate`] around it.
    pub fn build_with_store_path(
        self,
        db_path: impl AsRef<Path>,
        model: Arc<dyn ModelProvider>,
    ) -> Result<(Agent, Store, Arc<PermissionGate>, Arc<EventBus>)> {
        let bus = Arc::new(EventBus::new());
        let store = Store::open(db_path, bus.clone())?;
        Ok(self.build_with_store(store, bus, model))
    }

    /// Build against an in-memory store, primarily for tests and the `mock`
    /// provider.
    pub fn build_in_memory(
        self,
        model: Arc<dyn ModelProvider>,
    ) -> Result<(Agent, Store, Arc<PermissionGate>, Arc<EventBus>)> {
        let bus = Arc::new(EventBus::new());
        let store = Store::open_in_memory(bus.clone())?;
        Ok(self.build_with_store(store, bus, model))
    }

    fn build_with_store(
        self,
        store: Store,
        bus: Arc<EventBus>,
        model: Arc<dyn ModelProvider>,
    ) -> (Agent, Store, Arc<PermissionGate>, Arc<EventBus>) {
        let gate = Arc::new(PermissionGate::new(store.clone(), bus.clone()));
        let policy = Arc::new(agentcore_tools::ToolPolicy::from_config(&self.config.tools));
        let registry = build_tool_registry(&self.config, store.clone(), gate.clone(), model.clone());

        let agent = Agent::new(
            store.clone(),
            gate.clone(),
            Arc::new(registry),
            policy,
            model,
            self.config.agents.primary.clone(),
        );
        (agent, store, gate, bus)
    }

    /// Attach a (typically cheaper) model to run the title side-task.
    pub fn with_title_model(agent: Agent, title_model: Arc<dyn ModelProvider>) -> Agent {
        agent.with_title_task(title_model)
    }
}

//! In-memory [`FragmentStore`] implementation.
//!
//! Fragments live in a `HashMap` of `Arc<Fragment>` behind a
//! `parking_lot::RwLock`. Scans clone the matching `Arc`s under a short
//! read lock and iterate after it is released, so readers never block on
//! each other and never hold a lock while the caller awaits.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::models::{Fragment, FragmentFilter};

use super::{check_dimension, FragmentScan, FragmentStore, GenerationInfo};

struct LiveState {
    number: u64,
    revision: u64,
    dimension: Option<usize>,
    last_rebuild_at: Option<DateTime<Utc>>,
    next_sequence: u64,
    fragments: HashMap<String, Arc<Fragment>>,
}

impl LiveState {
    fn info(&self) -> GenerationInfo {
        GenerationInfo {
            number: self.number,
            revision: self.revision,
            dimension: self.dimension,
            last_rebuild_at: self.last_rebuild_at,
        }
    }

    fn counts_by<F>(&self, key: F) -> BTreeMap<String, usize>
    where
        F: Fn(&Fragment) -> &str,
    {
        let mut counts = BTreeMap::new();
        for f in self.fragments.values() {
            *counts.entry(key(f).to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// In-memory fragment store for tests, demos and embedded use.
pub struct InMemoryStore {
    live: RwLock<LiveState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            live: RwLock::new(LiveState {
                number: 1,
                revision: 0,
                dimension: None,
                last_rebuild_at: None,
                next_sequence: 1,
                fragments: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FragmentStore for InMemoryStore {
    async fn insert_batch(&self, fragments: Vec<Fragment>) -> Result<Vec<Fragment>> {
        if fragments.is_empty() {
            return Ok(fragments);
        }

        let mut live = self.live.write();
        live.dimension = check_dimension(live.dimension, &fragments)?;

        let mut stored = Vec::with_capacity(fragments.len());
        for mut f in fragments {
            f.sequence = live.next_sequence;
            live.next_sequence += 1;
            live.fragments.insert(f.id.clone(), Arc::new(f.clone()));
            stored.push(f);
        }
        live.revision += 1;
        Ok(stored)
    }

    async fn scan(&self, filter: &FragmentFilter) -> Result<FragmentScan> {
        let snapshot: Vec<Arc<Fragment>> = {
            let live = self.live.read();
            live.fragments
                .values()
                .filter(|f| filter.matches(f))
                .cloned()
                .collect()
        };
        Ok(FragmentScan::from_fragments(snapshot))
    }

    async fn get(&self, id: &str) -> Result<Option<Arc<Fragment>>> {
        Ok(self.live.read().fragments.get(id).cloned())
    }

    async fn delete_by_document(&self, source_document: &str, project_id: &str) -> Result<bool> {
        let mut live = self.live.write();
        let before = live.fragments.len();
        live.fragments
            .retain(|_, f| !(f.source_document == source_document && f.project_id == project_id));
        let removed = live.fragments.len() != before;
        if removed {
            live.revision += 1;
        }
        Ok(removed)
    }

    async fn replace_document(
        &self,
        source_document: &str,
        project_id: &str,
        fragments: Vec<Fragment>,
    ) -> Result<Vec<Fragment>> {
        let mut live = self.live.write();
        let dimension = check_dimension(live.dimension, &fragments)?;

        live.fragments
            .retain(|_, f| !(f.source_document == source_document && f.project_id == project_id));
        let mut stored = Vec::with_capacity(fragments.len());
        for mut f in fragments {
            f.sequence = live.next_sequence;
            live.next_sequence += 1;
            live.fragments.insert(f.id.clone(), Arc::new(f.clone()));
            stored.push(f);
        }
        live.dimension = dimension;
        live.revision += 1;
        Ok(stored)
    }

    async fn update_snippets(&self, id: &str, snippets: Vec<String>) -> Result<bool> {
        let mut live = self.live.write();
        let updated = match live.fragments.get(id) {
            Some(existing) => {
                let mut f = Fragment::clone(existing);
                f.notable_snippets = snippets;
                f.updated_at = Utc::now();
                Arc::new(f)
            }
            None => return Ok(false),
        };
        live.fragments.insert(id.to_string(), updated);
        live.revision += 1;
        Ok(true)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.live.read().fragments.len())
    }

    async fn count_by_module(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self.live.read().counts_by(|f| &f.module_tag))
    }

    async fn count_by_project(&self) -> Result<BTreeMap<String, usize>> {
        Ok(self.live.read().counts_by(|f| &f.project_id))
    }

    async fn generation(&self) -> Result<GenerationInfo> {
        Ok(self.live.read().info())
    }

    async fn publish_generation(
        &self,
        based_on: &GenerationInfo,
        fragments: Vec<Fragment>,
    ) -> Result<bool> {
        let dimension = check_dimension(None, &fragments)?;

        let mut live = self.live.write();
        if live.number != based_on.number || live.revision != based_on.revision {
            return Ok(false);
        }

        let mut next = HashMap::with_capacity(fragments.len());
        for f in fragments {
            live.next_sequence = live.next_sequence.max(f.sequence + 1);
            next.insert(f.id.clone(), Arc::new(f));
        }

        live.fragments = next;
        live.number += 1;
        live.revision += 1;
        live.dimension = dimension;
        live.last_rebuild_at = Some(Utc::now());
        Ok(true)
    }
}

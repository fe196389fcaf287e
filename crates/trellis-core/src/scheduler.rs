//! Invalidation pass: re-renders dirty components in place.

use crate::collections::new_set;
use crate::engine::Engine;
use crate::host::{HostDocument, RenderError};

impl<D: HostDocument> Engine<D> {
    /// Re-renders every invalidated component, deepest and latest first,
    /// then applies the resulting host mutations.
    pub(crate) fn run_invalidation_queue(&mut self) -> Result<(), RenderError> {
        let mut queue = self.runtime.take_invalidations();
        log::debug!("processing {} invalidations", queue.len());
        queue.sort_by(|a, b| a.depth.cmp(&b.depth).then(a.order.cmp(&b.order)));

        let mut rendered = new_set();
        while let Some(invalidation) = queue.pop() {
            let Some(&wrapper) = self.live.get(&invalidation.id) else {
                continue;
            };
            if !self.tree.contains(wrapper)
                || !self.store.is_live(invalidation.id)
                || !rendered.insert(invalidation.id)
            {
                continue;
            }
            // Siblings may have moved since the last pass, so children locate
            // their insertion anchor instead of appending.
            self.tree[wrapper].has_previous_siblings = None;
            if let Some(item) = self.update_component(wrapper, wrapper).item {
                self.process_queue.push(item);
                if !self.deferred_process.is_empty() {
                    let deferred = std::mem::take(&mut self.deferred_process);
                    self.process_queue.extend(deferred);
                }
            }
            self.run_process_queue();
        }

        self.cleanup_merged_nodes()?;
        self.run_application_queue()?;
        self.remove_completed_exits()?;
        self.run_callbacks()
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;

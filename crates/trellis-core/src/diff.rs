//! Incremental sibling-list diff driving the process queue.

use std::rc::Rc;

use crate::engine::{
    Application, Diagnostic, Engine, IdleTask, ProcessResult, Signature, Work,
};
use crate::host::HostDocument;
use crate::wrapper::{MergeNodes, WrapperId, WrapperKind};

type Instruction = (Option<WrapperId>, Option<WrapperId>);

impl<D: HostDocument> Engine<D> {
    /// Drains the process queue, last in first out.
    pub(crate) fn run_process_queue(&mut self) {
        while let Some(work) = self.process_queue.pop() {
            match work {
                Work::Diff {
                    current,
                    next,
                    merge_nodes,
                    old_index,
                    new_index,
                } => self.process(current, next, merge_nodes, old_index, new_index),
                Work::Attach { id, attached } => {
                    self.application_queue
                        .push(Application::Attach { id, attached });
                }
                Work::Detach { wrapper, record } => {
                    self.application_queue
                        .push(Application::Detach { wrapper, record });
                }
            }
        }
    }

    /// One step of the two-cursor diff. Emits at most one match, insertion
    /// or removal (two for a reorder) and requeues the remainder.
    fn process(
        &mut self,
        current: Rc<[WrapperId]>,
        next: Rc<[WrapperId]>,
        merge_nodes: Option<MergeNodes>,
        start_old: usize,
        start_new: usize,
    ) {
        let (mut old_index, mut new_index) = (start_old, start_new);
        let has_previous_siblings =
            current.len() > 1 || (!current.is_empty() && current.len() < next.len());
        let mut instructions: Vec<Instruction> = Vec::new();

        if new_index < next.len() {
            let current_wrapper = current.get(old_index).copied();
            let next_wrapper = next[new_index];
            self.tree[next_wrapper].has_previous_siblings = Some(has_previous_siblings);
            self.process_merge_nodes(next_wrapper, merge_nodes.as_ref());

            match current_wrapper {
                Some(cw) if self.same(cw, next_wrapper) => {
                    old_index += 1;
                    new_index += 1;
                    self.inherit_inserted(cw, next_wrapper);
                    instructions.push((Some(cw), Some(next_wrapper)));
                }
                Some(cw) if self.find_index(&current, next_wrapper, old_index + 1).is_some() => {
                    if self.find_index(&next, cw, new_index + 1).is_none() {
                        self.check_siblings_later(&current, old_index);
                        instructions.push((Some(cw), None));
                        old_index += 1;
                    } else {
                        self.check_siblings_later(&current, old_index);
                        self.check_siblings_later(&next, new_index);
                        instructions.push((Some(cw), None));
                        instructions.push((None, Some(next_wrapper)));
                        old_index += 1;
                        new_index += 1;
                    }
                }
                _ => {
                    if !current.is_empty() {
                        self.check_siblings_later(&next, new_index);
                    }
                    instructions.push((None, Some(next_wrapper)));
                    new_index += 1;
                }
            }
        }

        let requeued = new_index < next.len();
        if requeued {
            self.process_queue.push(Work::Diff {
                current: current.clone(),
                next: next.clone(),
                merge_nodes: merge_nodes.clone(),
                old_index,
                new_index,
            });
        }

        if current.len() > old_index && new_index >= next.len() {
            for index in old_index..current.len() {
                self.check_siblings_later(&current, index);
                instructions.push((Some(current[index]), None));
            }
        }

        for (current_wrapper, next_wrapper) in instructions {
            match self.process_one(current_wrapper, next_wrapper) {
                Some(result) => self.queue_result(result),
                None => {
                    let waiting_merge = self.options.merge
                        && merge_nodes
                            .as_ref()
                            .map(|nodes| !nodes.borrow().is_empty())
                            .unwrap_or(false);
                    if !waiting_merge {
                        continue;
                    }
                    if requeued {
                        self.process_queue.pop();
                    }
                    self.process_queue.push(Work::Diff {
                        current,
                        next,
                        merge_nodes,
                        old_index: start_old,
                        new_index: start_new,
                    });
                    log::debug!(
                        "deferring {} queued jobs until an unresolved component can merge",
                        self.process_queue.len()
                    );
                    self.deferred_process = std::mem::take(&mut self.process_queue);
                    return;
                }
            }
        }
    }

    fn queue_result(&mut self, result: ProcessResult) {
        let ProcessResult {
            item,
            side,
            application,
        } = result;
        if let Some(side) = side {
            self.process_queue.push(side);
        }
        if let Some(item) = item {
            self.process_queue.push(item);
        }
        if let Some(application) = application {
            self.application_queue.push(application);
        }
    }

    /// `None` means a component reference could not be resolved.
    fn process_one(
        &mut self,
        current: Option<WrapperId>,
        next: Option<WrapperId>,
    ) -> Option<ProcessResult> {
        match (current, next) {
            (Some(c), Some(n)) if c == n => Some(ProcessResult::default()),
            (None, Some(n)) => {
                if self.tree[n].is_element() {
                    Some(self.create_element(n))
                } else {
                    self.create_component(n)
                }
            }
            (Some(c), Some(n)) => {
                let both_elements = self.tree[c].is_element() && self.tree[n].is_element();
                let both_components = self.tree[c].is_component() && self.tree[n].is_component();
                if both_elements {
                    Some(self.update_element(c, n))
                } else if both_components {
                    Some(self.update_component(c, n))
                } else {
                    Some(ProcessResult::default())
                }
            }
            (Some(c), None) => {
                if self.tree[c].is_element() {
                    Some(self.remove_element(c))
                } else {
                    Some(self.remove_component(c))
                }
            }
            (None, None) => Some(ProcessResult::default()),
        }
    }

    fn inherit_inserted(&mut self, current: WrapperId, next: WrapperId) {
        let was_inserted = matches!(
            self.tree[current].kind,
            WrapperKind::Element { inserted: true, .. }
        );
        if let WrapperKind::Element { inserted, .. } = &mut self.tree[next].kind {
            *inserted = was_inserted;
        }
    }

    /// Adopts the first unconsumed pre-existing host node whose tag matches
    /// an element, or hands the candidates down to a component.
    fn process_merge_nodes(&mut self, next: WrapperId, merge_nodes: Option<&MergeNodes>) {
        if !self.options.merge {
            return;
        }
        let Some(merge_nodes) = merge_nodes else {
            return;
        };
        if merge_nodes.borrow().is_empty() {
            return;
        }
        if let Some(element) = self.tree[next].element().cloned() {
            let found = merge_nodes.borrow().iter().position(|&host| {
                self.document
                    .tag_name(host)
                    .map(|tag| tag.eq_ignore_ascii_case(&element.tag))
                    .unwrap_or(false)
            });
            if let Some(position) = found {
                let host = merge_nodes.borrow_mut().remove(position);
                self.all_merged.retain(|&merged| merged != host);
                self.tree[next].host = Some(host);
            }
        } else if let WrapperKind::Component {
            merge_nodes: slot, ..
        } = &mut self.tree[next].kind
        {
            *slot = Some(merge_nodes.clone());
        }
    }

    /// Whether two wrappers describe the same entity.
    pub(crate) fn same(&self, a: WrapperId, b: WrapperId) -> bool {
        let (wa, wb) = (&self.tree[a], &self.tree[b]);
        match (wa.element(), wb.element()) {
            (Some(ea), Some(eb)) => {
                if let (Some(ha), Some(hb)) = (ea.host_node, eb.host_node) {
                    if ha != hb {
                        return false;
                    }
                }
                ea.tag == eb.tag && ea.key == eb.key
            }
            (None, None) => match (wa.constructor(), wb.constructor()) {
                (Some(ca), Some(cb)) => {
                    ca.ptr_eq(&cb) && wa.node.key() == wb.node.key()
                }
                _ => false,
            },
            _ => false,
        }
    }

    fn find_index(&self, list: &[WrapperId], target: WrapperId, start: usize) -> Option<usize> {
        (start..list.len()).find(|&index| self.same(list[index], target))
    }

    fn signature(&self, wrapper: WrapperId) -> Signature {
        let w = &self.tree[wrapper];
        match w.element() {
            Some(element) if element.is_text() => Signature::Text,
            Some(element) => Signature::Element {
                tag: element.tag.clone(),
                key: element.key.clone(),
                host_node: element.host_node,
            },
            None => Signature::Component {
                constructor: w.constructor().map(|c| c.identity()),
                key: w.node.key().cloned(),
                label: w
                    .component_node()
                    .map(|c| c.constructor.label().to_string())
                    .unwrap_or_default(),
            },
        }
    }

    /// Queues an idle-time check that the sibling at `index` can be told
    /// apart from the others. Debug builds only.
    fn check_siblings_later(&mut self, list: &[WrapperId], index: usize) {
        if !cfg!(debug_assertions) {
            return;
        }
        let Some(&wrapper) = list.get(index) else {
            return;
        };
        if self.tree[wrapper].node.key().is_some() {
            return;
        }
        let siblings: Vec<Signature> = list.iter().map(|&w| self.signature(w)).collect();
        if matches!(siblings[index], Signature::Text) {
            return;
        }
        let owner = self
            .tree
            .parent_component(wrapper)
            .and_then(|parent| self.tree[parent].constructor())
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        self.idle_tasks.push(IdleTask::CheckDistinguishable {
            siblings,
            index,
            owner,
        });
    }

    pub(crate) fn check_distinguishable(&mut self, siblings: &[Signature], index: usize, owner: String) {
        let Some(target) = siblings.get(index) else {
            return;
        };
        let node = match target {
            Signature::Text => return,
            Signature::Element { key: Some(_), .. } | Signature::Component { key: Some(_), .. } => {
                return
            }
            Signature::Element { tag, .. } => tag.to_string(),
            Signature::Component { label, .. } => label.clone(),
        };
        let ambiguous = siblings
            .iter()
            .enumerate()
            .any(|(i, other)| i != index && same_signature(target, other));
        if ambiguous {
            let diagnostic = Diagnostic { owner, node };
            log::warn!("{diagnostic}");
            self.diagnostics.push(diagnostic);
        }
    }
}

fn same_signature(a: &Signature, b: &Signature) -> bool {
    match (a, b) {
        (
            Signature::Element {
                tag: ta,
                key: ka,
                host_node: ha,
            },
            Signature::Element {
                tag: tb,
                key: kb,
                host_node: hb,
            },
        ) => {
            if let (Some(ha), Some(hb)) = (ha, hb) {
                if ha != hb {
                    return false;
                }
            }
            ta == tb && ka == kb
        }
        (
            Signature::Component {
                constructor: Some(ca),
                key: ka,
                ..
            },
            Signature::Component {
                constructor: Some(cb),
                key: kb,
                ..
            },
        ) => ca == cb && ka == kb,
        _ => false,
    }
}

#[cfg(test)]
#[path = "tests/diff_tests.rs"]
mod tests;

//! Label-to-constructor resolution used by component nodes that name their
//! constructor indirectly.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::collections::{map::HashMap, new_map};
use crate::component::Constructor;

/// Entry stored under a registry label.
#[derive(Clone)]
pub enum RegistryItem {
    Ready(Constructor),
    /// Loader invoked on first lookup. `None` leaves the entry pending until
    /// it is completed explicitly.
    Lazy(Rc<dyn Fn() -> Option<Constructor>>),
}

impl RegistryItem {
    pub fn lazy(loader: impl Fn() -> Option<Constructor> + 'static) -> Self {
        RegistryItem::Lazy(Rc::new(loader))
    }
}

/// Releases a registry listener when dropped.
pub struct RegistrySubscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl RegistrySubscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn inactive() -> Self {
        Self { cancel: None }
    }
}

impl Drop for RegistrySubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

pub trait Registry {
    fn has(&self, label: &str) -> bool;
    fn define(&self, label: &str, item: RegistryItem);
    fn get(&self, label: &str) -> Option<Constructor>;
    /// Registers `listener` to run whenever a label becomes resolvable.
    fn subscribe(&self, listener: Rc<dyn Fn()>) -> RegistrySubscription;
}

enum Entry {
    Ready(Constructor),
    Pending(Option<Rc<dyn Fn() -> Option<Constructor>>>),
}

#[derive(Default)]
struct MapRegistryInner {
    entries: RefCell<HashMap<String, Entry>>,
    listeners: RefCell<Vec<(u64, Rc<dyn Fn()>)>>,
    next_listener: Cell<u64>,
}

impl MapRegistryInner {
    fn notify(&self) {
        let listeners: Vec<Rc<dyn Fn()>> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

/// In-memory registry backed by a hash map.
#[derive(Clone, Default)]
pub struct MapRegistry {
    inner: Rc<MapRegistryInner>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MapRegistryInner {
                entries: RefCell::new(new_map()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(1),
            }),
        }
    }

    /// Resolves a pending label and notifies subscribers.
    pub fn complete(&self, label: &str, constructor: Constructor) {
        self.inner
            .entries
            .borrow_mut()
            .insert(label.to_string(), Entry::Ready(constructor));
        log::debug!("registry label {label} resolved");
        self.inner.notify();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }
}

impl Registry for MapRegistry {
    fn has(&self, label: &str) -> bool {
        self.inner.entries.borrow().contains_key(label)
    }

    fn define(&self, label: &str, item: RegistryItem) {
        let entry = match item {
            RegistryItem::Ready(constructor) => Entry::Ready(constructor),
            RegistryItem::Lazy(loader) => Entry::Pending(Some(loader)),
        };
        let ready = matches!(entry, Entry::Ready(_));
        self.inner
            .entries
            .borrow_mut()
            .insert(label.to_string(), entry);
        if ready {
            self.inner.notify();
        }
    }

    fn get(&self, label: &str) -> Option<Constructor> {
        let loader = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get_mut(label)? {
                Entry::Ready(constructor) => return Some(constructor.clone()),
                Entry::Pending(loader) => loader.take()?,
            }
        };
        let constructor = loader()?;
        self.inner
            .entries
            .borrow_mut()
            .insert(label.to_string(), Entry::Ready(constructor.clone()));
        Some(constructor)
    }

    fn subscribe(&self, listener: Rc<dyn Fn()>) -> RegistrySubscription {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        let weak: Weak<MapRegistryInner> = Rc::downgrade(&self.inner);
        RegistrySubscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().retain(|(l, _)| *l != id);
            }
        })
    }
}

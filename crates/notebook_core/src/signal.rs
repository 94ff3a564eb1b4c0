//! Owner-scoped synchronous signals.
//!
//! # Responsibility
//! - Declare typed notification channels once per owner type.
//! - Keep every connection in one owner-keyed table so a model can drop all
//!   of its subscriptions in one call during disposal.
//!
//! # Invariants
//! - A channel is identified by `(owner id, channel name, payload type)`.
//! - Emission delivers to the handlers connected when it starts, in
//!   connection order. Handlers disconnected mid-emission are skipped.
//! - A `(handler, context)` pair is connected at most once per channel.
//! - A panicking handler never prevents the remaining handlers from running.
//! - The table is thread-local; models are single-threaded by construction.

use crate::logging::summarize_panic_payload;
use log::error;
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use uuid::Uuid;

/// Stable identity of every observable model instance.
pub type ObjectId = Uuid;

/// Generates a fresh object identity.
pub fn new_object_id() -> ObjectId {
    Uuid::new_v4()
}

/// Implemented by every type that can emit signals or own property values.
pub trait Identified {
    fn object_id(&self) -> ObjectId;
}

/// Shared handler callback. Identity is the `Rc` allocation.
pub type Handler<S, A> = Rc<dyn Fn(&S, &A)>;

/// Wraps a closure into a [`Handler`].
pub fn handler<S, A, F>(callback: F) -> Handler<S, A>
where
    F: Fn(&S, &A) + 'static,
{
    Rc::new(callback)
}

/// Typed channel declaration, shared by all instances of the owner type.
pub struct Signal<S, A> {
    name: &'static str,
    _marker: PhantomData<fn(&S, &A)>,
}

impl<S, A> Clone for Signal<S, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, A> Copy for Signal<S, A> {}

impl<S, A> Debug for Signal<S, A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("name", &self.name).finish()
    }
}

impl<S, A> Signal<S, A> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<S, A> Signal<S, A>
where
    S: Identified + 'static,
    A: 'static,
{
    /// Connects `handler` for future emissions from `sender`.
    ///
    /// Returns `false` when the same `(handler, context)` pair is already
    /// connected on this channel.
    pub fn connect(&self, sender: &S, handler: Handler<S, A>, context: Option<ObjectId>) -> bool {
        let key = self.key(sender.object_id());
        with_table(|table| {
            let entry = table
                .entry(key)
                .or_insert_with(|| Box::new(Vec::<Slot<S, A>>::new()));
            let Some(slots) = entry.as_any_mut().downcast_mut::<Vec<Slot<S, A>>>() else {
                return false;
            };
            if slots
                .iter()
                .any(|slot| slot.context == context && same_handler(&slot.handler, &handler))
            {
                return false;
            }
            slots.push(Slot {
                handler,
                context,
                live: Rc::new(Cell::new(true)),
            });
            true
        })
        .unwrap_or(false)
    }

    /// Disconnects `handler` from this channel on `sender`.
    ///
    /// With `Some(context)` only that registration is removed; with `None`
    /// every registration of `handler` is removed. Returns whether anything
    /// was disconnected.
    pub fn disconnect(
        &self,
        sender: &S,
        handler: &Handler<S, A>,
        context: Option<ObjectId>,
    ) -> bool {
        let key = self.key(sender.object_id());
        let removed = with_table(|table| {
            let Some(entry) = table.get_mut(&key) else {
                return Vec::new();
            };
            let Some(slots) = entry.as_any_mut().downcast_mut::<Vec<Slot<S, A>>>() else {
                return Vec::new();
            };
            let (removed, kept): (Vec<_>, Vec<_>) = slots.drain(..).partition(|slot| {
                same_handler(&slot.handler, handler)
                    && context.map_or(true, |context| slot.context == Some(context))
            });
            *slots = kept;
            if slots.is_empty() {
                table.remove(&key);
            }
            removed
        })
        .unwrap_or_default();

        for slot in &removed {
            slot.live.set(false);
        }
        !removed.is_empty()
    }

    /// Removes every registration of this channel on `sender`.
    pub fn disconnect_all(&self, sender: &S) {
        let key = self.key(sender.object_id());
        let removed = with_table(|table| table.remove(&key)).flatten();
        if let Some(mut slots) = removed {
            slots.close();
        }
    }

    /// Number of live registrations of this channel on `sender`.
    pub fn connection_count(&self, sender: &S) -> usize {
        let key = self.key(sender.object_id());
        with_table(|table| table.get(&key).map_or(0, |slots| slots.len())).unwrap_or(0)
    }

    /// Invokes every connected handler with `(sender, args)`.
    ///
    /// Runs synchronously; nested emissions triggered by handlers complete
    /// before this call returns.
    pub fn emit(&self, sender: &S, args: &A) {
        let key = self.key(sender.object_id());
        let snapshot = with_table(|table| {
            table
                .get(&key)
                .and_then(|slots| slots.as_any().downcast_ref::<Vec<Slot<S, A>>>())
                .cloned()
                .unwrap_or_default()
        })
        .unwrap_or_default();

        for slot in snapshot {
            if !slot.live.get() {
                continue;
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| (slot.handler)(sender, args)));
            if let Err(payload) = outcome {
                error!(
                    "event=signal_handler_panicked module=signal status=error channel={} owner={} payload={}",
                    self.name,
                    key.owner,
                    summarize_panic_payload(&*payload)
                );
            }
        }
    }

    fn key(&self, owner: ObjectId) -> ChannelKey {
        ChannelKey {
            owner,
            name: self.name,
            payload: TypeId::of::<(S, A)>(),
        }
    }
}

/// Removes every registration on every channel of `owner`.
pub fn clear_signal_data(owner: ObjectId) {
    let removed = with_table(|table| {
        let keys: Vec<ChannelKey> = table
            .keys()
            .filter(|key| key.owner == owner)
            .copied()
            .collect();
        keys.into_iter()
            .filter_map(|key| table.remove(&key))
            .collect::<Vec<_>>()
    })
    .unwrap_or_default();

    for mut slots in removed {
        slots.close();
    }
}

/// Removes every registration made with `context` on any owner.
pub fn disconnect_receiver(context: ObjectId) -> usize {
    let removed = with_table(|table| {
        let mut removed = Vec::new();
        for slots in table.values_mut() {
            removed.push(slots.take_context(context));
        }
        table.retain(|_, slots| slots.len() > 0);
        removed
    })
    .unwrap_or_default();

    removed.iter().map(|slots| slots.len()).sum()
}

/// Total live registrations across all channels of `owner`.
pub fn owner_connection_count(owner: ObjectId) -> usize {
    with_table(|table| {
        table
            .iter()
            .filter(|(key, _)| key.owner == owner)
            .map(|(_, slots)| slots.len())
            .sum()
    })
    .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ChannelKey {
    owner: ObjectId,
    name: &'static str,
    payload: TypeId,
}

struct Slot<S, A> {
    handler: Handler<S, A>,
    context: Option<ObjectId>,
    live: Rc<Cell<bool>>,
}

impl<S, A> Clone for Slot<S, A> {
    fn clone(&self) -> Self {
        Self {
            handler: Rc::clone(&self.handler),
            context: self.context,
            live: Rc::clone(&self.live),
        }
    }
}

trait SlotList {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn close(&mut self);
    fn take_context(&mut self, context: ObjectId) -> Box<dyn SlotList>;
}

impl<S: 'static, A: 'static> SlotList for Vec<Slot<S, A>> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn close(&mut self) {
        for slot in self.iter() {
            slot.live.set(false);
        }
    }

    fn take_context(&mut self, context: ObjectId) -> Box<dyn SlotList> {
        let (mut removed, kept): (Vec<_>, Vec<_>) = self
            .drain(..)
            .partition(|slot| slot.context == Some(context));
        *self = kept;
        removed.close();
        Box::new(removed)
    }
}

thread_local! {
    static CONNECTIONS: RefCell<HashMap<ChannelKey, Box<dyn SlotList>>> =
        RefCell::new(HashMap::new());
}

// Removed slots are returned out of the closure and dropped after the borrow
// ends: dropping a handler may drop a model whose disposal re-enters the table.
fn with_table<R>(f: impl FnOnce(&mut HashMap<ChannelKey, Box<dyn SlotList>>) -> R) -> Option<R> {
    CONNECTIONS
        .try_with(|table| f(&mut table.borrow_mut()))
        .ok()
}

fn same_handler<S, A>(left: &Handler<S, A>, right: &Handler<S, A>) -> bool {
    std::ptr::eq(
        Rc::as_ptr(left) as *const (),
        Rc::as_ptr(right) as *const (),
    )
}

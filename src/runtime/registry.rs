use std::any::Any;
use std::rc::Rc;

use ahash::AHashMap;

/// An id of an object registered in the runtime's handle registry.
///
/// Handles are never reused: resolving a handle whose object was already
/// deregistered fails with [`BadHandle`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Handle(u64);

/// Returned when a [`Handle`] is unknown to the registry or refers to an
/// object of another type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BadHandle;

/// The capability set of registered objects: dynamic type query and close.
///
/// Any runtime object the registry owns (today only channels) implements it,
/// so a handle can be closed without knowing the concrete type behind it.
pub trait RuntimeObject {
    /// Type-erased `self` for downcasting in [`resolve`](Registry::resolve).
    fn as_any(self: Rc<Self>) -> Rc<dyn Any>;

    /// Wakes every operation parked on the object and discards its storage.
    fn close_object(&self);
}

/// Maps [`Handle`]s to the objects they denote.
pub(crate) struct Registry {
    objects: AHashMap<u64, Rc<dyn RuntimeObject>>,
    next_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            objects: AHashMap::new(),
            next_id: 0,
        }
    }

    pub(crate) fn register(&mut self, object: Rc<dyn RuntimeObject>) -> Handle {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, object);
        Handle(id)
    }

    pub(crate) fn resolve<O: 'static>(&self, handle: Handle) -> Result<Rc<O>, BadHandle> {
        let object = self.objects.get(&handle.0).ok_or(BadHandle)?;
        object.clone().as_any().downcast::<O>().map_err(|_| BadHandle)
    }

    pub(crate) fn deregister(&mut self, handle: Handle) -> Result<Rc<dyn RuntimeObject>, BadHandle> {
        self.objects.remove(&handle.0).ok_or(BadHandle)
    }
}

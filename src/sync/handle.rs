//! Handle-based channel management.
//!
//! Channels created through [`open`] are owned by the runtime's registry and
//! addressed by a [`Handle`], so they can be looked up, shared and closed
//! without threading references around. [`resolve`] checks both that the
//! handle is known and that it denotes a channel of the requested element
//! type; [`close`] consumes the handle.
//!
//! # Example
//!
//! ```rust
//! use chorus::sync::handle;
//!
//! async fn foo() {
//!     let id = handle::open::<u32>(4).unwrap();
//!
//!     let ch = handle::resolve::<u32>(id).unwrap();
//!     ch.send(1).await.unwrap();
//!
//!     handle::close(id).unwrap();
//!     assert!(handle::resolve::<u32>(id).is_err());
//! }
//! ```

use std::rc::Rc;

use crate::runtime::registry::{BadHandle, Handle};
use crate::runtime::local_executor;
use crate::sync::channel::LocalChannel;

/// Error of [`open`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OpenError {
    /// The runtime is shutting down.
    Canceled,
    /// The channel buffer could not be allocated.
    OutOfMemory,
}

/// Creates a channel buffering up to `capacity` elements of type `T`,
/// registers it and returns its [`Handle`].
pub fn open<T: 'static>(capacity: usize) -> Result<Handle, OpenError> {
    let executor = local_executor();
    if !executor.can_block() {
        return Err(OpenError::Canceled);
    }

    let channel =
        LocalChannel::<T>::try_bounded(capacity).map_err(|_| OpenError::OutOfMemory)?;
    Ok(executor.registry().register(Rc::new(channel)))
}

/// Returns the channel behind `handle`.
///
/// Fails with [`BadHandle`] when the handle is unknown (never issued, or
/// already closed) or when it denotes a channel of another element type.
pub fn resolve<T: 'static>(handle: Handle) -> Result<Rc<LocalChannel<T>>, BadHandle> {
    local_executor().registry().resolve::<LocalChannel<T>>(handle)
}

/// Closes the channel behind `handle` and consumes the handle.
///
/// Every parked operation is woken with a closed result and buffered
/// elements are discarded; a second close of the same handle fails with
/// [`BadHandle`].
pub fn close(handle: Handle) -> Result<(), BadHandle> {
    let object = local_executor().registry().deregister(handle)?;
    object.close_object();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as chorus;
    use crate::sync::{local_scope, RecvResult};
    use crate::yield_now;

    #[chorus_macros::test]
    fn test_open_resolve_close() {
        let id = open::<u32>(2).unwrap();

        let ch = resolve::<u32>(id).unwrap();
        ch.try_send(1).unwrap();
        assert_eq!(resolve::<u32>(id).unwrap().try_recv().unwrap(), 1);

        close(id).unwrap();
        assert!(resolve::<u32>(id).is_err());
        assert_eq!(close(id), Err(BadHandle));
    }

    #[chorus_macros::test]
    fn test_resolve_wrong_type_fails() {
        let id = open::<u32>(1).unwrap();

        assert!(resolve::<u64>(id).is_err());
        assert!(resolve::<u32>(id).is_ok());

        close(id).unwrap();
    }

    #[chorus_macros::test]
    fn test_close_wakes_parked() {
        let id = open::<u32>(0).unwrap();

        local_scope(|scope| async move {
            scope.spawn(async move {
                let ch = resolve::<u32>(id).unwrap();
                assert!(matches!(ch.recv().await, RecvResult::Closed));
            });

            // let the receiver park first
            yield_now().await;

            close(id).unwrap();
        })
        .await;
    }

    #[chorus_macros::test]
    fn test_open_fails_on_shutdown() {
        crate::local_executor().shutdown();
        assert_eq!(open::<u32>(1), Err(OpenError::Canceled));
    }
}

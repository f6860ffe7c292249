use std::fmt::Debug;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::utils::Ptr;

struct Inner<T> {
    counter: usize,
    /// Outstanding borrows: positive for shared, `-1` for exclusive.
    #[cfg(debug_assertions)]
    borrows: isize,
    data: T,
}

/// `Local` is a reference-counted cell for sharing mutable state between
/// coroutines of one executor.
///
/// Only one coroutine runs at a time, so accesses never race. The remaining
/// hazard is keeping a borrow alive across a suspension point: the coroutine
/// resumed in between would observe an aliased exclusive borrow. Debug builds
/// track outstanding borrows through the returned guards and panic on such
/// misuse; release builds are unchecked.
///
/// `Local` is `!Send`.
pub struct Local<T> {
    inner: Ptr<Inner<T>>,
    // impl !Send
    no_send_marker: PhantomData<*const ()>,
}

impl<T> Local<T> {
    /// Creates a new `Local` with the provided data.
    pub fn new(data: T) -> Self {
        Local {
            inner: Ptr::new(Inner {
                counter: 1,
                #[cfg(debug_assertions)]
                borrows: 0,
                data,
            }),
            no_send_marker: PhantomData,
        }
    }

    #[inline(always)]
    fn inc_counter(&self) {
        unsafe { self.inner.as_mut().counter += 1 };
    }

    #[inline(always)]
    fn dec_counter(&self) -> usize {
        let reference = unsafe { self.inner.as_mut() };
        reference.counter -= 1;
        reference.counter
    }

    /// Returns a shared borrow of the data.
    ///
    /// # Panics
    ///
    /// In debug builds, if an exclusive borrow is outstanding — usually a
    /// [`borrow_mut`](Local::borrow_mut) guard kept across a suspension
    /// point.
    #[inline(always)]
    pub fn borrow(&self) -> LocalRef<'_, T> {
        #[cfg(debug_assertions)]
        {
            let inner = unsafe { self.inner.as_mut() };
            assert!(
                inner.borrows >= 0,
                "Local is already exclusively borrowed; \
                 a borrow guard was probably kept across a suspension point"
            );
            inner.borrows += 1;
        }

        LocalRef {
            inner: self.inner,
            _local: PhantomData,
        }
    }

    /// Returns an exclusive borrow of the data.
    ///
    /// # Panics
    ///
    /// In debug builds, if any borrow is outstanding — usually a guard kept
    /// across a suspension point.
    #[inline(always)]
    pub fn borrow_mut(&self) -> LocalRefMut<'_, T> {
        #[cfg(debug_assertions)]
        {
            let inner = unsafe { self.inner.as_mut() };
            assert!(
                inner.borrows == 0,
                "Local is already borrowed; \
                 a borrow guard was probably kept across a suspension point"
            );
            inner.borrows = -1;
        }

        LocalRefMut {
            inner: self.inner,
            _local: PhantomData,
        }
    }
}

impl<T: Default> Default for Local<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Debug> Debug for Local<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.borrow().fmt(f)
    }
}

impl<T> Clone for Local<T> {
    fn clone(&self) -> Self {
        self.inc_counter();
        Self {
            inner: self.inner,
            no_send_marker: PhantomData,
        }
    }
}

impl<T> Drop for Local<T> {
    fn drop(&mut self) {
        if self.dec_counter() == 0 {
            unsafe { self.inner.drop_and_deallocate() };
        }
    }
}

/// A shared borrow of a [`Local`], released on [`Drop`].
pub struct LocalRef<'local, T> {
    inner: Ptr<Inner<T>>,
    _local: PhantomData<&'local T>,
}

impl<T> Deref for LocalRef<'_, T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { &self.inner.as_ref().data }
    }
}

impl<T> Drop for LocalRef<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            unsafe { self.inner.as_mut() }.borrows -= 1;
        }
    }
}

/// An exclusive borrow of a [`Local`], released on [`Drop`].
pub struct LocalRefMut<'local, T> {
    inner: Ptr<Inner<T>>,
    _local: PhantomData<&'local mut T>,
}

impl<T> Deref for LocalRefMut<'_, T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { &self.inner.as_ref().data }
    }
}

impl<T> DerefMut for LocalRefMut<'_, T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut self.inner.as_mut().data }
    }
}

impl<T> Drop for LocalRefMut<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            unsafe { self.inner.as_mut() }.borrows = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate as chorus;

    #[chorus_macros::test]
    fn test_local() {
        let local = Local::new(5);
        assert_eq!(*local.borrow(), 5);

        *local.borrow_mut() = 10;
        assert_eq!(*local.borrow(), 10);

        let local_clone = local.clone();
        *local_clone.borrow_mut() += 1;
        assert_eq!(*local.borrow(), 11);

        assert_eq!(format!("{local:?}"), "11");
    }

    #[chorus_macros::test]
    fn test_shared_borrows_coexist() {
        let local = Local::new(vec![1, 2, 3]);

        let first = local.borrow();
        let second = local.borrow();
        assert_eq!(first.len(), second.len());
        drop(first);
        drop(second);

        local.borrow_mut().push(4);
        assert_eq!(*local.borrow(), vec![1, 2, 3, 4]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "already borrowed")]
    fn test_overlapping_borrows_panic_in_debug() {
        let local = Local::new(5);
        let _shared = local.borrow();
        let _exclusive = local.borrow_mut();
    }
}

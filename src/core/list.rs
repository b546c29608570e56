//! Generic intrusive doubly-linked list
//!
//! One list/item abstraction shared by ready lists, wait lists, the
//! delayed-task lists and the timer expiry lists, replacing the old
//! per-purpose `ReadyList`/`PendList` duplicates. Each list is a circular
//! chain around a sentinel node whose value is `OsTick::MAX`, so ordered
//! insertion never needs to special-case an empty list or walk off the end
//! — the sentinel always compares greatest and terminates the scan.
//!
//! Two-phase construction mirrors the rest of this crate's statics: `new()`
//! produces an inert value usable in a `const` initializer, `init()` wires
//! the sentinel's self-referential pointers once the list has reached its
//! final `'static` address.

use core::ptr::NonNull;

use crate::types::OsTick;

/// An intrusive list node, embedded in the owning struct (a TCB or a
/// timer).
///
/// `value` is the ordering key: wake tick for delayed lists, expiry tick
/// for timer lists, `CFG_PRIO_MAX - 1 - priority` for wait lists (higher
/// numeric priority is more urgent per spec §3, so this key decreases as
/// priority increases) so the head of an ordered list is always the
/// highest-priority waiter or earliest-expiry entry.
pub struct Item<T> {
    value: OsTick,
    next: Option<NonNull<Item<T>>>,
    prev: Option<NonNull<Item<T>>>,
    container: Option<NonNull<List<T>>>,
    owner: Option<NonNull<T>>,
}

impl<T> Item<T> {
    pub const fn new() -> Self {
        Item {
            value: 0,
            next: None,
            prev: None,
            container: None,
            owner: None,
        }
    }

    #[inline]
    pub fn value(&self) -> OsTick {
        self.value
    }

    #[inline]
    pub fn set_value(&mut self, value: OsTick) {
        self.value = value;
    }

    #[inline]
    pub fn set_owner(&mut self, owner: NonNull<T>) {
        self.owner = Some(owner);
    }

    #[inline]
    pub fn owner(&self) -> Option<NonNull<T>> {
        self.owner
    }

    /// Whether this item is currently linked into some list.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.container.is_some()
    }

    #[inline]
    pub fn container(&self) -> Option<NonNull<List<T>>> {
        self.container
    }

    /// Remove this item from whichever list currently contains it, if
    /// any. A no-op if the item is unlinked. Lets callers drop a task
    /// from "whatever state list it's currently on" without first
    /// working out which list that is — the same trick FreeRTOS's
    /// `vListRemove(&pxTCB->xStateListItem)` relies on.
    pub fn unlink(&mut self) {
        if let Some(mut container) = self.container {
            let self_ptr = NonNull::from(&mut *self);
            unsafe { container.as_mut().remove(self_ptr) };
        }
    }
}

impl<T> Default for Item<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Item<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Item<T> {}

/// A circular, sentinel-terminated intrusive list.
pub struct List<T> {
    sentinel: Item<T>,
    /// Round-robin insertion/traversal point; used by `append`/`advance`.
    /// Always points at a real node once `init()` has run (the sentinel
    /// counts as a valid, always-present node for this purpose).
    cursor: Option<NonNull<Item<T>>>,
    length: usize,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        List {
            sentinel: Item::new(),
            cursor: None,
            length: 0,
        }
    }

    /// Finish initialization. Must be called exactly once, after `self`
    /// has reached its final address, before any insert.
    pub fn init(&mut self) {
        let sentinel_ptr = NonNull::from(&mut self.sentinel);
        self.sentinel.value = OsTick::MAX;
        self.sentinel.next = Some(sentinel_ptr);
        self.sentinel.prev = Some(sentinel_ptr);
        self.cursor = Some(sentinel_ptr);
        self.length = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline]
    fn sentinel_ptr(&mut self) -> NonNull<Item<T>> {
        NonNull::from(&mut self.sentinel)
    }

    /// Insert `item` in ascending-value order. Entries with equal value
    /// keep FIFO order: a new entry lands just before the first existing
    /// entry whose value is not smaller.
    ///
    /// # Safety
    /// `item` must not already be linked into any list and must point at
    /// storage that outlives the list (true for the `'static` TCBs and
    /// timers this crate allocates).
    pub unsafe fn insert_ordered(&mut self, item: NonNull<Item<T>>) {
        let value = unsafe { item.as_ref().value };
        let sentinel = self.sentinel_ptr();
        let mut cur = unsafe { sentinel.as_ref().next.unwrap_or(sentinel) };
        while cur != sentinel {
            if unsafe { cur.as_ref().value } > value {
                break;
            }
            cur = unsafe { cur.as_ref().next.unwrap_or(sentinel) };
        }
        unsafe { self.link_before(cur, item) };
        self.length += 1;
    }

    /// Insert `item` just before the round-robin cursor — new ready tasks
    /// join the back of the current rotation at their priority.
    ///
    /// # Safety
    /// Same obligations as `insert_ordered`.
    pub unsafe fn append(&mut self, item: NonNull<Item<T>>) {
        let at = self.cursor.unwrap_or_else(|| self.sentinel_ptr());
        unsafe { self.link_before(at, item) };
        self.length += 1;
    }

    unsafe fn link_before(&mut self, at: NonNull<Item<T>>, mut item: NonNull<Item<T>>) {
        let list_ptr = NonNull::from(&mut *self);
        let prev = unsafe { at.as_ref().prev.unwrap_or(at) };
        unsafe {
            item.as_mut().next = Some(at);
            item.as_mut().prev = Some(prev);
            item.as_mut().container = Some(list_ptr);
            (*prev.as_ptr()).next = Some(item);
            (*at.as_ptr()).prev = Some(item);
        }
    }

    /// Remove `item` from this list. If the round-robin cursor pointed at
    /// `item`, the cursor steps back to its predecessor first so the next
    /// `advance()` still makes progress.
    pub fn remove(&mut self, mut item: NonNull<Item<T>>) {
        let next = unsafe { item.as_ref().next };
        let prev = unsafe { item.as_ref().prev };
        if let (Some(next), Some(prev)) = (next, prev) {
            unsafe {
                (*prev.as_ptr()).next = Some(next);
                (*next.as_ptr()).prev = Some(prev);
            }
        }
        if self.cursor == Some(item) {
            self.cursor = prev;
        }
        unsafe {
            item.as_mut().next = None;
            item.as_mut().prev = None;
            item.as_mut().container = None;
        }
        self.length = self.length.saturating_sub(1);
    }

    /// Advance the round-robin cursor to the next non-sentinel entry and
    /// return its owner. Returns `None` for an empty list; does not move
    /// the cursor in that case.
    pub fn advance(&mut self) -> Option<NonNull<T>> {
        if self.is_empty() {
            return None;
        }
        let sentinel = self.sentinel_ptr();
        let at = self.cursor.unwrap_or(sentinel);
        let mut next = unsafe { at.as_ref().next.unwrap_or(sentinel) };
        if next == sentinel {
            next = unsafe { sentinel.as_ref().next.unwrap_or(sentinel) };
        }
        self.cursor = Some(next);
        unsafe { next.as_ref().owner }
    }

    /// Owner of the head (lowest-value) entry, without disturbing the
    /// round-robin cursor.
    pub fn head(&self) -> Option<NonNull<T>> {
        if self.is_empty() {
            return None;
        }
        unsafe { self.sentinel.next.and_then(|h| h.as_ref().owner) }
    }

    /// Value of the head entry. Used by the tick handler to find the
    /// next wake time without dereferencing the owner.
    pub fn head_value(&self) -> Option<OsTick> {
        if self.is_empty() {
            return None;
        }
        unsafe { self.sentinel.next.map(|h| h.as_ref().value) }
    }

    /// Remove and return the owner of the head entry.
    pub fn pop_head(&mut self) -> Option<NonNull<T>> {
        let sentinel = self.sentinel_ptr();
        let head = self.sentinel.next.filter(|&h| h != sentinel)?;
        let owner = unsafe { head.as_ref().owner };
        self.remove(head);
        owner
    }
}

impl<T> Default for List<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for List<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for List<T> {}

// SAFETY: lists are only ever mutated from within a critical section.
unsafe impl<T> Send for List<T> {}
unsafe impl<T> Sync for List<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(u32);

    fn make(value: OsTick, owner: &mut Dummy) -> Item<Dummy> {
        let mut item = Item::new();
        item.set_value(value);
        item.set_owner(NonNull::from(owner));
        item
    }

    #[test]
    fn empty_list() {
        let mut list: List<Dummy> = List::new();
        list.init();
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(list.head().is_none());
        assert!(list.head_value().is_none());
    }

    #[test]
    fn ordered_insert_and_head() {
        let mut list: List<Dummy> = List::new();
        list.init();

        let mut a = Dummy(1);
        let mut b = Dummy(2);
        let mut c = Dummy(3);
        let mut item_a = make(30, &mut a);
        let mut item_b = make(10, &mut b);
        let mut item_c = make(20, &mut c);

        unsafe {
            list.insert_ordered(NonNull::from(&mut item_a));
            list.insert_ordered(NonNull::from(&mut item_b));
            list.insert_ordered(NonNull::from(&mut item_c));
        }

        assert_eq!(list.len(), 3);
        let head = list.head().unwrap();
        assert_eq!(unsafe { head.as_ref().0 }, 2); // value 10 -> owner b

        assert_eq!(list.head_value(), Some(10));
    }

    #[test]
    fn remove_mid_list() {
        let mut list: List<Dummy> = List::new();
        list.init();

        let mut a = Dummy(1);
        let mut b = Dummy(2);
        let mut item_a = make(10, &mut a);
        let mut item_b = make(20, &mut b);

        unsafe {
            list.insert_ordered(NonNull::from(&mut item_a));
            list.insert_ordered(NonNull::from(&mut item_b));
        }

        list.remove(NonNull::from(&mut item_a));
        assert_eq!(list.len(), 1);
        assert_eq!(list.head_value(), Some(20));
        assert!(!item_a.is_linked());
    }

    #[test]
    fn round_robin_advance() {
        let mut list: List<Dummy> = List::new();
        list.init();

        let mut a = Dummy(1);
        let mut b = Dummy(2);
        let mut c = Dummy(3);
        let mut item_a = make(0, &mut a);
        let mut item_b = make(0, &mut b);
        let mut item_c = make(0, &mut c);

        unsafe {
            list.append(NonNull::from(&mut item_a));
            list.append(NonNull::from(&mut item_b));
            list.append(NonNull::from(&mut item_c));
        }

        let first = unsafe { list.advance().unwrap().as_ref().0 };
        let second = unsafe { list.advance().unwrap().as_ref().0 };
        let third = unsafe { list.advance().unwrap().as_ref().0 };
        let wrapped = unsafe { list.advance().unwrap().as_ref().0 };

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 3);
        assert_eq!(wrapped, 1);
    }

    #[test]
    fn pop_head_drains_list() {
        let mut list: List<Dummy> = List::new();
        list.init();

        let mut a = Dummy(1);
        let mut b = Dummy(2);
        let mut item_a = make(5, &mut a);
        let mut item_b = make(15, &mut b);

        unsafe {
            list.insert_ordered(NonNull::from(&mut item_a));
            list.insert_ordered(NonNull::from(&mut item_b));
        }

        assert_eq!(unsafe { list.pop_head().unwrap().as_ref().0 }, 1);
        assert_eq!(unsafe { list.pop_head().unwrap().as_ref().0 }, 2);
        assert!(list.pop_head().is_none());
        assert!(list.is_empty());
    }
}

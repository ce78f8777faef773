//! Registry list visited in rotation by worker threads.

/// A list with a rotating cursor.
///
/// The cursor always names the next item to visit. Removing an item before the
/// cursor shifts the cursor back with it, so no remaining item is skipped.
#[derive(Debug)]
pub struct RoundRobin<T> {
    items: Vec<T>,
    next: usize,
}

impl<T> Default for RoundRobin<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next: 0,
        }
    }
}

impl<T> RoundRobin<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Remove the first item matching `predicate`
    pub fn remove_where(&mut self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        let index = self.items.iter().position(predicate)?;
        let item = self.items.remove(index);

        if index < self.next {
            self.next -= 1;
        }
        if self.next >= self.items.len() {
            self.next = 0;
        }

        Some(item)
    }

    pub fn contains_where(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.items.iter().any(predicate)
    }

    /// Item under the cursor, advancing the cursor
    pub fn next_item(&mut self) -> Option<&T> {
        if self.items.is_empty() {
            return None;
        }
        if self.next >= self.items.len() {
            self.next = 0;
        }

        let index = self.next;
        self.next += 1;
        self.items.get(index)
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_wraps() {
        let mut list = RoundRobin::new();
        list.push('a');
        list.push('b');

        assert_eq!(list.next_item(), Some(&'a'));
        assert_eq!(list.next_item(), Some(&'b'));
        assert_eq!(list.next_item(), Some(&'a'));
    }

    #[test]
    fn test_removal_before_cursor_skips_nothing() {
        let mut list = RoundRobin::new();
        for c in ['a', 'b', 'c', 'd'] {
            list.push(c);
        }

        assert_eq!(list.next_item(), Some(&'a'));
        assert_eq!(list.next_item(), Some(&'b'));
        assert_eq!(list.remove_where(|&c| c == 'a'), Some('a'));

        // One full pass visits every remaining item exactly once
        let pass: Vec<char> = (0..3).filter_map(|_| list.next_item().copied()).collect();
        assert_eq!(pass, vec!['c', 'd', 'b']);
    }

    #[test]
    fn test_removal_at_end_wraps_cursor() {
        let mut list = RoundRobin::new();
        for c in ['a', 'b', 'c'] {
            list.push(c);
        }

        list.next_item();
        list.next_item();
        assert_eq!(list.next_item(), Some(&'c'));
        list.remove_where(|&c| c == 'c');
        assert_eq!(list.next_item(), Some(&'a'));
    }

    #[test]
    fn test_empty_list() {
        let mut list: RoundRobin<u32> = RoundRobin::new();
        assert!(list.next_item().is_none());
        assert!(list.remove_where(|_| true).is_none());
    }
}

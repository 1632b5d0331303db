//! Persistent lazy streams
//!
//! A `Stream<T>` is a handle on "the sequence from here on". Pulling an
//! element never mutates the handle: it returns the element together with a
//! new handle for the remainder. Handles are cheap to clone, so a parser can
//! keep one as a checkpoint and resume from it later without re-running the
//! producer:
//! - each cell computes its step at most once and caches it
//! - a saved handle always yields the same element and remainder
//! - exhaustion is `None`, never an error

use std::fmt;
use std::rc::Rc;

use once_cell::unsync::Lazy;

type Step<T> = Option<(T, Stream<T>)>;
type Thunk<T> = Box<dyn FnOnce() -> Step<T>>;

/// Memoized, immutable, lazily realized sequence
pub struct Stream<T> {
    cell: Rc<Lazy<Step<T>, Thunk<T>>>,
}

impl<T> Clone for Stream<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: Clone + 'static> Stream<T> {
    /// The exhausted stream
    pub fn empty() -> Self {
        Self::from_fn(|| None)
    }

    /// Stream whose first step is produced by `step` on first demand
    pub fn from_fn(step: impl FnOnce() -> Option<(T, Stream<T>)> + 'static) -> Self {
        Self {
            cell: Rc::new(Lazy::new(Box::new(step) as Thunk<T>)),
        }
    }

    /// Stream with a known head and a deferred tail
    ///
    /// `tail` runs at most once, the first time the remainder is pulled.
    pub fn cons(head: T, tail: impl FnOnce() -> Stream<T> + 'static) -> Self {
        let rest = Self::from_fn(move || tail().next());
        Self::from_fn(move || Some((head, rest)))
    }

    /// Stream produced by repeatedly applying `step` to a state
    pub fn unfold<S: 'static>(seed: S, step: impl Fn(S) -> Option<(T, S)> + 'static) -> Self {
        Self::unfold_shared(seed, Rc::new(step))
    }

    fn unfold_shared<S: 'static>(seed: S, step: Rc<dyn Fn(S) -> Option<(T, S)>>) -> Self {
        Self::from_fn(move || {
            let (item, next) = step(seed)?;
            Some((item, Self::unfold_shared(next, step)))
        })
    }

    /// Pull the head and the remainder
    pub fn next(&self) -> Option<(T, Stream<T>)> {
        Lazy::force(&*self.cell).clone()
    }

    /// Borrow the head without materializing a new handle
    pub fn peek(&self) -> Option<&T> {
        Lazy::force(&*self.cell).as_ref().map(|(head, _)| head)
    }

    /// Whether the first step has already been computed
    pub fn is_forced(&self) -> bool {
        Lazy::get(&*self.cell).is_some()
    }

    /// Iterate from this point; the handle itself is left untouched
    pub fn iter(&self) -> StreamIter<T> {
        StreamIter {
            stream: self.clone(),
        }
    }
}

impl<T> Stream<T> {
    fn detach_tail(&mut self) -> Option<Stream<T>> {
        Rc::get_mut(&mut self.cell)
            .and_then(Lazy::get_mut)
            .and_then(Option::take)
            .map(|(_, tail)| tail)
    }
}

// Realized chains are unlinked iteratively; the default drop would recurse once
// per element.
impl<T> Drop for Stream<T> {
    fn drop(&mut self) {
        let mut tail = self.detach_tail();
        while let Some(mut stream) = tail {
            tail = stream.detach_tail();
        }
    }
}

impl<T> fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match Lazy::get(&*self.cell) {
            None => "pending",
            Some(None) => "exhausted",
            Some(Some(_)) => "forced",
        };
        f.debug_struct("Stream").field("state", &state).finish()
    }
}

/// Iterator over a stream's elements
pub struct StreamIter<T> {
    stream: Stream<T>,
}

impl<T: Clone + 'static> Iterator for StreamIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let (head, rest) = self.stream.next()?;
        self.stream = rest;
        Some(head)
    }
}

impl<T: Clone + 'static> FromIterator<T> for Stream<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Rc<[T]> = iter.into_iter().collect();
        Self::unfold(0usize, move |at| items.get(at).cloned().map(|item| (item, at + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counting(limit: usize, calls: Rc<Cell<usize>>) -> Stream<usize> {
        Stream::unfold(0usize, move |n| {
            calls.set(calls.get() + 1);
            (n < limit).then_some((n, n + 1))
        })
    }

    #[test]
    fn test_next_is_referentially_transparent() {
        let s: Stream<u32> = vec![1, 2, 3].into_iter().collect();

        let (a, rest_a) = s.next().unwrap();
        let (b, rest_b) = s.next().unwrap();
        assert_eq!(a, 1);
        assert_eq!(a, b);
        assert_eq!(rest_a.iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(rest_b.iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_tail_is_computed_once() {
        let calls = Rc::new(Cell::new(0));
        let s = counting(3, Rc::clone(&calls));

        assert!(!s.is_forced());
        let first = s.next();
        let second = s.next();
        assert_eq!(first.map(|(x, _)| x), Some(0));
        assert_eq!(second.map(|(x, _)| x), Some(0));
        assert_eq!(calls.get(), 1);

        // Re-walking from a saved checkpoint reuses every cached step
        let checkpoint = s.clone();
        assert_eq!(s.iter().count(), 3);
        let after_first_walk = calls.get();
        assert_eq!(checkpoint.iter().count(), 3);
        assert_eq!(calls.get(), after_first_walk);
        assert_eq!(after_first_walk, 4);
    }

    #[test]
    fn test_cons_defers_tail() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let s = Stream::cons('a', move || {
            counter.set(counter.get() + 1);
            Stream::cons('b', Stream::empty)
        });

        assert_eq!(s.peek(), Some(&'a'));
        assert_eq!(calls.get(), 0);

        let (_, rest) = s.next().unwrap();
        assert_eq!(rest.peek(), Some(&'b'));
        assert_eq!(rest.peek(), Some(&'b'));
        assert_eq!(calls.get(), 1);
        assert!(rest.next().unwrap().1.next().is_none());
    }

    #[test]
    fn test_exhausted_stream_returns_none() {
        let s: Stream<u8> = Stream::empty();
        assert!(s.next().is_none());
        assert!(s.next().is_none());
        assert!(s.peek().is_none());
    }

    #[test]
    fn test_long_chain_drops_without_recursion() {
        let s = counting(500_000, Rc::new(Cell::new(0)));
        assert_eq!(s.iter().count(), 500_000);
        drop(s);
    }
}

//! In-memory cache of compiled articles.
//!
//! Each key has at most one slot. A slot is [`ArticleState::Pending`] while a
//! compilation is in flight and [`ArticleState::Ready`] once it finished.
//! Requests that find a pending slot wait for that compilation instead of
//! starting another. A compilation only lands if its slot was not invalidated
//! or restarted in the meantime, so a slow compile of an old source never
//! overwrites a newer result.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::article::CompiledArticle;
use crate::store::ArticleKey;

/// Cache state of one article.
#[derive(Debug, Clone)]
pub enum ArticleState {
    /// Compilation in flight
    Pending,
    /// Compiled article
    Ready(Arc<CompiledArticle>),
}

impl ArticleState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Outcome of [`ArticleCache::claim`].
#[derive(Debug)]
pub enum Claim {
    /// Already compiled
    Ready(Arc<CompiledArticle>),
    /// The caller must compile and then [`finish`](ArticleCache::finish)
    Compile(Ticket),
    /// Another caller is compiling; [`wait`](ArticleCache::wait) for it
    InFlight,
}

#[derive(Debug)]
struct Slot {
    ticket: u64,
    state: ArticleState,
}

/// Handle for an in-flight compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
struct Inner {
    next_ticket: u64,
    slots: HashMap<ArticleKey, Slot>,
}

impl Inner {
    fn issue(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    fn is_pending(&self, key: &ArticleKey) -> bool {
        matches!(
            self.slots.get(key),
            Some(Slot {
                state: ArticleState::Pending,
                ..
            })
        )
    }
}

/// Compiled articles keyed by [`ArticleKey`].
#[derive(Debug, Default)]
pub struct ArticleCache {
    inner: Mutex<Inner>,
    settled: Condvar,
}

impl ArticleCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state of a key.
    pub fn get(&self, key: &ArticleKey) -> Option<ArticleState> {
        self.lock().slots.get(key).map(|slot| slot.state.clone())
    }

    /// Compiled article for a key, if ready.
    pub fn ready(&self, key: &ArticleKey) -> Option<Arc<CompiledArticle>> {
        match self.get(key)? {
            ArticleState::Ready(article) => Some(article),
            ArticleState::Pending => None,
        }
    }

    /// Look up a key, marking it pending if nobody has compiled it yet.
    pub fn claim(&self, key: &ArticleKey) -> Claim {
        let mut inner = self.lock();
        match inner.slots.get(key).map(|slot| &slot.state) {
            Some(ArticleState::Ready(article)) => return Claim::Ready(Arc::clone(article)),
            Some(ArticleState::Pending) => return Claim::InFlight,
            None => {}
        }

        let ticket = inner.issue();
        inner.slots.insert(
            key.clone(),
            Slot {
                ticket,
                state: ArticleState::Pending,
            },
        );
        Claim::Compile(Ticket(ticket))
    }

    /// Block while a compilation of `key` is in flight.
    ///
    /// Returns the article if one landed, or `None` if the slot was dropped.
    pub fn wait(&self, key: &ArticleKey) -> Option<Arc<CompiledArticle>> {
        let inner = self
            .settled
            .wait_while(self.lock(), |inner| inner.is_pending(key))
            .unwrap_or_else(PoisonError::into_inner);
        match inner.slots.get(key) {
            Some(Slot {
                state: ArticleState::Ready(article),
                ..
            }) => Some(Arc::clone(article)),
            _ => None,
        }
    }

    /// Start a recompilation unconditionally. A ready entry stays visible
    /// until replaced.
    pub fn begin(&self, key: &ArticleKey) -> Ticket {
        let mut inner = self.lock();
        let ticket = inner.issue();

        inner
            .slots
            .entry(key.clone())
            .and_modify(|slot| slot.ticket = ticket)
            .or_insert(Slot {
                ticket,
                state: ArticleState::Pending,
            });
        Ticket(ticket)
    }

    /// Store the result of a compilation started with [`claim`](Self::claim)
    /// or [`begin`](Self::begin).
    ///
    /// Returns false if the slot was invalidated or restarted since.
    pub fn finish(&self, key: &ArticleKey, ticket: Ticket, article: Arc<CompiledArticle>) -> bool {
        let mut inner = self.lock();
        let landed = match inner.slots.get_mut(key) {
            Some(slot) if slot.ticket == ticket.0 => {
                slot.state = ArticleState::Ready(article);
                true
            }
            _ => false,
        };
        drop(inner);
        if landed {
            self.settled.notify_all();
        }
        landed
    }

    /// Drop a pending slot whose compilation could not produce an article.
    pub fn abandon(&self, key: &ArticleKey, ticket: Ticket) {
        let mut inner = self.lock();
        let stale = matches!(
            inner.slots.get(key),
            Some(Slot { ticket: t, state: ArticleState::Pending }) if *t == ticket.0
        );
        if stale {
            inner.slots.remove(key);
            drop(inner);
            self.settled.notify_all();
        }
    }

    /// Remove one entry. Any compilation in flight for it is discarded.
    pub fn invalidate(&self, key: &ArticleKey) -> bool {
        let removed = self.lock().slots.remove(key).is_some();
        if removed {
            self.settled.notify_all();
        }
        removed
    }

    /// Number of ready entries.
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|s| s.state.is_ready())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_components::{CompileStatus, CompiledRender};
    use folio_mdx::FrontMatter;

    fn key(slug: &str) -> ArticleKey {
        ArticleKey::new("a", slug).unwrap()
    }

    fn article(slug: &str) -> Arc<CompiledArticle> {
        Arc::new(CompiledArticle {
            category: "a".into(),
            slug: slug.into(),
            front_matter: FrontMatter::new(),
            render: CompiledRender::default(),
            status: CompileStatus::Success,
        })
    }

    #[test]
    fn pending_then_ready() {
        let cache = ArticleCache::new();
        let ticket = cache.begin(&key("x"));

        assert!(matches!(cache.get(&key("x")), Some(ArticleState::Pending)));
        assert!(cache.ready(&key("x")).is_none());

        assert!(cache.finish(&key("x"), ticket, article("x")));
        assert!(cache.get(&key("x")).unwrap().is_ready());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidated_compile_does_not_land() {
        let cache = ArticleCache::new();
        let ticket = cache.begin(&key("x"));

        assert!(cache.invalidate(&key("x")));
        assert!(!cache.finish(&key("x"), ticket, article("x")));
        assert!(cache.get(&key("x")).is_none());
    }

    #[test]
    fn newer_compile_wins() {
        let cache = ArticleCache::new();
        let old = cache.begin(&key("x"));
        let new = cache.begin(&key("x"));

        assert!(cache.finish(&key("x"), new, article("x")));
        assert!(!cache.finish(&key("x"), old, article("stale")));
        assert_eq!(cache.ready(&key("x")).unwrap().slug, "x");
    }

    #[test]
    fn claim_hands_out_one_compile() {
        let cache = ArticleCache::new();

        let Claim::Compile(ticket) = cache.claim(&key("x")) else {
            panic!("first claim should compile");
        };
        assert!(matches!(cache.claim(&key("x")), Claim::InFlight));

        cache.finish(&key("x"), ticket, article("x"));
        assert!(matches!(cache.claim(&key("x")), Claim::Ready(a) if a.slug == "x"));
    }

    #[test]
    fn waiters_see_the_landed_article() {
        let cache = ArticleCache::new();
        let Claim::Compile(ticket) = cache.claim(&key("x")) else {
            panic!("first claim should compile");
        };

        std::thread::scope(|s| {
            let waiter = s.spawn(|| cache.wait(&key("x")));
            std::thread::sleep(std::time::Duration::from_millis(50));
            cache.finish(&key("x"), ticket, article("x"));
            assert_eq!(waiter.join().unwrap().unwrap().slug, "x");
        });
    }

    #[test]
    fn waiters_wake_when_slot_is_dropped() {
        let cache = ArticleCache::new();
        let Claim::Compile(ticket) = cache.claim(&key("x")) else {
            panic!("first claim should compile");
        };

        std::thread::scope(|s| {
            let waiter = s.spawn(|| cache.wait(&key("x")));
            std::thread::sleep(std::time::Duration::from_millis(50));
            cache.abandon(&key("x"), ticket);
            assert!(waiter.join().unwrap().is_none());
        });
        assert!(matches!(cache.claim(&key("x")), Claim::Compile(_)));
    }

    #[test]
    fn abandon_clears_only_pending() {
        let cache = ArticleCache::new();
        let first = cache.begin(&key("x"));
        cache.abandon(&key("x"), first);
        assert!(cache.get(&key("x")).is_none());

        let second = cache.begin(&key("y"));
        cache.finish(&key("y"), second, article("y"));
        cache.abandon(&key("y"), second);
        assert!(cache.ready(&key("y")).is_some());
    }
}

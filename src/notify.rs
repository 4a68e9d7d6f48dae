use std::sync::Arc;

use crate::emitter::EventEmitter;
use crate::event::{Event, EventBase, EventKind};
use crate::shortener::UrlShortener;

/// Builds events from a shared base and hands them to the emitter.
///
/// The base is created once per push; only the (shortened) URL changes
/// between emissions.
#[derive(Clone)]
pub struct Notifier {
    emitter: Arc<dyn EventEmitter>,
    shortener: UrlShortener,
    commit_id_size: usize,
}

impl Notifier {
    pub fn new(
        emitter: Arc<dyn EventEmitter>,
        shortener: UrlShortener,
        commit_id_size: usize,
    ) -> Self {
        Self {
            emitter,
            shortener,
            commit_id_size,
        }
    }

    pub async fn send(&self, base: &EventBase, url: Option<String>, kind: EventKind) {
        let mut base = base.clone();
        base.url = match url {
            Some(url) => Some(self.shortener.shorten(&url).await),
            None => None,
        };
        self.emitter.emit(Event::new(base, kind));
    }

    /// Commit id as shown in events. A size of 0 keeps the full id.
    pub fn commit_id(&self, id: &str) -> String {
        if self.commit_id_size == 0 {
            return id.to_string();
        }
        match id.char_indices().nth(self.commit_id_size) {
            Some((end, _)) => id[..end].to_string(),
            None => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::MemoryEmitter;
    use crate::event::Pusher;
    use crate::test_utils::notifier_with;

    #[test]
    fn truncates_commit_ids() {
        let (notifier, _) = notifier_with(7);
        assert_eq!(notifier.commit_id("0123456789abcdef"), "0123456");
        assert_eq!(notifier.commit_id("abc"), "abc");

        let (full, _) = notifier_with(0);
        assert_eq!(full.commit_id("0123456789abcdef"), "0123456789abcdef");
    }

    #[tokio::test]
    async fn only_url_differs_between_events() {
        let (notifier, emitter): (Notifier, MemoryEmitter) = notifier_with(7);
        let base = EventBase::new("repo", Pusher::named("alice"));

        notifier
            .send(
                &base,
                Some("https://example.com/a".into()),
                EventKind::Push { branch: None },
            )
            .await;
        notifier
            .send(&base, None, EventKind::Push { branch: None })
            .await;

        let events = emitter.events();
        assert_eq!(events[0].base.url.as_deref(), Some("https://example.com/a"));
        assert_eq!(events[1].base.url, None);
        assert_eq!(events[0].base.repository_name, events[1].base.repository_name);
        assert!(base.url.is_none());
    }
}

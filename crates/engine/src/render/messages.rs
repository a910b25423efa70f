use std::fmt;

use tracing::{debug, warn};

use super::image::Image;

/// Identity of a message: which renderer draws it and the data it draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub renderer: &'static str,
    pub data: u64,
}

impl MessageKey {
    pub const fn new(renderer: &'static str, data: u64) -> Self {
        Self { renderer, data }
    }
}

type MessageRender = Box<dyn Fn(&mut Image)>;

/// Transient full-screen notices drawn over everything else, oldest first.
#[derive(Default)]
pub struct MessageStack {
    entries: Vec<(MessageKey, MessageRender)>,
}

impl fmt::Debug for MessageStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(key, _)| key))
            .finish()
    }
}

impl MessageStack {
    /// Adds a message. A key that is already shown is a caller bug: debug builds assert,
    /// release builds keep the first registration.
    pub fn add_message(&mut self, key: MessageKey, render: impl Fn(&mut Image) + 'static) -> bool {
        let duplicate = self.contains(key);
        debug_assert!(!duplicate, "message {key:?} registered twice");
        if duplicate {
            warn!(renderer = key.renderer, data = key.data, "message_duplicate_ignored");
            return false;
        }
        debug!(renderer = key.renderer, data = key.data, "message_added");
        self.entries.push((key, Box::new(render)));
        true
    }

    pub fn end_message(&mut self, key: MessageKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != key);
        before != self.entries.len()
    }

    pub fn contains(&self, key: MessageKey) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self, target: &mut Image) {
        for (_, render) in &self.entries {
            render(target);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOADING: MessageKey = MessageKey::new("loading", 0);

    #[test]
    fn messages_render_in_insertion_order_until_ended() {
        let mut stack = MessageStack::default();
        stack.add_message(LOADING, |image| image.set(0, 0, [1.0, 0.0, 0.0, 1.0]));
        stack.add_message(MessageKey::new("lights", 7), |image| {
            image.set(0, 0, [0.0, 1.0, 0.0, 1.0])
        });

        let mut target = Image::new(1, 1);
        stack.render(&mut target);
        assert_eq!(target.get(0, 0), [0.0, 1.0, 0.0, 1.0]);

        assert!(stack.end_message(LOADING));
        assert!(!stack.end_message(LOADING));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    #[cfg(debug_assertions)]
    fn duplicate_registration_asserts() {
        let mut stack = MessageStack::default();
        stack.add_message(LOADING, |_| {});
        stack.add_message(LOADING, |_| {});
    }
}

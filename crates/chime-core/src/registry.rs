//! Channel registry
//!
//! Owned by the dispatcher, which is its only writer. Channels are created on
//! first use and torn down only by [`ChannelRegistry::shutdown`].

use crate::clip::ChannelId;
use crate::channel::ChannelQueue;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<ChannelId, ChannelQueue>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing queue for `id`, or a freshly started one
    pub fn resolve(&mut self, id: ChannelId) -> std::io::Result<&ChannelQueue> {
        if !self.channels.contains_key(&id) {
            let queue = ChannelQueue::spawn(id)?;
            log::info!("Registry: created channel {}", id);
            self.channels.insert(id, queue);
        }
        // Inserted above if it was missing
        Ok(&self.channels[&id])
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelQueue> {
        self.channels.get(&id)
    }

    /// Snapshot of registered channel ids, sorted
    pub fn all(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Stop and join every channel worker, leaving the registry empty
    pub fn shutdown(&mut self) {
        for (id, mut queue) in std::mem::take(&mut self.channels) {
            log::debug!("Registry: stopping channel {}", id);
            queue.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_creates_once() {
        let mut registry = ChannelRegistry::new();
        assert!(registry.is_empty());

        let a = ChannelId::new('a');
        assert!(registry.resolve(a).unwrap().is_running());
        registry.resolve(a).unwrap();
        registry.resolve(ChannelId::new('C')).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.all(), vec![ChannelId::new('a'), ChannelId::new('c')]);
        assert!(registry.get(ChannelId::new('b')).is_none());

        registry.shutdown();
        assert!(registry.is_empty());
    }
}

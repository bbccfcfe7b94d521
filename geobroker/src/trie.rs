use std::fmt;
use std::sync::Arc;

use crate::raster::SpatialRaster;
use crate::topic::{Level, Topic};
use crate::types::DashMap;

/// One node of the topic tree. Every node indexes the subscriptions whose topic filter ends here.
pub struct TopicNode {
    level: Level,
    filter: Topic,
    raster: SpatialRaster,
    children: DashMap<Level, Arc<TopicNode>>,
}

impl TopicNode {
    fn new(level: Level, filter: Topic, granularity: u32) -> Self {
        Self { level, filter, raster: SpatialRaster::new(granularity), children: DashMap::default() }
    }

    #[inline]
    pub fn level(&self) -> &Level {
        &self.level
    }

    /// The topic filter leading from the root to this node.
    #[inline]
    pub fn filter(&self) -> &Topic {
        &self.filter
    }

    #[inline]
    pub fn raster(&self) -> &SpatialRaster {
        &self.raster
    }

    #[inline]
    pub fn child(&self, l: &Level) -> Option<Arc<TopicNode>> {
        self.children.get(l).map(|n| n.value().clone())
    }

    #[inline]
    fn child_or_create(&self, l: &Level) -> Arc<TopicNode> {
        if let Some(n) = self.child(l) {
            return n;
        }
        let granularity = self.raster.granularity();
        self.children
            .entry(l.clone())
            .or_insert_with(|| {
                let mut levels = self.filter.levels().clone();
                levels.push(l.clone());
                Arc::new(TopicNode::new(l.clone(), Topic::from(levels), granularity))
            })
            .clone()
    }

    fn nodes_size(&self) -> usize {
        let len: usize = self.children.iter().map(|n| n.value().nodes_size()).sum();
        self.children.len() + len
    }

    fn _list(&self, out: &mut Vec<String>, top: usize, depth: usize) {
        if top == 0 {
            return;
        }
        for n in self.children.iter() {
            out.push(format!(
                "{} {:?}, subscription ids: {}",
                " ".repeat(depth * 3),
                n.key().to_string(),
                n.value().raster.subscription_ids_count()
            ));
            n.value()._list(out, top - 1, depth + 1);
        }
    }
}

/// Trie over topic levels. Wildcard levels are stored as ordinary children named `+` and `#`.
pub struct TopicTree {
    root: Arc<TopicNode>,
}

impl TopicTree {
    pub fn new(granularity: u32) -> Self {
        Self { root: Arc::new(TopicNode::new(Level::Blank, Topic::from(Vec::new()), granularity)) }
    }

    #[inline]
    pub fn granularity(&self) -> u32 {
        self.root.raster.granularity()
    }

    /// Descends along `topic`, creating missing nodes on the way, and returns the last one.
    pub fn get_or_create_children(&self, topic: &Topic) -> Arc<TopicNode> {
        topic.levels().iter().fold(self.root.clone(), |node, l| node.child_or_create(l))
    }

    /// Like [`TopicTree::get_or_create_children`] but never creates nodes.
    pub fn get_children(&self, topic: &Topic) -> Option<Arc<TopicNode>> {
        topic.levels().iter().try_fold(self.root.clone(), |node, l| node.child(l))
    }

    /// All nodes whose subscriptions match a publication on `topic`.
    ///
    /// The walk is breadth first. On every level it follows the literal child and the `+` child;
    /// a `#` child met on the way matches the rest of the topic, including the case where the
    /// filter is one level longer than the topic (`a/#` matches `a`).
    pub fn matching_nodes(&self, topic: &Topic) -> Vec<Arc<TopicNode>> {
        let mut out = Vec::new();
        let mut frontier = vec![self.root.clone()];

        for l in topic.levels() {
            if frontier.is_empty() {
                break;
            }
            let mut next = Vec::with_capacity(frontier.len());
            for node in frontier.iter() {
                if let Some(n) = node.child(&Level::MultiWildcard) {
                    out.push(n);
                }
                if let Some(n) = node.child(l) {
                    next.push(n);
                }
                if let Some(n) = node.child(&Level::SingleWildcard) {
                    next.push(n);
                }
            }
            frontier = next;
        }

        for node in frontier {
            if let Some(n) = node.child(&Level::MultiWildcard) {
                out.push(n);
            }
            out.push(node);
        }
        out
    }

    #[inline]
    pub fn nodes_size(&self) -> usize {
        self.root.nodes_size()
    }

    #[inline]
    pub fn list(&self, top: usize) -> Vec<String> {
        let mut out = Vec::new();
        self.root._list(&mut out, top, 0);
        out
    }
}

impl fmt::Debug for TopicTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicTree {{ nodes_size: {}, granularity: {} }}", self.nodes_size(), self.granularity())
    }
}

use std::{cmp::Ordering, sync::Arc};

use crate::{
    api::{Comment, SortMode},
    ThreadNode,
};

pub trait OrderExt {
    fn sort(&self, nodes: &mut [Arc<ThreadNode>]);

    /// Index at which `c` goes in `nodes`, assuming `nodes` is already sorted
    fn insertion_point(&self, nodes: &[Arc<ThreadNode>], c: &Comment) -> usize;
}

impl OrderExt for SortMode {
    fn sort(&self, nodes: &mut [Arc<ThreadNode>]) {
        let mut keyed = nodes
            .iter()
            .map(|n| (n.comment(), n.clone()))
            .collect::<Vec<_>>();
        keyed.sort_by(|(a, _), (b, _)| self.compare(a, b));
        for (slot, (_, n)) in nodes.iter_mut().zip(keyed) {
            *slot = n;
        }
    }

    fn insertion_point(&self, nodes: &[Arc<ThreadNode>], c: &Comment) -> usize {
        nodes.partition_point(|n| n.with_comment(|n| self.compare(n, c)) == Ordering::Less)
    }
}

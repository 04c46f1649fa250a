#![cfg(test)]

use std::{collections::HashSet, panic::AssertUnwindSafe, sync::Arc};

use discuss_mock_server::{Call, MockServer};

use crate::{
    api::{CommentId, ContentId},
    testing, ThreadNode, ThreadRoot,
};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    Like {
        node: usize,
    },
    Dislike {
        node: usize,
    },
    Delete {
        node: usize,
    },
    Reply {
        node: usize,
        #[generator(bolero::generator::gen_with::<String>().len(0..20usize))]
        body: String,
    },
    Toggle {
        node: usize,
    },
    ReloadRoots,
    FailNextReaction,
}

/// Every node currently reachable from the root's caches
fn visible(root: &ThreadRoot) -> Vec<Arc<ThreadNode>> {
    let mut res = Vec::new();
    let mut todo = root.roots();
    while let Some(n) = todo.pop() {
        todo.extend(n.children());
        res.push(n);
    }
    res
}

fn pick(root: &ThreadRoot, idx: usize) -> Option<Arc<ThreadNode>> {
    let nodes = visible(root);
    match nodes.len() {
        0 => None,
        len => Some(nodes[idx % len].clone()),
    }
}

fn check_invariants(server: &MockServer, root: &ThreadRoot, diverged: &HashSet<CommentId>) {
    let mut seen = HashSet::new();
    for n in visible(root) {
        assert!(seen.insert(n.id()), "comment {:?} cached twice", n.id());
        assert!(n.is_attached(), "reachable node {:?} is detached", n.id());
        let local = n.comment();
        let remote = server
            .comment(n.id())
            .unwrap_or_else(|| panic!("displayed comment {:?} is gone from server", n.id()));
        assert_eq!(local.direct_child_count, remote.direct_child_count);
        if n.children_loaded() {
            assert!(n.children().len() as u64 <= local.direct_child_count);
        }
        if !diverged.contains(&n.id()) {
            assert_eq!(local.reactions, remote.reactions);
        }
        for c in n.children() {
            assert_eq!(c.depth(), n.depth() + 1);
            assert_eq!(c.comment().parent_id, Some(n.id()));
        }
    }
}

do_tokio_test!(fuzz_thread_ops, Vec<FuzzOp>, |ops: Vec<FuzzOp>| async move {
    let (server, session) = testing::setup();
    let me = server.viewer().clone();
    let other = server.add_user("other");
    let a = server.seed_root(ContentId::stub(), &me, "a");
    let a1 = server.seed_reply(a.id, &other, "a1");
    server.seed_reply(a.id, &me, "a2");
    server.seed_reply(a1.id, &me, "a1x");
    let b = server.seed_root(ContentId::stub(), &other, "b");
    server.seed_reply(b.id, &me, "b1");
    server.seed_root(ContentId::stub(), &me, "c");

    let root = testing::loaded_root(&session).await;
    for n in root.roots() {
        n.mount().await.expect("mounting seeded root");
    }
    let mut diverged = HashSet::new();
    check_invariants(&server, &root, &diverged);

    for op in ops {
        match op {
            FuzzOp::Like { node } | FuzzOp::Dislike { node } => {
                let Some(n) = pick(&root, node) else { continue };
                let res = if matches!(op, FuzzOp::Like { .. }) {
                    n.like().await
                } else {
                    n.dislike().await
                };
                if res.is_err() {
                    diverged.insert(n.id());
                }
            }
            FuzzOp::Delete { node } => {
                if let Some(n) = pick(&root, node) {
                    let _ = n.delete().await;
                }
            }
            FuzzOp::Reply { node, body } => {
                if let Some(n) = pick(&root, node) {
                    let _ = n.submit_reply(&body).await;
                }
            }
            FuzzOp::Toggle { node } => {
                if let Some(n) = pick(&root, node) {
                    let _ = n.toggle_expanded().await;
                }
            }
            FuzzOp::ReloadRoots => {
                if root.load_page(1).await.is_ok() {
                    for n in root.roots() {
                        diverged.remove(&n.id());
                    }
                }
            }
            FuzzOp::FailNextReaction => server.fail_next(Call::React),
        }
        check_invariants(&server, &root, &diverged);
    }
});

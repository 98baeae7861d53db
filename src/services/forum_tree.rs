use crate::models::ForumModel;
use std::collections::{HashMap, HashSet};

/// The whole forum table folded into an adjacency map.
///
/// Forum counts are small, so every tree question (ancestors, descendants,
/// depth, display order) is answered in memory from one `SELECT`.
#[derive(Debug, Clone)]
pub struct ForumTree {
    forums: HashMap<i32, ForumModel>,
    children: HashMap<Option<i32>, Vec<i32>>,
}

impl ForumTree {
    pub fn new(forums: Vec<ForumModel>) -> Self {
        let mut children: HashMap<Option<i32>, Vec<i32>> = HashMap::new();
        for forum in &forums {
            children.entry(forum.parent_id).or_default().push(forum.id);
        }

        let forums: HashMap<i32, ForumModel> = forums.into_iter().map(|f| (f.id, f)).collect();
        for ids in children.values_mut() {
            ids.sort_by_key(|id| {
                let f = &forums[id];
                (f.sort_order, f.id)
            });
        }

        Self { forums, children }
    }

    pub fn get(&self, id: i32) -> Option<&ForumModel> {
        self.forums.get(&id)
    }

    pub fn contains(&self, id: i32) -> bool {
        self.forums.contains_key(&id)
    }

    pub fn children(&self, parent: Option<i32>) -> &[i32] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parent first, root last. Stops on a dangling parent id or a cycle.
    pub fn ancestors(&self, id: i32) -> Vec<i32> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.get(id).and_then(|f| f.parent_id);
        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            let Some(parent) = self.get(parent_id) else {
                break;
            };
            out.push(parent_id);
            current = parent.parent_id;
        }
        out
    }

    /// The forum followed by its ancestors: the path counters are folded over.
    pub fn path_to_root(&self, id: i32) -> Vec<i32> {
        let mut path = vec![id];
        path.extend(self.ancestors(id));
        path
    }

    pub fn level(&self, id: i32) -> usize {
        self.ancestors(id).len()
    }

    /// All descendants in display (pre-order) order, without `id` itself.
    pub fn descendants(&self, id: i32) -> Vec<i32> {
        let mut out = Vec::new();
        let mut stack: Vec<i32> = self.children(Some(id)).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            if next == id || out.contains(&next) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(Some(next)).iter().rev().copied());
        }
        out
    }

    /// `id` and its descendants.
    pub fn subtree(&self, id: i32) -> Vec<i32> {
        let mut ids = vec![id];
        ids.extend(self.descendants(id));
        ids
    }

    pub fn is_descendant_of(&self, id: i32, ancestor: i32) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Every forum in display order, paired with its depth.
    pub fn walk(&self) -> Vec<(&ForumModel, usize)> {
        let mut out = Vec::with_capacity(self.forums.len());
        let mut stack: Vec<(i32, usize)> =
            self.children(None).iter().rev().map(|id| (*id, 0)).collect();
        while let Some((id, level)) = stack.pop() {
            let Some(forum) = self.get(id) else {
                continue;
            };
            out.push((forum, level));
            stack.extend(
                self.children(Some(id))
                    .iter()
                    .rev()
                    .map(|child| (*child, level + 1)),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forum(id: i32, parent_id: Option<i32>, sort_order: i32) -> ForumModel {
        let now = chrono::Utc::now().naive_utc();
        ForumModel {
            id,
            parent_id,
            name: format!("forum {id}"),
            slug: format!("forum-{id}"),
            description: None,
            image: None,
            link: None,
            link_redirects: false,
            forum_type: 0,
            posts_count: 0,
            topics_count: 0,
            link_redirects_count: 0,
            last_post_on: None,
            display_sub_forum_list: true,
            sort_order,
            created_at: now,
            updated_at: now,
        }
    }

    //  1          5
    //  ├─ 3       └─ 6
    //  │  └─ 4
    //  └─ 2
    fn sample() -> ForumTree {
        ForumTree::new(vec![
            forum(1, None, 0),
            forum(2, Some(1), 2),
            forum(3, Some(1), 1),
            forum(4, Some(3), 0),
            forum(5, None, 1),
            forum(6, Some(5), 0),
        ])
    }

    #[test]
    fn walk_is_preorder_by_sort_order() {
        let tree = sample();
        let order: Vec<(i32, usize)> = tree.walk().iter().map(|(f, l)| (f.id, *l)).collect();
        assert_eq!(order, vec![(1, 0), (3, 1), (4, 2), (2, 1), (5, 0), (6, 1)]);
    }

    #[test]
    fn ancestors_run_from_parent_to_root() {
        let tree = sample();
        assert_eq!(tree.ancestors(4), vec![3, 1]);
        assert_eq!(tree.path_to_root(4), vec![4, 3, 1]);
        assert!(tree.ancestors(1).is_empty());
        assert_eq!(tree.level(4), 2);
    }

    #[test]
    fn subtree_includes_self_and_all_descendants() {
        let tree = sample();
        assert_eq!(tree.subtree(1), vec![1, 3, 4, 2]);
        assert_eq!(tree.descendants(6), Vec::<i32>::new());
        assert!(tree.is_descendant_of(4, 1));
        assert!(!tree.is_descendant_of(1, 4));
        assert!(!tree.is_descendant_of(6, 1));
    }

    #[test]
    fn cyclic_rows_do_not_loop_forever() {
        let tree = ForumTree::new(vec![forum(1, Some(2), 0), forum(2, Some(1), 0)]);
        assert_eq!(tree.ancestors(1), vec![2]);
        assert_eq!(tree.descendants(1), vec![2]);
        // neither is reachable from the roots
        assert!(tree.walk().is_empty());
    }
}

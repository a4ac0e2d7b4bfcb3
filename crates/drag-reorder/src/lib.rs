//! Drag Reorder Utilities
//!
//! Turns a completed drop on a flat ordered list into the new full ordering
//! of that list.

/// Drop target relative to the list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropTarget<Id> {
    /// Zone just before an item
    Before(Id),
    /// Zone just after an item
    After(Id),
    /// Zone after the last item
    End,
}

/// Apply a drop to `items`, returning the new full ordering.
///
/// Returns `None` when the dragged item or the target item is missing, or
/// when the drop leaves the order unchanged.
pub fn reorder_by_drop<T, Id, F>(items: &[T], dragged: &Id, target: &DropTarget<Id>, id_of: F) -> Option<Vec<T>>
where
    T: Clone,
    Id: PartialEq,
    F: Fn(&T) -> &Id,
{
    let from = items.iter().position(|item| id_of(item) == dragged)?;

    let mut rest: Vec<T> = items.to_vec();
    let moved = rest.remove(from);

    let to = match target {
        DropTarget::End => rest.len(),
        DropTarget::Before(id) => rest.iter().position(|item| id_of(item) == id)?,
        DropTarget::After(id) => rest.iter().position(|item| id_of(item) == id)? + 1,
    };

    if to == from {
        return None;
    }
    rest.insert(to, moved);
    Some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[(char, i32)]) -> String {
        items.iter().map(|(c, _)| *c).collect()
    }

    fn list() -> Vec<(char, i32)> {
        vec![('a', 0), ('b', 1), ('c', 2), ('d', 3)]
    }

    #[test]
    fn test_drop_before() {
        let out = reorder_by_drop(&list(), &'d', &DropTarget::Before('b'), |x| &x.0).unwrap();
        assert_eq!(ids(&out), "adbc");
    }

    #[test]
    fn test_drop_after() {
        let out = reorder_by_drop(&list(), &'a', &DropTarget::After('c'), |x| &x.0).unwrap();
        assert_eq!(ids(&out), "bcad");
    }

    #[test]
    fn test_drop_at_end() {
        let out = reorder_by_drop(&list(), &'b', &DropTarget::End, |x| &x.0).unwrap();
        assert_eq!(ids(&out), "acdb");
    }

    #[test]
    fn test_noop_and_missing_drops() {
        assert!(reorder_by_drop(&list(), &'b', &DropTarget::Before('c'), |x| &x.0).is_none());
        assert!(reorder_by_drop(&list(), &'d', &DropTarget::End, |x| &x.0).is_none());
        assert!(reorder_by_drop(&list(), &'z', &DropTarget::End, |x| &x.0).is_none());
        assert!(reorder_by_drop(&list(), &'a', &DropTarget::Before('z'), |x| &x.0).is_none());
    }
}

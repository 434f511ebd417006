//! Lazy hydration through the owning root
//!
//! Every container merged into an issue is stamped with a non-owning link to
//! that issue. A read that misses follows the link of the deepest container
//! it reached and asks the root to load its full remote state, then retries
//! once.

use crate::container::Container;
use crate::tree::{Lookup, Node};
use std::cell::RefCell;
use std::rc::Weak;

/// A root entity able to fetch its complete remote representation
pub trait Hydrate {
    /// Load the remote state if it is still missing.
    ///
    /// Returns `true` only when new data was merged.
    fn hydrate(&self) -> bool;
}

/// Non-owning link from a container to its root
pub type RootLink = Weak<dyn Hydrate>;

/// Read a dotted path from `body`, hydrating the owning root on a miss.
///
/// The borrow on `body` is released before the root is asked to hydrate,
/// since hydration merges into the same cell.
pub fn read_through(body: &RefCell<Container>, path: &str) -> Option<Node> {
    let mut hydrated = false;

    loop {
        let lookup = body.borrow().lookup(path);

        match lookup {
            Lookup::Found(node) => return Some(node),
            Lookup::Delegate(record, rest) => return record.get(&rest),
            Lookup::Missing(Some(link)) if !hydrated => {
                let root = link.upgrade()?;
                hydrated = true;
                if !root.hydrate() {
                    return None;
                }
            }
            Lookup::Missing(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingRoot {
        body: Rc<RefCell<Container>>,
        calls: Cell<usize>,
    }

    impl Hydrate for CountingRoot {
        fn hydrate(&self) -> bool {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() > 1 {
                return false;
            }
            let incoming = Container::from_json(json!({"fields": {"status": "Open"}})).unwrap();
            self.body.borrow_mut().merge(incoming);
            true
        }
    }

    fn rooted(value: serde_json::Value) -> (Rc<CountingRoot>, Rc<RefCell<Container>>) {
        let body = Rc::new(RefCell::new(Container::from_json(value).unwrap()));
        let root = Rc::new(CountingRoot {
            body: body.clone(),
            calls: Cell::new(0),
        });
        let link: RootLink = Rc::downgrade(&root) as Weak<dyn Hydrate>;
        body.borrow_mut().stamp_root(&link);
        (root, body)
    }

    #[test]
    fn test_hit_does_not_hydrate() {
        let (root, body) = rooted(json!({"fields": {"summary": "x"}}));
        assert!(read_through(&body, "fields.summary").is_some());
        assert_eq!(root.calls.get(), 0);
    }

    #[test]
    fn test_nested_miss_hydrates_root_and_retries() {
        let (root, body) = rooted(json!({"fields": {"summary": "x"}}));
        let status = read_through(&body, "fields.status").unwrap();
        assert_eq!(status.as_str(), Some("Open"));
        assert_eq!(root.calls.get(), 1);
    }

    #[test]
    fn test_miss_after_hydration_retries_once() {
        let (root, body) = rooted(json!({}));
        assert!(read_through(&body, "nope").is_none());
        assert_eq!(root.calls.get(), 1);
        assert!(read_through(&body, "still.nope").is_none());
        assert_eq!(root.calls.get(), 2);
    }

    #[test]
    fn test_unstamped_container_never_hydrates() {
        let body = RefCell::new(Container::new());
        assert!(read_through(&body, "anything").is_none());
    }
}

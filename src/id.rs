//! Code for handling IDs
use std::collections::HashSet;
use std::hash::Hash;

/// A data structure containing an ID
pub trait HasID<T> {
    /// Get the struct's ID
    fn get_id(&self) -> &T;
}

/// Define a custom ID type backed by a reference-counted string
macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Debug,
            serde::Deserialize,
            serde::Serialize,
        )]
        /// An ID type (e.g. `BusID`, `ComponentID`, etc.)
        pub struct $name(pub std::rc::Rc<str>);

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.into())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s.into())
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(id.into())
            }
        }
    };
}
pub(crate) use define_id_type;

/// Implement the `HasID` trait for the given type, assuming it has a field called `id`
macro_rules! define_id_getter {
    ($type:ty, $id_ty:ty) => {
        impl crate::id::HasID<$id_ty> for $type {
            fn get_id(&self) -> &$id_ty {
                &self.id
            }
        }
    };
}
pub(crate) use define_id_getter;

define_id_type! {ComponentID}

/// Find the first ID which occurs more than once in `items`, if any
pub fn find_duplicate_id<'a, T, I, ID>(items: I) -> Option<&'a ID>
where
    T: HasID<ID> + 'a,
    I: IntoIterator<Item = &'a T>,
    ID: Eq + Hash + 'a,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|item| item.get_id())
        .find(|id| !seen.insert(*id))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Record {
        id: ComponentID,
    }
    define_id_getter! {Record, ComponentID}

    #[test]
    fn find_duplicate_id_works() {
        let records: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|id| Record { id: id.into() })
            .collect();
        assert!(find_duplicate_id(&records).is_none());

        let records: Vec<_> = ["a", "b", "a"]
            .into_iter()
            .map(|id| Record { id: id.into() })
            .collect();
        assert_eq!(find_duplicate_id(&records), Some(&"a".into()));
    }

    #[test]
    fn id_display_and_borrow() {
        let id = ComponentID::new("DE_natgas");
        assert_eq!(id.to_string(), "DE_natgas");
        let borrowed: &str = std::borrow::Borrow::borrow(&id);
        assert_eq!(borrowed, "DE_natgas");
    }
}

//! Code for handling IDs

/// Define a new ID type.
///
/// IDs wrap an [`Arc<str>`](std::sync::Arc) so that they can be cheaply cloned and shared with
/// solver worker threads.
macro_rules! define_id_type {
    ($name:ident) => {
        #[derive(
            Clone,
            std::hash::Hash,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            serde::Deserialize,
            Debug,
            serde::Serialize,
        )]
        /// An ID type (e.g. `SiteID`, `RegionID`, etc.)
        pub struct $name(pub std::sync::Arc<str>);

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
                $name(std::sync::Arc::from(s))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(std::sync::Arc::from(s))
            }
        }

        impl $name {
            /// Create a new ID from a string slice
            pub fn new(id: &str) -> Self {
                $name(std::sync::Arc::from(id))
            }
        }
    };
}
pub(crate) use define_id_type;

#[cfg(test)]
define_id_type!(GenericID);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_id_lookup_by_str() {
        let map: HashMap<GenericID, u32> = [("a".into(), 1), ("b".into(), 2)].into();
        assert_eq!(map["a"], 1);
        assert_eq!(map.get("c"), None);
    }

    #[test]
    fn test_id_display_and_clone() {
        let id = GenericID::new("site_1");
        let other = id.clone();
        assert_eq!(id.to_string(), "site_1");
        assert!(std::sync::Arc::ptr_eq(&id.0, &other.0));
        assert_eq!(GenericID::from(String::from("site_1")), id);
    }

    #[test]
    fn test_id_deserialise() {
        #[derive(serde::Deserialize)]
        struct Record {
            id: GenericID,
        }

        let record: Record = toml::from_str("id = \"BE\"").unwrap();
        assert_eq!(record.id, "BE".into());
    }
}

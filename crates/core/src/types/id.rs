//! Newtype IDs for type-safe entity references.
//!
//! The commerce platform identifies carts, line items and products with
//! opaque GUID strings. Use the `define_id!` macro to create wrappers that
//! prevent accidentally passing a line item ID where a cart ID is expected.

/// Macro to define a type-safe, string-backed ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `Display`, `AsRef<str>`, `From<String>` and `From<&str>`
///
/// # Example
///
/// ```rust
/// # use cartwheel_core::define_id;
/// define_id!(BasketId);
/// define_id!(ShelfId);
///
/// let basket = BasketId::new("b-1");
/// let shelf = ShelfId::new("b-1");
/// assert_eq!(basket.as_str(), shelf.as_str());
///
/// // These are different types, so this won't compile:
/// // let _: BasketId = shelf;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying identifier.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the identifier.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl ::core::convert::AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

define_id!(CartId);
define_id!(LineItemId);
define_id!(ProductId);
define_id!(VariantId);
define_id!(CheckoutId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_id_serializes_transparently() {
        let id = LineItemId::new("11111111-2222-3333-4444-555555555555");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"11111111-2222-3333-4444-555555555555\"");

        let back: LineItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_id_display_matches_inner() {
        let id = CartId::from("cart-abc");
        assert_eq!(id.to_string(), "cart-abc");
        assert_eq!(id.as_ref(), "cart-abc");
        assert_eq!(id.into_inner(), "cart-abc".to_string());
    }
}

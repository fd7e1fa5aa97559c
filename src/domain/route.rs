//! Payload variants and their destinations.
//!
//! The dispatcher does not care what a payload is, only which variant it
//! belongs to. The mapping from variant to destination is explicit data,
//! validated when the resolver is built.

use crate::domain::outcome::DispatchError;
use crate::domain::window::ConfigError;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A payload that belongs to a closed set of routable variants.
pub trait Routable {
    /// Variant tag used for destination lookup.
    type Variant: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn variant(&self) -> Self::Variant;
}

/// Where a payload is delivered (an endpoint URL for HTTP senders).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination(String);

impl Destination {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Variant-to-destination table.
///
/// # Example
/// ```
/// use submission_throttle::DestinationResolver;
///
/// #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
/// enum Kind { Invoice, Receipt }
///
/// let resolver = DestinationResolver::new([(Kind::Invoice, "https://api.example/invoices")]).unwrap();
/// assert_eq!(resolver.resolve(Kind::Invoice).unwrap().as_str(), "https://api.example/invoices");
/// assert!(resolver.resolve(Kind::Receipt).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct DestinationResolver<V>
where
    V: Eq + Hash,
{
    routes: HashMap<V, Destination>,
}

impl<V> DestinationResolver<V>
where
    V: Copy + Eq + Hash + fmt::Debug,
{
    /// Build a resolver, validating every destination.
    ///
    /// Later entries for the same variant replace earlier ones.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidDestination` for an empty destination or
    /// one containing whitespace.
    pub fn new<I, D>(routes: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (V, D)>,
        D: Into<String>,
    {
        let mut table = HashMap::new();
        for (variant, destination) in routes {
            let destination = destination.into();
            validate_destination(&variant, &destination)?;
            table.insert(variant, Destination(destination));
        }
        Ok(Self { routes: table })
    }

    /// Look up the destination for `variant`.
    ///
    /// # Errors
    /// Returns `DispatchError::UnsupportedVariant` if no route exists.
    pub fn resolve(&self, variant: V) -> Result<&Destination, DispatchError> {
        self.routes
            .get(&variant)
            .ok_or_else(|| DispatchError::UnsupportedVariant {
                variant: format!("{:?}", variant),
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<V> Default for DestinationResolver<V>
where
    V: Eq + Hash,
{
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }
}

fn validate_destination<V: fmt::Debug>(variant: &V, destination: &str) -> Result<(), ConfigError> {
    let reason = if destination.trim().is_empty() {
        "destination is empty"
    } else if destination.chars().any(char::is_whitespace) {
        "destination contains whitespace"
    } else {
        return Ok(());
    };

    Err(ConfigError::InvalidDestination {
        variant: format!("{:?}", variant),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Kind {
        A,
        B,
    }

    #[test]
    fn test_resolve_known_variant() {
        let resolver = DestinationResolver::new([(Kind::A, "https://a.example")]).unwrap();
        assert_eq!(
            resolver.resolve(Kind::A).unwrap(),
            &Destination("https://a.example".to_string())
        );
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_variant() {
        let resolver = DestinationResolver::new([(Kind::A, "https://a.example")]).unwrap();
        match resolver.resolve(Kind::B) {
            Err(DispatchError::UnsupportedVariant { variant }) => assert_eq!(variant, "B"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_destination() {
        let err = DestinationResolver::new([(Kind::A, "  ")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidDestination {
                variant: "A".to_string(),
                reason: "destination is empty",
            }
        );
    }

    #[test]
    fn test_rejects_whitespace_in_destination() {
        let result = DestinationResolver::new([(Kind::B, "https://b.example/ path")]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidDestination { .. })
        ));
    }

    #[test]
    fn test_later_route_wins() {
        let resolver = DestinationResolver::new([
            (Kind::A, "https://old.example"),
            (Kind::A, "https://new.example"),
        ])
        .unwrap();
        assert_eq!(resolver.resolve(Kind::A).unwrap().as_str(), "https://new.example");
    }

    #[test]
    fn test_default_resolver_is_empty() {
        let resolver: DestinationResolver<Kind> = DestinationResolver::default();
        assert!(resolver.is_empty());
        assert!(resolver.resolve(Kind::A).is_err());
    }
}

//! Spec translation
//!
//! Turns validated desired state into request payloads. Translation never
//! touches the network itself; cross references that name another resource
//! are resolved through an injected [`ReferenceResolver`]. The production
//! resolver lists the referenced collection once per pass and caches it.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::reader::RegionOrder;
use crate::client::{ApiPaths, CloudApi};
use crate::error::{Error, Result};
use crate::model::{CrossReference, ReferenceChoice, SpecValidationError};

/// Collections a [`CrossReference`] can point into
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Vpc,
    Cluster,
    AllowList,
    Integration,
    SoftwareTrack,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Vpc => "VPC",
            ReferenceKind::Cluster => "cluster",
            ReferenceKind::AllowList => "allow list",
            ReferenceKind::Integration => "integration",
            ReferenceKind::SoftwareTrack => "software track",
        };
        write!(f, "{s}")
    }
}

/// Name-to-id lookup used while translating
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    /// Ids of every resource of `kind` called `name`
    async fn lookup(&self, kind: ReferenceKind, name: &str) -> Result<Vec<String>>;
}

/// Output of a translation: the request plus the caller order needed to
/// restore list ordering when reading back
#[derive(Clone, Debug, PartialEq)]
pub struct Translated<R> {
    pub request: R,
    pub order: RegionOrder,
}

/// Resolves names against the listing endpoints, one listing per kind per pass
pub struct ListingResolver {
    api: Arc<dyn CloudApi>,
    paths: ApiPaths,
    cache: Mutex<HashMap<ReferenceKind, Vec<(String, String)>>>,
}

impl ListingResolver {
    pub fn new(api: Arc<dyn CloudApi>, paths: ApiPaths) -> Self {
        Self {
            api,
            paths,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn listing_path(&self, kind: ReferenceKind) -> String {
        match kind {
            ReferenceKind::Vpc => self.paths.vpcs(),
            ReferenceKind::Cluster => self.paths.clusters(),
            ReferenceKind::AllowList => self.paths.allow_lists(),
            ReferenceKind::Integration => self.paths.integrations(),
            ReferenceKind::SoftwareTrack => self.paths.software_tracks(),
        }
    }

    fn cached(&self, kind: ReferenceKind) -> Option<Vec<(String, String)>> {
        self.cache.lock().ok()?.get(&kind).cloned()
    }

    async fn listing(&self, kind: ReferenceKind) -> Result<Vec<(String, String)>> {
        if let Some(entries) = self.cached(kind) {
            return Ok(entries);
        }

        let listing = self.api.fetch(&self.listing_path(kind)).await?;
        let entries = parse_listing(&listing);
        debug!(%kind, entries = entries.len(), "Cached reference listing");

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(kind, entries.clone());
        }
        Ok(entries)
    }
}

/// `(name, id)` pairs from a listing reply. Entries without both are skipped.
fn parse_listing(listing: &Value) -> Vec<(String, String)> {
    let Some(items) = listing.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = item.pointer("/info/id")?.as_str()?;
            let name = item
                .pointer("/spec/name")
                .or_else(|| item.pointer("/info/name"))
                .or_else(|| item.get("name"))?
                .as_str()?;
            Some((name.to_string(), id.to_string()))
        })
        .collect()
}

#[async_trait]
impl ReferenceResolver for ListingResolver {
    async fn lookup(&self, kind: ReferenceKind, name: &str) -> Result<Vec<String>> {
        Ok(self
            .listing(kind)
            .await?
            .into_iter()
            .filter(|(n, _)| n == name)
            .map(|(_, id)| id)
            .collect())
    }
}

/// Resolve a cross reference to a concrete id.
///
/// An id is used as-is; a name must match exactly one listed resource.
/// Anything else is a configuration error naming `field`.
pub async fn resolve_reference(
    resolver: &dyn ReferenceResolver,
    reference: &CrossReference,
    kind: ReferenceKind,
    field: &str,
) -> Result<String> {
    let name = match reference.choice() {
        Some(ReferenceChoice::Id(id)) => return Ok(id.to_string()),
        Some(ReferenceChoice::Name(name)) => name,
        None if reference.is_ambiguous() => {
            return Err(Error::configuration(
                format!("{field}.id / {field}.name"),
                format!("{kind} reference sets both id and name"),
                "Reference the resource by id or by name, not both.",
            ))
        }
        None => {
            return Err(Error::configuration(
                field,
                format!("a {kind} reference is required"),
                format!("Set {field}.id or {field}.name."),
            ))
        }
    };

    let ids = resolver.lookup(kind, name).await?;
    match ids.as_slice() {
        [id] => Ok(id.clone()),
        [] => Err(Error::configuration(
            format!("{field}.name"),
            format!("no {kind} named {name} exists"),
            format!("Create the {kind} first, or reference it by id."),
        )),
        _ => Err(Error::configuration(
            format!("{field}.name"),
            format!("{} resources of type {kind} are named {name}", ids.len()),
            "Reference the resource by id instead.",
        )),
    }
}

/// Resolve an optional reference; an empty reference yields `None`
pub async fn resolve_optional(
    resolver: &dyn ReferenceResolver,
    reference: &CrossReference,
    kind: ReferenceKind,
    field: &str,
) -> Result<Option<String>> {
    if reference.is_empty() {
        return Ok(None);
    }
    resolve_reference(resolver, reference, kind, field)
        .await
        .map(Some)
}

/// Turn collected validation issues into a configuration error
pub fn ensure_valid(result: std::result::Result<(), Vec<SpecValidationError>>) -> Result<()> {
    result.map_err(Error::ConfigurationError)
}


#[cfg(test)]
mod tests {
    use super::testing::StaticResolver;
    use super::*;
    use crate::client::fake::{FakeCloud, Reply};
    use serde_json::json;

    #[tokio::test]
    async fn test_id_reference_skips_lookup() {
        let resolver = StaticResolver::default();
        let id = resolve_reference(
            &resolver,
            &CrossReference::by_id("vpc-1"),
            ReferenceKind::Vpc,
            "regions[0].vpc",
        )
        .await
        .unwrap();
        assert_eq!(id, "vpc-1");
        assert_eq!(resolver.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_name_reference_resolves_or_fails_with_field() {
        let resolver = StaticResolver::default().with(ReferenceKind::Vpc, "prod", "vpc-9");

        let id = resolve_reference(&resolver, &CrossReference::by_name("prod"), ReferenceKind::Vpc, "vpc")
            .await
            .unwrap();
        assert_eq!(id, "vpc-9");

        let err = resolve_reference(&resolver, &CrossReference::by_name("dev"), ReferenceKind::Vpc, "vpc")
            .await
            .unwrap_err();
        match err {
            Error::ConfigurationError(issues) => assert_eq!(issues[0].field, "vpc.name"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let resolver = StaticResolver::default()
            .with(ReferenceKind::AllowList, "office", "a-1")
            .with(ReferenceKind::AllowList, "office", "a-2");
        let err = resolve_reference(
            &resolver,
            &CrossReference::by_name("office"),
            ReferenceKind::AllowList,
            "allow_lists[0]",
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("2 resources"));
    }

    #[tokio::test]
    async fn test_ambiguous_reference_is_rejected_before_lookup() {
        let resolver = StaticResolver::default();
        let reference = CrossReference {
            id: crate::model::Field::Value("vpc-1".into()),
            name: crate::model::Field::Value("prod".into()),
        };
        let err = resolve_reference(&resolver, &reference, ReferenceKind::Vpc, "regions[1].vpc")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("regions[1].vpc.id / regions[1].vpc.name"));
        assert_eq!(resolver.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_optional_reference() {
        let resolver = StaticResolver::default();
        let none = resolve_optional(&resolver, &CrossReference::default(), ReferenceKind::Vpc, "vpc")
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_listing_resolver_caches_per_kind() {
        let fake = Arc::new(FakeCloud::new());
        let paths = ApiPaths::new("acc", "proj");
        fake.on_fetch(
            paths.vpcs(),
            vec![Reply::Json(json!([
                {"info": {"id": "vpc-1"}, "spec": {"name": "prod"}},
                {"info": {"id": "vpc-2"}, "spec": {"name": "dev"}}
            ]))],
        );
        fake.on_fetch(
            paths.software_tracks(),
            vec![Reply::Json(json!([{"info": {"id": "t-1", "name": "Stable"}}]))],
        );

        let resolver = ListingResolver::new(fake.clone(), paths.clone());
        assert_eq!(resolver.lookup(ReferenceKind::Vpc, "prod").await.unwrap(), vec!["vpc-1"]);
        assert_eq!(resolver.lookup(ReferenceKind::Vpc, "dev").await.unwrap(), vec!["vpc-2"]);
        assert_eq!(
            resolver.lookup(ReferenceKind::SoftwareTrack, "Stable").await.unwrap(),
            vec!["t-1"]
        );
        assert_eq!(fake.fetch_count(&paths.vpcs()), 1);
    }
}

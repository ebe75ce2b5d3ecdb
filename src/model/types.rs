//! Shared types used across managed resource specifications

use std::fmt;

use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An optional attribute that distinguishes "never written" from "explicitly null".
///
/// Manifests leave most attributes out; the service then picks a default that has
/// to be read back. `Absent` is the omitted case, `Null` is an explicit `null`/`~`,
/// and `Value` carries what the caller asked for. Use with
/// `#[serde(default, skip_serializing_if = "Field::is_absent")]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Field<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<T> Field<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Field::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// True only when the caller supplied a concrete value
    pub fn is_set(&self) -> bool {
        matches!(self, Field::Value(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Absent => Field::Absent,
            Field::Null => Field::Null,
            Field::Value(v) => Field::Value(v),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Absent => Field::Absent,
            Field::Null => Field::Null,
            Field::Value(v) => Field::Value(f(v)),
        }
    }
}

impl<T: Clone> Field<T> {
    pub fn cloned_option(&self) -> Option<T> {
        self.value().cloned()
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::Null,
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => serializer.serialize_some(v),
            Field::Absent | Field::Null => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from)
    }
}

impl<T: JsonSchema> JsonSchema for Field<T> {
    fn schema_name() -> String {
        format!("Nullable_{}", T::schema_name())
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        gen.subschema_for::<Option<T>>()
    }

    fn is_referenceable() -> bool {
        false
    }
}

/// Cloud provider hosting a cluster or VPC
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudType {
    Aws,
    Gcp,
    Azure,
}

impl fmt::Display for CloudType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudType::Aws => write!(f, "AWS"),
            CloudType::Gcp => write!(f, "GCP"),
            CloudType::Azure => write!(f, "AZURE"),
        }
    }
}

/// Billing tier of a cluster
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterTier {
    Free,
    Paid,
}

impl fmt::Display for ClusterTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterTier::Free => write!(f, "FREE"),
            ClusterTier::Paid => write!(f, "PAID"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterType {
    #[default]
    Synchronous,
    GeoPartitioned,
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterType::Synchronous => write!(f, "SYNCHRONOUS"),
            ClusterType::GeoPartitioned => write!(f, "GEO_PARTITIONED"),
        }
    }
}

/// Failure domain the cluster must survive
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FaultTolerance {
    #[default]
    None,
    Node,
    Zone,
    Region,
}

impl fmt::Display for FaultTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultTolerance::None => write!(f, "NONE"),
            FaultTolerance::Node => write!(f, "NODE"),
            FaultTolerance::Zone => write!(f, "ZONE"),
            FaultTolerance::Region => write!(f, "REGION"),
        }
    }
}

/// Lifecycle state the caller wants a cluster in
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DesiredState {
    #[default]
    Active,
    Paused,
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesiredState::Active => write!(f, "Active"),
            DesiredState::Paused => write!(f, "Paused"),
        }
    }
}

/// A reference to another resource, either by name or by id (never both)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct CrossReference {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub id: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub name: Field<String>,
}

/// The single usable choice inside a [`CrossReference`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceChoice<'a> {
    Id(&'a str),
    Name(&'a str),
}

impl CrossReference {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Field::Value(id.into()),
            name: Field::Absent,
        }
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: Field::Absent,
            name: Field::Value(name.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.id.is_set() && !self.name.is_set()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.id.is_set() && self.name.is_set()
    }

    /// The reference to resolve, or `None` when neither or both sides are set
    pub fn choice(&self) -> Option<ReferenceChoice<'_>> {
        match (self.id.value(), self.name.value()) {
            (Some(id), None) => Some(ReferenceChoice::Id(id)),
            (None, Some(name)) => Some(ReferenceChoice::Name(name)),
            _ => None,
        }
    }
}

/// Compute shape applied to every node in a cluster or replica region
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NodeConfig {
    pub num_cores: u32,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub memory_mb: Field<u32>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub disk_size_gb: Field<u32>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub disk_iops: Field<u32>,
}

/// Node shape as reported by the service after defaults are applied
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct NodeConfigState {
    pub num_cores: u32,
    pub memory_mb: u32,
    pub disk_size_gb: u32,
    #[serde(default)]
    pub disk_iops: Option<u32>,
}

/// Database credentials.
///
/// Either `username`/`password` (applied to both YSQL and YCQL) or the four
/// API-specific fields. Mixing the two groups is rejected.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub username: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub password: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub ysql_username: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub ysql_password: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub ycql_username: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_absent")]
    pub ycql_password: Field<String>,
}

impl Credentials {
    pub fn combined(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Field::Value(username.into()),
            password: Field::Value(password.into()),
            ..Default::default()
        }
    }

    pub fn separate(
        ysql: (impl Into<String>, impl Into<String>),
        ycql: (impl Into<String>, impl Into<String>),
    ) -> Self {
        Self {
            ysql_username: Field::Value(ysql.0.into()),
            ysql_password: Field::Value(ysql.1.into()),
            ycql_username: Field::Value(ycql.0.into()),
            ycql_password: Field::Value(ycql.1.into()),
            ..Default::default()
        }
    }

    /// Names of the combined-group fields that are set
    pub fn combined_fields_set(&self) -> Vec<&'static str> {
        let mut set = Vec::new();
        if self.username.is_set() {
            set.push("username");
        }
        if self.password.is_set() {
            set.push("password");
        }
        set
    }

    /// Names of the per-API fields that are set
    pub fn separate_fields_set(&self) -> Vec<&'static str> {
        [
            ("ysql_username", &self.ysql_username),
            ("ysql_password", &self.ysql_password),
            ("ycql_username", &self.ycql_username),
            ("ycql_password", &self.ycql_password),
        ]
        .into_iter()
        .filter(|(_, f)| f.is_set())
        .map(|(name, _)| name)
        .collect()
    }

    /// YSQL and YCQL username/password pairs, if the credentials are complete
    pub fn resolved(&self) -> Option<((String, String), (String, String))> {
        if let (Some(u), Some(p)) = (self.username.value(), self.password.value()) {
            let pair = (u.clone(), p.clone());
            return Some((pair.clone(), pair));
        }
        match (
            self.ysql_username.value(),
            self.ysql_password.value(),
            self.ycql_username.value(),
            self.ycql_password.value(),
        ) {
            (Some(yu), Some(yp), Some(cu), Some(cp)) => {
                Some(((yu.clone(), yp.clone()), (cu.clone(), cp.clone())))
            }
            _ => None,
        }
    }
}

//! Capabilities - tools, resources and prompts exposed by backends
//!
//! Backends report capabilities under their own local names. The router
//! publishes them under `owner__local`; internally that is always the tagged
//! [`PublicName`] record and only becomes a string at the protocol boundary.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator between owner and local name in a public name
pub const NAME_SEPARATOR: &str = "__";

/// Kind of capability
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 3] = [Self::Tool, Self::Resource, Self::Prompt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Resource => "resource",
            Self::Prompt => "prompt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tool" => Some(Self::Tool),
            "resource" => Some(Self::Resource),
            "prompt" => Some(Self::Prompt),
            _ => None,
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespaced capability name: `{owner, local}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicName {
    pub owner: String,
    pub local: String,
}

impl PublicName {
    pub fn new(owner: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            local: local.into(),
        }
    }

    /// Resolve a wire name against the set of known owners
    ///
    /// The longest owner `o` for which the name starts with `o__` wins, so a
    /// local name that itself contains `__` still splits deterministically.
    /// Returns `None` when no owner matches or the local part is empty.
    pub fn resolve<'a, I>(public: &str, owners: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        owners
            .into_iter()
            .filter(|owner| !owner.is_empty())
            .filter_map(|owner| {
                let local = public
                    .strip_prefix(owner)?
                    .strip_prefix(NAME_SEPARATOR)?;
                (!local.is_empty()).then_some((owner, local))
            })
            .max_by_key(|(owner, _)| owner.len())
            .map(|(owner, local)| Self::new(owner, local))
    }
}

impl std::fmt::Display for PublicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.owner, NAME_SEPARATOR, self.local)
    }
}

impl Serialize for PublicName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicName {
    /// Without the registry there is no owner set; split on the first separator
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.split_once(NAME_SEPARATOR)
            .filter(|(owner, local)| !owner.is_empty() && !local.is_empty())
            .map(|(owner, local)| PublicName::new(owner, local))
            .ok_or_else(|| serde::de::Error::custom(format!("not a public name: {}", raw)))
    }
}

/// One capability as reported by a backend, cached verbatim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    /// Backend-local name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Input schema (tools), argument list (prompts) or resource metadata
    #[serde(default)]
    pub schema: serde_json::Value,

    /// Resource URI (resources only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Complete protocol object as received from the backend
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            schema: serde_json::Value::Null,
            uri: None,
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }
}

/// Negotiated capability catalog of a single backend
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CapabilitySnapshot {
    #[serde(default)]
    pub tools: Vec<CapabilityDescriptor>,
    #[serde(default)]
    pub resources: Vec<CapabilityDescriptor>,
    #[serde(default)]
    pub prompts: Vec<CapabilityDescriptor>,
}

impl CapabilitySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_count(&self) -> usize {
        self.tools.len() + self.resources.len() + self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    pub fn of_kind(&self, kind: CapabilityKind) -> &[CapabilityDescriptor] {
        match kind {
            CapabilityKind::Tool => &self.tools,
            CapabilityKind::Resource => &self.resources,
            CapabilityKind::Prompt => &self.prompts,
        }
    }

    pub fn of_kind_mut(&mut self, kind: CapabilityKind) -> &mut Vec<CapabilityDescriptor> {
        match kind {
            CapabilityKind::Tool => &mut self.tools,
            CapabilityKind::Resource => &mut self.resources,
            CapabilityKind::Prompt => &mut self.prompts,
        }
    }

    /// All descriptors paired with their kind
    pub fn iter(&self) -> impl Iterator<Item = (CapabilityKind, &CapabilityDescriptor)> {
        CapabilityKind::ALL
            .into_iter()
            .flat_map(move |kind| self.of_kind(kind).iter().map(move |d| (kind, d)))
    }

    pub fn find(&self, kind: CapabilityKind, local: &str) -> Option<&CapabilityDescriptor> {
        self.of_kind(kind).iter().find(|d| d.name == local)
    }

    /// Per-kind counts as reported in status
    pub fn counts(&self) -> CapabilityCounts {
        CapabilityCounts {
            tools: self.tools.len(),
            resources: self.resources.len(),
            prompts: self.prompts.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapabilityCounts {
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
}

/// Derived catalog record; never stored on its own
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityEntry {
    pub public_name: PublicName,
    pub kind: CapabilityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl CapabilityEntry {
    pub fn from_descriptor(
        owner: &str,
        kind: CapabilityKind,
        descriptor: &CapabilityDescriptor,
    ) -> Self {
        Self {
            public_name: PublicName::new(owner, &descriptor.name),
            kind,
            description: descriptor.description.clone(),
            schema: descriptor.schema.clone(),
            uri: descriptor.uri.clone(),
            raw: descriptor.raw.clone(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.public_name.owner
    }

    pub fn local_name(&self) -> &str {
        &self.public_name.local
    }
}

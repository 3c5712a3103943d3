//! Component registry: the fixed PTL tag vocabulary and its prop schemas
//!
//! The registry is the containment boundary for user-authored markup. Every
//! tag a template uses must be registered here, and every attribute must
//! validate against the tag's `PropSchema`, or compilation fails. Nothing
//! outside this catalog can reach the renderer.

use crate::types::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Closed set of prop types, validated exhaustively at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropType {
    String,
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Boolean,
    Enum { values: Vec<String> },
}

/// Contract for one component attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropSchema {
    #[serde(flatten)]
    pub prop_type: PropType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PropSchema {
    /// Coerce a raw attribute string into a typed value, or explain why it
    /// does not fit the schema.
    pub fn coerce(&self, raw: &str) -> std::result::Result<Value, String> {
        match &self.prop_type {
            PropType::String => Ok(Value::String(raw.to_string())),
            PropType::Boolean => match raw {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(format!("expected 'true' or 'false', got '{}'", raw)),
            },
            PropType::Number { min, max } => {
                let n: f64 = raw
                    .parse()
                    .map_err(|_| format!("expected a number, got '{}'", raw))?;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("value {} is below minimum {}", n, min));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("value {} is above maximum {}", n, max));
                    }
                }
                Ok(Value::Number(n))
            }
            PropType::Enum { values } => {
                if values.iter().any(|v| v == raw) {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err(format!(
                        "'{}' is not one of [{}]",
                        raw,
                        values.join(", ")
                    ))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentCategory {
    Layout,
    Visual,
    Data,
    Conditional,
    Interactive,
    Action,
    Html,
}

impl fmt::Display for ComponentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentCategory::Layout => "layout",
            ComponentCategory::Visual => "visual",
            ComponentCategory::Data => "data",
            ComponentCategory::Conditional => "conditional",
            ComponentCategory::Interactive => "interactive",
            ComponentCategory::Action => "action",
            ComponentCategory::Html => "html",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRegistration {
    pub tag: String,
    pub category: ComponentCategory,
    pub props: BTreeMap<String, PropSchema>,
}

impl ComponentRegistration {
    pub fn prop(&self, name: &str) -> Option<&PropSchema> {
        self.props.get(name)
    }
}

/// One row of the catalog export consumed by documentation tooling.
pub type CatalogEntry = ComponentRegistration;

/// The immutable tag catalog, built once at startup.
pub struct Registry {
    components: HashMap<String, ComponentRegistration>,
}

impl Registry {
    pub fn get(&self, tag: &str) -> Option<&ComponentRegistration> {
        self.components.get(tag)
    }

    pub fn allowed_tags(&self) -> BTreeSet<String> {
        self.components.keys().cloned().collect()
    }

    /// Stable enumeration of every registration, sorted by tag name.
    pub fn catalog(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<_> = self.components.values().cloned().collect();
        entries.sort_by(|a, b| a.tag.cmp(&b.tag));
        entries
    }

    /// The standard PTL vocabulary.
    pub fn standard() -> Self {
        let mut builder = RegistryBuilder::default();

        // Layout
        builder
            .component("FlexRow", ComponentCategory::Layout)
            .enum_prop("gap", &["none", "sm", "md", "lg"], Some("md"))
            .enum_prop("align", &["start", "center", "end"], Some("start"));
        builder
            .component("FlexColumn", ComponentCategory::Layout)
            .enum_prop("gap", &["none", "sm", "md", "lg"], Some("md"))
            .enum_prop("align", &["start", "center", "end"], Some("start"));
        builder
            .component("GridBox", ComponentCategory::Layout)
            .number_prop("columns", Some(1.0), Some(6.0), Some(2.0))
            .enum_prop("gap", &["none", "sm", "md", "lg"], Some("md"));
        builder
            .component("CenteredBox", ComponentCategory::Layout)
            .enum_prop("width", &["narrow", "normal", "wide"], Some("normal"));
        builder
            .component("SplitLayout", ComponentCategory::Layout)
            .enum_prop("ratio", &["1:1", "1:2", "2:1"], Some("1:1"));

        // Visual
        builder
            .component("ProfilePhoto", ComponentCategory::Visual)
            .enum_prop("size", &["sm", "md", "lg"], Some("md"))
            .enum_prop("shape", &["circle", "square"], Some("circle"));
        builder.component("DisplayName", ComponentCategory::Visual);
        builder.component("UserHandle", ComponentCategory::Visual);
        builder.component("Bio", ComponentCategory::Visual);
        builder
            .component("Heading", ComponentCategory::Visual)
            .number_prop("level", Some(1.0), Some(3.0), Some(2.0));
        builder
            .component("StyledText", ComponentCategory::Visual)
            .enum_prop("tone", &["muted", "accent", "warning"], Some("muted"));

        // Data
        builder
            .component("BlogPosts", ComponentCategory::Data)
            .number_prop("limit", Some(1.0), Some(20.0), Some(5.0));
        builder
            .component("Guestbook", ComponentCategory::Data)
            .number_prop("limit", Some(1.0), Some(20.0), Some(10.0));
        builder
            .component("FriendList", ComponentCategory::Data)
            .number_prop("limit", Some(1.0), Some(50.0), Some(12.0));
        builder
            .component("ImageGallery", ComponentCategory::Data)
            .number_prop("limit", Some(1.0), Some(30.0), Some(9.0))
            .number_prop("columns", Some(1.0), Some(6.0), Some(3.0));
        builder.component("PostCount", ComponentCategory::Data);
        builder.component("FriendCount", ComponentCategory::Data);

        // Conditional
        builder
            .component("Show", ComponentCategory::Conditional)
            .string_required("when");
        builder.component("Choose", ComponentCategory::Conditional);
        builder
            .component("When", ComponentCategory::Conditional)
            .string_required("condition");
        builder.component("Otherwise", ComponentCategory::Conditional);
        builder.component("IfOwner", ComponentCategory::Conditional);
        builder.component("IfVisitor", ComponentCategory::Conditional);

        // Interactive / state
        builder
            .component("Var", ComponentCategory::Interactive)
            .string_required("name")
            .enum_required("type", &["string", "number", "boolean", "array"])
            .string_prop("initial");
        builder
            .component("Button", ComponentCategory::Interactive)
            .string_required("label");
        builder.component("OnClick", ComponentCategory::Interactive);
        builder
            .component("ForEach", ComponentCategory::Interactive)
            .string_required("source")
            .string_required("item")
            .string_prop("index");

        // Actions
        builder
            .component("Set", ComponentCategory::Action)
            .string_required("var")
            .string_required("expr");
        builder
            .component("Toggle", ComponentCategory::Action)
            .string_required("var");
        builder
            .component("Increment", ComponentCategory::Action)
            .string_required("var")
            .number_prop("min", None, None, None)
            .number_prop("max", None, None, None);
        builder
            .component("Decrement", ComponentCategory::Action)
            .string_required("var")
            .number_prop("min", None, None, None)
            .number_prop("max", None, None, None);
        builder
            .component("Filter", ComponentCategory::Action)
            .string_required("source")
            .string_required("target")
            .string_required("where");
        builder
            .component("Sort", ComponentCategory::Action)
            .string_required("source")
            .string_required("target")
            .string_required("by")
            .enum_prop("order", &["asc", "desc"], Some("asc"));
        builder
            .component("Transform", ComponentCategory::Action)
            .string_required("source")
            .string_required("target")
            .string_required("expr");
        builder
            .component("Find", ComponentCategory::Action)
            .string_required("source")
            .string_required("target")
            .string_required("where");
        builder
            .component("Count", ComponentCategory::Action)
            .string_required("source")
            .string_required("target")
            .string_prop("where");
        builder
            .component("Sum", ComponentCategory::Action)
            .string_required("source")
            .string_required("target")
            .string_prop("property");
        builder
            .component("Get", ComponentCategory::Action)
            .string_required("source")
            .string_required("target")
            .string_required("at");

        // Inert HTML allow-list. Only schema-checked attributes pass through.
        for tag in [
            "div", "span", "p", "h1", "h2", "h3", "ul", "ol", "li", "br", "hr", "em",
            "strong", "blockquote",
        ] {
            builder
                .component(tag, ComponentCategory::Html)
                .string_prop("class");
        }
        builder
            .component("a", ComponentCategory::Html)
            .string_prop("class")
            .string_required("href");
        builder
            .component("img", ComponentCategory::Html)
            .string_prop("class")
            .string_required("src")
            .string_prop("alt");

        Registry {
            components: builder.finish(),
        }
    }
}

#[derive(Default)]
struct RegistryBuilder {
    components: HashMap<String, ComponentRegistration>,
    current: Option<String>,
}

impl RegistryBuilder {
    fn component(&mut self, tag: &str, category: ComponentCategory) -> &mut Self {
        self.components.insert(
            tag.to_string(),
            ComponentRegistration {
                tag: tag.to_string(),
                category,
                props: BTreeMap::new(),
            },
        );
        self.current = Some(tag.to_string());
        self
    }

    fn add(&mut self, name: &str, schema: PropSchema) -> &mut Self {
        let tag = self.current.as_ref().expect("component() before prop");
        self.components
            .get_mut(tag)
            .unwrap()
            .props
            .insert(name.to_string(), schema);
        self
    }

    fn string_prop(&mut self, name: &str) -> &mut Self {
        self.add(
            name,
            PropSchema {
                prop_type: PropType::String,
                required: false,
                default: None,
            },
        )
    }

    fn string_required(&mut self, name: &str) -> &mut Self {
        self.add(
            name,
            PropSchema {
                prop_type: PropType::String,
                required: true,
                default: None,
            },
        )
    }

    fn number_prop(
        &mut self,
        name: &str,
        min: Option<f64>,
        max: Option<f64>,
        default: Option<f64>,
    ) -> &mut Self {
        self.add(
            name,
            PropSchema {
                prop_type: PropType::Number { min, max },
                required: false,
                default: default.map(Value::Number),
            },
        )
    }

    fn enum_prop(&mut self, name: &str, values: &[&str], default: Option<&str>) -> &mut Self {
        self.add(
            name,
            PropSchema {
                prop_type: PropType::Enum {
                    values: values.iter().map(|s| s.to_string()).collect(),
                },
                required: false,
                default: default.map(|d| Value::String(d.to_string())),
            },
        )
    }

    fn enum_required(&mut self, name: &str, values: &[&str]) -> &mut Self {
        self.add(
            name,
            PropSchema {
                prop_type: PropType::Enum {
                    values: values.iter().map(|s| s.to_string()).collect(),
                },
                required: true,
                default: None,
            },
        )
    }

    fn finish(self) -> HashMap<String, ComponentRegistration> {
        self.components
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_unknown() {
        let registry = Registry::standard();
        assert!(registry.get("ProfilePhoto").is_some());
        assert!(registry.get("ScriptTag").is_none());
        assert!(registry.get("Marquee").is_none());
    }

    #[test]
    fn test_number_coercion_and_range() {
        let registry = Registry::standard();
        let schema = registry.get("GridBox").unwrap().prop("columns").unwrap();
        assert_eq!(schema.coerce("3").unwrap(), Value::Number(3.0));
        assert!(schema.coerce("9").is_err());
        assert!(schema.coerce("wide").is_err());
    }

    #[test]
    fn test_enum_coercion() {
        let registry = Registry::standard();
        let schema = registry.get("ProfilePhoto").unwrap().prop("size").unwrap();
        assert_eq!(schema.coerce("lg").unwrap(), Value::String("lg".into()));
        let err = schema.coerce("huge").unwrap_err();
        assert!(err.contains("sm"));
    }

    #[test]
    fn test_boolean_coercion() {
        let schema = PropSchema {
            prop_type: PropType::Boolean,
            required: false,
            default: None,
        };
        assert_eq!(schema.coerce("true").unwrap(), Value::Bool(true));
        assert_eq!(schema.coerce("false").unwrap(), Value::Bool(false));
        assert!(schema.coerce("yes").is_err());
    }

    #[test]
    fn test_catalog_is_sorted_and_complete() {
        let registry = Registry::standard();
        let catalog = registry.catalog();
        assert_eq!(catalog.len(), registry.allowed_tags().len());
        let tags: Vec<_> = catalog.iter().map(|e| e.tag.clone()).collect();
        let mut sorted = tags.clone();
        sorted.sort();
        assert_eq!(tags, sorted);
    }

    #[test]
    fn test_catalog_serializes() {
        let registry = Registry::standard();
        let json = serde_json::to_string(&registry.catalog()).unwrap();
        assert!(json.contains("ProfilePhoto"));
        assert!(json.contains("required"));
    }
}

//! Rule Configuration Model
//!
//! Per-namespace parsing rules, type maps and default-value remaps, built
//! from the rules JSON document.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::ast::TranslationUnit;
use crate::checker::IncludedChecker;
use crate::error::{GeneratorError, Result};
use crate::overlay::{MetaEntity, MetaEntityRef};

/// Native spelling of the implicitly mapped string type.
pub const STRING_TYPE: &str = "char const*";

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE MAPS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct TypeMapSpec {
    #[serde(rename = "type")]
    pub cpp_type: String,
    #[serde(default)]
    pub ctype: Option<String>,
    #[serde(default)]
    pub cstype: Option<String>,
    pub ptype: String,
    #[serde(default)]
    pub cpp_to_c: Option<String>,
    #[serde(default)]
    pub c_to_cpp: Option<String>,
    #[serde(default)]
    pub pinvoke_to_cs: Option<String>,
    #[serde(default)]
    pub cs_to_pinvoke: Option<String>,
    #[serde(default)]
    pub marshal_attribute: Option<String>,
    #[serde(default)]
    pub is_value_type: bool,
}

/// How one native type crosses the native, bridge and managed layers.
///
/// Conversion templates contain a `{value}` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMap {
    pub cpp_type: String,
    /// Type used in bridge function signatures.
    pub c_type: String,
    /// Type exposed on the managed API.
    pub cs_type: String,
    /// Type used in managed extern declarations.
    pub pinvoke_type: String,
    pub is_value_type: bool,
    pub cpp_to_c: Option<String>,
    pub c_to_cpp: Option<String>,
    pub pinvoke_to_cs: Option<String>,
    pub cs_to_pinvoke: Option<String>,
    pub marshal_attribute: Option<String>,
}

impl From<TypeMapSpec> for TypeMap {
    fn from(spec: TypeMapSpec) -> Self {
        let c_type = spec
            .ctype
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| spec.cpp_type.clone());
        let cs_type = spec
            .cstype
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| spec.ptype.clone());

        let mut map = TypeMap {
            cpp_type: spec.cpp_type,
            c_type,
            cs_type,
            pinvoke_type: spec.ptype,
            is_value_type: spec.is_value_type,
            cpp_to_c: spec.cpp_to_c,
            c_to_cpp: spec.c_to_cpp,
            pinvoke_to_cs: spec.pinvoke_to_cs,
            cs_to_pinvoke: spec.cs_to_pinvoke,
            marshal_attribute: spec.marshal_attribute,
        };
        if map.cs_type == "string" {
            map.apply_string_conversion();
        }
        map
    }
}

impl TypeMap {
    /// The map every namespace gets for `char const*`.
    pub fn string_map() -> Self {
        TypeMap::from(TypeMapSpec {
            cpp_type: STRING_TYPE.to_string(),
            ctype: None,
            cstype: Some("string".to_string()),
            ptype: "string".to_string(),
            cpp_to_c: Some("{value}".to_string()),
            c_to_cpp: None,
            pinvoke_to_cs: None,
            cs_to_pinvoke: None,
            marshal_attribute: None,
            is_value_type: true,
        })
    }

    /// Route managed strings through the runtime string converter, layered on
    /// top of whatever templates the map already declares.
    fn apply_string_conversion(&mut self) {
        let holder = if self.cpp_type == STRING_TYPE {
            "MonoStringHolder"
        } else {
            self.cpp_type.as_str()
        };
        let from_managed = format!("CSharpConverter<MonoString>::FromCSharp<{}>({{value}})", holder);

        self.c_type = "MonoString*".to_string();
        self.cpp_to_c = Some(format!(
            "CSharpConverter<MonoString>::ToCSharp({})",
            self.cpp_to_c.as_deref().unwrap_or("{value}")
        ));
        self.c_to_cpp = Some(match self.c_to_cpp.as_deref() {
            Some(template) => template.replace("{value}", &from_managed),
            None => from_managed,
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT VALUES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DefaultValueSpec {
    Literal(String),
    Detailed {
        value: String,
        #[serde(default, rename = "const")]
        is_const: bool,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// RULES
// ═══════════════════════════════════════════════════════════════════════════════

/// One root directory and the filter applied to files found below it.
#[derive(Debug, Clone)]
pub struct ParsePath {
    pub path: PathBuf,
    pub checker: IncludedChecker,
}

#[derive(Debug)]
pub struct NamespaceRules {
    pub default_namespace: String,
    pub parse_paths: Vec<ParsePath>,
    /// Classes that may appear as managed base classes.
    pub inheritable: IncludedChecker,
    /// Declared names eligible for export; empty means all.
    pub symbol_checker: IncludedChecker,
    pub type_maps: HashMap<String, TypeMap>,
    /// Parsed headers keyed by absolute path.
    pub parsed: BTreeMap<PathBuf, TranslationUnit>,
    pub api_root: MetaEntityRef,
}

impl NamespaceRules {
    pub fn new(default_namespace: &str) -> Self {
        let mut type_maps = HashMap::new();
        type_maps.insert(STRING_TYPE.to_string(), TypeMap::string_map());
        NamespaceRules {
            default_namespace: default_namespace.to_string(),
            parse_paths: Vec::new(),
            inheritable: IncludedChecker::new(),
            symbol_checker: IncludedChecker::new(),
            type_maps,
            parsed: BTreeMap::new(),
            api_root: MetaEntity::root(),
        }
    }

    /// Later maps for the same native type replace earlier ones.
    pub fn add_type_map(&mut self, map: TypeMap) {
        self.type_maps.insert(map.cpp_type.clone(), map);
    }

    pub fn type_map(&self, name: &str) -> Option<&TypeMap> {
        self.type_maps.get(name)
    }

    pub fn is_inheritable(&self, symbol_name: &str) -> bool {
        self.inheritable.is_included(symbol_name)
    }

    /// Drop the overlay tree and start a fresh one.
    pub fn reset_overlay(&mut self) {
        self.api_root = MetaEntity::root();
    }
}

/// Module-wide options shared by all namespaces.
#[derive(Debug, Clone, Default)]
pub struct GeneratorSettings {
    pub module_name: String,
    /// Extra initializers invoked after the internal calls are registered.
    pub mono_calls: Vec<String>,
    pub default_value_remaps: HashMap<String, String>,
    pub forced_constants: HashSet<String>,
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl GeneratorSettings {
    pub fn is_forced_constant(&self, value: &str) -> bool {
        self.forced_constants.contains(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the settings and per-namespace rules from a rules document.
///
/// Parse paths are resolved against `source_dir`.
pub fn load_rules(
    document: &Value,
    source_dir: &Path,
) -> Result<(GeneratorSettings, Vec<NamespaceRules>)> {
    let root = document
        .as_object()
        .ok_or_else(|| GeneratorError::Config("rules document must be a JSON object".into()))?;

    let mut settings = GeneratorSettings {
        module_name: root
            .get("module")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        source_dir: source_dir.to_path_buf(),
        ..GeneratorSettings::default()
    };

    if let Some(calls) = root
        .get("initialization")
        .and_then(|init| init.get("mono-calls"))
    {
        settings.mono_calls = serde_json::from_value(calls.clone())?;
    }

    if let Some(defaults) = root.get("default-values") {
        let defaults: BTreeMap<String, DefaultValueSpec> =
            serde_json::from_value(defaults.clone())?;
        for (name, spec) in defaults {
            let value = match spec {
                DefaultValueSpec::Literal(value) => value,
                DefaultValueSpec::Detailed { value, is_const } => {
                    if is_const {
                        settings.forced_constants.insert(value.clone());
                    }
                    value
                }
            };
            settings.default_value_remaps.insert(name, value);
        }
    }

    let mut rules = Vec::new();
    if let Some(namespaces) = root.get("namespaces") {
        let namespaces = namespaces
            .as_object()
            .ok_or_else(|| GeneratorError::Config("'namespaces' must be an object".into()))?;
        for (name, spec) in namespaces {
            rules.push(load_namespace(name, spec, source_dir)?);
        }
    }

    Ok((settings, rules))
}

fn load_namespace(name: &str, spec: &Value, source_dir: &Path) -> Result<NamespaceRules> {
    let mut rules = NamespaceRules::new(name);
    let empty = Map::new();
    let spec = spec.as_object().unwrap_or(&empty);

    if let Some(inheritable) = spec.get("inheritable") {
        rules.inheritable = IncludedChecker::from_value(inheritable)?;
    }

    if let Some(parse) = spec.get("parse") {
        let parse = parse.as_object().ok_or_else(|| {
            GeneratorError::Config(format!("namespace '{}': 'parse' must be an object", name))
        })?;
        for (dir, checker) in parse {
            rules.parse_paths.push(ParsePath {
                path: source_dir.join(dir),
                checker: IncludedChecker::from_value(checker)?,
            });
        }
    }

    if let Some(symbols) = spec.get("symbols") {
        rules.symbol_checker = IncludedChecker::from_value(symbols)?;
    }

    if let Some(typemaps) = spec.get("typemaps") {
        let specs: Vec<TypeMapSpec> = serde_json::from_value(typemaps.clone())?;
        for map in specs {
            rules.add_type_map(TypeMap::from(map));
        }
    }
    // The implicit string map is applied last and wins over a user map for
    // the same native type.
    rules.add_type_map(TypeMap::string_map());

    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_object_document_is_rejected() {
        let err = load_rules(&json!([1, 2]), Path::new("/src")).unwrap_err();
        assert!(matches!(err, GeneratorError::Config(_)));
    }

    #[test]
    fn test_string_map_is_doctored() {
        let map = TypeMap::string_map();
        assert_eq!(map.c_type, "MonoString*");
        assert_eq!(map.cs_type, "string");
        assert_eq!(
            map.cpp_to_c.as_deref(),
            Some("CSharpConverter<MonoString>::ToCSharp({value})")
        );
        assert_eq!(
            map.c_to_cpp.as_deref(),
            Some("CSharpConverter<MonoString>::FromCSharp<MonoStringHolder>({value})")
        );
    }

    #[test]
    fn test_user_string_map_layers_existing_template() {
        let map = TypeMap::from(TypeMapSpec {
            cpp_type: "Urho3D::String".to_string(),
            ctype: None,
            cstype: None,
            ptype: "string".to_string(),
            cpp_to_c: Some("{value}.CString()".to_string()),
            c_to_cpp: Some("Urho3D::String({value})".to_string()),
            pinvoke_to_cs: None,
            cs_to_pinvoke: None,
            marshal_attribute: None,
            is_value_type: true,
        });
        assert_eq!(
            map.cpp_to_c.as_deref(),
            Some("CSharpConverter<MonoString>::ToCSharp({value}.CString())")
        );
        assert_eq!(
            map.c_to_cpp.as_deref(),
            Some("Urho3D::String(CSharpConverter<MonoString>::FromCSharp<Urho3D::String>({value}))")
        );
    }

    #[test]
    fn test_defaults_for_missing_type_names() {
        let map = TypeMap::from(TypeMapSpec {
            cpp_type: "Urho3D::StringHash".to_string(),
            ctype: None,
            cstype: None,
            ptype: "uint".to_string(),
            cpp_to_c: Some("{value}.Value()".to_string()),
            c_to_cpp: None,
            pinvoke_to_cs: None,
            cs_to_pinvoke: None,
            marshal_attribute: None,
            is_value_type: true,
        });
        assert_eq!(map.c_type, "Urho3D::StringHash");
        assert_eq!(map.cs_type, "uint");
    }

    #[test]
    fn test_load_full_document() {
        let doc = json!({
            "module": "Urho3D",
            "initialization": { "mono-calls": ["RegisterCustomCalls"] },
            "default-values": {
                "Foo::kDefault": { "value": "42", "const": true },
                "M_MAX_UNSIGNED": "uint.MaxValue"
            },
            "namespaces": {
                "Urho3D": {
                    "inheritable": ["Urho3D::Object"],
                    "parse": { "Urho3D": ["*.h", "-Private/*"] },
                    "typemaps": [
                        { "type": "Urho3D::StringHash", "ptype": "uint", "cpp_to_c": "{value}.Value()" }
                    ]
                }
            }
        });
        let (settings, rules) = load_rules(&doc, Path::new("/src")).unwrap();

        assert_eq!(settings.module_name, "Urho3D");
        assert_eq!(settings.mono_calls, vec!["RegisterCustomCalls".to_string()]);
        assert_eq!(settings.default_value_remaps["Foo::kDefault"], "42");
        assert_eq!(settings.default_value_remaps["M_MAX_UNSIGNED"], "uint.MaxValue");
        assert!(settings.is_forced_constant("42"));
        assert!(!settings.is_forced_constant("uint.MaxValue"));

        assert_eq!(rules.len(), 1);
        let ns = &rules[0];
        assert_eq!(ns.default_namespace, "Urho3D");
        assert_eq!(ns.parse_paths[0].path, PathBuf::from("/src/Urho3D"));
        assert!(ns.parse_paths[0].checker.is_included("Scene/Node.h"));
        assert!(ns.is_inheritable("Urho3D::Object"));
        assert!(!ns.is_inheritable("Urho3D::Node"));
        assert!(ns.type_map("Urho3D::StringHash").is_some());
        assert!(ns.type_map(STRING_TYPE).is_some());
    }

    #[test]
    fn test_implicit_string_map_overrides_user_map() {
        let doc = json!({
            "module": "M",
            "namespaces": {
                "M": {
                    "parse": {},
                    "typemaps": [ { "type": "char const*", "ptype": "IntPtr" } ]
                }
            }
        });
        let (_, rules) = load_rules(&doc, Path::new("/src")).unwrap();
        assert_eq!(rules[0].type_map(STRING_TYPE).unwrap().cs_type, "string");
    }
}

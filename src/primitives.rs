//! Framework primitive catalog
//!
//! A static, per-language catalog of the named functions, decorators,
//! annotations, and macros developers wrap or configure, organised as
//! language, then framework, then category, down to names. Detectors consume the catalog
//! for semantic anchoring; incremental re-scans rely on primitive identity
//! being stable, so the catalog is initialise-once with an explicit reset
//! for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use crate::lang::Language;

/// Per-framework catalog: category to primitive names
pub type FrameworkCatalog = BTreeMap<&'static str, Vec<&'static str>>;

/// The static primitive catalog
pub struct PrimitiveRegistry {
    by_language: BTreeMap<Language, BTreeMap<&'static str, FrameworkCatalog>>,
}

impl PrimitiveRegistry {
    /// Creates an empty catalog
    pub fn new() -> Self {
        Self {
            by_language: BTreeMap::new(),
        }
    }

    /// The bundled catalog
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.add(
            Language::TypeScript,
            "react",
            &[
                ("state", &["useState", "useReducer", "useContext", "useRef"]),
                (
                    "lifecycle",
                    &["useEffect", "useLayoutEffect", "useMemo", "useCallback"],
                ),
                ("routing", &["useNavigate", "useParams", "useLocation"]),
            ],
        );
        registry.add(
            Language::TypeScript,
            "angular",
            &[
                ("di", &["Injectable", "Inject", "inject"]),
                ("components", &["Component", "Directive", "Pipe"]),
                ("lifecycle", &["ngOnInit", "ngOnDestroy", "ngOnChanges"]),
            ],
        );
        registry.add(
            Language::TypeScript,
            "express",
            &[
                ("routing", &["Router", "route", "use"]),
                ("middleware", &["json", "urlencoded", "static"]),
            ],
        );
        registry.add(
            Language::JavaScript,
            "express",
            &[
                ("routing", &["Router", "route", "use"]),
                ("middleware", &["json", "urlencoded", "static"]),
            ],
        );
        registry.add(
            Language::Python,
            "django",
            &[
                ("routing", &["path", "re_path", "include"]),
                ("views", &["login_required", "permission_required"]),
                ("models", &["Model", "ForeignKey", "ManyToManyField"]),
            ],
        );
        registry.add(
            Language::Python,
            "fastapi",
            &[
                ("routing", &["APIRouter", "Depends", "Query", "Path"]),
                ("middleware", &["middleware", "add_middleware"]),
            ],
        );
        registry.add(
            Language::Python,
            "flask",
            &[("routing", &["route", "Blueprint", "before_request"])],
        );
        registry.add(
            Language::Java,
            "spring",
            &[
                (
                    "di",
                    &["Autowired", "Component", "Service", "Repository", "Bean"],
                ),
                (
                    "routing",
                    &[
                        "RestController",
                        "RequestMapping",
                        "GetMapping",
                        "PostMapping",
                    ],
                ),
                ("security", &["PreAuthorize", "Secured"]),
            ],
        );
        registry.add(
            Language::CSharp,
            "aspnet",
            &[
                ("routing", &["ApiController", "HttpGet", "HttpPost", "Route"]),
                ("di", &["FromServices", "FromBody", "FromQuery"]),
                ("security", &["Authorize", "AllowAnonymous"]),
            ],
        );
        registry.add(
            Language::Php,
            "laravel",
            &[
                ("routing", &["Route", "middleware", "group"]),
                ("models", &["Model", "hasMany", "belongsTo"]),
            ],
        );
        registry.add(
            Language::Go,
            "gin",
            &[("routing", &["Default", "Group", "GET", "POST", "Use"])],
        );
        registry.add(
            Language::Rust,
            "axum",
            &[
                ("routing", &["Router", "get", "post", "put", "delete"]),
                ("extractors", &["State", "Path", "Query", "Json"]),
            ],
        );
        registry.add(
            Language::Rust,
            "actix",
            &[("routing", &["App", "web", "scope", "service"])],
        );

        registry
    }

    fn add(
        &mut self,
        language: Language,
        framework: &'static str,
        categories: &[(&'static str, &[&'static str])],
    ) {
        let catalog: FrameworkCatalog = categories
            .iter()
            .map(|(cat, names)| (*cat, names.to_vec()))
            .collect();
        self.by_language
            .entry(language)
            .or_default()
            .insert(framework, catalog);
    }

    /// All primitive names known for a language, across frameworks and
    /// categories
    pub fn primitives_for(&self, language: Language) -> BTreeSet<&'static str> {
        self.by_language
            .get(&language)
            .into_iter()
            .flat_map(|frameworks| frameworks.values())
            .flat_map(|catalog| catalog.values())
            .flatten()
            .copied()
            .collect()
    }

    /// Framework names known for a language
    pub fn frameworks_for(&self, language: Language) -> Vec<&'static str> {
        self.by_language
            .get(&language)
            .map(|frameworks| frameworks.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Locates the (framework, category) pair a primitive name belongs to
    pub fn locate(&self, name: &str, language: Language) -> Option<(&'static str, &'static str)> {
        let frameworks = self.by_language.get(&language)?;
        for (framework, catalog) in frameworks {
            for (category, names) in catalog {
                if names.iter().any(|n| *n == name) {
                    return Some((*framework, *category));
                }
            }
        }
        None
    }

    /// Heuristic: does `name` follow the language's primitive naming
    /// conventions?
    ///
    /// Catches hook-style names in TypeScript/JavaScript, decorator and
    /// annotation prefixes, and common factory verb prefixes.
    pub fn looks_like_primitive(&self, name: &str, language: Language) -> bool {
        if self.locate(name, language).is_some() {
            return true;
        }
        if matches!(language, Language::TypeScript | Language::JavaScript) {
            if let Some(rest) = name.strip_prefix("use") {
                if rest.chars().next().is_some_and(char::is_uppercase) {
                    return true;
                }
            }
        }
        if name.starts_with('@') || name.starts_with("#[") || name.starts_with('[') {
            return true;
        }
        ["create", "make", "build"]
            .iter()
            .any(|prefix| {
                name.strip_prefix(prefix)
                    .and_then(|rest| rest.chars().next())
                    .is_some_and(char::is_uppercase)
            })
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

static GLOBAL: RwLock<Option<Arc<PrimitiveRegistry>>> = RwLock::new(None);

/// Returns the process-wide catalog, initialising the bundled one on
/// first access
pub fn global() -> Arc<PrimitiveRegistry> {
    if let Some(existing) = GLOBAL.read().expect("primitive lock poisoned").as_ref() {
        return Arc::clone(existing);
    }
    let mut slot = GLOBAL.write().expect("primitive lock poisoned");
    slot.get_or_insert_with(|| Arc::new(PrimitiveRegistry::builtin()))
        .clone()
}

/// Replaces the process-wide catalog
pub fn initialize(registry: PrimitiveRegistry) {
    *GLOBAL.write().expect("primitive lock poisoned") = Some(Arc::new(registry));
}

/// Clears the process-wide catalog. Intended for tests.
pub fn reset() {
    *GLOBAL.write().expect("primitive lock poisoned") = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate() {
        let registry = PrimitiveRegistry::builtin();
        assert_eq!(
            registry.locate("useState", Language::TypeScript),
            Some(("react", "state"))
        );
        assert_eq!(
            registry.locate("Autowired", Language::Java),
            Some(("spring", "di"))
        );
        assert_eq!(registry.locate("useState", Language::Python), None);
    }

    #[test]
    fn test_primitives_union() {
        let registry = PrimitiveRegistry::builtin();
        let ts = registry.primitives_for(Language::TypeScript);
        assert!(ts.contains("useState"));
        assert!(ts.contains("Injectable"));
        assert!(ts.contains("Router"));
    }

    #[test]
    fn test_looks_like_primitive() {
        let registry = PrimitiveRegistry::builtin();
        assert!(registry.looks_like_primitive("useThing", Language::TypeScript));
        assert!(!registry.looks_like_primitive("useful", Language::TypeScript));
        assert!(registry.looks_like_primitive("@Controller", Language::Java));
        assert!(registry.looks_like_primitive("#[derive]", Language::Rust));
        assert!(registry.looks_like_primitive("createClient", Language::Go));
        assert!(!registry.looks_like_primitive("handler", Language::Go));
    }
}

//! Path resolution for the in-bundle module system.
//!
//! Resolution is two pure steps: [`resolve_relative`] maps a relative
//! specifier plus the requiring module's path onto an absolute project path,
//! and the candidate functions enumerate the fixed probe order against the
//! registered-module namespace of one bundle ([`ModuleSet`]). No filesystem
//! is ever consulted - the registry is the only namespace that exists.

use std::collections::BTreeSet;

/// Module identifiers satisfied by host-injected objects instead of the
/// registry. These never enter the module table.
pub const EXTERNAL_MODULES: [&str; 5] = [
    "react",
    "react-dom",
    "react-dom/client",
    "react/jsx-runtime",
    "react/jsx-dev-runtime",
];

/// Resolve a relative specifier against the path of the requiring module.
///
/// `base_path` is the requiring module's own path (`a/b/c.ts`); its final
/// segment is dropped to obtain the directory. `.` segments are no-ops,
/// `..` pops one directory and silently clamps at the root rather than
/// erroring. Specifiers that do not start with `.` are not this function's
/// business; callers pass them through unresolved.
#[must_use]
pub fn resolve_relative(base_path: &str, spec: &str) -> String {
    let mut stack: Vec<&str> = base_path.split('/').collect();
    stack.pop();

    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    stack.join("/")
}

/// Lookup candidates for a resolved module path, in probe order.
#[must_use]
pub fn module_candidates(path: &str) -> [String; 5] {
    [
        path.to_string(),
        format!("{path}.ts"),
        format!("{path}.tsx"),
        format!("{path}/index.ts"),
        format!("{path}/index.tsx"),
    ]
}

/// Lookup candidates for an intercepted `/api/<rest>` request path, or
/// `None` if the path is not an API route at all.
#[must_use]
pub fn api_route_candidates(url_path: &str) -> Option<[String; 3]> {
    let rest = url_path.strip_prefix("/api/")?;
    if rest.is_empty() {
        return None;
    }
    let base = format!("src/api/{rest}");
    Some([base.clone(), format!("{base}.ts"), format!("{base}.tsx")])
}

/// The registered-module namespace of one bundle.
///
/// Private to a single bundle/sandbox instance; recreated on every remount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSet {
    paths: BTreeSet<String>,
}

impl ModuleSet {
    pub fn from_paths(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve a `require(spec)` issued from `base_path` to a registered
    /// module path. Relative specifiers go through [`resolve_relative`];
    /// bare/absolute ones are probed as-is. First candidate hit wins.
    #[must_use]
    pub fn resolve_module(&self, base_path: &str, spec: &str) -> Option<String> {
        let target = if spec.starts_with('.') {
            resolve_relative(base_path, spec)
        } else {
            spec.to_string()
        };

        module_candidates(&target)
            .into_iter()
            .find(|candidate| self.paths.contains(candidate))
    }

    /// Resolve an intercepted request path (`/api/greeting`) to a registered
    /// handler module, checked against the registry only.
    #[must_use]
    pub fn resolve_api_route(&self, url_path: &str) -> Option<String> {
        api_route_candidates(url_path)?
            .into_iter()
            .find(|candidate| self.paths.contains(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_resolve_sibling() {
        assert_eq!(resolve_relative("a/b/c.ts", "./e"), "a/b/e");
    }

    #[test]
    fn test_resolve_parent() {
        assert_eq!(resolve_relative("a/b/c.ts", "../d"), "a/d");
    }

    #[test]
    fn test_resolve_deep_walk() {
        assert_eq!(
            resolve_relative("src/components/ui/Button.tsx", "../../hooks/useThing"),
            "src/hooks/useThing"
        );
    }

    #[test]
    fn test_excess_parent_segments_clamp() {
        assert_eq!(resolve_relative("a/b.ts", "../../../x"), "x");
        assert_eq!(resolve_relative("top.ts", "../x"), "x");
    }

    #[test]
    fn test_dot_segments_are_noops() {
        assert_eq!(resolve_relative("a/b/c.ts", "././e"), "a/b/e");
    }

    #[test]
    fn test_module_candidate_order() {
        let set = ModuleSet::from_paths(["foo.ts", "foo/index.ts"]);
        assert_eq!(set.resolve_module("main.ts", "foo").as_deref(), Some("foo.ts"));

        let set = ModuleSet::from_paths(["foo/index.ts"]);
        assert_eq!(
            set.resolve_module("main.ts", "foo").as_deref(),
            Some("foo/index.ts")
        );

        // An exact registration beats every suffix probe.
        let set = ModuleSet::from_paths(["foo", "foo.ts"]);
        assert_eq!(set.resolve_module("main.ts", "foo").as_deref(), Some("foo"));
    }

    #[test]
    fn test_unregistered_module_misses() {
        let set = ModuleSet::from_paths(["src/App.tsx"]);
        assert_eq!(set.resolve_module("src/App.tsx", "./missing"), None);
    }

    #[test]
    fn test_relative_resolution_through_set() {
        let set = ModuleSet::from_paths(["src/components/Button.tsx"]);
        assert_eq!(
            set.resolve_module("src/App.tsx", "./components/Button").as_deref(),
            Some("src/components/Button.tsx")
        );
    }

    #[test]
    fn test_api_route_candidates() {
        assert_eq!(
            api_route_candidates("/api/greeting").unwrap().to_vec(),
            vec!["src/api/greeting", "src/api/greeting.ts", "src/api/greeting.tsx"]
        );
        assert!(api_route_candidates("/api/").is_none());
        assert!(api_route_candidates("/other/greeting").is_none());
    }

    #[test]
    fn test_api_route_lookup() {
        let set = ModuleSet::from_paths(["src/api/greeting.ts", "src/App.tsx"]);
        assert_eq!(
            set.resolve_api_route("/api/greeting").as_deref(),
            Some("src/api/greeting.ts")
        );
        assert_eq!(set.resolve_api_route("/api/missing"), None);
        assert_eq!(set.resolve_api_route("/assets/logo.png"), None);
    }

    #[test]
    fn test_nested_api_route() {
        let set = ModuleSet::from_paths(["src/api/users/list.ts"]);
        assert_eq!(
            set.resolve_api_route("/api/users/list").as_deref(),
            Some("src/api/users/list.ts")
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_-]{0,8}"
    }

    proptest! {
        #[test]
        fn prop_resolution_is_deterministic(
            base in proptest::collection::vec(segment(), 1..5),
            spec in proptest::collection::vec(segment(), 1..5),
        ) {
            let base = base.join("/");
            let spec = format!("./{}", spec.join("/"));
            prop_assert_eq!(
                resolve_relative(&base, &spec),
                resolve_relative(&base, &spec)
            );
        }

        #[test]
        fn prop_sibling_resolution_appends_to_directory(
            dirs in proptest::collection::vec(segment(), 0..4),
            file in segment(),
            target in segment(),
        ) {
            let base = if dirs.is_empty() {
                file.clone()
            } else {
                format!("{}/{}", dirs.join("/"), file)
            };
            let resolved = resolve_relative(&base, &format!("./{target}"));
            let expected = if dirs.is_empty() {
                target.clone()
            } else {
                format!("{}/{}", dirs.join("/"), target)
            };
            prop_assert_eq!(resolved, expected);
        }

        #[test]
        fn prop_excess_parents_never_panic(
            base in proptest::collection::vec(segment(), 1..4),
            ups in 1..10usize,
            target in segment(),
        ) {
            let base = base.join("/");
            let spec = format!("{}/{}", vec![".."; ups].join("/"), target);
            let resolved = resolve_relative(&base, &spec);
            // Clamped at the root: the result is never longer than the
            // straight sibling resolution and always ends with the target.
            prop_assert!(resolved.ends_with(&target));
        }
    }
}

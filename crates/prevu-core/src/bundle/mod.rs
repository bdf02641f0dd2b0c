//! Bundle assembly.
//!
//! One compile pass turns the project's `.ts`/`.tsx` files into a single
//! executable script: the registry prelude, one `__prevu_define` factory per
//! module, the fetch interceptor, and the entry-point render call. The
//! bundle is recreated wholesale on every pass — it is never patched
//! incrementally — and a failure in any single file aborts the whole pass
//! so a partial bundle can never execute.

pub mod lower;

use self::lower::js_string;
use crate::compiler::{CompilerBackend, TranspileOptions};
use crate::files::ProjectFiles;
use crate::resolver::ModuleSet;
use thiserror::Error;

/// Registry prelude: `__prevu_define` / `__prevu_require_from`.
const PRELUDE_JS: &str = include_str!("js/prelude.js");

/// Request router over the sandbox's network primitive.
const INTERCEPTOR_JS: &str = include_str!("js/interceptor.js");

/// A fatal error in one compile pass. The previous working bundle keeps
/// running; no reload happens for a pass that produced this.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Compilation Error in {path}: {message}")]
pub struct CompileError {
    pub path: String,
    pub message: String,
}

/// The single executable script produced by one compile pass.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Full script: prelude + module factories + interceptor + render call.
    pub code: String,
    /// Registered module paths, in definition order.
    pub modules: Vec<String>,
    /// Module whose default export is mounted as the application root.
    pub entry_point: String,
}

impl Bundle {
    /// The registered-path namespace the host resolves against.
    #[must_use]
    pub fn module_set(&self) -> ModuleSet {
        ModuleSet::from_paths(self.modules.iter().cloned())
    }
}

/// Compile every `.ts`/`.tsx` file and assemble the bundle.
pub fn compile_project(
    files: &ProjectFiles,
    entry_point: &str,
    backend: &dyn CompilerBackend,
) -> Result<Bundle, CompileError> {
    let mut registrations = String::new();
    let mut modules = Vec::new();

    for (path, content) in files.compilable() {
        let options = TranspileOptions::new(path);
        let transpiled = backend
            .transpile(&options, content)
            .map_err(|e| CompileError {
                path: path.to_string(),
                message: e.message,
            })?;
        let lowered = lower::lower_module(&transpiled.code).map_err(|e| CompileError {
            path: path.to_string(),
            message: e.message,
        })?;

        registrations.push_str(&wrap_factory(path, &lowered));
        modules.push(path.to_string());
    }

    let code = format!(
        "{PRELUDE_JS}\n{registrations}\n{INTERCEPTOR_JS}\n{}",
        render_script(entry_point)
    );

    Ok(Bundle {
        code,
        modules,
        entry_point: entry_point.to_string(),
    })
}

/// Wrap a lowered module body as a registry factory. A runtime exception
/// inside the body is logged with the originating path before re-throwing,
/// so the failure is attributable while still propagating to whichever
/// caller required the module.
fn wrap_factory(path: &str, body: &str) -> String {
    let key = js_string(path);
    let annotation = js_string(&format!("Error in module {path}:"));
    format!(
        "__prevu_define({key}, (exports, require) => {{ try {{\n{body}}} catch (e) {{ console.error({annotation}, e); throw e; }} }});\n"
    )
}

/// The entry-point render call. Errors here (including everything that
/// propagates out of `require`) reach the host through the sandbox's
/// uncaught-error hook — the only path a runtime error takes.
fn render_script(entry_point: &str) -> String {
    let entry = js_string(entry_point);
    format!(
        r#"(() => {{
  try {{
    const require = __prevu_require_from({entry});
    const Main = require({entry}).default;
    if (!Main) {{
      throw new Error("Could not find default export from " + {entry});
    }}
    const React = __prevu_host.externals["react"];
    const ReactDomClient = __prevu_host.externals["react-dom/client"];
    const root = ReactDomClient.createRoot(document.getElementById("root"));
    root.render(React.createElement(Main));
  }} catch (e) {{
    __prevu_host.reportError(e);
  }}
}})();
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::SwcBackend;
    use crate::files::SourceFile;

    fn project(files: &[(&str, &str)]) -> ProjectFiles {
        ProjectFiles::from_files(
            files
                .iter()
                .map(|(path, content)| SourceFile::new(*path, *content)),
        )
    }

    #[test]
    fn test_bundle_layout() {
        let files = project(&[
            ("src/App.tsx", "export default () => 'hi';"),
            ("src/util.ts", "export const answer = 42;"),
        ]);
        let bundle = compile_project(&files, "src/App.tsx", &SwcBackend::new()).unwrap();

        assert_eq!(bundle.modules, vec!["src/App.tsx", "src/util.ts"]);
        assert_eq!(bundle.entry_point, "src/App.tsx");

        // Prelude before registrations, interceptor and render call after.
        let prelude = bundle.code.find("__prevu_define(").unwrap();
        let app = bundle.code.find("__prevu_define(\"src/App.tsx\"").unwrap();
        let interceptor = bundle.code.find("globalThis.fetch").unwrap();
        let render = bundle.code.find("createRoot").unwrap();
        assert!(prelude <= app);
        assert!(app < interceptor);
        assert!(interceptor < render);
    }

    #[test]
    fn test_factory_wraps_with_annotation() {
        let files = project(&[("src/App.tsx", "export default () => 'hi';")]);
        let bundle = compile_project(&files, "src/App.tsx", &SwcBackend::new()).unwrap();
        assert!(bundle
            .code
            .contains("console.error(\"Error in module src/App.tsx:\", e)"));
        assert!(bundle.code.contains("throw e;"));
    }

    #[test]
    fn test_non_compilable_files_are_ignored() {
        let files = project(&[
            ("src/App.tsx", "export default () => 'hi';"),
            ("styles.css", "body { color: red }"),
        ]);
        let bundle = compile_project(&files, "src/App.tsx", &SwcBackend::new()).unwrap();
        assert_eq!(bundle.modules, vec!["src/App.tsx"]);
        assert!(!bundle.code.contains("color: red"));
    }

    #[test]
    fn test_single_file_failure_aborts_pass() {
        let files = project(&[
            ("src/App.tsx", "export default () => 'hi';"),
            ("src/broken.ts", "const x = {"),
        ]);
        let err = compile_project(&files, "src/App.tsx", &SwcBackend::new()).unwrap_err();
        assert_eq!(err.path, "src/broken.ts");
        assert!(err.to_string().contains("Compilation Error"));
    }

    #[test]
    fn test_module_set_matches_registrations() {
        let files = project(&[
            ("src/App.tsx", "export default () => 'hi';"),
            ("src/api/echo.ts", "export default (req, res) => res.json({});"),
        ]);
        let bundle = compile_project(&files, "src/App.tsx", &SwcBackend::new()).unwrap();
        let set = bundle.module_set();
        assert!(set.contains("src/App.tsx"));
        assert_eq!(
            set.resolve_api_route("/api/echo").as_deref(),
            Some("src/api/echo.ts")
        );
    }
}

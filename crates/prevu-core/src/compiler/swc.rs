//! SWC compiler backend.
//!
//! Fast in-process TypeScript/TSX transpilation: parse, strip types,
//! transform JSX, hygiene + fixer, emit. Module syntax is preserved here;
//! ESM forms are lowered to registry factories by the bundle pipeline.

use super::{CompilerBackend, CompilerError, JsxRuntime, TranspileOptions, TranspileOutput};

use swc_common::{
    comments::SingleThreadedComments, errors::Handler, sync::Lrc, FileName, Globals, Mark,
    SourceMap, GLOBALS,
};
use swc_ecma_ast::{EsVersion, Program};
use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
use swc_ecma_parser::{lexer::Lexer, Parser, StringInput, Syntax, TsSyntax};
use swc_ecma_transforms_base::{fixer::fixer, hygiene::hygiene, resolver};
use swc_ecma_transforms_react::{react, Options as ReactOptions, Runtime};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::FoldWith;

/// Emitted ES target. The sandbox is a current V8 isolate, so no
/// downleveling is needed.
const TARGET: EsVersion = EsVersion::Es2022;

/// SWC-based compiler backend.
///
/// `Send + Sync`; each `transpile` call is independent.
#[derive(Debug, Clone, Default)]
pub struct SwcBackend {
    _private: (),
}

impl SwcBackend {
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn is_tsx(path: &str) -> bool {
        path.to_lowercase().ends_with(".tsx")
    }
}

impl CompilerBackend for SwcBackend {
    fn name(&self) -> &'static str {
        "swc"
    }

    fn transpile(
        &self,
        options: &TranspileOptions,
        source: &str,
    ) -> Result<TranspileOutput, CompilerError> {
        if source.trim().is_empty() {
            return Ok(TranspileOutput::new(""));
        }

        let is_jsx = Self::is_tsx(&options.input_path);

        let cm: Lrc<SourceMap> = Lrc::default();

        // Errors are surfaced through the Result; the handler just absorbs
        // SWC's own diagnostic stream.
        let handler = Handler::with_emitter_writer(Box::new(std::io::sink()), Some(cm.clone()));

        let fm = cm.new_source_file(
            Lrc::new(FileName::Custom(options.input_path.clone())),
            source.to_string(),
        );

        let syntax = Syntax::Typescript(TsSyntax {
            tsx: is_jsx,
            decorators: true,
            ..Default::default()
        });

        let comments = SingleThreadedComments::default();

        let lexer = Lexer::new(syntax, TARGET, StringInput::from(&*fm), Some(&comments));
        let mut parser = Parser::new_from(lexer);

        let module = parser.parse_module().map_err(|e| {
            let kind = format!("{:?}", e.kind());
            e.into_diagnostic(&handler).emit();
            CompilerError::parse_error(format!("Failed to parse {}: {kind}", options.input_path))
        })?;

        let late_errors: Vec<String> = parser
            .take_errors()
            .into_iter()
            .map(|e| format!("{:?}", e.kind()))
            .collect();
        if !late_errors.is_empty() {
            return Err(CompilerError::parse_error(late_errors.join(", ")));
        }

        let module = GLOBALS.set(&Globals::default(), || {
            let unresolved_mark = Mark::new();
            let top_level_mark = Mark::new();

            let mut program = Program::Module(module);

            program = program.fold_with(&mut resolver(unresolved_mark, top_level_mark, true));
            program = program.fold_with(&mut strip(unresolved_mark, top_level_mark));

            let mut module = match program {
                Program::Module(m) => m,
                Program::Script(s) => swc_ecma_ast::Module {
                    span: s.span,
                    body: s
                        .body
                        .into_iter()
                        .map(swc_ecma_ast::ModuleItem::Stmt)
                        .collect(),
                    shebang: s.shebang,
                },
            };

            if is_jsx {
                let runtime = match options.jsx_runtime {
                    JsxRuntime::Automatic => Runtime::Automatic,
                    JsxRuntime::Classic => Runtime::Classic,
                };

                let react_options = ReactOptions {
                    runtime: Some(runtime),
                    import_source: Some("react".to_string()),
                    ..Default::default()
                };

                module = module.fold_with(&mut react(
                    cm.clone(),
                    Some(&comments),
                    react_options,
                    top_level_mark,
                    unresolved_mark,
                ));
            }

            module = module.fold_with(&mut hygiene());
            module.fold_with(&mut fixer(Some(&comments)))
        });

        let mut buf = Vec::new();
        {
            let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);
            let mut emitter = Emitter {
                cfg: swc_ecma_codegen::Config::default().with_target(TARGET),
                cm: cm.clone(),
                comments: Some(&comments),
                wr: writer,
            };
            emitter
                .emit_module(&module)
                .map_err(|e| CompilerError::transform_error(format!("Failed to emit: {e}")))?;
        }

        let code = String::from_utf8(buf)
            .map_err(|e| CompilerError::transform_error(format!("Invalid UTF-8 output: {e}")))?;

        Ok(TranspileOutput::new(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transpile(path: &str, source: &str) -> Result<String, CompilerError> {
        SwcBackend::new()
            .transpile(&TranspileOptions::new(path), source)
            .map(|out| out.code)
    }

    #[test]
    fn test_backend_name() {
        assert_eq!(SwcBackend::new().name(), "swc");
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(transpile("src/empty.ts", "   \n").unwrap(), "");
    }

    #[test]
    fn test_strips_typescript() {
        let source = r#"
            interface User {
                name: string;
                age: number;
            }
            const user: User = { name: "Alice", age: 30 };
            console.log(user.name);
        "#;
        let code = transpile("src/user.ts", source).unwrap();

        assert!(!code.contains("interface"));
        assert!(!code.contains(": User"));
        assert!(!code.contains(": string"));
        assert!(code.contains("const user"));
        assert!(code.contains("console.log"));
    }

    #[test]
    fn test_tsx_automatic_runtime() {
        let source = r#"
            export default function App() {
                return <div className="app">Hello World</div>;
            }
        "#;
        let code = transpile("src/App.tsx", source).unwrap();

        assert!(code.contains("jsx") || code.contains("jsxs"));
        assert!(code.contains("react/jsx-runtime"));
        assert!(!code.contains("<div"));
    }

    #[test]
    fn test_tsx_strips_props_types() {
        let source = r"
            interface Props {
                name: string;
            }
            export function Greeting({ name }: Props) {
                return <h1>Hello, {name}!</h1>;
            }
        ";
        let code = transpile("src/Greeting.tsx", source).unwrap();

        assert!(!code.contains("interface"));
        assert!(!code.contains(": Props"));
        assert!(!code.contains("<h1>"));
        assert!(code.contains("function Greeting"));
    }

    #[test]
    fn test_jsx_in_plain_ts_is_rejected() {
        // `.ts` files do not enable TSX syntax; angle brackets parse as
        // type assertions and this source must fail rather than silently
        // producing a broken module.
        let result = transpile("src/App.ts", "const x = <div>hi</div>;");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_error() {
        let result = transpile("src/broken.ts", "const x = {");
        let err = result.unwrap_err();
        assert!(err.code.contains("PARSE"));
    }
}

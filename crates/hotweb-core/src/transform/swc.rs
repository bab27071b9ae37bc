//! SWC-backed transform for JSX, TSX, and TypeScript sources.
//!
//! JSX compiles with the classic runtime to calls of a configurable factory
//! (`m("div", null)` by default). TypeScript types are stripped. Output is
//! plain ES modules, unminified, without comments.

#![allow(clippy::default_trait_access)]

use super::{Transform, TransformError};
use crate::makefs::Store;
use hotweb_util::path;

/// SWC-based transform.
///
/// `SwcTransform` is `Send + Sync`; every call builds its own source map and
/// globals, so it can be shared across request threads.
#[derive(Debug, Clone)]
pub struct SwcTransform {
    jsx_factory: String,
}

impl SwcTransform {
    #[must_use]
    pub fn new(jsx_factory: impl Into<String>) -> Self {
        Self {
            jsx_factory: jsx_factory.into(),
        }
    }

    #[must_use]
    pub fn jsx_factory(&self) -> &str {
        &self.jsx_factory
    }

    /// Compile `source`, choosing the syntax from the extension of `name`.
    ///
    /// # Errors
    /// Returns [`TransformError::Parse`] on syntax errors,
    /// [`TransformError::Emit`] when code generation fails, and
    /// [`TransformError::Unsupported`] when built without the `swc` feature.
    pub fn compile(&self, name: &str, source: &str) -> Result<String, TransformError> {
        let ext = path::extension(name);
        let is_ts = matches!(ext, ".ts" | ".tsx" | ".mts" | ".cts");
        let is_jsx = matches!(ext, ".jsx" | ".tsx");

        #[cfg(feature = "swc")]
        {
            compile_with_swc(name, source, &self.jsx_factory, is_ts, is_jsx)
        }

        #[cfg(not(feature = "swc"))]
        {
            let _ = (source, is_ts, is_jsx);
            Err(TransformError::Unsupported(name.to_string()))
        }
    }
}

impl Default for SwcTransform {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_JSX_FACTORY)
    }
}

impl Transform for SwcTransform {
    fn transform(&self, fs: &dyn Store, _dst: &str, src: &str) -> Result<Vec<u8>, TransformError> {
        let bytes = fs.read(src)?;
        let source = String::from_utf8_lossy(&bytes);
        let code = self.compile(src, &source)?;
        Ok(code.into_bytes())
    }
}

#[cfg(feature = "swc")]
fn compile_with_swc(
    name: &str,
    source: &str,
    jsx_factory: &str,
    is_ts: bool,
    is_jsx: bool,
) -> Result<String, TransformError> {
    use swc_common::{
        comments::SingleThreadedComments, errors::Handler, sync::Lrc, FileName, Globals, Mark,
        SourceMap, GLOBALS,
    };
    use swc_ecma_ast::{EsVersion, Program};
    use swc_ecma_codegen::{text_writer::JsWriter, Emitter};
    use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax, TsSyntax};
    use swc_ecma_transforms_base::{fixer::fixer, hygiene::hygiene, resolver};
    use swc_ecma_transforms_react::{react, Options as ReactOptions, Runtime};
    use swc_ecma_transforms_typescript::strip;
    use swc_ecma_visit::FoldWith;

    let cm: Lrc<SourceMap> = Default::default();
    let handler = Handler::with_emitter_writer(Box::new(std::io::sink()), Some(cm.clone()));

    // The pragma comment selects the classic-runtime factory
    let source = if is_jsx {
        format!("/** @jsx {jsx_factory} */\n{source}")
    } else {
        source.to_string()
    };
    let fm = cm.new_source_file(Lrc::new(FileName::Custom(name.to_string())), source);

    let syntax = if is_ts {
        Syntax::Typescript(TsSyntax {
            tsx: is_jsx,
            decorators: true,
            ..Default::default()
        })
    } else {
        Syntax::Es(EsSyntax {
            jsx: is_jsx,
            decorators: true,
            ..Default::default()
        })
    };
    let target = EsVersion::EsNext;
    let comments = SingleThreadedComments::default();

    let lexer = Lexer::new(syntax, target, StringInput::from(&*fm), Some(&comments));
    let mut parser = Parser::new_from(lexer);

    let module = parser.parse_module().map_err(|e| {
        let kind = format!("{:?}", e.kind());
        e.into_diagnostic(&handler).emit();
        TransformError::Parse(format!("{name}: {kind}"))
    })?;

    let errors: Vec<String> = parser
        .take_errors()
        .into_iter()
        .map(|e| format!("{:?}", e.kind()))
        .collect();
    if !errors.is_empty() {
        return Err(TransformError::Parse(format!("{name}: {}", errors.join(", "))));
    }

    let has_items = !module.body.is_empty();

    let output = GLOBALS.set(&Globals::default(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        let mut program = Program::Module(module);
        program = program.fold_with(&mut resolver(unresolved_mark, top_level_mark, is_ts));
        if is_ts {
            program = program.fold_with(&mut strip(unresolved_mark, top_level_mark));
        }

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
            let react_options = ReactOptions {
                runtime: Some(Runtime::Classic),
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
        let mut emitter = Emitter {
            cfg: swc_ecma_codegen::Config::default()
                .with_minify(false)
                .with_target(target),
            cm: cm.clone(),
            comments: None,
            wr: JsWriter::new(cm.clone(), "\n", &mut buf, None),
        };
        emitter
            .emit_module(&output)
            .map_err(|e| TransformError::Emit(e.to_string()))?;
    }

    let code = String::from_utf8(buf)
        .map_err(|e| TransformError::Emit(format!("invalid UTF-8 output: {e}")))?;
    if has_items && code.trim().is_empty() {
        return Err(TransformError::NoOutput);
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::makefs::MemStore;

    #[test]
    fn test_default_factory() {
        assert_eq!(SwcTransform::default().jsx_factory(), "m");
    }

    #[test]
    #[cfg(not(feature = "swc"))]
    fn test_without_swc_is_unsupported() {
        let store = MemStore::new();
        store.write("/html.jsx", b"<html></html>\n").unwrap();
        let err = SwcTransform::default()
            .transform(&store, "/html.js", "/html.jsx")
            .unwrap_err();
        assert!(matches!(err, TransformError::Unsupported(ref name) if name == "/html.jsx"));
    }

    #[test]
    #[cfg(feature = "swc")]
    fn test_jsx_uses_factory() {
        let store = MemStore::new();
        store.write("/html.jsx", b"<html></html>\n").unwrap();
        let out = SwcTransform::default()
            .transform(&store, "/html.js", "/html.jsx")
            .unwrap();
        let code = String::from_utf8(out).unwrap();
        assert!(code.contains("m(\"html\", null);"), "{code}");
    }

    #[test]
    #[cfg(feature = "swc")]
    fn test_custom_factory() {
        let code = SwcTransform::new("h")
            .compile("/card.jsx", "export const card = <div class=\"card\" />;")
            .unwrap();
        assert!(code.contains("h(\"div\""), "{code}");
        assert!(code.contains("export const card"), "{code}");
    }

    #[test]
    #[cfg(feature = "swc")]
    fn test_typescript_types_stripped() {
        let code = SwcTransform::default()
            .compile("/math.ts", "export function add(a: number, b: number): number { return a + b; }")
            .unwrap();
        assert!(code.contains("export function add(a, b)"), "{code}");
        assert!(!code.contains("number"), "{code}");
    }

    #[test]
    #[cfg(feature = "swc")]
    fn test_parse_error() {
        let err = SwcTransform::default()
            .compile("/broken.jsx", "export const x = <div>;")
            .unwrap_err();
        assert!(matches!(err, TransformError::Parse(ref msg) if msg.contains("/broken.jsx")));
    }
}

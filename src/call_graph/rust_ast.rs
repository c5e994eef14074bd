//! Rust extraction via `syn`
//!
//! Rust sources get a real AST pass instead of the regex path: function and
//! method declarations with span lines, call/method-call sites attributed
//! to their enclosing item, and `use` aliases for the resolver. A file that
//! fails to parse degrades to an empty extraction; the build records the
//! error and moves on.

use proc_macro2::Span;
use std::path::Path;
use syn::spanned::Spanned;
use syn::visit::Visit;

use crate::language::Language;

use super::extract::{CallSite, FileExtraction, FunctionDecl, ImportDecl};
use super::node::NodeKind;

fn line_of(span: Span) -> usize {
    span.start().line
}

struct RustVisitor {
    functions: Vec<FunctionDecl>,
    calls: Vec<CallSite>,
    imports: Vec<ImportDecl>,
    fn_stack: Vec<String>,
}

impl RustVisitor {
    fn new() -> Self {
        Self {
            functions: Vec::new(),
            calls: Vec::new(),
            imports: Vec::new(),
            fn_stack: Vec::new(),
        }
    }

    fn record_call(&mut self, name: String, receiver: Option<String>, line: usize) {
        self.calls.push(CallSite {
            callee_name: name,
            receiver,
            line,
            enclosing: self.fn_stack.last().cloned(),
        });
    }

    fn collect_use_tree(&mut self, tree: &syn::UseTree, prefix: &mut Vec<String>) {
        match tree {
            syn::UseTree::Path(path) => {
                prefix.push(path.ident.to_string());
                self.collect_use_tree(&path.tree, prefix);
                prefix.pop();
            }
            syn::UseTree::Name(name) => {
                let ident = name.ident.to_string();
                if ident != "self" {
                    self.imports.push(ImportDecl {
                        local_name: ident,
                        source: prefix.join("::"),
                    });
                }
            }
            syn::UseTree::Rename(rename) => {
                self.imports.push(ImportDecl {
                    local_name: rename.rename.to_string(),
                    source: prefix.join("::"),
                });
            }
            syn::UseTree::Group(group) => {
                for item in &group.items {
                    self.collect_use_tree(item, prefix);
                }
            }
            syn::UseTree::Glob(_) => {}
        }
    }
}

impl<'ast> Visit<'ast> for RustVisitor {
    fn visit_item_fn(&mut self, item: &'ast syn::ItemFn) {
        let name = item.sig.ident.to_string();
        self.functions.push(FunctionDecl {
            name: name.clone(),
            line: line_of(item.sig.ident.span()),
            kind: NodeKind::Function,
        });
        self.fn_stack.push(name);
        syn::visit::visit_item_fn(self, item);
        self.fn_stack.pop();
    }

    fn visit_impl_item_fn(&mut self, item: &'ast syn::ImplItemFn) {
        let name = item.sig.ident.to_string();
        self.functions.push(FunctionDecl {
            name: name.clone(),
            line: line_of(item.sig.ident.span()),
            kind: NodeKind::Method,
        });
        self.fn_stack.push(name);
        syn::visit::visit_impl_item_fn(self, item);
        self.fn_stack.pop();
    }

    fn visit_item_use(&mut self, item: &'ast syn::ItemUse) {
        let mut prefix = Vec::new();
        self.collect_use_tree(&item.tree, &mut prefix);
    }

    fn visit_expr_call(&mut self, expr: &'ast syn::ExprCall) {
        if let syn::Expr::Path(path) = expr.func.as_ref() {
            if let Some(last) = path.path.segments.last() {
                let receiver = if path.path.segments.len() > 1 {
                    Some(
                        path.path
                            .segments
                            .iter()
                            .rev()
                            .nth(1)
                            .map(|s| s.ident.to_string())
                            .unwrap_or_default(),
                    )
                } else {
                    None
                };
                self.record_call(last.ident.to_string(), receiver, line_of(expr.span()));
            }
        }
        syn::visit::visit_expr_call(self, expr);
    }

    fn visit_expr_method_call(&mut self, expr: &'ast syn::ExprMethodCall) {
        let receiver = match expr.receiver.as_ref() {
            syn::Expr::Path(path) => path.path.get_ident().map(|i| i.to_string()),
            _ => None,
        };
        self.record_call(
            expr.method.to_string(),
            receiver,
            line_of(expr.method.span()),
        );
        syn::visit::visit_expr_method_call(self, expr);
    }
}

/// Extracts a Rust file. Parse failures yield an empty extraction.
pub fn extract(path: &Path, content: &str) -> FileExtraction {
    let mut visitor = RustVisitor::new();
    match syn::parse_file(content) {
        Ok(file) => visitor.visit_file(&file),
        Err(e) => {
            log::debug!("rust parse failed for {}: {}", path.display(), e);
        }
    }

    visitor.functions.sort_by_key(|f| f.line);
    visitor
        .calls
        .sort_by(|a, b| (a.line, &a.callee_name).cmp(&(b.line, &b.callee_name)));
    visitor.imports.sort();
    visitor.imports.dedup();

    FileExtraction {
        file: path.to_path_buf(),
        language: Language::Rust,
        functions: visitor.functions,
        calls: visitor.calls,
        imports: visitor.imports,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn functions_methods_and_calls() {
        let src = r#"
use crate::repo::{delete_user, find_user as lookup};

pub fn handler(id: u64) -> Result<(), Error> {
    let user = lookup(id)?;
    service::notify(&user);
    Ok(())
}

struct Repo;

impl Repo {
    fn delete(&self, id: u64) {
        self.conn.execute(id);
    }
}
"#;
        let extraction = extract(Path::new("src/api.rs"), src);

        let handler = extraction.functions.iter().find(|f| f.name == "handler").unwrap();
        assert_eq!(handler.kind, NodeKind::Function);
        let delete = extraction.functions.iter().find(|f| f.name == "delete").unwrap();
        assert_eq!(delete.kind, NodeKind::Method);

        let lookup = extraction.calls.iter().find(|c| c.callee_name == "lookup").unwrap();
        assert_eq!(lookup.enclosing.as_deref(), Some("handler"));

        let notify = extraction.calls.iter().find(|c| c.callee_name == "notify").unwrap();
        assert_eq!(notify.receiver.as_deref(), Some("service"));

        let execute = extraction.calls.iter().find(|c| c.callee_name == "execute").unwrap();
        assert_eq!(execute.enclosing.as_deref(), Some("delete"));

        assert!(extraction
            .imports
            .iter()
            .any(|i| i.local_name == "lookup" && i.source == "crate::repo"));
        assert!(extraction
            .imports
            .iter()
            .any(|i| i.local_name == "delete_user"));
    }

    #[test]
    fn broken_files_degrade_to_empty() {
        let extraction = extract(Path::new("src/broken.rs"), "fn oops( {");
        assert!(extraction.functions.is_empty());
        assert!(extraction.calls.is_empty());
    }
}

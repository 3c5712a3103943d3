//! PTL Profile Template Compiler
//!
//! A compiler and reactive rendering engine for the PTL declarative
//! profile-page language: untrusted templates go in, safe HTML and
//! island-scoped re-renders come out.
//!
//! # Features
//!
//! - Complete PTL language support with layout, profile and social components
//! - Closed expression language: no calls, no assignment, no host access
//! - Typed page variables with strict write checking
//! - Action pipelines with collection operators (Filter, Sort, Transform, ...)
//! - Islands analysis: static regions render once, stateful regions re-render
//! - Comprehensive error reporting with node paths and line numbers
//!
//! # Basic Usage
//!
//! ```rust
//! use ptlc::{compile_source, Result};
//!
//! fn main() -> Result<()> {
//!     let template = compile_source("<CenteredBox><DisplayName /></CenteredBox>")?;
//!     assert!(template.islands.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! # Compilation Pipeline
//!
//! 1. **Phase 1**: Lexer - tokenize markup
//! 2. **Phase 2**: Parser - build the tree, validating every tag and prop
//!    against the component registry
//! 3. **Phase 3**: Islands analysis - partition the tree into static and
//!    interactive regions
//! 4. **Phase 4**: Artifact - package tree, islands and fingerprint as a
//!    `CompiledTemplate`
//!
//! Rendering happens later, per page view, through a
//! [`runtime::TemplateInstance`].

pub mod actions;
pub mod ast;
pub mod cli;
pub mod conditional;
pub mod context;
pub mod error;
pub mod expr;
pub mod islands;
pub mod lexer;
pub mod parser;
pub mod registry;
pub mod renderer;
pub mod runtime;
pub mod storage;
pub mod types;
pub mod vars;

// Re-export commonly used types and functions
pub use ast::{ActionKind, ActionNode, ConditionalBlock, Node, TextSegment};
pub use cli::PtlCli;
pub use context::{DataContext, OwnerProfile, Viewer};
pub use error::{Result, TemplateError};
pub use expr::{evaluate, parse_expression, Expr, Scope};
pub use islands::analyze as analyze_islands;
pub use lexer::{Lexer, Token, TokenType};
pub use parser::Parser;
pub use registry::{ComponentCategory, PropSchema, PropType, Registry};
pub use renderer::Renderer;
pub use runtime::{DispatchResult, TemplateInstance};
pub use storage::{DirStore, MemoryStore, TemplateStore};
pub use types::{CompiledTemplate, Island, Value, VarType};
pub use vars::VariableStore;

/// Compiler version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Compilation options and settings
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Maximum markup nesting depth before compilation fails
    pub max_nesting_depth: usize,

    /// Maximum raw source length in bytes
    pub max_source_len: usize,

    /// Pretty-print the JSON artifact when writing to disk
    pub pretty_output: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: types::MAX_NESTING_DEPTH,
            max_source_len: types::MAX_SOURCE_LEN,
            pretty_output: false,
        }
    }
}

/// Compilation statistics and metrics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CompilationStats {
    /// Source size in bytes
    pub source_size: u64,

    /// Top-level and nested nodes in the compiled tree
    pub node_count: usize,

    /// Number of islands
    pub island_count: usize,

    /// Number of handlers across all islands
    pub handler_count: usize,

    /// Compilation time in milliseconds
    pub compile_time_ms: u64,
}

/// Compile PTL source with default options.
pub fn compile_source(source: &str) -> Result<CompiledTemplate> {
    let (template, _stats) = compile_source_with_options(source, &CompilerOptions::default())?;
    Ok(template)
}

/// Compile PTL source with custom options.
pub fn compile_source_with_options(
    source: &str,
    options: &CompilerOptions,
) -> Result<(CompiledTemplate, CompilationStats)> {
    let start_time = std::time::Instant::now();

    log::debug!("Phase 1-2: lexing and parsing ({} bytes)", source.len());
    let registry = Registry::standard();
    let tree = Parser::new(&registry)
        .with_max_depth(options.max_nesting_depth)
        .with_max_source_len(options.max_source_len)
        .parse(source)?;

    log::debug!("Phase 3: islands analysis");
    let islands = islands::analyze(&tree);
    islands::verify(&tree, &islands)?;

    let template = CompiledTemplate::new(tree, islands, source.to_string());

    let stats = CompilationStats {
        source_size: source.len() as u64,
        node_count: count_nodes(&template.tree),
        island_count: template.islands.len(),
        handler_count: template.islands.iter().map(|i| i.handlers.len()).sum(),
        compile_time_ms: start_time.elapsed().as_millis() as u64,
    };
    log::debug!(
        "compiled: {} nodes, {} islands, {} handlers in {}ms",
        stats.node_count,
        stats.island_count,
        stats.handler_count,
        stats.compile_time_ms
    );

    Ok((template, stats))
}

/// Compile a `.ptl` file with default options.
pub fn compile_file(input_path: &str) -> Result<CompiledTemplate> {
    let source =
        std::fs::read_to_string(input_path).map_err(|e| TemplateError::FileNotFound {
            path: format!("{}: {}", input_path, e),
        })?;
    compile_source(&source)
}

/// Compile a file and write the JSON artifact next to it (or to an explicit
/// output path).
pub fn compile_file_with_options(
    input_path: &str,
    output_path: &str,
    options: &CompilerOptions,
) -> Result<CompilationStats> {
    let source =
        std::fs::read_to_string(input_path).map_err(|e| TemplateError::FileNotFound {
            path: format!("{}: {}", input_path, e),
        })?;
    let (template, stats) = compile_source_with_options(&source, options)?;
    let json = if options.pretty_output {
        serde_json::to_string_pretty(&template)
    } else {
        serde_json::to_string(&template)
    }
    .map_err(|e| TemplateError::invalid_format(e.to_string()))?;
    std::fs::write(output_path, json)?;
    Ok(stats)
}

fn count_nodes(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .map(|node| {
            let branches: usize = match node {
                Node::Conditional(block) => block
                    .branches()
                    .iter()
                    .map(|branch| count_nodes(branch))
                    .sum(),
                _ => 0,
            };
            1 + branches + count_nodes(node.children())
        })
        .sum()
}

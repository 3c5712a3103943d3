//! Live template instances
//!
//! A `TemplateInstance` binds a compiled artifact to one viewer's data
//! context: it declares the page variables, wires island subscriptions, and
//! serves the initial render plus per-trigger dispatches. Instances are
//! per-render and single-threaded; nothing outlives the page view.

use crate::actions::{run_pipeline, PipelineOutcome};
use crate::ast::{ActionNode, Node};
use crate::context::DataContext;
use crate::error::{Result, TemplateError};
use crate::islands;
use crate::renderer::Renderer;
use crate::types::{CompiledTemplate, VarType};
use crate::vars::VariableStore;

/// What one dispatch produced: the island subtrees that must be swapped into
/// the page, plus the pipeline's write/error record.
#[derive(Debug)]
pub struct DispatchResult {
    pub patches: Vec<(usize, String)>,
    pub outcome: PipelineOutcome,
}

pub struct TemplateInstance {
    compiled: CompiledTemplate,
    store: VariableStore,
    ctx: DataContext,
}

impl TemplateInstance {
    /// Instantiate a compiled template for one viewer. Declares every `Var`
    /// in the tree (conditional branches included, so state exists even when
    /// a branch is not taken) and subscribes islands to the variables their
    /// rendering reads.
    pub fn new(compiled: CompiledTemplate, ctx: DataContext) -> Result<Self> {
        islands::verify(&compiled.tree, &compiled.islands)?;

        let mut store = VariableStore::new();
        declare_all(&compiled.tree, &mut store)?;

        for island in &compiled.islands {
            for name in &island.variables {
                if store.is_declared(name) {
                    store.subscribe(name, island.id);
                }
            }
        }

        Ok(Self {
            compiled,
            store,
            ctx,
        })
    }

    pub fn compiled(&self) -> &CompiledTemplate {
        &self.compiled
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn ctx(&self) -> &DataContext {
        &self.ctx
    }

    /// Full page render.
    pub fn render(&self) -> Result<String> {
        Renderer::new(&self.ctx, &self.store, &self.compiled.islands)
            .render(&self.compiled.tree)
    }

    /// Run the handler with the given id and re-render exactly the islands
    /// whose subscribed variables were written. Patches come back in island
    /// id order.
    pub fn dispatch(&mut self, handler_id: usize) -> Result<DispatchResult> {
        let actions = find_handler(&self.compiled.tree, handler_id)
            .ok_or_else(|| {
                TemplateError::action(format!("no handler with id {}", handler_id))
            })?
            .to_vec();

        let outcome = run_pipeline(&actions, &mut self.store, &self.ctx);

        let renderer = Renderer::new(&self.ctx, &self.store, &self.compiled.islands);
        let mut patches = Vec::new();
        for &id in &outcome.notified_islands {
            let island = self
                .compiled
                .islands
                .iter()
                .find(|isl| isl.id == id)
                .ok_or_else(|| {
                    TemplateError::render(format!("notified island {} does not exist", id))
                })?;
            patches.push((id, renderer.render_island(&self.compiled.tree, island)?));
        }
        Ok(DispatchResult { patches, outcome })
    }
}

/// Declare every `Var` component in the tree, descending into conditional
/// branches: a variable's existence never depends on which branch renders.
fn declare_all(nodes: &[Node], store: &mut VariableStore) -> Result<()> {
    for node in nodes {
        match node {
            Node::Component { tag, props, .. } if tag == "Var" => {
                let name = props.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let type_name = props.get("type").and_then(|v| v.as_str()).unwrap_or("");
                let var_type = VarType::from_name(type_name).ok_or_else(|| {
                    TemplateError::action(format!("unknown variable type '{}'", type_name))
                })?;
                let initial = props
                    .get("initial")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                store.declare(name, var_type, initial)?;
            }
            Node::Conditional(block) => {
                for branch in block.branches() {
                    declare_all(branch, store)?;
                }
            }
            other => declare_all(other.children(), store)?,
        }
    }
    Ok(())
}

fn find_handler(nodes: &[Node], handler_id: usize) -> Option<&[ActionNode]> {
    for node in nodes {
        match node {
            Node::Handler { id, actions, .. } if *id == handler_id => {
                return Some(actions);
            }
            Node::Conditional(block) => {
                for branch in block.branches() {
                    if let Some(found) = find_handler(branch, handler_id) {
                        return Some(found);
                    }
                }
            }
            other => {
                if let Some(found) = find_handler(other.children(), handler_id) {
                    return Some(found);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OwnerProfile, Viewer};
    use crate::parser::Parser;
    use crate::registry::Registry;
    use crate::types::Value;

    fn compile(src: &str) -> CompiledTemplate {
        let registry = Registry::standard();
        let tree = Parser::new(&registry).parse(src).unwrap();
        let islands = islands::analyze(&tree);
        CompiledTemplate::new(tree, islands, src.to_string())
    }

    fn ctx() -> DataContext {
        DataContext::new(OwnerProfile {
            id: "u1".into(),
            handle: "maple".into(),
            display_name: "Maple".into(),
            bio: String::new(),
            avatar_url: None,
        })
    }

    const COUNTER: &str = r#"
        <Var name="count" type="number" initial="0" />
        <div>
          <p>Count: {$vars.count}</p>
          <Button label="More"><OnClick><Increment var="count" max="2" /></OnClick></Button>
        </div>"#;

    #[test]
    fn test_counter_dispatch_patches_island() {
        let mut instance = TemplateInstance::new(compile(COUNTER), ctx()).unwrap();
        let first = instance.render().unwrap();
        assert!(first.contains("Count: 0"));

        let result = instance.dispatch(0).unwrap();
        assert_eq!(result.patches.len(), 1);
        let (id, html) = &result.patches[0];
        assert!(html.contains(&format!("data-ptl-island=\"{}\"", id)));
        assert!(html.contains("Count: 1"));
        assert!(result.outcome.recovered_errors.is_empty());

        instance.dispatch(0).unwrap();
        // Clamped at max: the write still lands, at the bound.
        let result = instance.dispatch(0).unwrap();
        assert!(result.patches[0].1.contains("Count: 2"));
    }

    #[test]
    fn test_toggle_flips_branch() {
        let src = r#"
            <Var name="open" type="boolean" initial="false" />
            <div>
              <Show when="$vars.open"><p>details here</p></Show>
              <Button label="Toggle"><OnClick><Toggle var="open" /></OnClick></Button>
            </div>"#;
        let mut instance = TemplateInstance::new(compile(src), ctx()).unwrap();
        assert!(!instance.render().unwrap().contains("details here"));

        let result = instance.dispatch(0).unwrap();
        assert!(result.patches[0].1.contains("details here"));

        let result = instance.dispatch(0).unwrap();
        assert!(!result.patches[0].1.contains("details here"));
    }

    #[test]
    fn test_unknown_handler_is_action_error() {
        let mut instance = TemplateInstance::new(compile(COUNTER), ctx()).unwrap();
        let err = instance.dispatch(99).unwrap_err();
        assert!(matches!(err, TemplateError::Action { .. }));
    }

    #[test]
    fn test_vars_in_untaken_branches_are_declared() {
        let src = r#"
            <IfOwner>
              <Var name="draft" type="string" initial="wip" />
            </IfOwner>
            <p>{$vars.draft}</p>"#;
        // Viewer is anonymous, so the IfOwner branch never renders, but the
        // variable must still exist.
        let instance = TemplateInstance::new(compile(src), ctx()).unwrap();
        assert_eq!(
            instance.store().get("draft"),
            Some(&Value::String("wip".into()))
        );
        assert!(instance.render().unwrap().contains("wip"));
    }

    #[test]
    fn test_duplicate_var_declaration_fails_instantiation() {
        let src = r#"
            <Var name="x" type="number" />
            <Var name="x" type="string" />"#;
        assert!(TemplateInstance::new(compile(src), ctx()).is_err());
    }

    #[test]
    fn test_collection_pipeline_end_to_end() {
        let src = r#"
            <Var name="shown" type="array" initial="[]" />
            <div>
              <p>Visible: {$vars.shown}</p>
              <Button label="Filter">
                <OnClick>
                  <Filter source="posts" target="shown" where="item.score > 5" />
                  <Sort source="$vars.shown" target="shown" by="item.score" order="desc" />
                </OnClick>
              </Button>
            </div>"#;
        let posts: Vec<Value> = [3.0, 8.0, 6.0]
            .iter()
            .map(|score| {
                Value::Object(
                    [("score".to_string(), Value::Number(*score))]
                        .into_iter()
                        .collect(),
                )
            })
            .collect();
        let mut instance =
            TemplateInstance::new(compile(src), ctx().with_posts(posts)).unwrap();
        let result = instance.dispatch(0).unwrap();
        assert!(result.outcome.written.contains("shown"));
        match instance.store().get("shown") {
            Some(Value::Array(items)) => {
                let scores: Vec<f64> = items
                    .iter()
                    .map(|i| i.field("score").as_number().unwrap())
                    .collect();
                assert_eq!(scores, vec![8.0, 6.0]);
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_owner_sees_owner_island() {
        let src = r#"
            <Var name="count" type="number" initial="0" />
            <IfOwner>
              <div>
                <p>Drafts: {$vars.count}</p>
                <Button label="Up"><OnClick><Increment var="count" /></OnClick></Button>
              </div>
            </IfOwner>"#;
        let owner_ctx = ctx().with_viewer(Viewer {
            id: "u1".into(),
            handle: "maple".into(),
        });
        let mut instance = TemplateInstance::new(compile(src), owner_ctx).unwrap();
        assert!(instance.render().unwrap().contains("Drafts: 0"));
        let result = instance.dispatch(0).unwrap();
        assert!(result.patches[0].1.contains("Drafts: 1"));
    }
}

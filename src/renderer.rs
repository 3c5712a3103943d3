//! HTML rendering for compiled templates
//!
//! Walks the tree depth-first against the data context and variable store.
//! Island roots are annotated with `data-ptl-island` and trigger-owning
//! buttons with `data-ptl-handler`, which is all the hydration layer needs to
//! attach listeners and swap island subtrees. All interpolated text and
//! attribute values are HTML-escaped; raw user data can never reach the
//! output unescaped.

use crate::ast::{Node, TextSegment};
use crate::conditional;
use crate::context::DataContext;
use crate::error::{Result, TemplateError};
use crate::expr::{evaluate, Scope};
use crate::islands::resolve_path;
use crate::types::{format_number, Island, NodePath, Value};
use crate::vars::VariableStore;
use std::collections::HashMap;

pub struct Renderer<'a> {
    ctx: &'a DataContext,
    store: &'a VariableStore,
    island_roots: HashMap<NodePath, usize>,
}

impl<'a> Renderer<'a> {
    pub fn new(ctx: &'a DataContext, store: &'a VariableStore, islands: &[Island]) -> Self {
        let island_roots = islands
            .iter()
            .map(|isl| (isl.path.clone(), isl.id))
            .collect();
        Self {
            ctx,
            store,
            island_roots,
        }
    }

    /// Full render: runs once at initial load.
    pub fn render(&self, tree: &[Node]) -> Result<String> {
        let mut out = String::new();
        let mut scope = Scope::with_vars(self.ctx.root(), self.store);
        let mut path = Vec::new();
        self.render_nodes(tree, &mut scope, &mut path, false, &mut out)?;
        Ok(out)
    }

    /// Re-render a single island, wrapper included, for subtree replacement.
    pub fn render_island(&self, tree: &[Node], island: &Island) -> Result<String> {
        let node = resolve_path(tree, &island.path).ok_or_else(|| {
            TemplateError::render(format!(
                "island {} references a node no longer in the tree",
                island.id
            ))
        })?;
        let mut out = String::new();
        out.push_str(&format!("<div data-ptl-island=\"{}\">", island.id));
        let mut scope = Scope::with_vars(self.ctx.root(), self.store);
        let mut path = island.path.clone();
        self.render_node(node, &mut scope, &mut path, true, &mut out)?;
        out.push_str("</div>");
        Ok(out)
    }

    fn render_nodes(
        &self,
        nodes: &[Node],
        scope: &mut Scope,
        path: &mut NodePath,
        in_island: bool,
        out: &mut String,
    ) -> Result<()> {
        for (i, node) in nodes.iter().enumerate() {
            path.push(i);
            let island_id = if in_island {
                None
            } else {
                self.island_roots.get(path.as_slice()).copied()
            };
            match island_id {
                Some(id) => {
                    out.push_str(&format!("<div data-ptl-island=\"{}\">", id));
                    self.render_node(node, scope, path, true, out)?;
                    out.push_str("</div>");
                }
                None => self.render_node(node, scope, path, in_island, out)?,
            }
            path.pop();
        }
        Ok(())
    }

    fn render_node(
        &self,
        node: &Node,
        scope: &mut Scope,
        path: &mut NodePath,
        in_island: bool,
        out: &mut String,
    ) -> Result<()> {
        match node {
            Node::Text { segments } => {
                for segment in segments {
                    match segment {
                        TextSegment::Literal(text) => out.push_str(&escape_html(text)),
                        TextSegment::Expr(expr) => {
                            let value = evaluate(expr, scope);
                            out.push_str(&escape_html(&value.render_string()));
                        }
                    }
                }
                Ok(())
            }
            Node::Element {
                tag,
                attrs,
                children,
                ..
            } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push_str(&format!(" {}=\"{}\"", name, escape_html(value)));
                }
                if is_void_tag(tag) {
                    out.push_str(" />");
                    return Ok(());
                }
                out.push('>');
                self.render_nodes(children, scope, path, in_island, out)?;
                out.push_str(&format!("</{}>", tag));
                Ok(())
            }
            Node::Conditional(block) => {
                // At most one branch is ever instantiated.
                if let Some(taken) = conditional::resolve(block, scope, self.ctx) {
                    self.render_nodes(taken, scope, path, in_island, out)?;
                }
                Ok(())
            }
            Node::Loop {
                source,
                item,
                index,
                children,
                ..
            } => {
                let items = match evaluate(source, scope) {
                    Value::Array(items) => items,
                    other => {
                        log::debug!(
                            "ForEach source is not an array (found {}), rendering nothing",
                            other.render_string()
                        );
                        return Ok(());
                    }
                };
                for (i, element) in items.into_iter().enumerate() {
                    let mut locals: HashMap<String, Value> = HashMap::new();
                    locals.insert(item.clone(), element);
                    if let Some(index_name) = index {
                        locals.insert(index_name.clone(), Value::Number(i as f64));
                    }
                    scope.push_locals(locals);
                    let result = self.render_nodes(children, scope, path, in_island, out);
                    scope.pop_locals();
                    result?;
                }
                Ok(())
            }
            // Triggers emit nothing themselves; the owning button carries
            // the handler id.
            Node::Handler { .. } => Ok(()),
            Node::Component {
                tag,
                props,
                children,
                ..
            } => self.render_component(tag, props, children, scope, path, in_island, out),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_component(
        &self,
        tag: &str,
        props: &std::collections::BTreeMap<String, Value>,
        children: &[Node],
        scope: &mut Scope,
        path: &mut NodePath,
        in_island: bool,
        out: &mut String,
    ) -> Result<()> {
        let owner = self.ctx.root().field("owner");
        match tag {
            "FlexRow" | "FlexColumn" => {
                let direction = if tag == "FlexRow" { "row" } else { "column" };
                out.push_str(&format!(
                    "<div class=\"ptl-flex-{} ptl-gap-{} ptl-align-{}\">",
                    direction,
                    prop_str(props, "gap"),
                    prop_str(props, "align")
                ));
                self.render_nodes(children, scope, path, in_island, out)?;
                out.push_str("</div>");
                Ok(())
            }
            "GridBox" => {
                out.push_str(&format!(
                    "<div class=\"ptl-grid ptl-cols-{} ptl-gap-{}\">",
                    prop_num(props, "columns"),
                    prop_str(props, "gap")
                ));
                self.render_nodes(children, scope, path, in_island, out)?;
                out.push_str("</div>");
                Ok(())
            }
            "CenteredBox" => {
                out.push_str(&format!(
                    "<div class=\"ptl-centered ptl-width-{}\">",
                    prop_str(props, "width")
                ));
                self.render_nodes(children, scope, path, in_island, out)?;
                out.push_str("</div>");
                Ok(())
            }
            "SplitLayout" => {
                let ratio = prop_str(props, "ratio").replace(':', "-");
                out.push_str(&format!("<div class=\"ptl-split ptl-ratio-{}\">", ratio));
                self.render_nodes(children, scope, path, in_island, out)?;
                out.push_str("</div>");
                Ok(())
            }
            "ProfilePhoto" => {
                out.push_str(&format!(
                    "<img class=\"ptl-avatar ptl-avatar-{} ptl-avatar-{}\" src=\"{}\" alt=\"{}\" />",
                    prop_str(props, "size"),
                    prop_str(props, "shape"),
                    escape_html(&owner.field("avatarUrl").render_string()),
                    escape_html(&owner.field("displayName").render_string())
                ));
                Ok(())
            }
            "DisplayName" => {
                out.push_str(&format!(
                    "<span class=\"ptl-display-name\">{}</span>",
                    escape_html(&owner.field("displayName").render_string())
                ));
                Ok(())
            }
            "UserHandle" => {
                out.push_str(&format!(
                    "<span class=\"ptl-handle\">@{}</span>",
                    escape_html(&owner.field("handle").render_string())
                ));
                Ok(())
            }
            "Bio" => {
                out.push_str("<p class=\"ptl-bio\">");
                let bio = owner.field("bio").render_string();
                if children.is_empty() {
                    out.push_str(&escape_html(&bio));
                } else {
                    self.render_nodes(children, scope, path, in_island, out)?;
                }
                out.push_str("</p>");
                Ok(())
            }
            "Heading" => {
                let level = prop_num(props, "level").max(1.0).min(3.0) as u8;
                out.push_str(&format!("<h{} class=\"ptl-heading\">", level));
                self.render_nodes(children, scope, path, in_island, out)?;
                out.push_str(&format!("</h{}>", level));
                Ok(())
            }
            "StyledText" => {
                out.push_str(&format!(
                    "<span class=\"ptl-text-{}\">",
                    prop_str(props, "tone")
                ));
                self.render_nodes(children, scope, path, in_island, out)?;
                out.push_str("</span>");
                Ok(())
            }
            "BlogPosts" => {
                let limit = prop_num(props, "limit") as usize;
                out.push_str("<section class=\"ptl-posts\">");
                for post in self.ctx.posts().iter().take(limit) {
                    out.push_str(&format!(
                        "<article class=\"ptl-post\"><h3>{}</h3><div>{}</div></article>",
                        escape_html(&post.field("title").render_string()),
                        escape_html(&post.field("body").render_string())
                    ));
                }
                out.push_str("</section>");
                Ok(())
            }
            "Guestbook" => {
                let limit = prop_num(props, "limit") as usize;
                out.push_str("<section class=\"ptl-guestbook\">");
                for entry in self.ctx.guestbook().iter().take(limit) {
                    out.push_str(&format!(
                        "<blockquote class=\"ptl-guest-entry\">{}<cite>{}</cite></blockquote>",
                        escape_html(&entry.field("message").render_string()),
                        escape_html(&entry.field("author").render_string())
                    ));
                }
                out.push_str("</section>");
                Ok(())
            }
            "FriendList" => {
                let limit = prop_num(props, "limit") as usize;
                out.push_str("<ul class=\"ptl-friends\">");
                for friend in self.ctx.friends().iter().take(limit) {
                    out.push_str(&format!(
                        "<li>@{}</li>",
                        escape_html(&friend.field("handle").render_string())
                    ));
                }
                out.push_str("</ul>");
                Ok(())
            }
            "ImageGallery" => {
                let limit = prop_num(props, "limit") as usize;
                out.push_str(&format!(
                    "<div class=\"ptl-gallery ptl-cols-{}\">",
                    prop_num(props, "columns")
                ));
                for image in self.ctx.images().iter().take(limit) {
                    out.push_str(&format!(
                        "<img src=\"{}\" alt=\"{}\" />",
                        escape_html(&image.field("url").render_string()),
                        escape_html(&image.field("alt").render_string())
                    ));
                }
                out.push_str("</div>");
                Ok(())
            }
            "PostCount" => {
                out.push_str(&format_number(self.ctx.posts().len() as f64));
                Ok(())
            }
            "FriendCount" => {
                out.push_str(&format_number(self.ctx.friends().len() as f64));
                Ok(())
            }
            // Declarations render nothing.
            "Var" => Ok(()),
            "Button" => {
                let handler_id = children.iter().find_map(|c| match c {
                    Node::Handler { id, .. } => Some(*id),
                    _ => None,
                });
                out.push_str("<button class=\"ptl-button\"");
                if let Some(id) = handler_id {
                    out.push_str(&format!(" data-ptl-handler=\"{}\"", id));
                }
                out.push_str(&format!(
                    ">{}</button>",
                    escape_html(prop_str(props, "label"))
                ));
                Ok(())
            }
            other => Err(TemplateError::render(format!(
                "no renderer for component <{}>",
                other
            ))),
        }
    }
}

fn prop_str<'p>(props: &'p std::collections::BTreeMap<String, Value>, name: &str) -> &'p str {
    props.get(name).and_then(|v| v.as_str()).unwrap_or("")
}

fn prop_num(props: &std::collections::BTreeMap<String, Value>, name: &str) -> f64 {
    props.get(name).and_then(|v| v.as_number()).unwrap_or(0.0)
}

fn is_void_tag(tag: &str) -> bool {
    matches!(tag, "br" | "hr" | "img")
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OwnerProfile, Viewer};
    use crate::islands::analyze;
    use crate::parser::Parser;
    use crate::registry::Registry;
    use crate::types::VarType;

    fn parse(src: &str) -> Vec<Node> {
        let registry = Registry::standard();
        Parser::new(&registry).parse(src).unwrap()
    }

    fn ctx() -> DataContext {
        DataContext::new(OwnerProfile {
            id: "u1".into(),
            handle: "maple".into(),
            display_name: "Maple".into(),
            bio: "gardener & <coder>".into(),
            avatar_url: Some("https://pics.example/m.png".into()),
        })
    }

    fn render(src: &str, ctx: &DataContext, store: &VariableStore) -> String {
        let tree = parse(src);
        let islands = analyze(&tree);
        Renderer::new(ctx, store, &islands).render(&tree).unwrap()
    }

    #[test]
    fn test_static_profile_render() {
        let store = VariableStore::new();
        let html = render(
            r#"<CenteredBox><ProfilePhoto size="lg" /><DisplayName /><UserHandle /></CenteredBox>"#,
            &ctx(),
            &store,
        );
        assert!(html.contains("ptl-avatar-lg"));
        assert!(html.contains("<span class=\"ptl-display-name\">Maple</span>"));
        assert!(html.contains("@maple"));
        assert!(!html.contains("data-ptl-island"));
    }

    #[test]
    fn test_interpolation_is_escaped() {
        let store = VariableStore::new();
        let html = render("<p>{owner.bio}</p>", &ctx(), &store);
        assert!(html.contains("gardener &amp; &lt;coder&gt;"));
        assert!(!html.contains("<coder>"));
    }

    #[test]
    fn test_empty_sentinel_renders_as_empty_string() {
        let store = VariableStore::new();
        let html = render("<p>[{owner.pronouns}]</p>", &ctx(), &store);
        assert!(html.contains("[]"));
    }

    #[test]
    fn test_island_annotation_and_handler_binding() {
        let store = {
            let mut s = VariableStore::new();
            s.declare("count", VarType::Number, Some("0".into())).unwrap();
            s
        };
        let html = render(
            r#"<div>
                 <p>Count: {$vars.count}</p>
                 <Button label="More"><OnClick><Increment var="count" /></OnClick></Button>
               </div>"#,
            &ctx(),
            &store,
        );
        assert!(html.contains("data-ptl-island=\"0\""));
        assert!(html.contains("data-ptl-handler=\"0\""));
        assert!(html.contains("Count: 0"));
    }

    #[test]
    fn test_loop_binds_item_and_index() {
        let posts: Vec<Value> = serde_json::from_str::<serde_json::Value>(
            r#"[{"title": "First"}, {"title": "Second"}]"#,
        )
        .map(|v| match Value::from(v) {
            Value::Array(items) => items,
            _ => unreachable!(),
        })
        .unwrap();
        let ctx = ctx().with_posts(posts);
        let store = VariableStore::new();
        let html = render(
            r#"<ul><ForEach source="posts" item="post" index="i"><li>{i}: {post.title}</li></ForEach></ul>"#,
            &ctx,
            &store,
        );
        assert!(html.contains("<li>0: First</li>"));
        assert!(html.contains("<li>1: Second</li>"));
    }

    #[test]
    fn test_blog_posts_respects_limit() {
        let posts: Vec<Value> = (0..5)
            .map(|i| {
                Value::Object(
                    [("title".to_string(), Value::String(format!("p{}", i)))]
                        .into_iter()
                        .collect(),
                )
            })
            .collect();
        let ctx = ctx().with_posts(posts);
        let store = VariableStore::new();
        let html = render(r#"<BlogPosts limit="2" />"#, &ctx, &store);
        assert!(html.contains("p0"));
        assert!(html.contains("p1"));
        assert!(!html.contains("p2"));
    }

    #[test]
    fn test_ifowner_renders_nothing_for_visitor() {
        let store = VariableStore::new();
        let src = r#"<IfOwner><p>secret editor</p></IfOwner><IfVisitor><p>welcome</p></IfVisitor>"#;

        let visitor_view = render(src, &ctx(), &store);
        assert!(!visitor_view.contains("secret editor"));
        assert!(visitor_view.contains("welcome"));

        let owner_ctx = ctx().with_viewer(Viewer {
            id: "u1".into(),
            handle: "maple".into(),
        });
        let owner_view = render(src, &owner_ctx, &store);
        assert!(owner_view.contains("secret editor"));
        assert!(!owner_view.contains("welcome"));
    }

    #[test]
    fn test_choose_instantiates_exactly_one_branch() {
        let store = VariableStore::new();
        let html = render(
            r#"<Choose>
                 <When condition="owner.handle == 'maple'">match</When>
                 <When condition="true">also true</When>
                 <Otherwise>fallback</Otherwise>
               </Choose>"#,
            &ctx(),
            &store,
        );
        assert!(html.contains("match"));
        assert!(!html.contains("also true"));
        assert!(!html.contains("fallback"));
    }

    #[test]
    fn test_island_scoped_rerender() {
        let tree = parse(r#"<p>Count: {$vars.count}</p><p>static text</p>"#);
        let islands = analyze(&tree);
        assert_eq!(islands.len(), 1);

        let mut store = VariableStore::new();
        store.declare("count", VarType::Number, Some("3".into())).unwrap();
        let ctx = ctx();
        let renderer = Renderer::new(&ctx, &store, &islands);
        let patch = renderer.render_island(&tree, &islands[0]).unwrap();
        assert!(patch.contains("Count: 3"));
        assert!(patch.contains("data-ptl-island=\"0\""));
        assert!(!patch.contains("static text"));
    }

    #[test]
    fn test_render_island_with_stale_path_is_render_error() {
        let tree = parse(r#"<p>{$vars.x}</p>"#);
        let mut islands = analyze(&tree);
        islands[0].path = vec![7];
        let store = VariableStore::new();
        let ctx = ctx();
        let renderer = Renderer::new(&ctx, &store, &islands);
        let err = renderer.render_island(&tree, &islands[0]).unwrap_err();
        assert!(matches!(err, TemplateError::Render { .. }));
    }

    #[test]
    fn test_attribute_values_escaped() {
        let store = VariableStore::new();
        let html = render(r#"<div class="a&quot;b">x</div>"#, &ctx(), &store);
        assert!(html.contains("class=\"a&amp;quot;b\""));
    }
}

//! Action pipeline: ordered handler execution
//!
//! One user trigger runs its actions strictly in source order, synchronously.
//! Each action's writes are visible to the next through the variable store,
//! and only through the store: operators never see another operator's
//! in-flight state. Operator misuse (Filter on a non-array, Toggle on a
//! number) degrades to a local no-op that is logged and skipped; the pipeline
//! always continues to the next action.

use crate::ast::{ActionKind, ActionNode};
use crate::context::DataContext;
use crate::error::{Result, TemplateError};
use crate::expr::{evaluate, Expr, Scope};
use crate::types::Value;
use crate::vars::VariableStore;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// What one pipeline run did: which variables were written, which islands
/// their subscriptions say must re-render, and the locally recovered errors.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    pub written: BTreeSet<String>,
    pub notified_islands: BTreeSet<usize>,
    pub recovered_errors: Vec<TemplateError>,
}

/// Execute a handler's actions against the store and data context.
pub fn run_pipeline(
    actions: &[ActionNode],
    store: &mut VariableStore,
    ctx: &DataContext,
) -> PipelineOutcome {
    let mut outcome = PipelineOutcome::default();
    for action in actions {
        match execute(&action.kind, store, ctx) {
            Ok((target, value)) => match store.set(&target, value) {
                Ok(islands) => {
                    outcome.written.insert(target);
                    outcome.notified_islands.extend(islands);
                }
                Err(err) => {
                    log::warn!("action at line {} skipped: {}", action.line, err);
                    outcome.recovered_errors.push(err);
                }
            },
            Err(err) => {
                log::warn!("action at line {} skipped: {}", action.line, err);
                outcome.recovered_errors.push(err);
            }
        }
    }
    outcome
}

/// Run one action to its (target, value) write, or an `ActionError`.
fn execute(kind: &ActionKind, store: &VariableStore, ctx: &DataContext) -> Result<(String, Value)> {
    let scope = Scope::with_vars(ctx.root(), store);
    match kind {
        ActionKind::Set { var, expr } => {
            let value = evaluate(expr, &scope);
            Ok((var.clone(), value))
        }
        ActionKind::Toggle { var } => match store.get(var) {
            Some(Value::Bool(b)) => Ok((var.clone(), Value::Bool(!b))),
            Some(other) => Err(TemplateError::action(format!(
                "Toggle target '{}' is not a boolean (found {})",
                var,
                other.render_string()
            ))),
            None => Err(TemplateError::action(format!(
                "Toggle target '{}' is not declared",
                var
            ))),
        },
        ActionKind::Increment { var, min, max } => stepped(store, var, 1.0, *min, *max),
        ActionKind::Decrement { var, min, max } => stepped(store, var, -1.0, *min, *max),
        ActionKind::Filter {
            source,
            target,
            predicate,
        } => {
            let items = source_array(source, &scope, "Filter")?;
            let mut scope = scope;
            let mut kept = Vec::new();
            for (i, item) in items.into_iter().enumerate() {
                if per_item(&mut scope, &item, i, predicate).is_truthy() {
                    kept.push(item);
                }
            }
            Ok((target.clone(), Value::Array(kept)))
        }
        ActionKind::Sort {
            source,
            target,
            by,
            descending,
        } => {
            let items = source_array(source, &scope, "Sort")?;
            let mut scope = scope;
            let mut keyed: Vec<(Value, Value)> = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| {
                    let key = per_item(&mut scope, &item, i, by);
                    (key, item)
                })
                .collect();
            // Vec::sort_by is stable: ties keep their original order.
            if *descending {
                keyed.sort_by(|a, b| value_order(&b.0, &a.0));
            } else {
                keyed.sort_by(|a, b| value_order(&a.0, &b.0));
            }
            Ok((
                target.clone(),
                Value::Array(keyed.into_iter().map(|(_, item)| item).collect()),
            ))
        }
        ActionKind::Transform {
            source,
            target,
            expr,
        } => {
            let items = source_array(source, &scope, "Transform")?;
            let mut scope = scope;
            let mapped: Vec<Value> = items
                .into_iter()
                .enumerate()
                .map(|(i, item)| per_item(&mut scope, &item, i, expr))
                .collect();
            Ok((target.clone(), Value::Array(mapped)))
        }
        ActionKind::Find {
            source,
            target,
            predicate,
        } => {
            let items = source_array(source, &scope, "Find")?;
            let mut scope = scope;
            for (i, item) in items.into_iter().enumerate() {
                if per_item(&mut scope, &item, i, predicate).is_truthy() {
                    return Ok((target.clone(), item));
                }
            }
            Ok((target.clone(), Value::Empty))
        }
        ActionKind::Count {
            source,
            target,
            predicate,
        } => {
            let items = source_array(source, &scope, "Count")?;
            let count = match predicate {
                Some(predicate) => {
                    let mut scope = scope;
                    items
                        .into_iter()
                        .enumerate()
                        .filter(|(i, item)| per_item(&mut scope, item, *i, predicate).is_truthy())
                        .count()
                }
                None => items.len(),
            };
            Ok((target.clone(), Value::Number(count as f64)))
        }
        ActionKind::Sum {
            source,
            target,
            property,
        } => {
            let items = source_array(source, &scope, "Sum")?;
            let total: f64 = items
                .iter()
                .map(|item| {
                    let contribution = match property {
                        // The property path resolves against each element.
                        Some(path) => {
                            let mut item_scope = Scope::new(item);
                            item_scope.push_locals(
                                [("item".to_string(), item.clone())].into_iter().collect(),
                            );
                            evaluate(path, &item_scope)
                        }
                        None => item.clone(),
                    };
                    contribution.as_number().unwrap_or(0.0)
                })
                .sum();
            Ok((target.clone(), Value::Number(total)))
        }
        ActionKind::Get { source, target, at } => {
            let base = evaluate(source, &scope);
            let key = evaluate(at, &scope);
            Ok((target.clone(), base.index(&key)))
        }
    }
}

fn stepped(
    store: &VariableStore,
    var: &str,
    step: f64,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<(String, Value)> {
    let current = match store.get(var) {
        Some(Value::Number(n)) => *n,
        Some(_) => {
            return Err(TemplateError::action(format!(
                "step target '{}' is not a number",
                var
            )));
        }
        None => {
            return Err(TemplateError::action(format!(
                "step target '{}' is not declared",
                var
            )));
        }
    };
    let mut next = current + step;
    if let Some(min) = min {
        next = next.max(min);
    }
    if let Some(max) = max {
        next = next.min(max);
    }
    Ok((var.to_string(), Value::Number(next)))
}

fn source_array(source: &Expr, scope: &Scope, operator: &str) -> Result<Vec<Value>> {
    match evaluate(source, scope) {
        Value::Array(items) => Ok(items),
        other => Err(TemplateError::action(format!(
            "{} source is not an array (found {})",
            operator,
            shape_name(&other)
        ))),
    }
}

fn per_item(scope: &mut Scope, item: &Value, index: usize, expr: &Expr) -> Value {
    let mut locals: HashMap<String, Value> = HashMap::new();
    locals.insert("item".to_string(), item.clone());
    locals.insert("index".to_string(), Value::Number(index as f64));
    scope.push_locals(locals);
    let result = evaluate(expr, scope);
    scope.pop_locals();
    result
}

/// Total order over sort keys: numbers, then strings, then booleans, with
/// Empty always last. Cross-type keys compare by that rank.
fn value_order(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => shape_rank(a).cmp(&shape_rank(b)),
    }
}

fn shape_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Empty => 5,
    }
}

fn shape_name(v: &Value) -> &'static str {
    match v {
        Value::Empty => "empty",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OwnerProfile;
    use crate::expr::parse_expression;
    use crate::types::VarType;

    fn ctx() -> DataContext {
        DataContext::new(OwnerProfile {
            id: "u1".into(),
            handle: "maple".into(),
            display_name: "Maple".into(),
            bio: String::new(),
            avatar_url: None,
        })
    }

    fn products() -> String {
        r#"[
            {"name": "Laptop", "price": 999, "category": "tech"},
            {"name": "Mouse", "price": 29, "category": "tech"},
            {"name": "Desk", "price": 199, "category": "office"}
        ]"#
        .to_string()
    }

    fn store_with_products() -> VariableStore {
        let mut store = VariableStore::new();
        store
            .declare("products", VarType::Array, Some(products()))
            .unwrap();
        store.declare("result", VarType::Array, None).unwrap();
        store.declare("n", VarType::Number, None).unwrap();
        store
    }

    fn action(kind: ActionKind) -> ActionNode {
        ActionNode { kind, line: 1 }
    }

    fn expr(src: &str) -> Expr {
        parse_expression(src).unwrap()
    }

    #[test]
    fn test_filter_then_count_scenario() {
        // Two tech products in, Filter(category=='tech') then Count gives 2.
        let mut store = store_with_products();
        let outcome = run_pipeline(
            &[
                action(ActionKind::Filter {
                    source: expr("$vars.products"),
                    target: "result".into(),
                    predicate: expr("item.category == 'tech'"),
                }),
                action(ActionKind::Count {
                    source: expr("$vars.result"),
                    target: "n".into(),
                    predicate: None,
                }),
            ],
            &mut store,
            &ctx(),
        );
        assert!(outcome.recovered_errors.is_empty());
        assert_eq!(store.get("n"), Some(&Value::Number(2.0)));
        let kept = store.get("result").unwrap().as_array().unwrap();
        // Original order preserved.
        assert_eq!(kept[0].field("name"), Value::String("Laptop".into()));
        assert_eq!(kept[1].field("name"), Value::String("Mouse".into()));
    }

    #[test]
    fn test_count_with_predicate_equals_count_of_filter() {
        let mut store = store_with_products();
        run_pipeline(
            &[
                action(ActionKind::Filter {
                    source: expr("$vars.products"),
                    target: "result".into(),
                    predicate: expr("item.price < 500"),
                }),
                action(ActionKind::Count {
                    source: expr("$vars.result"),
                    target: "n".into(),
                    predicate: None,
                }),
            ],
            &mut store,
            &ctx(),
        );
        let filtered_count = store.get("n").cloned().unwrap();
        run_pipeline(
            &[action(ActionKind::Count {
                source: expr("$vars.products"),
                target: "n".into(),
                predicate: Some(expr("item.price < 500")),
            })],
            &mut store,
            &ctx(),
        );
        assert_eq!(store.get("n"), Some(&filtered_count));
    }

    #[test]
    fn test_sort_ascending_scenario() {
        let mut store = store_with_products();
        run_pipeline(
            &[action(ActionKind::Sort {
                source: expr("$vars.products"),
                target: "result".into(),
                by: expr("item.price"),
                descending: false,
            })],
            &mut store,
            &ctx(),
        );
        let sorted = store.get("result").unwrap().as_array().unwrap();
        let prices: Vec<Value> = sorted.iter().map(|p| p.field("price")).collect();
        assert_eq!(
            prices,
            vec![Value::Number(29.0), Value::Number(199.0), Value::Number(999.0)]
        );
    }

    #[test]
    fn test_sort_is_stable_and_idempotent() {
        let mut store = VariableStore::new();
        store
            .declare(
                "items",
                VarType::Array,
                Some(r#"[{"k": 1, "tag": "a"}, {"k": 1, "tag": "b"}, {"k": 0, "tag": "c"}]"#.into()),
            )
            .unwrap();
        store.declare("sorted", VarType::Array, None).unwrap();
        store.declare("again", VarType::Array, None).unwrap();

        let sort_to = |target: &str, source: &str| {
            action(ActionKind::Sort {
                source: expr(source),
                target: target.into(),
                by: expr("item.k"),
                descending: false,
            })
        };
        run_pipeline(&[sort_to("sorted", "$vars.items")], &mut store, &ctx());
        let sorted = store.get("sorted").unwrap().clone();
        let tags: Vec<Value> = sorted
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.field("tag"))
            .collect();
        // Equal keys keep original relative order.
        assert_eq!(
            tags,
            vec![
                Value::String("c".into()),
                Value::String("a".into()),
                Value::String("b".into())
            ]
        );

        run_pipeline(&[sort_to("again", "$vars.sorted")], &mut store, &ctx());
        assert_eq!(store.get("again"), Some(&sorted));
    }

    #[test]
    fn test_transform_preserves_length_and_order() {
        let mut store = store_with_products();
        run_pipeline(
            &[action(ActionKind::Transform {
                source: expr("$vars.products"),
                target: "result".into(),
                expr: expr("item.name + ': $' + item.price"),
            })],
            &mut store,
            &ctx(),
        );
        let mapped = store.get("result").unwrap().as_array().unwrap();
        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0], Value::String("Laptop: $999".into()));
        assert_eq!(mapped[2], Value::String("Desk: $199".into()));
    }

    #[test]
    fn test_sum_property_scenario() {
        let mut store = store_with_products();
        run_pipeline(
            &[action(ActionKind::Sum {
                source: expr("$vars.products"),
                target: "n".into(),
                property: Some(expr("price")),
            })],
            &mut store,
            &ctx(),
        );
        assert_eq!(store.get("n"), Some(&Value::Number(1227.0)));
    }

    #[test]
    fn test_sum_skips_non_numeric() {
        let mut store = VariableStore::new();
        store
            .declare(
                "mixed",
                VarType::Array,
                Some(r#"[1, "two", 3, null, {"x": 1}]"#.into()),
            )
            .unwrap();
        store.declare("n", VarType::Number, None).unwrap();
        run_pipeline(
            &[action(ActionKind::Sum {
                source: expr("$vars.mixed"),
                target: "n".into(),
                property: None,
            })],
            &mut store,
            &ctx(),
        );
        assert_eq!(store.get("n"), Some(&Value::Number(4.0)));
    }

    #[test]
    fn test_find_no_match_writes_sentinel() {
        let mut store = store_with_products();
        store.declare("found", VarType::Array, None).unwrap();
        let outcome = run_pipeline(
            &[action(ActionKind::Find {
                source: expr("$vars.products"),
                target: "found".into(),
                predicate: expr("item.category == 'furniture'"),
            })],
            &mut store,
            &ctx(),
        );
        assert!(outcome.recovered_errors.is_empty());
        assert_eq!(store.get("found"), Some(&Value::Empty));
    }

    #[test]
    fn test_get_by_index_and_key() {
        let mut store = store_with_products();
        store
            .declare("nums", VarType::Array, Some("[5, 7, 9]".into()))
            .unwrap();
        store.declare("picked", VarType::Number, None).unwrap();
        store.declare("one", VarType::String, None).unwrap();
        run_pipeline(
            &[
                action(ActionKind::Get {
                    source: expr("$vars.nums"),
                    target: "picked".into(),
                    at: expr("1 + 1"),
                }),
                action(ActionKind::Get {
                    source: expr("$vars.products[1]"),
                    target: "one".into(),
                    at: expr("'name'"),
                }),
            ],
            &mut store,
            &ctx(),
        );
        assert_eq!(store.get("picked"), Some(&Value::Number(9.0)));
        assert_eq!(store.get("one"), Some(&Value::String("Mouse".into())));
    }

    #[test]
    fn test_get_miss_is_sentinel() {
        let mut store = store_with_products();
        store.declare("x", VarType::String, None).unwrap();
        run_pipeline(
            &[action(ActionKind::Get {
                source: expr("$vars.products"),
                target: "x".into(),
                at: expr("99"),
            })],
            &mut store,
            &ctx(),
        );
        assert_eq!(store.get("x"), Some(&Value::Empty));
    }

    #[test]
    fn test_increment_clamps_and_decrement() {
        let mut store = VariableStore::new();
        store.declare("count", VarType::Number, Some("9".into())).unwrap();
        let inc = action(ActionKind::Increment {
            var: "count".into(),
            min: None,
            max: Some(10.0),
        });
        run_pipeline(&[inc.clone(), inc.clone(), inc], &mut store, &ctx());
        assert_eq!(store.get("count"), Some(&Value::Number(10.0)));

        let dec = action(ActionKind::Decrement {
            var: "count".into(),
            min: Some(9.0),
            max: None,
        });
        run_pipeline(&[dec.clone(), dec], &mut store, &ctx());
        assert_eq!(store.get("count"), Some(&Value::Number(9.0)));
    }

    #[test]
    fn test_toggle() {
        let mut store = VariableStore::new();
        store
            .declare("open", VarType::Boolean, Some("false".into()))
            .unwrap();
        run_pipeline(
            &[action(ActionKind::Toggle { var: "open".into() })],
            &mut store,
            &ctx(),
        );
        assert_eq!(store.get("open"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_non_array_source_is_local_noop() {
        let mut store = VariableStore::new();
        store.declare("num", VarType::Number, Some("7".into())).unwrap();
        store
            .declare("result", VarType::Array, Some("[1]".into()))
            .unwrap();
        store.declare("after", VarType::Number, None).unwrap();
        let outcome = run_pipeline(
            &[
                action(ActionKind::Filter {
                    source: expr("$vars.num"),
                    target: "result".into(),
                    predicate: expr("item > 0"),
                }),
                action(ActionKind::Set {
                    var: "after".into(),
                    expr: expr("1"),
                }),
            ],
            &mut store,
            &ctx(),
        );
        assert_eq!(outcome.recovered_errors.len(), 1);
        // Target untouched, pipeline continued.
        assert_eq!(
            store.get("result"),
            Some(&Value::Array(vec![Value::Number(1.0)]))
        );
        assert_eq!(store.get("after"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_mismatched_target_type_rejected_by_store() {
        // Sum writes a number; a string-typed target rejects the write and
        // keeps its old value.
        let mut store = store_with_products();
        store
            .declare("label", VarType::String, Some("untouched".into()))
            .unwrap();
        let outcome = run_pipeline(
            &[action(ActionKind::Sum {
                source: expr("$vars.products"),
                target: "label".into(),
                property: Some(expr("price")),
            })],
            &mut store,
            &ctx(),
        );
        assert_eq!(outcome.recovered_errors.len(), 1);
        assert_eq!(store.get("label"), Some(&Value::String("untouched".into())));
    }

    #[test]
    fn test_chained_filter_sort_transform() {
        let mut store = store_with_products();
        store.declare("step2", VarType::Array, None).unwrap();
        store.declare("names", VarType::Array, None).unwrap();
        run_pipeline(
            &[
                action(ActionKind::Filter {
                    source: expr("$vars.products"),
                    target: "result".into(),
                    predicate: expr("item.category == 'tech'"),
                }),
                action(ActionKind::Sort {
                    source: expr("$vars.result"),
                    target: "step2".into(),
                    by: expr("item.price"),
                    descending: false,
                }),
                action(ActionKind::Transform {
                    source: expr("$vars.step2"),
                    target: "names".into(),
                    expr: expr("item.name"),
                }),
            ],
            &mut store,
            &ctx(),
        );
        assert_eq!(
            store.get("names"),
            Some(&Value::Array(vec![
                Value::String("Mouse".into()),
                Value::String("Laptop".into())
            ]))
        );
    }

    #[test]
    fn test_set_from_data_context() {
        let ctx = ctx().with_posts(vec![Value::Empty, Value::Empty]);
        let mut store = VariableStore::new();
        store.declare("n", VarType::Number, None).unwrap();
        run_pipeline(
            &[action(ActionKind::Set {
                var: "n".into(),
                expr: expr("postCount"),
            })],
            &mut store,
            &ctx,
        );
        assert_eq!(store.get("n"), Some(&Value::Number(2.0)));
    }
}

//! Query evaluation over an ordered document map.

use crate::types::{
    Direction, DocumentRef, Fields, Filter, FilterOp, Query, QueryDocument, QuerySnapshot,
    QuerySource, ResourcePath,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: by type first, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    same_type(a, b) && compare_values(a, b) == Ordering::Equal
}

/// Look up a dotted field path.
fn lookup<'a>(fields: &'a Fields, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn filter_matches(filter: &Filter, fields: &Fields) -> bool {
    let Some(value) = lookup(fields, &filter.field) else {
        return false;
    };
    let target = &filter.value;

    match filter.op {
        FilterOp::Equal => values_equal(value, target),
        FilterOp::NotEqual => !values_equal(value, target),
        FilterOp::LessThan => same_type(value, target) && compare_values(value, target).is_lt(),
        FilterOp::LessThanOrEqual => {
            same_type(value, target) && compare_values(value, target).is_le()
        }
        FilterOp::GreaterThan => same_type(value, target) && compare_values(value, target).is_gt(),
        FilterOp::GreaterThanOrEqual => {
            same_type(value, target) && compare_values(value, target).is_ge()
        }
        FilterOp::ArrayContains => value
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(item, target))),
        FilterOp::In => target
            .as_array()
            .is_some_and(|options| options.iter().any(|option| values_equal(value, option))),
    }
}

/// Whether a document at `path` is read by the query's source.
pub fn matches_source(query: &Query, path: &ResourcePath) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    match &query.source {
        QuerySource::Collection(collection) => &parent == collection.path(),
        QuerySource::CollectionGroup(id) => parent.last_segment() == Some(id.as_str()),
    }
}

/// Run a query. Without an explicit order, results come back in path order.
pub fn evaluate_query(query: &Query, documents: &BTreeMap<ResourcePath, Fields>) -> QuerySnapshot {
    let mut rows: Vec<(&ResourcePath, &Fields)> = documents
        .iter()
        .filter(|(path, _)| path.len() % 2 == 0 && matches_source(query, path))
        .filter(|(_, fields)| query.filters.iter().all(|f| filter_matches(f, fields)))
        .filter(|(_, fields)| {
            query
                .order_by
                .iter()
                .all(|order| lookup(fields, &order.field).is_some())
        })
        .collect();

    if !query.order_by.is_empty() {
        rows.sort_by(|(lp, lf), (rp, rf)| {
            for order in &query.order_by {
                let (Some(l), Some(r)) = (lookup(lf, &order.field), lookup(rf, &order.field))
                else {
                    continue;
                };
                let ord = match order.direction {
                    Direction::Ascending => compare_values(l, r),
                    Direction::Descending => compare_values(r, l),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            lp.cmp(rp)
        });
    }

    if let Some(limit) = query.limit {
        rows.truncate(limit);
    }

    QuerySnapshot {
        docs: rows
            .into_iter()
            .filter_map(|(path, fields)| {
                DocumentRef::from_path(path.clone())
                    .ok()
                    .map(|reference| QueryDocument {
                        reference,
                        data: fields.clone(),
                    })
            })
            .collect(),
    }
}

//! `eval`, `where`, `default`, `delete`, `shift` (spec §4.5). All stateless
//! per-group maps over points except `shift`, which only offsets time.

use flow_core::{GroupBySpec, Message, Point, Value};

use crate::lambda::Expr;
use crate::operator::Operator;

/// `eval(lambda...).as(name...)`.
pub struct Eval {
    pub exprs: Vec<(Expr, String)>,
    /// `keep()` / `keep(names...)`: `None` drops unlisted prior fields,
    /// `Some(&[])` from `keep()` with no args means "keep everything".
    pub keep: Option<Vec<String>>,
    pub keep_all: bool,
    /// Computed field names promoted to tags; must evaluate to a string.
    pub promote_tags: Vec<String>,
}

impl Eval {
    pub fn new(exprs: Vec<(Expr, String)>) -> Self {
        Self {
            exprs,
            keep: None,
            keep_all: false,
            promote_tags: Vec::new(),
        }
    }

    pub fn keep_all(mut self) -> Self {
        self.keep_all = true;
        self
    }

    pub fn keep(mut self, names: Vec<String>) -> Self {
        self.keep = Some(names);
        self
    }

    pub fn tags(mut self, names: Vec<String>) -> Self {
        self.promote_tags = names;
        self
    }
}

impl Operator for Eval {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(mut p) = msg else {
            return vec![msg];
        };

        let mut computed = std::collections::HashMap::new();
        for (expr, name) in &self.exprs {
            match expr.eval(&p) {
                Ok(v) => {
                    computed.insert(name.clone(), v);
                }
                Err(e) => {
                    tracing::warn!(field = %name, error = %e, "eval: dropping point on lambda error");
                    return Vec::new();
                }
            }
        }

        if self.keep_all {
            // Keep prior fields as-is.
        } else if let Some(names) = &self.keep {
            if !names.is_empty() {
                p.fields.retain(|k, _| names.contains(k));
            }
        } else {
            p.fields.clear();
        }

        for (name, value) in computed {
            p.fields.insert(name, value);
        }

        let mut group_dirty = false;
        for tag_name in &self.promote_tags {
            if let Some(v) = p.fields.get(tag_name) {
                p.tags.insert(tag_name.clone(), v.render());
                group_dirty = true;
            }
        }
        if group_dirty {
            p.recompute_group(false);
        }

        vec![Message::Point(p)]
    }
}

/// `where(lambda)`: passes a point only if the lambda evaluates true.
pub struct Where {
    pub predicate: Expr,
}

impl Operator for Where {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(p) = &msg else {
            return vec![msg];
        };
        match self.predicate.eval(p) {
            Ok(v) if v.as_bool() == Some(true) => vec![msg],
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "where: dropping point on lambda error");
                Vec::new()
            }
        }
    }
}

/// `default().field(k,v)` / `default().tag(k,v)`: fill a field/tag only
/// when it is absent. Named `DefaultFields` rather than `Default` to avoid
/// shadowing `std::default::Default` at call sites that glob-import this
/// module.
#[derive(Default)]
pub struct DefaultFields {
    pub fields: Vec<(String, Value)>,
    pub tags: Vec<(String, String)>,
}

impl Operator for DefaultFields {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(mut p) = msg else {
            return vec![msg];
        };
        for (k, v) in &self.fields {
            p.fields.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &self.tags {
            if !p.tags.contains_key(k) {
                p.tags.insert(k.clone(), v.clone());
            }
        }
        vec![Message::Point(p)]
    }
}

#[derive(Default)]
pub struct Delete {
    pub fields: Vec<String>,
    pub tags: Vec<String>,
    /// If a deleted tag is part of the active group-by set, the group must
    /// be re-derived (spec §4.5).
    pub regroup: Option<GroupBySpec>,
}

impl Operator for Delete {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        let Message::Point(mut p) = msg else {
            return vec![msg];
        };
        for f in &self.fields {
            p.fields.remove(f);
        }
        let mut any_tag_removed = false;
        for t in &self.tags {
            if p.tags.remove(t).is_some() {
                any_tag_removed = true;
            }
        }
        if any_tag_removed {
            if let Some(spec) = &self.regroup {
                let (tags, gid) = spec.apply(&p.measurement, &p.tags, false);
                p.tags = tags;
                p.group_id = gid;
            } else {
                p.recompute_group(false);
            }
        }
        vec![Message::Point(p)]
    }
}

/// `shift(d)`: adds `d` nanoseconds to every timestamp on the edge.
pub struct Shift {
    pub delta: i64,
}

impl Operator for Shift {
    fn process(&mut self, msg: Message) -> Vec<Message> {
        match msg {
            Message::Point(mut p) => {
                p.time += self.delta;
                vec![Message::Point(p)]
            }
            other => vec![other],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::Tags;

    #[test]
    fn eval_appends_named_field_and_keeps_prior_by_default_off() {
        let mut op = Eval::new(vec![(
            Expr::Add(Box::new(Expr::Field("a".into())), Box::new(Expr::Field("b".into()))),
            "sum".into(),
        )]);
        let p = Point::new("cpu", 0).with_field("a", 1.0).with_field("b", 2.0);
        let out = op.process(Message::Point(p));
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.field("sum").and_then(Value::as_f64), Some(3.0));
        assert!(p.field("a").is_none(), "without keep(), prior fields are dropped");
    }

    #[test]
    fn eval_keep_all_preserves_prior_fields() {
        let mut op = Eval::new(vec![(Expr::Const(1.0.into()), "one".into())]).keep_all();
        let p = Point::new("cpu", 0).with_field("a", 1.0);
        let out = op.process(Message::Point(p));
        let Message::Point(p) = &out[0] else { panic!() };
        assert!(p.field("a").is_some());
        assert!(p.field("one").is_some());
    }

    #[test]
    fn where_filters_false_predicate() {
        let mut op = Where {
            predicate: Expr::Gt(Box::new(Expr::Field("value".into())), Box::new(Expr::Const(90.0.into()))),
        };
        let pass = Point::new("cpu", 0).with_field("value", 95.0);
        let fail = Point::new("cpu", 0).with_field("value", 10.0);
        assert_eq!(op.process(Message::Point(pass)).len(), 1);
        assert_eq!(op.process(Message::Point(fail)).len(), 0);
    }

    #[test]
    fn default_only_fills_absent_fields() {
        let mut op = DefaultFields {
            fields: vec![("B.value".to_string(), Value::Float(0.0))],
            tags: vec![],
        };
        let present = Point::new("cpu", 0).with_field("B.value", 5.0);
        let absent = Point::new("cpu", 0);
        let out1 = op.process(Message::Point(present));
        let Message::Point(p1) = &out1[0] else { panic!() };
        assert_eq!(p1.field("B.value").and_then(Value::as_f64), Some(5.0));

        let out2 = op.process(Message::Point(absent));
        let Message::Point(p2) = &out2[0] else { panic!() };
        assert_eq!(p2.field("B.value").and_then(Value::as_f64), Some(0.0));
    }

    #[test]
    fn delete_tag_recomputes_group() {
        let mut op = Delete {
            fields: vec![],
            tags: vec!["host".to_string()],
            regroup: None,
        };
        let p = Point::new("cpu", 0).with_tags(Tags::from_pairs([("host", "a")]));
        let before = p.group_id;
        let out = op.process(Message::Point(p));
        let Message::Point(p) = &out[0] else { panic!() };
        assert_ne!(p.group_id, before);
        assert!(p.tag("host").is_none());
    }

    #[test]
    fn shift_offsets_timestamps() {
        let mut op = Shift { delta: 1_000_000_000 };
        let p = Point::new("cpu", 5);
        let out = op.process(Message::Point(p));
        let Message::Point(p) = &out[0] else { panic!() };
        assert_eq!(p.time, 1_000_000_005);
    }
}
